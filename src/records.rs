//! Hospital records: a document store seeded with appointments plus the catalog

use serde_json::Value;
use tracing::info;

use hms_document::document::{CollectionHandle, Cursor, DocumentStore, DocumentStoreMetrics};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;
use crate::fixtures;
use crate::model::Appointment;

/// Appointments collection with the catalog bound to it
pub struct HospitalRecords {
    store: DocumentStore,
    collection: String,
    catalog: Catalog,
}

impl HospitalRecords {
    /// Create an empty collection as configured and validate the catalog
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let store = DocumentStore::new(config.store_config()?);
        store.create_collection(&config.store.collection)?;

        let catalog = Catalog::standard(config.catalog_settings());
        catalog.validate()?;

        Ok(Self {
            store,
            collection: config.store.collection.clone(),
            catalog,
        })
    }

    /// Create and load the configured seed file, or the built-in fixture
    pub fn open(config: &Config) -> Result<Self> {
        let records = Self::new(config)?;
        let appointments = match &config.seed.path {
            Some(path) => fixtures::load_seed_file(path)?,
            None => fixtures::seed_appointments()?,
        };
        records.load(&appointments)?;
        Ok(records)
    }

    /// Insert appointments; all or none are stored
    pub fn load(&self, appointments: &[Appointment]) -> Result<usize> {
        let documents = appointments
            .iter()
            .map(Appointment::to_document)
            .collect::<Result<Vec<_>>>()?;

        let ids = self.store.insert_many(&self.collection, documents)?;
        info!("Loaded {} appointments into {}", ids.len(), self.collection);
        Ok(ids.len())
    }

    /// The catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The underlying store
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Backend over the appointments collection
    pub fn appointments_collection(&self) -> CollectionHandle<'_> {
        self.store.collection(&self.collection)
    }

    /// Run a catalog entry
    pub fn run(&self, id: &str) -> Result<Cursor> {
        self.catalog.run(id, &self.appointments_collection())
    }

    /// Ad-hoc filter query
    pub fn find(&self, filter: &Value, projection: &Value) -> Result<Cursor> {
        Ok(self.store.find(&self.collection, filter, projection)?)
    }

    /// Ad-hoc aggregation
    pub fn aggregate(&self, pipeline: &[Value]) -> Result<Cursor> {
        Ok(self.store.aggregate(&self.collection, pipeline)?)
    }

    /// Every stored appointment, decoded
    pub fn appointments(&self) -> Result<Vec<Appointment>> {
        self.find(&Value::Null, &Value::Null)?
            .map(Appointment::from_document)
            .collect()
    }

    /// Store metrics
    pub fn metrics(&self) -> DocumentStoreMetrics {
        self.store.metrics()
    }
}

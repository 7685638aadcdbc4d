//! Catalog of named read-only operations over the appointments collection
//!
//! Fifteen filter queries (`find-01` to `find-15`) and thirteen aggregation
//! pipelines (`agg-01` to `agg-13`). Entries are plain JSON definitions and
//! run against any [`DocumentBackend`].
//!
//! # Example
//!
//! ```rust,ignore
//! use hms::catalog::{Catalog, CatalogSettings};
//!
//! let catalog = Catalog::standard(CatalogSettings::default());
//! catalog.validate()?;
//!
//! for doc in catalog.run("agg-10", &store.collection("appointments"))? {
//!     println!("{}", doc);
//! }
//! ```

mod pipelines;
mod queries;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::info;

use hms_document::document::{
    AggregationPipeline, Cursor, DocumentBackend, DocumentQuery, DocumentStoreError, FindOptions,
    Projection,
};

use crate::error::{HmsError, Result};
use crate::model::schema;

/// Catalog parameters
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// Window for the expiring-medicines report, in days
    pub expiry_window_days: i64,
    /// Soft-delete flag to filter on; nothing is filtered when unset
    pub exclude_deleted: Option<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            expiry_window_days: 60,
            exclude_deleted: None,
        }
    }
}

/// Kind of catalog operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Filter query with projection
    Find,
    /// Aggregation pipeline
    Aggregate,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Find => f.write_str("find"),
            EntryKind::Aggregate => f.write_str("aggregate"),
        }
    }
}

/// Store operation behind a catalog entry
#[derive(Debug, Clone)]
pub enum Operation {
    /// `find(filter, projection)`
    Find {
        /// Filter document
        filter: Value,
        /// Projection document
        projection: Value,
    },
    /// `aggregate(pipeline)`
    Aggregate {
        /// Pipeline stages
        pipeline: Vec<Value>,
    },
}

/// A named operation with its documented intent
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Entry ID, e.g. `find-04`
    pub id: String,
    /// What the operation returns
    pub intent: String,
    /// Why someone runs it
    pub rationale: String,
    /// The store operation
    pub operation: Operation,
}

impl CatalogEntry {
    fn new(id: &str, intent: &str, rationale: &str, operation: Operation) -> Self {
        Self {
            id: id.to_string(),
            intent: intent.to_string(),
            rationale: rationale.to_string(),
            operation,
        }
    }

    /// Kind of operation
    pub fn kind(&self) -> EntryKind {
        match self.operation {
            Operation::Find { .. } => EntryKind::Find,
            Operation::Aggregate { .. } => EntryKind::Aggregate,
        }
    }

    /// Stored field paths the operation reads
    pub fn source_fields(&self) -> std::result::Result<BTreeSet<String>, DocumentStoreError> {
        match &self.operation {
            Operation::Find { filter, projection } => {
                let mut fields = DocumentQuery::from_json(filter)?.fields();
                fields.extend(Projection::from_json(projection)?.paths().map(String::from));
                Ok(fields)
            }
            Operation::Aggregate { pipeline } => {
                Ok(AggregationPipeline::from_json(pipeline)?.source_fields())
            }
        }
    }
}

/// The catalog of named operations
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    settings: CatalogSettings,
}

impl Catalog {
    /// The standard catalog: `find-01`..`find-15` then `agg-01`..`agg-13`
    pub fn standard(settings: CatalogSettings) -> Self {
        let mut entries = queries::find_queries();
        entries.extend(pipelines::pipelines(&settings));
        Self { entries, settings }
    }

    /// All entries, finds first
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Settings the catalog was built with
    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// Look up an entry by ID
    pub fn get(&self, id: &str) -> Result<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| HmsError::UnknownCatalogEntry(id.to_string()))
    }

    /// Check that every entry parses and reads only fields an appointment has
    pub fn validate(&self) -> Result<()> {
        let known = schema::appointment_paths()?;

        for entry in &self.entries {
            let fields = entry.source_fields().map_err(|e| HmsError::InvalidCatalogEntry {
                id: entry.id.clone(),
                reason: e.to_string(),
            })?;

            if let Some(unknown) = fields.iter().find(|f| !schema::is_known_path(&known, f)) {
                return Err(HmsError::InvalidCatalogEntry {
                    id: entry.id.clone(),
                    reason: format!("unknown field '{}'", unknown),
                });
            }
        }

        Ok(())
    }

    /// Run one entry against a backend
    pub fn run(&self, id: &str, backend: &dyn DocumentBackend) -> Result<Cursor> {
        let entry = self.get(id)?;
        let started = Instant::now();

        let cursor = match &entry.operation {
            Operation::Find { filter, projection } => {
                let mut options = FindOptions::default();
                if let Some(flag) = &self.settings.exclude_deleted {
                    options = options.exclude_deleted(flag);
                }
                backend.find_with_options(filter, projection, &options)?
            }
            Operation::Aggregate { pipeline } => match &self.settings.exclude_deleted {
                Some(flag) => {
                    let mut stages = Vec::with_capacity(pipeline.len() + 1);
                    stages.push(json!({ "$excludeDeleted": flag }));
                    stages.extend(pipeline.iter().cloned());
                    backend.aggregate(&stages)?
                }
                None => backend.aggregate(pipeline)?,
            },
        };

        info!(
            "Ran {} ({}) returning {} documents in {:?}",
            entry.id,
            entry.kind(),
            cursor.len(),
            started.elapsed()
        );
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_ids() {
        let catalog = Catalog::standard(CatalogSettings::default());
        assert_eq!(catalog.entries().len(), 28);

        let finds = catalog
            .entries()
            .iter()
            .filter(|e| e.kind() == EntryKind::Find)
            .count();
        assert_eq!(finds, 15);

        assert_eq!(catalog.entries()[0].id, "find-01");
        assert_eq!(catalog.entries()[14].id, "find-15");
        assert_eq!(catalog.entries()[15].id, "agg-01");
        assert_eq!(catalog.entries()[27].id, "agg-13");
    }

    #[test]
    fn test_standard_catalog_is_valid() {
        Catalog::standard(CatalogSettings::default()).validate().unwrap();
    }

    #[test]
    fn test_unknown_entry() {
        let catalog = Catalog::standard(CatalogSettings::default());
        assert!(matches!(
            catalog.get("agg-99"),
            Err(HmsError::UnknownCatalogEntry(id)) if id == "agg-99"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_field() {
        let mut catalog = Catalog::standard(CatalogSettings::default());
        catalog.entries.push(CatalogEntry::new(
            "find-99",
            "typo",
            "",
            Operation::Find {
                filter: json!({ "patient.frist_name": "Alice" }),
                projection: Value::Null,
            },
        ));
        assert!(matches!(
            catalog.validate(),
            Err(HmsError::InvalidCatalogEntry { id, .. }) if id == "find-99"
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_entry() {
        let mut catalog = Catalog::standard(CatalogSettings::default());
        catalog.entries.push(CatalogEntry::new(
            "agg-99",
            "bad stage",
            "",
            Operation::Aggregate {
                pipeline: vec![json!({ "$lookup": {} })],
            },
        ));
        assert!(matches!(
            catalog.validate(),
            Err(HmsError::InvalidCatalogEntry { .. })
        ));
    }

    #[test]
    fn test_oversized_expiry_window_fails_without_panicking() {
        use chrono::{TimeZone, Utc};
        use hms_document::document::{DocumentStore, DocumentStoreConfig};

        let catalog = Catalog::standard(CatalogSettings {
            expiry_window_days: i64::MAX,
            exclude_deleted: None,
        });
        catalog.validate().unwrap();

        let store = DocumentStore::new(DocumentStoreConfig {
            reference_time: Some(Utc.with_ymd_and_hms(2025, 5, 9, 0, 0, 0).unwrap()),
            ..Default::default()
        });
        store.create_collection("appointments").unwrap();
        store
            .insert_one(
                "appointments",
                json!({ "appointment_id": "a1", "billing": { "medicines": [
                    { "expiry_date": { "$date": "2030-01-01" } }
                ] } }),
            )
            .unwrap();

        let result = catalog.run("agg-05", &store.collection("appointments"));
        assert!(matches!(
            result,
            Err(HmsError::Store(DocumentStoreError::MalformedExpression(_)))
        ));
    }

    #[test]
    fn test_source_fields() {
        let catalog = Catalog::standard(CatalogSettings::default());
        let fields = catalog.get("find-02").unwrap().source_fields().unwrap();
        assert!(fields.contains("billing.medicines.quantity"));
        assert!(fields.contains("billing.medicines"));

        let fields = catalog.get("agg-09").unwrap().source_fields().unwrap();
        assert_eq!(fields.into_iter().collect::<Vec<_>>(), vec!["appointment_date"]);
    }
}

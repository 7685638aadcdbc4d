//! Embedded JSON document store - MongoDB-compatible query semantics
//!
//! This module provides an in-process document store supporting:
//! - Schemaless JSON document storage with extended-JSON dates
//! - Filter queries with dot paths that cross embedded arrays
//! - Inclusion, exclusion and positional projections
//! - Aggregation pipelines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Document Store                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌─────────────┐                          │
//! │  │  Collection  │  │ Collection  │   ...                    │
//! │  │ appointments │  │   scratch   │                          │
//! │  └──────────────┘  └─────────────┘                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │   Query evaluator  │  Projection  │  Aggregation pipeline    │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Expression evaluator (EvalContext: $$NOW, vars)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │          Path accessor and value ordering helpers            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call evaluates its whole result before returning, so a query either
//! fails before producing output or yields a complete [`Cursor`].
//!
//! # Example
//!
//! ```rust,ignore
//! use hms_document::document::{DocumentStore, DocumentStoreConfig};
//! use serde_json::json;
//!
//! let store = DocumentStore::new(DocumentStoreConfig::default());
//! store.create_collection("appointments")?;
//!
//! store.insert_one("appointments", json!({
//!     "appointment_id": "a002",
//!     "doctor": { "available_days": ["Monday", "Friday"] }
//! }))?;
//!
//! // Array membership: matches because "Friday" is an element
//! let cursor = store.find(
//!     "appointments",
//!     &json!({ "doctor.available_days": "Friday" }),
//!     &json!({ "appointment_id": 1 }),
//! )?;
//!
//! let pipeline = vec![
//!     json!({ "$group": { "_id": "$doctor.doctor_id", "visits": { "$sum": 1 } } }),
//!     json!({ "$sort": { "visits": -1 } }),
//! ];
//! let results: Vec<_> = store.aggregate("appointments", &pipeline)?.collect();
//! ```

pub mod aggregation;
pub mod collection;
#[allow(clippy::module_inception)]
pub mod document;
pub mod expression;
pub mod projection;
pub mod query;
pub mod value;

pub use aggregation::{AggregationPipeline, PipelineStage, SortDirection};
pub use collection::Collection;
pub use document::{Document, DocumentId, ObjectId};
pub use expression::{EvalContext, Expression};
pub use projection::Projection;
pub use query::{DocumentQuery, QueryOperator};

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use self::aggregation::prune_deleted;

/// Document store configuration
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    /// Maximum document size in bytes
    pub max_document_size: usize,
    /// Maximum nesting depth for documents
    pub max_nesting_depth: usize,
    /// Instant bound to `$$NOW`; the clock is sampled per request when unset
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            max_document_size: 16 * 1024 * 1024, // 16MB like MongoDB
            max_nesting_depth: 100,
            reference_time: None,
        }
    }
}

/// Document store metrics
#[derive(Debug, Clone, Default)]
pub struct DocumentStoreMetrics {
    /// Total documents stored
    pub total_documents: u64,
    /// Total collections
    pub total_collections: u64,
    /// Insert operations
    pub inserts: u64,
    /// Query operations
    pub queries: u64,
    /// Aggregation operations
    pub aggregations: u64,
    /// Documents returned by queries and aggregations
    pub documents_returned: u64,
}

/// Options for [`DocumentStore::find_with_options`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort keys, applied before skip and limit
    pub sort: Vec<(String, SortDirection)>,
    /// Documents to skip
    pub skip: usize,
    /// Maximum documents to return
    pub limit: Option<usize>,
    /// Soft-delete flag; matching documents carrying it are dropped
    pub exclude_deleted: Option<String>,
}

impl FindOptions {
    /// Add a sort key
    pub fn sort(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort.push((field.to_string(), direction));
        self
    }

    /// Skip the first `n` documents
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Return at most `n` documents
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Drop documents whose `flag` field (or an embedded one) is truthy
    pub fn exclude_deleted(mut self, flag: &str) -> Self {
        self.exclude_deleted = Some(flag.to_string());
        self
    }
}

/// Lazily iterated result of a fully evaluated query
#[derive(Debug)]
pub struct Cursor {
    documents: std::vec::IntoIter<Value>,
}

impl Cursor {
    fn new(documents: Vec<Value>) -> Self {
        Self {
            documents: documents.into_iter(),
        }
    }
}

impl Iterator for Cursor {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.documents.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

/// Main document store engine
pub struct DocumentStore {
    /// Collections by name
    collections: RwLock<HashMap<String, Collection>>,
    /// Configuration
    config: DocumentStoreConfig,
    /// Metrics
    metrics: RwLock<DocumentStoreMetrics>,
}

impl DocumentStore {
    /// Create a new document store
    pub fn new(config: DocumentStoreConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            config,
            metrics: RwLock::new(DocumentStoreMetrics::default()),
        }
    }

    /// Store configuration
    pub fn config(&self) -> &DocumentStoreConfig {
        &self.config
    }

    /// Evaluation context for one request
    pub fn context(&self) -> EvalContext {
        EvalContext::new(self.config.reference_time.unwrap_or_else(Utc::now))
    }

    /// Create a new collection
    pub fn create_collection(&self, name: &str) -> Result<(), DocumentStoreError> {
        let mut collections = self.collections.write();

        if collections.contains_key(name) {
            return Err(DocumentStoreError::CollectionExists(name.to_string()));
        }

        collections.insert(name.to_string(), Collection::new(name));
        self.metrics.write().total_collections += 1;

        info!("Created collection {}", name);
        Ok(())
    }

    /// Drop a collection
    pub fn drop_collection(&self, name: &str) -> Result<(), DocumentStoreError> {
        let mut collections = self.collections.write();

        let dropped = collections
            .remove(name)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(name.to_string()))?;

        let mut metrics = self.metrics.write();
        metrics.total_collections = metrics.total_collections.saturating_sub(1);
        metrics.total_documents = metrics
            .total_documents
            .saturating_sub(dropped.count_documents());

        info!("Dropped collection {}", name);
        Ok(())
    }

    /// List all collections, sorted by name
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert a single document
    pub fn insert_one(&self, collection: &str, document: Value) -> Result<DocumentId, DocumentStoreError> {
        let mut ids = self.insert_many(collection, vec![document])?;
        ids.pop()
            .ok_or_else(|| DocumentStoreError::InvalidDocument("Nothing was inserted".into()))
    }

    /// Insert multiple documents; either all are inserted or none
    pub fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<DocumentId>, DocumentStoreError> {
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            let size = self.validate_document(&document)?;
            prepared.push((Document::from_json(document)?, size));
        }

        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;

        let ids = coll.insert_batch(prepared)?;

        let mut metrics = self.metrics.write();
        metrics.inserts += ids.len() as u64;
        metrics.total_documents += ids.len() as u64;

        debug!("Inserted {} documents into {}", ids.len(), collection);
        Ok(ids)
    }

    /// Find documents matching a filter, shaped by a projection
    pub fn find(
        &self,
        collection: &str,
        filter: &Value,
        projection: &Value,
    ) -> Result<Cursor, DocumentStoreError> {
        self.find_with_options(collection, filter, projection, &FindOptions::default())
    }

    /// Find with sort, skip, limit and opt-in soft-delete filtering
    pub fn find_with_options(
        &self,
        collection: &str,
        filter: &Value,
        projection: &Value,
        options: &FindOptions,
    ) -> Result<Cursor, DocumentStoreError> {
        let started = Instant::now();
        let query = DocumentQuery::from_json(filter)?;
        let projection = Projection::from_json(projection)?;
        let ctx = self.context();

        let matched: Vec<Value> = {
            let collections = self.collections.read();
            let coll = collections
                .get(collection)
                .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;
            match &options.exclude_deleted {
                // Flagged elements are pruned before matching
                Some(flag) => {
                    let mut kept = Vec::new();
                    for doc in coll.documents() {
                        let mut data = doc.data.clone();
                        if prune_deleted(&mut data, flag) && query.matches(&data, &ctx)? {
                            kept.push(data);
                        }
                    }
                    kept
                }
                None => coll
                    .find(&query, &ctx)?
                    .into_iter()
                    .map(|doc| doc.data.clone())
                    .collect(),
            }
        };

        let mut stages = Vec::new();
        if !options.sort.is_empty() {
            stages.push(PipelineStage::Sort(options.sort.clone()));
        }
        if options.skip > 0 {
            stages.push(PipelineStage::Skip(options.skip));
        }
        if let Some(limit) = options.limit {
            stages.push(PipelineStage::Limit(limit));
        }
        let shaped = AggregationPipeline::from_stages(stages).execute(matched, &ctx)?;

        let results = shaped
            .iter()
            .map(|doc| projection.apply(doc, &query, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let mut metrics = self.metrics.write();
        metrics.queries += 1;
        metrics.documents_returned += results.len() as u64;

        debug!(
            "find on {} returned {} documents in {:?}",
            collection,
            results.len(),
            started.elapsed()
        );
        Ok(Cursor::new(results))
    }

    /// Run an aggregation pipeline
    pub fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Cursor, DocumentStoreError> {
        let pipeline = AggregationPipeline::from_json(pipeline)?;
        self.aggregate_pipeline(collection, &pipeline)
    }

    /// Run an already parsed aggregation pipeline
    pub fn aggregate_pipeline(
        &self,
        collection: &str,
        pipeline: &AggregationPipeline,
    ) -> Result<Cursor, DocumentStoreError> {
        let started = Instant::now();
        let ctx = self.context();

        let documents: Vec<Value> = {
            let collections = self.collections.read();
            let coll = collections
                .get(collection)
                .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;
            coll.documents().map(|doc| doc.data.clone()).collect()
        };

        let results = pipeline.execute(documents, &ctx)?;

        let mut metrics = self.metrics.write();
        metrics.aggregations += 1;
        metrics.documents_returned += results.len() as u64;

        debug!(
            "aggregate on {} ({} stages) returned {} documents in {:?}",
            collection,
            pipeline.stages().len(),
            results.len(),
            started.elapsed()
        );
        Ok(Cursor::new(results))
    }

    /// Count documents matching a filter
    pub fn count(&self, collection: &str, filter: &Value) -> Result<u64, DocumentStoreError> {
        let query = DocumentQuery::from_json(filter)?;
        let ctx = self.context();

        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;

        coll.count(&query, &ctx)
    }

    /// Distinct values of a field among documents matching an optional filter
    pub fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> Result<Vec<Value>, DocumentStoreError> {
        let query = filter.map(DocumentQuery::from_json).transpose()?;
        let ctx = self.context();

        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| DocumentStoreError::CollectionNotFound(collection.to_string()))?;

        coll.distinct(field, query.as_ref(), &ctx)
    }

    /// Validate a document against size and depth limits, returning its size
    fn validate_document(&self, doc: &Value) -> Result<usize, DocumentStoreError> {
        if !doc.is_object() {
            return Err(DocumentStoreError::InvalidDocument(
                "Document must be an object".into(),
            ));
        }

        let size = serde_json::to_vec(doc)
            .map_err(|e| DocumentStoreError::InvalidDocument(e.to_string()))?
            .len();
        if size > self.config.max_document_size {
            return Err(DocumentStoreError::DocumentTooLarge {
                size,
                max: self.config.max_document_size,
            });
        }

        let depth = document::nesting_depth(doc);
        if depth > self.config.max_nesting_depth {
            return Err(DocumentStoreError::NestingTooDeep {
                depth,
                max: self.config.max_nesting_depth,
            });
        }

        Ok(size)
    }

    /// Get metrics
    pub fn metrics(&self) -> DocumentStoreMetrics {
        self.metrics.read().clone()
    }

    /// Handle bound to one collection
    pub fn collection(&self, name: &str) -> CollectionHandle<'_> {
        CollectionHandle {
            store: self,
            name: name.to_string(),
        }
    }
}

/// The operations a caller needs from a document store collection
pub trait DocumentBackend {
    /// Insert documents, returning their IDs
    fn insert_many(&self, documents: Vec<Value>) -> Result<Vec<DocumentId>, DocumentStoreError>;

    /// Filter and project
    fn find(&self, filter: &Value, projection: &Value) -> Result<Cursor, DocumentStoreError> {
        self.find_with_options(filter, projection, &FindOptions::default())
    }

    /// Filter, post-process with `options`, then project
    fn find_with_options(
        &self,
        filter: &Value,
        projection: &Value,
        options: &FindOptions,
    ) -> Result<Cursor, DocumentStoreError>;

    /// Run an aggregation pipeline
    fn aggregate(&self, pipeline: &[Value]) -> Result<Cursor, DocumentStoreError>;
}

/// A [`DocumentBackend`] over one collection of a [`DocumentStore`]
///
/// A missing collection surfaces as [`DocumentStoreError::StoreUnavailable`].
pub struct CollectionHandle<'a> {
    store: &'a DocumentStore,
    name: String,
}

impl CollectionHandle<'_> {
    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn unavailable(err: DocumentStoreError) -> DocumentStoreError {
        match err {
            DocumentStoreError::CollectionNotFound(name) => {
                DocumentStoreError::StoreUnavailable(format!("collection {} does not exist", name))
            }
            other => other,
        }
    }
}

impl DocumentBackend for CollectionHandle<'_> {
    fn insert_many(&self, documents: Vec<Value>) -> Result<Vec<DocumentId>, DocumentStoreError> {
        self.store
            .insert_many(&self.name, documents)
            .map_err(Self::unavailable)
    }

    fn find_with_options(
        &self,
        filter: &Value,
        projection: &Value,
        options: &FindOptions,
    ) -> Result<Cursor, DocumentStoreError> {
        self.store
            .find_with_options(&self.name, filter, projection, options)
            .map_err(Self::unavailable)
    }

    fn aggregate(&self, pipeline: &[Value]) -> Result<Cursor, DocumentStoreError> {
        self.store
            .aggregate(&self.name, pipeline)
            .map_err(Self::unavailable)
    }
}

/// Document store errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    /// Collection already exists
    #[error("Collection already exists: {0}")]
    CollectionExists(String),
    /// Collection not found
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// Invalid document
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Document too large
    #[error("Document too large: {size} bytes (max: {max} bytes)")]
    DocumentTooLarge {
        /// Actual size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },
    /// Nesting too deep
    #[error("Document nesting too deep: {depth} levels (max: {max} levels)")]
    NestingTooDeep {
        /// Actual depth
        depth: usize,
        /// Maximum allowed depth
        max: usize,
    },
    /// Unsupported operator, wrong operand shape or inconsistent type comparison
    #[error("Malformed expression: {0}")]
    MalformedExpression(String),
    /// Duplicate key
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    /// The backing store could not serve the request
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

//! Collection management for document store

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::document::{candidates, Document, DocumentId};
use super::expression::EvalContext;
use super::query::DocumentQuery;
use super::DocumentStoreError;

/// A collection of documents, kept in insertion order
#[derive(Debug, Clone)]
pub struct Collection {
    /// Collection name
    name: String,
    /// Documents in insertion order
    documents: Vec<Document>,
    /// Position of each document by ID
    ids: HashMap<DocumentId, usize>,
    /// Total serialized data size
    data_size: u64,
    /// Creation time
    created_at: DateTime<Utc>,
}

impl Collection {
    /// Create a new collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Vec::new(),
            ids: HashMap::new(),
            data_size: 0,
            created_at: Utc::now(),
        }
    }

    /// Get collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get document count
    pub fn count_documents(&self) -> u64 {
        self.documents.len() as u64
    }

    /// Get total data size
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// When the collection was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Insert a document
    pub fn insert(&mut self, doc: Document, size: usize) -> Result<(), DocumentStoreError> {
        if self.ids.contains_key(&doc.id) {
            return Err(DocumentStoreError::DuplicateKey(format!(
                "Duplicate key error: {}",
                doc.id
            )));
        }

        self.ids.insert(doc.id.clone(), self.documents.len());
        self.documents.push(doc);
        self.data_size += size as u64;
        Ok(())
    }

    /// Insert a batch; nothing is inserted when any ID is already taken
    pub fn insert_batch(&mut self, docs: Vec<(Document, usize)>) -> Result<Vec<DocumentId>, DocumentStoreError> {
        let mut seen = HashSet::with_capacity(docs.len());
        for (doc, _) in &docs {
            if self.ids.contains_key(&doc.id) || !seen.insert(&doc.id) {
                return Err(DocumentStoreError::DuplicateKey(format!(
                    "Duplicate key error: {}",
                    doc.id
                )));
            }
        }

        let mut inserted = Vec::with_capacity(docs.len());
        for (doc, size) in docs {
            inserted.push(doc.id.clone());
            self.insert(doc, size)?;
        }
        Ok(inserted)
    }

    /// Get a document by ID
    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.ids.get(id).and_then(|&i| self.documents.get(i))
    }

    /// Find documents matching a query, in insertion order
    pub fn find(
        &self,
        query: &DocumentQuery,
        ctx: &EvalContext,
    ) -> Result<Vec<&Document>, DocumentStoreError> {
        let mut results = Vec::new();
        for doc in &self.documents {
            if query.matches(&doc.data, ctx)? {
                results.push(doc);
            }
        }
        Ok(results)
    }

    /// Count documents matching a query
    pub fn count(&self, query: &DocumentQuery, ctx: &EvalContext) -> Result<u64, DocumentStoreError> {
        if query.is_empty() {
            return Ok(self.count_documents());
        }

        Ok(self.find(query, ctx)?.len() as u64)
    }

    /// Distinct values of a field, in first-seen order; array values contribute their elements
    pub fn distinct(
        &self,
        field: &str,
        query: Option<&DocumentQuery>,
        ctx: &EvalContext,
    ) -> Result<Vec<Value>, DocumentStoreError> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();

        for doc in &self.documents {
            if let Some(q) = query {
                if !q.matches(&doc.data, ctx)? {
                    continue;
                }
            }

            for value in candidates(&doc.data, field) {
                let items: Vec<&Value> = match value {
                    Value::Array(arr) => arr.iter().collect(),
                    other => vec![other],
                };
                for item in items {
                    if seen.insert(item.to_string()) {
                        values.push(item.clone());
                    }
                }
            }
        }

        Ok(values)
    }

    /// Get all documents (for iteration)
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        EvalContext::new(Utc::now())
    }

    fn doc(value: Value) -> (Document, usize) {
        let size = value.to_string().len();
        (Document::from_json(value).unwrap(), size)
    }

    #[test]
    fn test_insert_and_find() {
        let mut collection = Collection::new("test");
        let (d, size) = doc(json!({ "name": "Alice", "age": 30 }));
        collection.insert(d, size).unwrap();

        let query = DocumentQuery::from_json(&json!({ "name": "Alice" })).unwrap();
        let results = collection.find(&query, &ctx()).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get_field("name"), Some(&json!("Alice")));
        assert!(collection.data_size() > 0);
    }

    #[test]
    fn test_duplicate_key_error() {
        let mut collection = Collection::new("test");
        let (d1, s1) = doc(json!({ "_id": "123", "name": "Alice" }));
        let (d2, s2) = doc(json!({ "_id": "123", "name": "Bob" }));

        collection.insert(d1, s1).unwrap();
        let result = collection.insert(d2, s2);

        assert!(matches!(result, Err(DocumentStoreError::DuplicateKey(_))));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut collection = Collection::new("test");
        let batch = vec![
            doc(json!({ "_id": "a", "n": 1 })),
            doc(json!({ "_id": "b", "n": 2 })),
            doc(json!({ "_id": "a", "n": 3 })),
        ];
        assert!(collection.insert_batch(batch).is_err());
        assert_eq!(collection.count_documents(), 0);

        let ids = collection
            .insert_batch(vec![doc(json!({ "_id": "a" })), doc(json!({ "_id": "b" }))])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(collection.get(&DocumentId::String("b".into())).is_some());
    }

    #[test]
    fn test_distinct_flattens_arrays() {
        let mut collection = Collection::new("test");
        collection
            .insert_batch(vec![
                doc(json!({ "days": ["Monday", "Friday"] })),
                doc(json!({ "days": ["Friday", "Tuesday"] })),
                doc(json!({ "other": 1 })),
            ])
            .unwrap();

        let days = collection.distinct("days", None, &ctx()).unwrap();
        assert_eq!(days, vec![json!("Monday"), json!("Friday"), json!("Tuesday")]);
    }

    #[test]
    fn test_count_with_query() {
        let mut collection = Collection::new("test");
        collection
            .insert_batch(vec![doc(json!({ "n": 1 })), doc(json!({ "n": 5 }))])
            .unwrap();
        let query = DocumentQuery::from_json(&json!({ "n": { "$gt": 2 } })).unwrap();
        assert_eq!(collection.count(&query, &ctx()).unwrap(), 1);
        assert_eq!(collection.count(&DocumentQuery::new(), &ctx()).unwrap(), 2);
    }
}

//! Document types, ObjectId implementation and the dot-path accessor

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::DocumentStoreError;

/// Name of the identity field
pub const ID_FIELD: &str = "_id";

/// MongoDB-compatible ObjectId
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// 12-byte identifier
    bytes: [u8; 12],
}

impl ObjectId {
    /// Create a new ObjectId
    pub fn new() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let mut bytes = [0u8; 12];

        // 4 bytes: Unix timestamp in seconds
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());

        // 5 bytes: process-unique random value
        let random: [u8; 5] = rand::random();
        bytes[4..9].copy_from_slice(&random);

        // 3 bytes: counter
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);

        Self { bytes }
    }

    /// Create ObjectId from hex string
    pub fn from_hex(hex: &str) -> Result<Self, DocumentStoreError> {
        if hex.len() != 24 || !hex.is_ascii() {
            return Err(DocumentStoreError::InvalidDocument(
                "ObjectId must be 24 hex characters".into(),
            ));
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
                DocumentStoreError::InvalidDocument("Invalid hex in ObjectId".into())
            })?;
        }

        Ok(Self { bytes })
    }

    /// Get hex representation
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Seconds since the epoch embedded in the id
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Document identifier (can be ObjectId or other types)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentId {
    /// ObjectId
    ObjectId(ObjectId),
    /// String ID
    String(String),
    /// Integer ID
    Integer(i64),
}

impl DocumentId {
    /// Create a new ObjectId-based document ID
    pub fn new() -> Self {
        Self::ObjectId(ObjectId::new())
    }

    /// Create from JSON value
    pub fn from_json(value: &Value) -> Result<Self, DocumentStoreError> {
        match value {
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Integer).ok_or_else(|| {
                DocumentStoreError::InvalidDocument("Document ID must be integer, not float".into())
            }),
            Value::Object(obj) => match obj.get("$oid").and_then(Value::as_str) {
                Some(s) if obj.len() == 1 => Ok(Self::ObjectId(ObjectId::from_hex(s)?)),
                _ => Err(DocumentStoreError::InvalidDocument(
                    "Invalid _id format".into(),
                )),
            },
            _ => Err(DocumentStoreError::InvalidDocument(
                "Invalid _id type".into(),
            )),
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> Value {
        match self {
            Self::ObjectId(oid) => serde_json::json!({ "$oid": oid.to_hex() }),
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::Number((*i).into()),
        }
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectId(oid) => write!(f, "{}", oid),
            Self::String(s) => write!(f, "{}", s),
            Self::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// A stored JSON document
///
/// `data` always carries the `_id` field as its first key, so a stored
/// document is evaluated and returned exactly as the caller sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document ID
    pub id: DocumentId,
    /// Document data, `_id` included
    pub data: Value,
}

impl Document {
    /// Create a new document from JSON, generating an ObjectId when `_id` is absent
    pub fn from_json(value: Value) -> Result<Self, DocumentStoreError> {
        let Value::Object(mut fields) = value else {
            return Err(DocumentStoreError::InvalidDocument(
                "Document must be an object".into(),
            ));
        };

        let id = match fields.shift_remove(ID_FIELD) {
            Some(id_value) => DocumentId::from_json(&id_value)?,
            None => DocumentId::new(),
        };

        let mut data = Map::with_capacity(fields.len() + 1);
        data.insert(ID_FIELD.to_string(), id.to_json());
        data.extend(fields);

        Ok(Self {
            id,
            data: Value::Object(data),
        })
    }

    /// Convert document to JSON including _id
    pub fn to_json(&self) -> Value {
        self.data.clone()
    }

    /// Get a field value by path (supports dot notation)
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        get_path(&self.data, path)
    }

    /// Get all field paths in the document
    pub fn field_paths(&self) -> Vec<String> {
        field_paths(&self.data)
    }
}

/// Strict dot-path lookup; numeric segments index into arrays
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Every value a path reaches, expanding arrays met before the last segment
///
/// `billing.medicines.medicine_name` yields one value per medicine. Missing
/// branches contribute nothing, so an empty result means "absent". A value
/// found at the final segment is returned as-is, arrays included.
pub fn candidates<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_candidates(value, &parts, &mut out);
    out
}

fn collect_candidates<'a>(value: &'a Value, parts: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(next) = map.get(*head) {
                collect_candidates(next, rest, out);
            }
        }
        Value::Array(arr) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = arr.get(index) {
                    collect_candidates(next, rest, out);
                }
            } else {
                for element in arr.iter().filter(|e| e.is_object()) {
                    collect_candidates(element, parts, out);
                }
            }
        }
        _ => {}
    }
}

/// Resolve a field reference the way expressions read it
///
/// Missing fields become `null`. Crossing an array maps the rest of the path
/// over its elements and yields an array of the values found.
pub fn resolve_field(value: &Value, path: &str) -> Value {
    lookup_field(value, path).unwrap_or(Value::Null)
}

/// Like [`resolve_field`], but `None` when the path is missing
pub fn lookup_field(value: &Value, path: &str) -> Option<Value> {
    let parts: Vec<&str> = path.split('.').collect();
    resolve_parts(value, &parts)
}

fn resolve_parts(value: &Value, parts: &[&str]) -> Option<Value> {
    let Some((head, rest)) = parts.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(map) => resolve_parts(map.get(*head)?, rest),
        Value::Array(arr) => Some(Value::Array(
            arr.iter()
                .filter_map(|element| resolve_parts(element, parts))
                .collect(),
        )),
        _ => None,
    }
}

/// Set a value at a dot path, creating intermediate objects as needed
pub fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), DocumentStoreError> {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return Ok(());
    };

    let mut current = target;
    for part in parents {
        let map = current.as_object_mut().ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("Path '{}' contains non-object", path))
        })?;
        let next = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !next.is_object() {
            *next = Value::Object(Map::new());
        }
        current = next;
    }

    match current.as_object_mut() {
        Some(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        None => Err(DocumentStoreError::InvalidDocument(format!(
            "Cannot set '{}' on non-object",
            path
        ))),
    }
}

/// Remove the value at a dot path, descending into array elements
pub fn remove_path(target: &mut Value, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    remove_parts(target, &parts);
}

fn remove_parts(target: &mut Value, parts: &[&str]) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    match target {
        Value::Object(map) if rest.is_empty() => {
            map.shift_remove(*head);
        }
        Value::Object(map) => {
            if let Some(next) = map.get_mut(*head) {
                remove_parts(next, rest);
            }
        }
        Value::Array(arr) => {
            for element in arr.iter_mut() {
                remove_parts(element, parts);
            }
        }
        _ => {}
    }
}

/// All field paths in a value; array elements share their array's path
pub fn field_paths(value: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(value, "", &mut paths);
    paths.sort();
    paths.dedup();
    paths
}

fn collect_paths(value: &Value, prefix: &str, paths: &mut Vec<String>) {
    match value {
        Value::Object(map) if super::value::as_date_millis(value).is_none() => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                paths.push(path.clone());
                collect_paths(val, &path, paths);
            }
        }
        Value::Array(arr) => {
            for val in arr {
                collect_paths(val, prefix, paths);
            }
        }
        _ => {}
    }
}

/// Depth of the deepest container in a value
pub fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(nesting_depth).max().unwrap_or(0),
        Value::Array(arr) => 1 + arr.iter().map(nesting_depth).max().unwrap_or(0),
        _ => 0,
    }
}

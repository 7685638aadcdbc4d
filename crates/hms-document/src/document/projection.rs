//! Field projection for find results

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::document::{remove_path, ID_FIELD};
use super::expression::EvalContext;
use super::query::DocumentQuery;
use super::DocumentStoreError;

/// Projection specification
#[derive(Debug, Clone)]
pub struct Projection {
    /// Projected paths in declaration order (`_id` excluded)
    fields: Vec<(String, ProjectionValue)>,
    /// Mode (include or exclude)
    mode: ProjectionMode,
    /// Whether `_id` is returned
    include_id: bool,
}

/// Projection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectionMode {
    /// Return the whole document
    All,
    /// Include specified fields only
    Include,
    /// Exclude specified fields
    Exclude,
}

/// Projection value
#[derive(Debug, Clone)]
enum ProjectionValue {
    /// Include field
    Include,
    /// Exclude field
    Exclude,
    /// Slice array
    Slice(SliceSpec),
    /// First array element matched by the query (`"array.$"`)
    Positional,
}

/// Slice specification
#[derive(Debug, Clone, Copy)]
enum SliceSpec {
    /// First n elements, or last n when negative
    Single(i64),
    /// Skip then take
    Range(i64, i64),
}

/// Include-mode path tree
#[derive(Debug)]
enum Node<'a> {
    Leaf(&'a str, &'a ProjectionValue),
    Branch(HashMap<&'a str, Node<'a>>),
}

fn malformed(msg: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::MalformedExpression(msg.into())
}

impl Default for Projection {
    fn default() -> Self {
        Self::all()
    }
}

impl Projection {
    /// Projection returning documents unchanged
    pub fn all() -> Self {
        Self {
            fields: Vec::new(),
            mode: ProjectionMode::All,
            include_id: true,
        }
    }

    /// Parse projection from JSON; `null` and `{}` return whole documents
    pub fn from_json(value: &Value) -> Result<Self, DocumentStoreError> {
        let obj = match value {
            Value::Null => return Ok(Self::all()),
            Value::Object(obj) => obj,
            _ => return Err(malformed("Projection must be an object")),
        };

        let mut projection = Self::all();
        let mut has_include = false;
        let mut has_exclude = false;
        let mut positional = 0;
        let mut id_only_include = false;

        for (field, val) in obj {
            let pv = Self::parse_value(val)?;
            if field == ID_FIELD {
                projection.include_id = !matches!(pv, ProjectionValue::Exclude);
                id_only_include = projection.include_id;
                continue;
            }

            let (path, pv) = match field.strip_suffix(".$") {
                Some(array_path) => {
                    if !matches!(pv, ProjectionValue::Include) {
                        return Err(malformed(format!(
                            "Positional projection '{}' must be an inclusion",
                            field
                        )));
                    }
                    positional += 1;
                    (array_path.to_string(), ProjectionValue::Positional)
                }
                None => (field.clone(), pv),
            };
            if path.is_empty() || path.split('.').any(|p| p.is_empty() || p.starts_with('$')) {
                return Err(malformed(format!("Invalid projection path: {}", field)));
            }

            match pv {
                ProjectionValue::Exclude => has_exclude = true,
                ProjectionValue::Include | ProjectionValue::Positional => has_include = true,
                ProjectionValue::Slice(_) => {}
            }
            projection.fields.push((path, pv));
        }

        // Cannot mix include and exclude (except for _id)
        if has_include && has_exclude {
            return Err(malformed("Cannot mix include and exclude in projection"));
        }
        if positional > 1 {
            return Err(malformed("Only one positional projection is allowed"));
        }

        projection.mode = if has_include {
            ProjectionMode::Include
        } else if has_exclude || !projection.include_id {
            ProjectionMode::Exclude
        } else if id_only_include && projection.fields.is_empty() {
            ProjectionMode::Include
        } else if projection.fields.is_empty() {
            ProjectionMode::All
        } else {
            // Only $slice entries: everything else stays
            ProjectionMode::Exclude
        };

        projection.build_tree()?;
        Ok(projection)
    }

    /// Parse a projection value
    fn parse_value(value: &Value) -> Result<ProjectionValue, DocumentStoreError> {
        match value {
            Value::Number(n) if n.as_f64() == Some(0.0) => Ok(ProjectionValue::Exclude),
            Value::Number(_) => Ok(ProjectionValue::Include),
            Value::Bool(true) => Ok(ProjectionValue::Include),
            Value::Bool(false) => Ok(ProjectionValue::Exclude),
            Value::Object(obj) => match obj.get("$slice") {
                Some(slice) if obj.len() == 1 => Ok(ProjectionValue::Slice(Self::parse_slice(slice)?)),
                _ => Err(malformed("Unknown projection operator")),
            },
            _ => Err(malformed("Invalid projection value")),
        }
    }

    /// Parse slice specification
    fn parse_slice(value: &Value) -> Result<SliceSpec, DocumentStoreError> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(SliceSpec::Single)
                .ok_or_else(|| malformed("$slice must be an integer")),
            Value::Array(arr) => match arr.as_slice() {
                [skip, take] => {
                    let skip = skip
                        .as_i64()
                        .ok_or_else(|| malformed("$slice skip must be an integer"))?;
                    let take = take
                        .as_u64()
                        .filter(|t| *t > 0)
                        .ok_or_else(|| malformed("$slice take must be a positive integer"))?;
                    Ok(SliceSpec::Range(skip, take as i64))
                }
                _ => Err(malformed("$slice array must have 2 elements")),
            },
            _ => Err(malformed("$slice must be a number or array")),
        }
    }

    /// Field paths named by the projection
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(path, _)| path.as_str())
    }

    /// Whether the projection needs the query to resolve a positional element
    pub fn is_positional(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, pv)| matches!(pv, ProjectionValue::Positional))
    }

    fn build_tree(&self) -> Result<HashMap<&str, Node<'_>>, DocumentStoreError> {
        let mut root: HashMap<&str, Node<'_>> = HashMap::new();
        for (path, pv) in &self.fields {
            let parts: Vec<&str> = path.split('.').collect();
            let Some((last, parents)) = parts.split_last() else {
                continue;
            };
            let mut level = &mut root;
            for part in parents {
                let node = level
                    .entry(*part)
                    .or_insert_with(|| Node::Branch(HashMap::new()));
                level = match node {
                    Node::Branch(children) => children,
                    Node::Leaf(..) => return Err(collision(path)),
                };
            }
            if level.insert(*last, Node::Leaf(path, pv)).is_some() {
                return Err(collision(path));
            }
        }
        Ok(root)
    }

    /// Apply projection to a document
    ///
    /// `query` is the filter that selected the document; positional
    /// projections use it to find the matching array element.
    pub fn apply(
        &self,
        doc: &Value,
        query: &DocumentQuery,
        ctx: &EvalContext,
    ) -> Result<Value, DocumentStoreError> {
        match self.mode {
            ProjectionMode::All => Ok(doc.clone()),
            ProjectionMode::Exclude => {
                let mut result = doc.clone();
                for (path, pv) in &self.fields {
                    match pv {
                        ProjectionValue::Slice(spec) => slice_in_place(&mut result, path, *spec),
                        _ => remove_path(&mut result, path),
                    }
                }
                if !self.include_id {
                    remove_path(&mut result, ID_FIELD);
                }
                Ok(result)
            }
            ProjectionMode::Include => {
                let tree = self.build_tree()?;
                let Value::Object(source) = doc else {
                    return Ok(Value::Object(Map::new()));
                };
                let mut result = Map::new();
                for (key, value) in source {
                    if key == ID_FIELD {
                        if self.include_id {
                            result.insert(key.clone(), value.clone());
                        }
                        continue;
                    }
                    if let Some(node) = tree.get(key.as_str()) {
                        if let Some(projected) = project_node(node, value, doc, query, ctx)? {
                            result.insert(key.clone(), projected);
                        }
                    }
                }
                Ok(Value::Object(result))
            }
        }
    }
}

fn collision(path: &str) -> DocumentStoreError {
    malformed(format!("Path collision in projection at '{}'", path))
}

fn project_node(
    node: &Node<'_>,
    value: &Value,
    root: &Value,
    query: &DocumentQuery,
    ctx: &EvalContext,
) -> Result<Option<Value>, DocumentStoreError> {
    match node {
        Node::Leaf(_, ProjectionValue::Include) => Ok(Some(value.clone())),
        Node::Leaf(_, ProjectionValue::Exclude) => Ok(None),
        Node::Leaf(_, ProjectionValue::Slice(spec)) => Ok(Some(apply_slice(value, *spec))),
        Node::Leaf(path, ProjectionValue::Positional) => {
            let Value::Array(elements) = value else {
                return Ok(None);
            };
            Ok(query
                .first_matching_index(root, path, ctx)?
                .and_then(|index| elements.get(index))
                .map(|element| Value::Array(vec![element.clone()])))
        }
        Node::Branch(children) => match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, child_value) in map {
                    if let Some(child) = children.get(key.as_str()) {
                        if let Some(projected) = project_node(child, child_value, root, query, ctx)? {
                            out.insert(key.clone(), projected);
                        }
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items.iter().filter(|i| i.is_object()) {
                    if let Some(projected) = project_node(node, item, root, query, ctx)? {
                        out.push(projected);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            _ => Ok(None),
        },
    }
}

fn apply_slice(value: &Value, spec: SliceSpec) -> Value {
    let Value::Array(items) = value else {
        return value.clone();
    };
    let len = items.len() as i64;
    let (start, count) = match spec {
        SliceSpec::Single(n) if n >= 0 => (0, n),
        SliceSpec::Single(n) => ((len + n).max(0), -n),
        SliceSpec::Range(skip, take) if skip >= 0 => (skip.min(len), take),
        SliceSpec::Range(skip, take) => ((len + skip).max(0), take),
    };
    Value::Array(
        items
            .iter()
            .skip(start as usize)
            .take(count.max(0) as usize)
            .cloned()
            .collect(),
    )
}

fn slice_in_place(target: &mut Value, path: &str, spec: SliceSpec) {
    let mut current = target;
    for part in path.split('.') {
        match current.get_mut(part) {
            Some(next) => current = next,
            None => return,
        }
    }
    *current = apply_slice(current, spec);
}

//! Aggregation pipeline implementation (MongoDB-compatible)
//!
//! Each stage is a pure function from a document sequence to a document
//! sequence. Groups are emitted in the order their key was first seen and
//! `$sort` is stable, so a pipeline over the same input always yields the same
//! ordered output.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};

use super::document::{get_path, lookup_field, remove_path, resolve_field, set_path, ID_FIELD};
use super::expression::{EvalContext, Expression};
use super::projection::Projection;
use super::query::DocumentQuery;
use super::value::{as_date_millis, compare_values, is_truthy, number_value, values_equal};
use super::DocumentStoreError;

/// Aggregation pipeline
#[derive(Debug, Clone, Default)]
pub struct AggregationPipeline {
    /// Pipeline stages
    stages: Vec<PipelineStage>,
}

/// Pipeline stage types
#[derive(Debug, Clone)]
pub enum PipelineStage {
    /// Match documents
    Match(DocumentQuery),
    /// Project fields
    Project(ProjectSpec),
    /// Group documents
    Group(GroupSpec),
    /// Sort documents
    Sort(Vec<(String, SortDirection)>),
    /// Limit results
    Limit(usize),
    /// Skip results
    Skip(usize),
    /// Unwind array field
    Unwind(UnwindSpec),
    /// Add computed fields
    AddFields(Vec<(String, Expression)>),
    /// Count documents into a single output field
    Count(String),
    /// Drop documents carrying a truthy soft-delete flag
    ExcludeDeleted(String),
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending
    Ascending,
    /// Descending
    Descending,
}

/// Project specification
#[derive(Debug, Clone)]
pub struct ProjectSpec {
    /// Inclusion/exclusion part, applied first
    shape: Projection,
    /// Computed fields, appended in declaration order
    computed: Vec<(String, Expression)>,
    /// Paths named by inclusions and exclusions
    paths: Vec<String>,
}

/// Group specification
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// Group key
    pub id: Expression,
    /// Accumulators in output order
    pub accumulators: Vec<(String, Accumulator)>,
}

/// Accumulator operators
#[derive(Debug, Clone)]
pub enum Accumulator {
    /// Sum of numeric values; 0 when there are none
    Sum(Expression),
    /// Mean of numeric values; null when there are none
    Avg(Expression),
    /// Min
    Min(Expression),
    /// Max
    Max(Expression),
    /// First value seen
    First(Expression),
    /// Last value seen
    Last(Expression),
    /// Push to array, duplicates retained
    Push(Expression),
    /// Add to set
    AddToSet(Expression),
    /// Count
    Count,
}

/// Unwind specification
#[derive(Debug, Clone)]
pub struct UnwindSpec {
    /// Path to array field
    pub path: String,
    /// Include array index
    pub include_array_index: Option<String>,
    /// Preserve null and empty arrays
    pub preserve_null_and_empty: bool,
}

fn malformed(msg: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::MalformedExpression(msg.into())
}

impl AggregationPipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse pipeline from JSON
    pub fn from_json(stages: &[Value]) -> Result<Self, DocumentStoreError> {
        let stages = stages
            .iter()
            .map(Self::parse_stage)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    /// Build a pipeline from already parsed stages
    pub fn from_stages(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    /// Pipeline stages
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Parse a single stage
    fn parse_stage(value: &Value) -> Result<PipelineStage, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("Stage must be an object"))?;

        let (name, spec) = match (obj.len(), obj.iter().next()) {
            (1, Some(entry)) => entry,
            _ => return Err(malformed("Stage must have exactly one operator")),
        };

        match name.as_str() {
            "$match" => Ok(PipelineStage::Match(DocumentQuery::from_json(spec)?)),
            "$project" => Ok(PipelineStage::Project(Self::parse_project(spec)?)),
            "$group" => Ok(PipelineStage::Group(Self::parse_group(spec)?)),
            "$sort" => Ok(PipelineStage::Sort(Self::parse_sort(spec)?)),
            "$limit" => Ok(PipelineStage::Limit(Self::parse_count(name, spec)?)),
            "$skip" => Ok(PipelineStage::Skip(Self::parse_count(name, spec)?)),
            "$unwind" => Ok(PipelineStage::Unwind(Self::parse_unwind(spec)?)),
            "$addFields" | "$set" => Ok(PipelineStage::AddFields(Self::parse_add_fields(spec)?)),
            "$count" => Ok(PipelineStage::Count(Self::parse_output_name(name, spec)?)),
            "$excludeDeleted" => Ok(PipelineStage::ExcludeDeleted(Self::parse_output_name(
                name, spec,
            )?)),
            _ => Err(malformed(format!("Unknown pipeline stage: {}", name))),
        }
    }

    fn parse_count(name: &str, value: &Value) -> Result<usize, DocumentStoreError> {
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| malformed(format!("{} requires a non-negative integer", name)))
    }

    fn parse_output_name(name: &str, value: &Value) -> Result<String, DocumentStoreError> {
        match value.as_str() {
            Some(s) if !s.is_empty() && !s.starts_with('$') && !s.contains('.') => Ok(s.to_string()),
            _ => Err(malformed(format!("{} requires a plain field name", name))),
        }
    }

    /// Parse project specification
    fn parse_project(value: &Value) -> Result<ProjectSpec, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$project must be an object"))?;

        let mut shape = Map::new();
        let mut computed = Vec::new();
        let mut paths = Vec::new();
        let mut excludes = false;

        for (field, spec) in obj {
            match spec {
                Value::Bool(_) | Value::Number(_) => {
                    let include = is_truthy(spec);
                    if field != ID_FIELD {
                        excludes |= !include;
                        paths.push(field.clone());
                    }
                    shape.insert(field.clone(), Value::from(u8::from(include)));
                }
                _ => computed.push((field.clone(), Expression::parse(spec)?)),
            }
        }

        if excludes && !computed.is_empty() {
            return Err(malformed(
                "Cannot mix exclusions and computed fields in $project",
            ));
        }
        if !computed.is_empty() && !shape.keys().any(|k| k != ID_FIELD) {
            // Computed-only projections still keep `_id` unless suppressed
            shape
                .entry(ID_FIELD.to_string())
                .or_insert_with(|| Value::from(1));
        }

        Ok(ProjectSpec {
            shape: Projection::from_json(&Value::Object(shape))?,
            computed,
            paths,
        })
    }

    /// Parse group specification
    fn parse_group(value: &Value) -> Result<GroupSpec, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$group must be an object"))?;

        let id = obj
            .get(ID_FIELD)
            .ok_or_else(|| malformed("$group requires _id"))?;
        let id = Expression::parse(id)?;

        let mut accumulators = Vec::new();
        for (field, acc) in obj {
            if field == ID_FIELD {
                continue;
            }
            if field.contains('.') {
                return Err(malformed(format!(
                    "$group output field '{}' cannot contain '.'",
                    field
                )));
            }
            accumulators.push((field.clone(), Self::parse_accumulator(acc)?));
        }

        Ok(GroupSpec { id, accumulators })
    }

    /// Parse accumulator
    fn parse_accumulator(value: &Value) -> Result<Accumulator, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("Accumulator must be an object"))?;

        let (op, arg) = match (obj.len(), obj.iter().next()) {
            (1, Some(entry)) => entry,
            _ => return Err(malformed("Accumulator must have exactly one operator")),
        };

        let expr = || Expression::parse(arg);
        match op.as_str() {
            "$sum" => Ok(Accumulator::Sum(expr()?)),
            "$avg" => Ok(Accumulator::Avg(expr()?)),
            "$min" => Ok(Accumulator::Min(expr()?)),
            "$max" => Ok(Accumulator::Max(expr()?)),
            "$first" => Ok(Accumulator::First(expr()?)),
            "$last" => Ok(Accumulator::Last(expr()?)),
            "$push" => Ok(Accumulator::Push(expr()?)),
            "$addToSet" => Ok(Accumulator::AddToSet(expr()?)),
            "$count" => match arg {
                Value::Object(args) if args.is_empty() => Ok(Accumulator::Count),
                _ => Err(malformed("$count accumulator takes an empty object")),
            },
            _ => Err(malformed(format!("Unknown accumulator: {}", op))),
        }
    }

    /// Parse sort specification
    fn parse_sort(value: &Value) -> Result<Vec<(String, SortDirection)>, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$sort must be an object"))?;
        if obj.is_empty() {
            return Err(malformed("$sort requires at least one key"));
        }

        obj.iter()
            .map(|(field, dir)| {
                let direction = match dir.as_i64() {
                    Some(1) => SortDirection::Ascending,
                    Some(-1) => SortDirection::Descending,
                    _ => return Err(malformed("Sort direction must be 1 or -1")),
                };
                Ok((field.clone(), direction))
            })
            .collect()
    }

    /// Parse unwind specification
    fn parse_unwind(value: &Value) -> Result<UnwindSpec, DocumentStoreError> {
        let field_path = |path: &str| {
            path.strip_prefix('$')
                .filter(|p| !p.is_empty() && !p.starts_with('$'))
                .map(String::from)
                .ok_or_else(|| malformed("$unwind path must be a '$'-prefixed field path"))
        };
        match value {
            Value::String(path) => Ok(UnwindSpec {
                path: field_path(path)?,
                include_array_index: None,
                preserve_null_and_empty: false,
            }),
            Value::Object(obj) => {
                let path = obj
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("$unwind requires path"))?;
                let include_array_index = match obj.get("includeArrayIndex") {
                    None => None,
                    Some(v) => Some(Self::parse_output_name("includeArrayIndex", v)?),
                };
                let preserve_null_and_empty = match obj.get("preserveNullAndEmptyArrays") {
                    None => false,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => return Err(malformed("preserveNullAndEmptyArrays must be a boolean")),
                };
                Ok(UnwindSpec {
                    path: field_path(path)?,
                    include_array_index,
                    preserve_null_and_empty,
                })
            }
            _ => Err(malformed("$unwind must be a string or object")),
        }
    }

    /// Parse add fields specification
    fn parse_add_fields(value: &Value) -> Result<Vec<(String, Expression)>, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$addFields must be an object"))?;

        obj.iter()
            .map(|(field, val)| Ok((field.clone(), Expression::parse(val)?)))
            .collect()
    }

    /// Field paths of the source documents this pipeline reads
    ///
    /// Collection stops at the first stage that reshapes documents
    /// (`$group`, `$project`, `$count`); later stages read that stage's output.
    pub fn source_fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        let mut added: BTreeSet<String> = BTreeSet::new();
        for stage in &self.stages {
            match stage {
                PipelineStage::Match(query) => fields.extend(query.fields()),
                PipelineStage::Unwind(spec) => {
                    fields.insert(spec.path.clone());
                }
                PipelineStage::Sort(keys) => {
                    fields.extend(keys.iter().map(|(k, _)| k.clone()));
                }
                PipelineStage::AddFields(entries) => {
                    for (name, expr) in entries {
                        expr.collect_fields(&mut fields);
                        added.insert(name.clone());
                    }
                }
                PipelineStage::Project(spec) => {
                    fields.extend(spec.paths.iter().cloned());
                    for (_, expr) in &spec.computed {
                        expr.collect_fields(&mut fields);
                    }
                    break;
                }
                PipelineStage::Group(spec) => {
                    spec.id.collect_fields(&mut fields);
                    for (_, acc) in &spec.accumulators {
                        if let Some(expr) = acc.expression() {
                            expr.collect_fields(&mut fields);
                        }
                    }
                    break;
                }
                PipelineStage::Count(_) => break,
                PipelineStage::Limit(_) | PipelineStage::Skip(_) | PipelineStage::ExcludeDeleted(_) => {}
            }
        }
        fields.retain(|f| {
            !added
                .iter()
                .any(|a| f == a || f.starts_with(&format!("{}.", a)))
        });
        fields
    }

    /// Execute the pipeline
    pub fn execute(
        &self,
        documents: Vec<Value>,
        ctx: &EvalContext,
    ) -> Result<Vec<Value>, DocumentStoreError> {
        let mut documents = documents;

        for stage in &self.stages {
            documents = Self::execute_stage(stage, documents, ctx)?;
        }

        Ok(documents)
    }

    /// Execute a single stage
    fn execute_stage(
        stage: &PipelineStage,
        documents: Vec<Value>,
        ctx: &EvalContext,
    ) -> Result<Vec<Value>, DocumentStoreError> {
        match stage {
            PipelineStage::Match(query) => {
                let mut kept = Vec::with_capacity(documents.len());
                for doc in documents {
                    if query.matches(&doc, ctx)? {
                        kept.push(doc);
                    }
                }
                Ok(kept)
            }
            PipelineStage::Project(spec) => documents
                .iter()
                .map(|doc| Self::execute_project(doc, spec, ctx))
                .collect(),
            PipelineStage::Group(spec) => Self::execute_group(documents, spec, ctx),
            PipelineStage::Sort(keys) => Ok(Self::execute_sort(documents, keys)),
            PipelineStage::Limit(n) => Ok(documents.into_iter().take(*n).collect()),
            PipelineStage::Skip(n) => Ok(documents.into_iter().skip(*n).collect()),
            PipelineStage::Unwind(spec) => Self::execute_unwind(documents, spec),
            PipelineStage::AddFields(fields) => documents
                .into_iter()
                .map(|doc| Self::execute_add_fields(doc, fields, ctx))
                .collect(),
            PipelineStage::Count(field) => {
                if documents.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = Map::new();
                out.insert(field.clone(), Value::from(documents.len()));
                Ok(vec![Value::Object(out)])
            }
            PipelineStage::ExcludeDeleted(flag) => Ok(documents
                .into_iter()
                .filter_map(|mut doc| prune_deleted(&mut doc, flag).then_some(doc))
                .collect()),
        }
    }

    /// Execute project stage
    fn execute_project(
        doc: &Value,
        spec: &ProjectSpec,
        ctx: &EvalContext,
    ) -> Result<Value, DocumentStoreError> {
        let mut result = spec.shape.apply(doc, &DocumentQuery::new(), ctx)?;
        for (field, expr) in &spec.computed {
            // A bare field reference to a missing path leaves the field out
            let value = match expr {
                Expression::Field(path) => match lookup_field(doc, path) {
                    Some(value) => value,
                    None => continue,
                },
                _ => expr.evaluate(doc, ctx)?,
            };
            set_path(&mut result, field, value)?;
        }
        Ok(result)
    }

    /// Execute group stage
    fn execute_group(
        documents: Vec<Value>,
        spec: &GroupSpec,
        ctx: &EvalContext,
    ) -> Result<Vec<Value>, DocumentStoreError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<AccumulatorState>)> = Vec::new();

        for doc in &documents {
            let key = spec.id.evaluate(doc, ctx)?;
            let slot = *index.entry(canonical_key(&key)).or_insert_with(|| {
                let states = spec
                    .accumulators
                    .iter()
                    .map(|(_, acc)| AccumulatorState::new(acc))
                    .collect();
                groups.push((key, states));
                groups.len() - 1
            });

            for ((_, acc), state) in spec.accumulators.iter().zip(groups[slot].1.iter_mut()) {
                let value = match acc.expression() {
                    Some(expr) => expr.evaluate(doc, ctx)?,
                    None => Value::Null,
                };
                state.update(value);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, states)| {
                let mut out = Map::with_capacity(states.len() + 1);
                out.insert(ID_FIELD.to_string(), key);
                for ((field, _), state) in spec.accumulators.iter().zip(states) {
                    out.insert(field.clone(), state.finish());
                }
                Value::Object(out)
            })
            .collect())
    }

    /// Execute sort stage
    fn execute_sort(mut documents: Vec<Value>, keys: &[(String, SortDirection)]) -> Vec<Value> {
        // Vec::sort_by is stable: equal keys keep their input order
        documents.sort_by(|a, b| {
            for (field, direction) in keys {
                let va = resolve_field(a, field);
                let vb = resolve_field(b, field);

                let cmp = compare_values(&va, &vb);
                if cmp != std::cmp::Ordering::Equal {
                    return match direction {
                        SortDirection::Ascending => cmp,
                        SortDirection::Descending => cmp.reverse(),
                    };
                }
            }
            std::cmp::Ordering::Equal
        });
        documents
    }

    /// Execute unwind stage
    fn execute_unwind(
        documents: Vec<Value>,
        spec: &UnwindSpec,
    ) -> Result<Vec<Value>, DocumentStoreError> {
        let mut result = Vec::new();

        for doc in documents {
            let elements = match get_path(&doc, &spec.path) {
                Some(Value::Array(arr)) => arr.clone(),
                Some(Value::Null) | None => Vec::new(),
                // A scalar behaves as a one-element array
                Some(_) => {
                    let mut doc = doc.clone();
                    if let Some(index_field) = &spec.include_array_index {
                        set_path(&mut doc, index_field, Value::Null)?;
                    }
                    result.push(doc);
                    continue;
                }
            };

            if elements.is_empty() {
                if spec.preserve_null_and_empty {
                    let mut doc = doc;
                    if matches!(get_path(&doc, &spec.path), Some(Value::Array(_))) {
                        remove_path(&mut doc, &spec.path);
                    }
                    if let Some(index_field) = &spec.include_array_index {
                        set_path(&mut doc, index_field, Value::Null)?;
                    }
                    result.push(doc);
                }
                continue;
            }

            for (index, element) in elements.into_iter().enumerate() {
                let mut unwound = doc.clone();
                set_path(&mut unwound, &spec.path, element)?;
                if let Some(index_field) = &spec.include_array_index {
                    set_path(&mut unwound, index_field, Value::from(index))?;
                }
                result.push(unwound);
            }
        }

        Ok(result)
    }

    /// Execute add fields stage
    fn execute_add_fields(
        doc: Value,
        fields: &[(String, Expression)],
        ctx: &EvalContext,
    ) -> Result<Value, DocumentStoreError> {
        let mut result = doc.clone();
        for (field, expr) in fields {
            set_path(&mut result, field, expr.evaluate(&doc, ctx)?)?;
        }
        Ok(result)
    }
}

impl Accumulator {
    /// Operand expression, if the accumulator takes one
    pub fn expression(&self) -> Option<&Expression> {
        match self {
            Self::Sum(e)
            | Self::Avg(e)
            | Self::Min(e)
            | Self::Max(e)
            | Self::First(e)
            | Self::Last(e)
            | Self::Push(e)
            | Self::AddToSet(e) => Some(e),
            Self::Count => None,
        }
    }
}

/// Running state of one accumulator within one group
#[derive(Debug)]
enum AccumulatorState {
    Sum(f64),
    Avg { sum: f64, count: usize },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
    AddToSet(Vec<Value>),
    Count(usize),
}

impl AccumulatorState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => Self::Sum(0.0),
            Accumulator::Avg(_) => Self::Avg { sum: 0.0, count: 0 },
            Accumulator::Min(_) => Self::Min(None),
            Accumulator::Max(_) => Self::Max(None),
            Accumulator::First(_) => Self::First(None),
            Accumulator::Last(_) => Self::Last(Value::Null),
            Accumulator::Push(_) => Self::Push(Vec::new()),
            Accumulator::AddToSet(_) => Self::AddToSet(Vec::new()),
            Accumulator::Count => Self::Count(0),
        }
    }

    fn update(&mut self, value: Value) {
        match self {
            // Non-numeric values are ignored by $sum and $avg
            Self::Sum(total) => {
                if let Some(n) = value.as_f64() {
                    *total += n;
                }
            }
            Self::Avg { sum, count } => {
                if let Some(n) = value.as_f64() {
                    *sum += n;
                    *count += 1;
                }
            }
            Self::Min(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map_or(true, |c| compare_values(&value, c).is_lt())
                {
                    *current = Some(value);
                }
            }
            Self::Max(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map_or(true, |c| compare_values(&value, c).is_gt())
                {
                    *current = Some(value);
                }
            }
            Self::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Self::Last(current) => *current = value,
            Self::Push(items) => items.push(value),
            Self::AddToSet(items) => {
                if !items.iter().any(|item| values_equal(item, &value)) {
                    items.push(value);
                }
            }
            Self::Count(n) => *n += 1,
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Sum(total) => number_value(total),
            Self::Avg { count: 0, .. } => Value::Null,
            Self::Avg { sum, count } => number_value(sum / count as f64),
            Self::Min(v) | Self::Max(v) | Self::First(v) => v.unwrap_or(Value::Null),
            Self::Last(v) => v,
            Self::Push(items) | Self::AddToSet(items) => Value::Array(items),
            Self::Count(n) => Value::from(n),
        }
    }
}

/// Key used to partition groups; numbers and dates compare by value
fn canonical_key(value: &Value) -> String {
    fn normalize(value: &Value) -> Value {
        match value {
            Value::Number(n) => n.as_f64().map(number_value).unwrap_or(Value::Null),
            Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
            Value::Object(_) if as_date_millis(value).is_some() => {
                super::value::millis_value(as_date_millis(value).unwrap_or_default())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
    normalize(value).to_string()
}

/// Strip flagged array elements; `false` when the document itself is flagged
pub(crate) fn prune_deleted(value: &mut Value, flag: &str) -> bool {
    match value {
        Value::Object(map) => {
            if map.get(flag).is_some_and(is_truthy) {
                return false;
            }
            map.values_mut().all(|child| prune_deleted(child, flag))
        }
        Value::Array(items) => {
            items.retain_mut(|item| prune_deleted(item, flag));
            true
        }
        _ => true,
    }
}

//! MongoDB-compatible query language implementation
//!
//! A filter is parsed into a [`DocumentQuery`]: a conjunction of field
//! conditions plus root-level logical operators. Field paths cross embedded
//! arrays, so `{"billing.medicines.medicine_name": "Ibuprofen"}` matches when
//! any medicine carries that name, and `{"doctor.available_days": "Friday"}`
//! matches when the literal is an element of the stored array.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::document::{candidates, get_path};
use super::expression::{EvalContext, Expression};
use super::value::{compare_same_class, is_truthy, type_class, values_equal, TypeClass};
use super::DocumentStoreError;

/// Query operator types
#[derive(Debug, Clone)]
pub enum QueryOperator {
    // Comparison operators
    /// Equal
    Eq(Value),
    /// Not equal
    Ne(Value),
    /// Greater than
    Gt(Value),
    /// Greater than or equal
    Gte(Value),
    /// Less than
    Lt(Value),
    /// Less than or equal
    Lte(Value),
    /// In array
    In(Vec<Value>),
    /// Not in array
    Nin(Vec<Value>),

    // Logical operators
    /// Logical AND
    And(Vec<DocumentQuery>),
    /// Logical OR
    Or(Vec<DocumentQuery>),
    /// Logical NOR
    Nor(Vec<DocumentQuery>),
    /// Negation of the field operators it wraps
    Not(Vec<QueryOperator>),

    // Element operators
    /// Field exists
    Exists(bool),

    // Evaluation operators
    /// Regular expression match on string values
    Regex(Regex),
    /// Computed-expression predicate
    Expr(Expression),

    // Array operators
    /// Array contains all values
    All(Vec<Value>),
    /// Some array element satisfies the predicate
    ElemMatch(ElemMatch),
    /// Array length
    Size(usize),
}

/// Predicate applied to each element by `$elemMatch`
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// Elements are documents matched against a nested query
    Document(Box<DocumentQuery>),
    /// Elements are scalars matched against operators
    Value(Vec<QueryOperator>),
}

/// A field condition in a query
#[derive(Debug, Clone)]
pub struct FieldCondition {
    /// Field path (dot notation supported)
    pub field: String,
    /// Operator to apply
    pub operator: QueryOperator,
}

/// A document query
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Field conditions
    conditions: Vec<FieldCondition>,
    /// Logical operators at root level
    logical_ops: Vec<QueryOperator>,
}

fn malformed(msg: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::MalformedExpression(msg.into())
}

impl DocumentQuery {
    /// Create an empty query (matches all)
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if query is empty (matches all)
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.logical_ops.is_empty()
    }

    /// Parse query from JSON
    pub fn from_json(value: &Value) -> Result<Self, DocumentStoreError> {
        let mut query = DocumentQuery::new();

        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Ok(query),
            _ => return Err(malformed("Query must be an object")),
        };

        for (key, value) in obj {
            if key.starts_with('$') {
                query.logical_ops.push(Self::parse_logical_operator(key, value)?);
            } else {
                query
                    .conditions
                    .extend(Self::parse_field_condition(key, value)?);
            }
        }

        Ok(query)
    }

    fn parse_query_list(op: &str, value: &Value) -> Result<Vec<Self>, DocumentStoreError> {
        let arr = value
            .as_array()
            .ok_or_else(|| malformed(format!("{} requires an array", op)))?;
        if arr.is_empty() {
            return Err(malformed(format!("{} requires a non-empty array", op)));
        }
        arr.iter().map(DocumentQuery::from_json).collect()
    }

    /// Parse a root-level operator
    fn parse_logical_operator(op: &str, value: &Value) -> Result<QueryOperator, DocumentStoreError> {
        match op {
            "$and" => Ok(QueryOperator::And(Self::parse_query_list(op, value)?)),
            "$or" => Ok(QueryOperator::Or(Self::parse_query_list(op, value)?)),
            "$nor" => Ok(QueryOperator::Nor(Self::parse_query_list(op, value)?)),
            "$expr" => Ok(QueryOperator::Expr(Expression::parse(value)?)),
            _ => Err(malformed(format!("Unknown operator: {}", op))),
        }
    }

    /// Parse a field condition
    fn parse_field_condition(
        field: &str,
        value: &Value,
    ) -> Result<Vec<FieldCondition>, DocumentStoreError> {
        let operators = match value {
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => {
                if super::value::as_date_millis(value).is_some() {
                    vec![QueryOperator::Eq(value.clone())]
                } else {
                    Self::parse_operator_object(value)?
                }
            }
            // Literal or nested document equality
            _ => vec![QueryOperator::Eq(value.clone())],
        };

        Ok(operators
            .into_iter()
            .map(|operator| FieldCondition {
                field: field.to_string(),
                operator,
            })
            .collect())
    }

    /// Parse `{ "$op": operand, ... }` into field operators
    fn parse_operator_object(value: &Value) -> Result<Vec<QueryOperator>, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("Operator expression must be an object"))?;

        if obj.keys().any(|k| !k.starts_with('$')) {
            return Err(malformed(
                "Cannot mix operators and plain fields in one condition",
            ));
        }

        let mut operators = Vec::with_capacity(obj.len());
        for (op, op_value) in obj {
            match op.as_str() {
                "$regex" => {
                    let options = obj.get("$options").map(|o| {
                        o.as_str()
                            .ok_or_else(|| malformed("$options must be a string"))
                    });
                    let options = options.transpose()?.unwrap_or("");
                    operators.push(QueryOperator::Regex(compile_regex(op_value, options)?));
                }
                "$options" if !obj.contains_key("$regex") => {
                    return Err(malformed("$options requires $regex"));
                }
                "$options" => {}
                _ => operators.push(Self::parse_comparison_operator(op, op_value)?),
            }
        }
        Ok(operators)
    }

    /// Parse a single field operator
    fn parse_comparison_operator(op: &str, value: &Value) -> Result<QueryOperator, DocumentStoreError> {
        let list = |name: &str| {
            value
                .as_array()
                .cloned()
                .ok_or_else(|| malformed(format!("{} requires an array", name)))
        };
        match op {
            "$eq" => Ok(QueryOperator::Eq(value.clone())),
            "$ne" => Ok(QueryOperator::Ne(value.clone())),
            "$gt" => Ok(QueryOperator::Gt(value.clone())),
            "$gte" => Ok(QueryOperator::Gte(value.clone())),
            "$lt" => Ok(QueryOperator::Lt(value.clone())),
            "$lte" => Ok(QueryOperator::Lte(value.clone())),
            "$in" => Ok(QueryOperator::In(list(op)?)),
            "$nin" => Ok(QueryOperator::Nin(list(op)?)),
            "$all" => Ok(QueryOperator::All(list(op)?)),
            "$exists" => Ok(QueryOperator::Exists(is_truthy(value))),
            "$size" => value
                .as_u64()
                .map(|n| QueryOperator::Size(n as usize))
                .ok_or_else(|| malformed("$size requires a non-negative integer")),
            "$not" => match value {
                Value::Object(_) => Ok(QueryOperator::Not(Self::parse_operator_object(value)?)),
                _ => Err(malformed("$not requires an operator expression")),
            },
            "$elemMatch" => Self::parse_elem_match(value),
            _ => Err(malformed(format!("Unknown query operator: {}", op))),
        }
    }

    fn parse_elem_match(value: &Value) -> Result<QueryOperator, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$elemMatch requires an object"))?;
        let value_mode = !obj.is_empty()
            && obj
                .keys()
                .all(|k| k.starts_with('$') && !matches!(k.as_str(), "$and" | "$or" | "$nor" | "$expr"));
        let spec = if value_mode {
            ElemMatch::Value(Self::parse_operator_object(value)?)
        } else {
            ElemMatch::Document(Box::new(DocumentQuery::from_json(value)?))
        };
        Ok(QueryOperator::ElemMatch(spec))
    }

    /// Check if a document matches this query
    pub fn matches(&self, doc: &Value, ctx: &EvalContext) -> Result<bool, DocumentStoreError> {
        for condition in &self.conditions {
            let values = candidates(doc, &condition.field);
            if !matches_operator(&values, &condition.operator, ctx)? {
                return Ok(false);
            }
        }

        for op in &self.logical_ops {
            if !Self::matches_logical_op(doc, op, ctx)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Check if a document matches a logical operator
    fn matches_logical_op(
        doc: &Value,
        op: &QueryOperator,
        ctx: &EvalContext,
    ) -> Result<bool, DocumentStoreError> {
        match op {
            QueryOperator::And(queries) => {
                for q in queries {
                    if !q.matches(doc, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            QueryOperator::Or(queries) => {
                for q in queries {
                    if q.matches(doc, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            QueryOperator::Nor(queries) => {
                for q in queries {
                    if q.matches(doc, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            QueryOperator::Expr(expr) => Ok(is_truthy(&expr.evaluate(doc, ctx)?)),
            _ => Err(malformed("Field operator used at query root")),
        }
    }

    /// Index of the first element of `array_path` satisfying this query's
    /// conditions on that array
    ///
    /// Backs the positional projection `"array.$"`. Only conditions whose path
    /// is the array or lies beneath it take part; conditions nested in `$and`
    /// count, those under `$or`/`$nor` do not.
    pub fn first_matching_index(
        &self,
        doc: &Value,
        array_path: &str,
        ctx: &EvalContext,
    ) -> Result<Option<usize>, DocumentStoreError> {
        let mut relevant = Vec::new();
        self.collect_array_conditions(array_path, &mut relevant);
        if relevant.is_empty() {
            return Err(malformed(format!(
                "Positional projection on '{}' requires a query condition on that array",
                array_path
            )));
        }

        let Some(Value::Array(elements)) = get_path(doc, array_path) else {
            return Ok(None);
        };

        'elements: for (index, element) in elements.iter().enumerate() {
            for (rest, operator) in &relevant {
                let matched = match (rest, operator) {
                    (None, QueryOperator::ElemMatch(spec)) => elem_matches(element, spec, ctx)?,
                    (None, op) => matches_operator(&[element], op, ctx)?,
                    (Some(rest), op) => matches_operator(&candidates(element, rest), op, ctx)?,
                };
                if !matched {
                    continue 'elements;
                }
            }
            return Ok(Some(index));
        }
        Ok(None)
    }

    fn collect_array_conditions<'a>(
        &'a self,
        array_path: &str,
        out: &mut Vec<(Option<&'a str>, &'a QueryOperator)>,
    ) {
        for condition in &self.conditions {
            if condition.field == array_path {
                out.push((None, &condition.operator));
            } else if let Some(rest) = condition
                .field
                .strip_prefix(array_path)
                .and_then(|r| r.strip_prefix('.'))
            {
                out.push((Some(rest), &condition.operator));
            }
        }
        for op in &self.logical_ops {
            if let QueryOperator::And(queries) = op {
                for q in queries {
                    q.collect_array_conditions(array_path, out);
                }
            }
        }
    }

    /// Get all field paths the query reads
    pub fn fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        for condition in &self.conditions {
            fields.insert(condition.field.clone());
            collect_operator_fields(&condition.field, &condition.operator, fields);
        }
        for op in &self.logical_ops {
            match op {
                QueryOperator::And(queries)
                | QueryOperator::Or(queries)
                | QueryOperator::Nor(queries) => {
                    for q in queries {
                        q.collect_fields(fields);
                    }
                }
                QueryOperator::Expr(expr) => expr.collect_fields(fields),
                _ => {}
            }
        }
    }
}

fn collect_operator_fields(prefix: &str, op: &QueryOperator, fields: &mut BTreeSet<String>) {
    match op {
        QueryOperator::ElemMatch(ElemMatch::Document(query)) => {
            for field in query.fields() {
                fields.insert(format!("{}.{}", prefix, field));
            }
        }
        QueryOperator::Not(ops) | QueryOperator::ElemMatch(ElemMatch::Value(ops)) => {
            for op in ops {
                collect_operator_fields(prefix, op, fields);
            }
        }
        _ => {}
    }
}

fn compile_regex(pattern: &Value, options: &str) -> Result<Regex, DocumentStoreError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| malformed("$regex requires a string pattern"))?;
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(malformed(format!("Unsupported $regex option: {}", other))),
        };
    }
    builder
        .build()
        .map_err(|e| malformed(format!("Invalid $regex pattern: {}", e)))
}

/// Values a scalar operator inspects: each candidate, plus the elements of array candidates
fn flattened<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Value::Array(arr) = value {
            out.extend(arr.iter());
        }
    }
    out
}

fn equals_any(values: &[&Value], expected: &Value) -> bool {
    if expected.is_null() {
        return values.is_empty() || flattened(values).iter().any(|v| v.is_null());
    }
    flattened(values).iter().any(|v| values_equal(v, expected))
}

fn compare_any(
    values: &[&Value],
    expected: &Value,
    test: impl Fn(Ordering) -> bool,
) -> Result<bool, DocumentStoreError> {
    let expected_class = type_class(expected);
    for value in flattened(values) {
        let class = type_class(value);
        if class == TypeClass::Null || (class == TypeClass::Array && expected_class != TypeClass::Array) {
            continue;
        }
        match compare_same_class(value, expected) {
            Some(ordering) if test(ordering) => return Ok(true),
            Some(_) => {}
            None => {
                return Err(malformed(format!(
                    "Cannot compare {} with {}",
                    class.name(),
                    expected_class.name()
                )))
            }
        }
    }
    Ok(false)
}

fn elem_matches(element: &Value, spec: &ElemMatch, ctx: &EvalContext) -> Result<bool, DocumentStoreError> {
    match spec {
        ElemMatch::Document(query) => Ok(element.is_object() && query.matches(element, ctx)?),
        ElemMatch::Value(ops) => {
            for op in ops {
                if !matches_operator(&[element], op, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Check the values a path resolved to against one operator
fn matches_operator(
    values: &[&Value],
    op: &QueryOperator,
    ctx: &EvalContext,
) -> Result<bool, DocumentStoreError> {
    match op {
        QueryOperator::Eq(expected) => Ok(equals_any(values, expected)),
        QueryOperator::Ne(expected) => Ok(!equals_any(values, expected)),
        QueryOperator::Gt(expected) => compare_any(values, expected, |o| o == Ordering::Greater),
        QueryOperator::Gte(expected) => compare_any(values, expected, |o| o != Ordering::Less),
        QueryOperator::Lt(expected) => compare_any(values, expected, |o| o == Ordering::Less),
        QueryOperator::Lte(expected) => compare_any(values, expected, |o| o != Ordering::Greater),
        QueryOperator::In(options) => Ok(options.iter().any(|o| equals_any(values, o))),
        QueryOperator::Nin(options) => Ok(!options.iter().any(|o| equals_any(values, o))),
        QueryOperator::Exists(should_exist) => Ok(values.is_empty() != *should_exist),
        QueryOperator::Regex(regex) => Ok(flattened(values)
            .iter()
            .any(|v| v.as_str().is_some_and(|s| regex.is_match(s)))),
        QueryOperator::Size(n) => Ok(values
            .iter()
            .any(|v| v.as_array().is_some_and(|arr| arr.len() == *n))),
        QueryOperator::All(required) => Ok(values.iter().any(|v| {
            let items: Vec<&Value> = match v {
                Value::Array(arr) => arr.iter().collect(),
                other => vec![*other],
            };
            !required.is_empty()
                && required
                    .iter()
                    .all(|r| items.iter().any(|item| values_equal(item, r)))
        })),
        QueryOperator::ElemMatch(spec) => {
            for value in values {
                if let Value::Array(arr) = value {
                    for element in arr {
                        if elem_matches(element, spec, ctx)? {
                            return Ok(true);
                        }
                    }
                }
            }
            Ok(false)
        }
        QueryOperator::Not(ops) => {
            for op in ops {
                if !matches_operator(values, op, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        QueryOperator::And(_) | QueryOperator::Or(_) | QueryOperator::Nor(_) | QueryOperator::Expr(_) => {
            Err(malformed("Logical operator used inside a field condition"))
        }
    }
}

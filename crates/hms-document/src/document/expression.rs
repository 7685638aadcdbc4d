//! Aggregation expressions (MongoDB-compatible subset)
//!
//! Expressions are parsed once from their JSON form and then evaluated per
//! document against an [`EvalContext`]. The context carries the reference
//! instant bound to `$$NOW`; evaluation never reads the clock.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};

use super::document::resolve_field;
use super::value::{
    as_date_millis, as_datetime, compare_values, date_value, is_truthy, millis_value,
    number_value, type_class, values_equal, TypeClass,
};
use super::DocumentStoreError;

/// Default `$dateToString` format
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%LZ";

/// Evaluation context shared by one query or pipeline run
#[derive(Debug, Clone)]
pub struct EvalContext {
    now: DateTime<Utc>,
    variables: HashMap<String, Value>,
}

impl EvalContext {
    /// Create a context whose `$$NOW` is `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            variables: HashMap::new(),
        }
    }

    /// The reference instant
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// A child context with one more user variable bound
    pub fn with_variable(&self, name: &str, value: Value) -> Self {
        let mut child = self.clone();
        child.variables.insert(name.to_string(), value);
        child
    }

    fn variable(&self, name: &str, root: &Value) -> Result<Value, DocumentStoreError> {
        match name {
            "NOW" => Ok(date_value(self.now)),
            "ROOT" | "CURRENT" => Ok(root.clone()),
            _ => self.variables.get(name).cloned().ok_or_else(|| {
                DocumentStoreError::MalformedExpression(format!("Undefined variable: $${}", name))
            }),
        }
    }
}

/// Expression for computed fields
#[derive(Debug, Clone)]
pub enum Expression {
    /// Literal value
    Literal(Value),
    /// Field reference (`$a.b`)
    Field(String),
    /// Variable reference (`$$name` or `$$name.path`)
    Variable {
        /// Variable name without the `$$` prefix
        name: String,
        /// Optional path into the variable's value
        path: Option<String>,
    },
    /// Array of expressions
    Array(Vec<Expression>),
    /// Object with expression values, in declaration order
    Object(Vec<(String, Expression)>),
    /// Addition; one date operand makes the result a date
    Add(Vec<Expression>),
    /// Subtraction; date minus date yields milliseconds
    Subtract(Box<Expression>, Box<Expression>),
    /// Multiplication
    Multiply(Vec<Expression>),
    /// Division
    Divide(Box<Expression>, Box<Expression>),
    /// String concatenation
    Concat(Vec<Expression>),
    /// Conditional
    Cond {
        /// Condition
        r#if: Box<Expression>,
        /// Then branch
        then: Box<Expression>,
        /// Else branch
        r#else: Box<Expression>,
    },
    /// First non-null operand, else the last operand
    IfNull(Vec<Expression>),
    /// Array length
    Size(Box<Expression>),
    /// Array filter binding each element to a variable
    Filter {
        /// Input array
        input: Box<Expression>,
        /// Variable name bound to the current element
        var: String,
        /// Keep the element when this is truthy
        cond: Box<Expression>,
    },
    /// Date formatting
    DateToString {
        /// strftime-style format (MongoDB specifiers)
        format: String,
        /// Date operand
        date: Box<Expression>,
        /// Value used when the date is null or missing
        on_null: Option<Box<Expression>>,
    },
    /// Year from date
    Year(Box<Expression>),
    /// Month from date
    Month(Box<Expression>),
    /// Day from date
    DayOfMonth(Box<Expression>),
    /// Equality
    Eq(Box<Expression>, Box<Expression>),
    /// Not equal
    Ne(Box<Expression>, Box<Expression>),
    /// Greater than
    Gt(Box<Expression>, Box<Expression>),
    /// Greater than or equal
    Gte(Box<Expression>, Box<Expression>),
    /// Less than
    Lt(Box<Expression>, Box<Expression>),
    /// Less than or equal
    Lte(Box<Expression>, Box<Expression>),
    /// Logical and
    And(Vec<Expression>),
    /// Logical or
    Or(Vec<Expression>),
    /// Logical not
    Not(Box<Expression>),
    /// String to upper
    ToUpper(Box<Expression>),
    /// String to lower
    ToLower(Box<Expression>),
}

fn malformed(msg: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::MalformedExpression(msg.into())
}

impl Expression {
    /// Parse an expression from its JSON form
    pub fn parse(value: &Value) -> Result<Self, DocumentStoreError> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(Self::Literal(value.clone())),
            Value::String(s) => Ok(Self::parse_reference(s)),
            Value::Array(arr) => Ok(Self::Array(Self::parse_all(arr)?)),
            Value::Object(obj) => {
                if as_date_millis(value).is_some() {
                    return Ok(Self::Literal(value.clone()));
                }
                let operators = obj.keys().filter(|k| k.starts_with('$')).count();
                match (operators, obj.iter().next()) {
                    (1, Some((op, arg))) if obj.len() == 1 => Self::parse_operator(op, arg),
                    (0, _) => {
                        let fields = obj
                            .iter()
                            .map(|(k, v)| Ok((k.clone(), Self::parse(v)?)))
                            .collect::<Result<Vec<_>, DocumentStoreError>>()?;
                        Ok(Self::Object(fields))
                    }
                    _ => Err(malformed(
                        "An expression object must hold exactly one operator",
                    )),
                }
            }
        }
    }

    fn parse_reference(s: &str) -> Self {
        if let Some(var) = s.strip_prefix("$$") {
            let (name, path) = match var.split_once('.') {
                Some((name, path)) => (name.to_string(), Some(path.to_string())),
                None => (var.to_string(), None),
            };
            Self::Variable { name, path }
        } else if let Some(field) = s.strip_prefix('$') {
            Self::Field(field.to_string())
        } else {
            Self::Literal(Value::String(s.to_string()))
        }
    }

    fn parse_all(values: &[Value]) -> Result<Vec<Self>, DocumentStoreError> {
        values.iter().map(Self::parse).collect()
    }

    fn parse_list(op: &str, value: &Value) -> Result<Vec<Self>, DocumentStoreError> {
        let arr = value
            .as_array()
            .ok_or_else(|| malformed(format!("{} requires an array", op)))?;
        Self::parse_all(arr)
    }

    fn parse_pair(op: &str, value: &Value) -> Result<(Box<Self>, Box<Self>), DocumentStoreError> {
        match value.as_array().map(Vec::as_slice) {
            Some([left, right]) => Ok((Box::new(Self::parse(left)?), Box::new(Self::parse(right)?))),
            _ => Err(malformed(format!("{} requires exactly 2 arguments", op))),
        }
    }

    /// Unary operators accept either the operand or a one-element array
    fn parse_unary(value: &Value) -> Result<Box<Self>, DocumentStoreError> {
        match value.as_array().map(Vec::as_slice) {
            Some([single]) => Ok(Box::new(Self::parse(single)?)),
            _ => Ok(Box::new(Self::parse(value)?)),
        }
    }

    fn parse_operator(op: &str, value: &Value) -> Result<Self, DocumentStoreError> {
        match op {
            "$literal" => Ok(Self::Literal(value.clone())),
            "$add" => Ok(Self::Add(Self::parse_list(op, value)?)),
            "$multiply" => Ok(Self::Multiply(Self::parse_list(op, value)?)),
            "$concat" => Ok(Self::Concat(Self::parse_list(op, value)?)),
            "$and" => Ok(Self::And(Self::parse_list(op, value)?)),
            "$or" => Ok(Self::Or(Self::parse_list(op, value)?)),
            "$subtract" => {
                let (l, r) = Self::parse_pair(op, value)?;
                Ok(Self::Subtract(l, r))
            }
            "$divide" => {
                let (l, r) = Self::parse_pair(op, value)?;
                Ok(Self::Divide(l, r))
            }
            "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
                let (l, r) = Self::parse_pair(op, value)?;
                Ok(match op {
                    "$eq" => Self::Eq(l, r),
                    "$ne" => Self::Ne(l, r),
                    "$gt" => Self::Gt(l, r),
                    "$gte" => Self::Gte(l, r),
                    "$lt" => Self::Lt(l, r),
                    _ => Self::Lte(l, r),
                })
            }
            "$ifNull" => {
                let exprs = Self::parse_list(op, value)?;
                if exprs.len() < 2 {
                    return Err(malformed("$ifNull requires at least 2 arguments"));
                }
                Ok(Self::IfNull(exprs))
            }
            "$not" => Ok(Self::Not(Self::parse_unary(value)?)),
            "$size" => Ok(Self::Size(Self::parse_unary(value)?)),
            "$toUpper" => Ok(Self::ToUpper(Self::parse_unary(value)?)),
            "$toLower" => Ok(Self::ToLower(Self::parse_unary(value)?)),
            "$year" => Ok(Self::Year(Self::parse_unary(value)?)),
            "$month" => Ok(Self::Month(Self::parse_unary(value)?)),
            "$dayOfMonth" => Ok(Self::DayOfMonth(Self::parse_unary(value)?)),
            "$cond" => Self::parse_cond(value),
            "$filter" => Self::parse_filter(value),
            "$dateToString" => Self::parse_date_to_string(value),
            _ => Err(malformed(format!("Unknown expression operator: {}", op))),
        }
    }

    fn parse_cond(value: &Value) -> Result<Self, DocumentStoreError> {
        let (if_value, then_value, else_value) = match value {
            Value::Array(arr) if arr.len() == 3 => (&arr[0], &arr[1], &arr[2]),
            Value::Object(obj) => (
                obj.get("if").ok_or_else(|| malformed("$cond requires if"))?,
                obj.get("then").ok_or_else(|| malformed("$cond requires then"))?,
                obj.get("else").ok_or_else(|| malformed("$cond requires else"))?,
            ),
            _ => return Err(malformed("$cond requires an object or a 3-element array")),
        };
        Ok(Self::Cond {
            r#if: Box::new(Self::parse(if_value)?),
            then: Box::new(Self::parse(then_value)?),
            r#else: Box::new(Self::parse(else_value)?),
        })
    }

    fn parse_filter(value: &Value) -> Result<Self, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$filter requires an object"))?;
        if let Some(unknown) = obj.keys().find(|k| !matches!(k.as_str(), "input" | "as" | "cond")) {
            return Err(malformed(format!("Unknown $filter argument: {}", unknown)));
        }
        let input = obj
            .get("input")
            .ok_or_else(|| malformed("$filter requires input"))?;
        let cond = obj
            .get("cond")
            .ok_or_else(|| malformed("$filter requires cond"))?;
        let var = match obj.get("as") {
            Some(Value::String(name)) if !name.is_empty() && !name.starts_with('$') => name.clone(),
            Some(_) => return Err(malformed("$filter 'as' must be a variable name")),
            None => "this".to_string(),
        };
        Ok(Self::Filter {
            input: Box::new(Self::parse(input)?),
            var,
            cond: Box::new(Self::parse(cond)?),
        })
    }

    fn parse_date_to_string(value: &Value) -> Result<Self, DocumentStoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("$dateToString requires an object"))?;
        let mut format = DEFAULT_DATE_FORMAT.to_string();
        let mut date = None;
        let mut on_null = None;
        for (key, arg) in obj {
            match key.as_str() {
                "format" => {
                    format = arg
                        .as_str()
                        .ok_or_else(|| malformed("$dateToString format must be a string"))?
                        .to_string()
                }
                "date" => date = Some(Box::new(Self::parse(arg)?)),
                "onNull" => on_null = Some(Box::new(Self::parse(arg)?)),
                "timezone" if matches!(arg.as_str(), Some("UTC") | Some("Z") | Some("+00:00")) => {}
                _ => return Err(malformed(format!("Unsupported $dateToString argument: {}", key))),
            }
        }
        let format = translate_date_format(&format)?;
        Ok(Self::DateToString {
            format,
            date: date.ok_or_else(|| malformed("$dateToString requires date"))?,
            on_null,
        })
    }

    /// Evaluate against a document
    pub fn evaluate(&self, doc: &Value, ctx: &EvalContext) -> Result<Value, DocumentStoreError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Field(path) => Ok(resolve_field(doc, path)),
            Self::Variable { name, path } => {
                let value = ctx.variable(name, doc)?;
                Ok(match path {
                    Some(path) => resolve_field(&value, path),
                    None => value,
                })
            }
            Self::Array(exprs) => Ok(Value::Array(
                exprs
                    .iter()
                    .map(|e| e.evaluate(doc, ctx))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Object(fields) => {
                let mut obj = Map::with_capacity(fields.len());
                for (k, e) in fields {
                    obj.insert(k.clone(), e.evaluate(doc, ctx)?);
                }
                Ok(Value::Object(obj))
            }
            Self::Add(exprs) => {
                let values = exprs
                    .iter()
                    .map(|e| e.evaluate(doc, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                add_values(&values)
            }
            Self::Subtract(l, r) => subtract_values(&l.evaluate(doc, ctx)?, &r.evaluate(doc, ctx)?),
            Self::Multiply(exprs) => {
                let mut product = 1.0;
                for e in exprs {
                    match numeric_operand("$multiply", &e.evaluate(doc, ctx)?)? {
                        Some(n) => product *= n,
                        None => return Ok(Value::Null),
                    }
                }
                Ok(number_value(product))
            }
            Self::Divide(l, r) => {
                let l = numeric_operand("$divide", &l.evaluate(doc, ctx)?)?;
                let r = numeric_operand("$divide", &r.evaluate(doc, ctx)?)?;
                Ok(match (l, r) {
                    (Some(l), Some(r)) if r != 0.0 => number_value(l / r),
                    _ => Value::Null,
                })
            }
            Self::Concat(exprs) => {
                let mut result = String::new();
                for e in exprs {
                    match e.evaluate(doc, ctx)? {
                        Value::String(s) => result.push_str(&s),
                        Value::Null => return Ok(Value::Null),
                        other => {
                            return Err(malformed(format!(
                                "$concat only supports strings, got {}",
                                type_class(&other).name()
                            )))
                        }
                    }
                }
                Ok(Value::String(result))
            }
            Self::Cond { r#if, then, r#else } => {
                if is_truthy(&r#if.evaluate(doc, ctx)?) {
                    then.evaluate(doc, ctx)
                } else {
                    r#else.evaluate(doc, ctx)
                }
            }
            Self::IfNull(exprs) => {
                let (last, rest) = exprs
                    .split_last()
                    .ok_or_else(|| malformed("$ifNull requires arguments"))?;
                for e in rest {
                    let v = e.evaluate(doc, ctx)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                last.evaluate(doc, ctx)
            }
            Self::Size(e) => match e.evaluate(doc, ctx)? {
                Value::Array(arr) => Ok(Value::from(arr.len())),
                Value::Null => Ok(Value::from(0)),
                other => Err(malformed(format!(
                    "$size requires an array, got {}",
                    type_class(&other).name()
                ))),
            },
            Self::Filter { input, var, cond } => match input.evaluate(doc, ctx)? {
                Value::Array(items) => {
                    let mut kept = Vec::new();
                    for item in items {
                        let scope = ctx.with_variable(var, item.clone());
                        if is_truthy(&cond.evaluate(doc, &scope)?) {
                            kept.push(item);
                        }
                    }
                    Ok(Value::Array(kept))
                }
                Value::Null => Ok(Value::Null),
                other => Err(malformed(format!(
                    "$filter input must be an array, got {}",
                    type_class(&other).name()
                ))),
            },
            Self::DateToString {
                format,
                date,
                on_null,
            } => {
                let value = date.evaluate(doc, ctx)?;
                if value.is_null() {
                    return match on_null {
                        Some(e) => e.evaluate(doc, ctx),
                        None => Ok(Value::Null),
                    };
                }
                let instant = date_operand("$dateToString", &value)?;
                Ok(Value::String(instant.format(format).to_string()))
            }
            Self::Year(e) => self.date_part(e, doc, ctx, |d| i64::from(d.year())),
            Self::Month(e) => self.date_part(e, doc, ctx, |d| i64::from(d.month())),
            Self::DayOfMonth(e) => self.date_part(e, doc, ctx, |d| i64::from(d.day())),
            Self::Eq(l, r) => {
                let (l, r) = (l.evaluate(doc, ctx)?, r.evaluate(doc, ctx)?);
                Ok(Value::Bool(values_equal(&l, &r)))
            }
            Self::Ne(l, r) => {
                let (l, r) = (l.evaluate(doc, ctx)?, r.evaluate(doc, ctx)?);
                Ok(Value::Bool(!values_equal(&l, &r)))
            }
            Self::Gt(l, r) => compare(l, r, doc, ctx, |o| o == Ordering::Greater),
            Self::Gte(l, r) => compare(l, r, doc, ctx, |o| o != Ordering::Less),
            Self::Lt(l, r) => compare(l, r, doc, ctx, |o| o == Ordering::Less),
            Self::Lte(l, r) => compare(l, r, doc, ctx, |o| o != Ordering::Greater),
            Self::And(exprs) => {
                for e in exprs {
                    if !is_truthy(&e.evaluate(doc, ctx)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Self::Or(exprs) => {
                for e in exprs {
                    if is_truthy(&e.evaluate(doc, ctx)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Self::Not(e) => Ok(Value::Bool(!is_truthy(&e.evaluate(doc, ctx)?))),
            Self::ToUpper(e) => Ok(Value::String(string_operand(&e.evaluate(doc, ctx)?).to_uppercase())),
            Self::ToLower(e) => Ok(Value::String(string_operand(&e.evaluate(doc, ctx)?).to_lowercase())),
        }
    }

    /// Document field paths this expression reads
    pub fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Field(path) => {
                fields.insert(path.clone());
            }
            Self::Variable { name, path } => {
                if let (Some(path), "ROOT" | "CURRENT") = (path, name.as_str()) {
                    fields.insert(path.clone());
                }
            }
            Self::Array(exprs)
            | Self::Add(exprs)
            | Self::Multiply(exprs)
            | Self::Concat(exprs)
            | Self::IfNull(exprs)
            | Self::And(exprs)
            | Self::Or(exprs) => exprs.iter().for_each(|e| e.collect_fields(fields)),
            Self::Object(entries) => entries.iter().for_each(|(_, e)| e.collect_fields(fields)),
            Self::Subtract(l, r)
            | Self::Divide(l, r)
            | Self::Eq(l, r)
            | Self::Ne(l, r)
            | Self::Gt(l, r)
            | Self::Gte(l, r)
            | Self::Lt(l, r)
            | Self::Lte(l, r) => {
                l.collect_fields(fields);
                r.collect_fields(fields);
            }
            Self::Cond { r#if, then, r#else } => {
                r#if.collect_fields(fields);
                then.collect_fields(fields);
                r#else.collect_fields(fields);
            }
            Self::Filter { input, cond, .. } => {
                input.collect_fields(fields);
                cond.collect_fields(fields);
            }
            Self::DateToString { date, on_null, .. } => {
                date.collect_fields(fields);
                if let Some(e) = on_null {
                    e.collect_fields(fields);
                }
            }
            Self::Size(e)
            | Self::Year(e)
            | Self::Month(e)
            | Self::DayOfMonth(e)
            | Self::Not(e)
            | Self::ToUpper(e)
            | Self::ToLower(e) => e.collect_fields(fields),
        }
    }

    fn date_part(
        &self,
        operand: &Expression,
        doc: &Value,
        ctx: &EvalContext,
        part: impl Fn(DateTime<Utc>) -> i64,
    ) -> Result<Value, DocumentStoreError> {
        let value = operand.evaluate(doc, ctx)?;
        if value.is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::from(part(date_operand("date operator", &value)?)))
    }
}

fn compare(
    l: &Expression,
    r: &Expression,
    doc: &Value,
    ctx: &EvalContext,
    test: impl Fn(Ordering) -> bool,
) -> Result<Value, DocumentStoreError> {
    let (l, r) = (l.evaluate(doc, ctx)?, r.evaluate(doc, ctx)?);
    Ok(Value::Bool(test(compare_values(&l, &r))))
}

fn numeric_operand(op: &str, value: &Value) -> Result<Option<f64>, DocumentStoreError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(malformed(format!(
            "{} only supports numeric types, got {}",
            op,
            type_class(other).name()
        ))),
    }
}

fn date_operand(op: &str, value: &Value) -> Result<DateTime<Utc>, DocumentStoreError> {
    as_datetime(value).ok_or_else(|| {
        malformed(format!(
            "{} requires a date, got {}",
            op,
            type_class(value).name()
        ))
    })
}

fn string_operand(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn add_values(values: &[Value]) -> Result<Value, DocumentStoreError> {
    let mut sum = 0.0;
    let mut date = None;
    for value in values {
        match type_class(value) {
            TypeClass::Null => return Ok(Value::Null),
            TypeClass::Date if date.is_some() => {
                return Err(malformed("$add only supports one date operand"))
            }
            TypeClass::Date => date = as_date_millis(value),
            TypeClass::Number => sum += value.as_f64().unwrap_or(0.0),
            other => {
                return Err(malformed(format!(
                    "$add only supports numeric or date types, got {}",
                    other.name()
                )))
            }
        }
    }
    match date {
        Some(millis) => millis
            .checked_add(sum.round() as i64)
            .map(millis_value)
            .ok_or_else(|| malformed("$add overflows the date range")),
        None => Ok(number_value(sum)),
    }
}

fn subtract_values(l: &Value, r: &Value) -> Result<Value, DocumentStoreError> {
    match (type_class(l), type_class(r)) {
        (TypeClass::Null, _) | (_, TypeClass::Null) => Ok(Value::Null),
        (TypeClass::Date, TypeClass::Date) => {
            let (l, r) = (as_date_millis(l), as_date_millis(r));
            match (l, r) {
                (Some(l), Some(r)) => l
                    .checked_sub(r)
                    .map(Value::from)
                    .ok_or_else(|| malformed("$subtract overflows the date range")),
                _ => Ok(Value::Null),
            }
        }
        (TypeClass::Date, TypeClass::Number) => match as_date_millis(l) {
            Some(millis) => millis
                .checked_sub(r.as_f64().unwrap_or(0.0).round() as i64)
                .map(millis_value)
                .ok_or_else(|| malformed("$subtract overflows the date range")),
            None => Ok(Value::Null),
        },
        (TypeClass::Number, TypeClass::Number) => Ok(number_value(
            l.as_f64().unwrap_or(0.0) - r.as_f64().unwrap_or(0.0),
        )),
        (a, b) => Err(malformed(format!(
            "cannot $subtract a {} from a {}",
            b.name(),
            a.name()
        ))),
    }
}

/// Rewrite MongoDB date specifiers into chrono's and reject unknown ones
fn translate_date_format(format: &str) -> Result<String, DocumentStoreError> {
    let translated = format.replace("%L", "%3f");
    if StrftimeItems::new(&translated).any(|item| matches!(item, Item::Error)) {
        return Err(malformed(format!("Invalid $dateToString format: {}", format)));
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::value::MILLIS_PER_DAY;
    use chrono::TimeZone;
    use serde_json::json;

    fn ctx() -> EvalContext {
        EvalContext::new(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap())
    }

    fn eval(expr: Value, doc: &Value) -> Result<Value, DocumentStoreError> {
        Expression::parse(&expr)?.evaluate(doc, &ctx())
    }

    #[test]
    fn test_concat_and_null_propagation() {
        let doc = json!({ "patient": { "first_name": "Alice", "last_name": "Smith" } });
        assert_eq!(
            eval(json!({ "$concat": ["$patient.first_name", " ", "$patient.last_name"] }), &doc).unwrap(),
            json!("Alice Smith")
        );
        assert_eq!(
            eval(json!({ "$concat": ["$patient.middle_name", "x"] }), &doc).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_size_treats_null_as_empty() {
        let doc = json!({ "billing": null });
        assert_eq!(
            eval(json!({ "$size": { "$ifNull": ["$billing.medicines", []] } }), &doc).unwrap(),
            json!(0)
        );
        assert_eq!(eval(json!({ "$size": "$billing.medicines" }), &doc).unwrap(), json!(0));
        assert!(eval(json!({ "$size": "abc" }), &doc).is_err());
    }

    #[test]
    fn test_age_in_years() {
        let doc = json!({
            "appointment_date": { "$date": "2025-03-21" },
            "patient": { "date_of_birth": { "$date": "1985-09-23" } }
        });
        let age = eval(
            json!({ "$divide": [
                { "$subtract": ["$appointment_date", "$patient.date_of_birth"] },
                31_536_000_000i64
            ] }),
            &doc,
        )
        .unwrap();
        let age = age.as_f64().unwrap();
        assert!((age - 39.49).abs() < 0.01, "age was {}", age);
    }

    #[test]
    fn test_add_days_to_now() {
        let sum = eval(json!({ "$add": ["$$NOW", MILLIS_PER_DAY] }), &json!({})).unwrap();
        assert_eq!(
            as_datetime(&sum),
            Some(Utc.with_ymd_and_hms(2025, 5, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_date_arithmetic_overflow_is_malformed() {
        let result = eval(json!({ "$add": ["$$NOW", i64::MAX] }), &json!({}));
        assert!(matches!(result, Err(DocumentStoreError::MalformedExpression(_))));

        let result = eval(json!({ "$subtract": ["$$NOW", i64::MIN] }), &json!({}));
        assert!(matches!(result, Err(DocumentStoreError::MalformedExpression(_))));
    }

    #[test]
    fn test_filter_binds_variable() {
        let doc = json!({ "items": [
            { "expiry_date": { "$date": "2025-05-20" } },
            { "expiry_date": { "$date": "2026-01-01" } },
            { "expiry_date": { "$date": "2025-04-01" } }
        ] });
        let kept = eval(
            json!({ "$filter": {
                "input": "$items",
                "as": "it",
                "cond": { "$and": [
                    { "$gt": ["$$it.expiry_date", "$$NOW"] },
                    { "$lte": ["$$it.expiry_date", { "$add": ["$$NOW", 60 * MILLIS_PER_DAY] }] }
                ] }
            } }),
            &doc,
        )
        .unwrap();
        assert_eq!(kept, json!([{ "expiry_date": { "$date": "2025-05-20" } }]));
    }

    #[test]
    fn test_date_to_string() {
        let doc = json!({ "d": { "$date": "2025-02-14T10:30:00Z" } });
        assert_eq!(
            eval(json!({ "$dateToString": { "format": "%Y-%m", "date": "$d" } }), &doc).unwrap(),
            json!("2025-02")
        );
        assert_eq!(
            eval(json!({ "$dateToString": { "date": "$d" } }), &doc).unwrap(),
            json!("2025-02-14T10:30:00.000Z")
        );
        assert!(eval(json!({ "$dateToString": { "date": "$name" } }), &json!({ "name": "x" })).is_err());
    }

    #[test]
    fn test_divide_by_zero_is_null() {
        assert_eq!(eval(json!({ "$divide": [1, 0] }), &json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn test_undefined_variable_is_malformed() {
        let err = eval(json!("$$missing"), &json!({})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::MalformedExpression(_)));
    }

    #[test]
    fn test_unknown_operator_is_malformed() {
        assert!(matches!(
            Expression::parse(&json!({ "$frobnicate": 1 })),
            Err(DocumentStoreError::MalformedExpression(_))
        ));
    }

    #[test]
    fn test_cond_and_year() {
        let doc = json!({ "d": { "$date": "2024-07-04" }, "n": 5 });
        assert_eq!(eval(json!({ "$year": "$d" }), &doc).unwrap(), json!(2024));
        assert_eq!(eval(json!({ "$month": "$d" }), &doc).unwrap(), json!(7));
        assert_eq!(
            eval(json!({ "$cond": [{ "$gte": ["$n", 3] }, "big", "small"] }), &doc).unwrap(),
            json!("big")
        );
    }
}

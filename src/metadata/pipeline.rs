//! Aggregation pipeline over stored metadata documents.
//!
//! Callers describe queries as a sequence of stages in a Mongo-like JSON
//! form:
//!
//! ```json
//! [
//!   {"$match": {"region": "us-east-1", "buckets.object_count": {"$gt": 0}}},
//!   {"$matchBuckets": {"tags.env": "prod"}},
//!   {"$sort": {"name": 1}},
//!   {"$skip": 10},
//!   {"$limit": 5}
//! ]
//! ```
//!
//! Dotted paths descend into objects and fan out over arrays, so a
//! condition on `buckets.name` holds when any bucket satisfies it.  No
//! stage can add documents to the working set; a leading `$match`
//! therefore bounds everything the rest of the pipeline may return.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::errors::StoreError;

/// A single comparison applied to the values found at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Exists(bool),
}

/// A conjunction of path conditions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents matching the filter.
    Match(Filter),
    /// Within each document, keep only the buckets matching the filter.
    MatchBuckets(Filter),
    /// Order documents by one or more paths.
    Sort(Vec<(String, SortOrder)>),
    /// Drop the first `n` documents.
    Skip(usize),
    /// Keep at most `n` documents.
    Limit(usize),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality filter on a single path.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(path, Condition::Eq(value.into()))
    }

    /// Add a clause to the conjunction.
    pub fn with(mut self, path: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push((path.into(), condition));
        self
    }

    /// Parse a filter document.
    pub fn from_value(value: &Value) -> Result<Self, StoreError> {
        let map = value
            .as_object()
            .ok_or_else(|| StoreError::invalid_pipeline("filter must be an object"))?;

        let mut filter = Filter::new();
        for (path, criterion) in map {
            if path.is_empty() || path.starts_with('$') {
                return Err(StoreError::invalid_pipeline(format!(
                    "unsupported filter path '{path}'"
                )));
            }
            match criterion {
                Value::Object(ops) if is_operator_object(ops) => {
                    for (op, arg) in ops {
                        let condition = parse_condition(op, arg)?;
                        filter.clauses.push((path.clone(), condition));
                    }
                }
                other => filter.clauses.push((path.clone(), Condition::Eq(other.clone()))),
            }
        }
        Ok(filter)
    }

    /// Whether `doc` satisfies every clause.
    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|(path, condition)| {
            let candidates = resolve_path(doc, path);
            condition_holds(condition, &candidates)
        })
    }
}

impl Stage {
    /// Parse a single `{"$stage": argument}` document.
    pub fn from_value(value: &Value) -> Result<Self, StoreError> {
        let map = value
            .as_object()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| StoreError::invalid_pipeline("stage must be an object with one key"))?;
        let (name, arg) = map
            .iter()
            .next()
            .ok_or_else(|| StoreError::invalid_pipeline("empty stage"))?;

        match name.as_str() {
            "$match" => Ok(Stage::Match(Filter::from_value(arg)?)),
            "$matchBuckets" => Ok(Stage::MatchBuckets(Filter::from_value(arg)?)),
            "$sort" => parse_sort(arg).map(Stage::Sort),
            "$skip" => parse_count(name, arg, true).map(Stage::Skip),
            "$limit" => parse_count(name, arg, false).map(Stage::Limit),
            other => Err(StoreError::invalid_pipeline(format!(
                "unsupported stage '{other}'"
            ))),
        }
    }

    /// Parse a JSON array of stages.
    pub fn parse_pipeline(value: &Value) -> Result<Vec<Stage>, StoreError> {
        value
            .as_array()
            .ok_or_else(|| StoreError::invalid_pipeline("pipeline must be an array"))?
            .iter()
            .map(Stage::from_value)
            .collect()
    }

    fn apply(&self, docs: Vec<Value>) -> Vec<Value> {
        match self {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::MatchBuckets(filter) => docs
                .into_iter()
                .map(|mut doc| {
                    if let Some(Value::Array(buckets)) = doc.get_mut("buckets") {
                        buckets.retain(|b| filter.matches(b));
                    }
                    doc
                })
                .collect(),
            Stage::Sort(keys) => {
                let mut docs = docs;
                docs.sort_by(|a, b| compare_by_keys(a, b, keys));
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        }
    }
}

/// Run `stages` in order over `docs`.
pub fn run(docs: Vec<Value>, stages: &[Stage]) -> Vec<Value> {
    stages.iter().fold(docs, |docs, stage| stage.apply(docs))
}

// -- Parsing -----------------------------------------------------------------

fn is_operator_object(ops: &Map<String, Value>) -> bool {
    !ops.is_empty() && ops.keys().all(|k| k.starts_with('$'))
}

fn parse_condition(op: &str, arg: &Value) -> Result<Condition, StoreError> {
    let condition = match op {
        "$eq" => Condition::Eq(arg.clone()),
        "$ne" => Condition::Ne(arg.clone()),
        "$gt" => Condition::Gt(arg.clone()),
        "$gte" => Condition::Gte(arg.clone()),
        "$lt" => Condition::Lt(arg.clone()),
        "$lte" => Condition::Lte(arg.clone()),
        "$in" => Condition::In(
            arg.as_array()
                .cloned()
                .ok_or_else(|| StoreError::invalid_pipeline("$in requires an array"))?,
        ),
        "$exists" => Condition::Exists(
            arg.as_bool()
                .ok_or_else(|| StoreError::invalid_pipeline("$exists requires a boolean"))?,
        ),
        other => {
            return Err(StoreError::invalid_pipeline(format!(
                "unsupported operator '{other}'"
            )))
        }
    };
    Ok(condition)
}

fn parse_sort(arg: &Value) -> Result<Vec<(String, SortOrder)>, StoreError> {
    let map = arg
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| StoreError::invalid_pipeline("$sort requires a non-empty object"))?;

    map.iter()
        .map(|(path, dir)| match dir.as_i64() {
            Some(1) => Ok((path.clone(), SortOrder::Ascending)),
            Some(-1) => Ok((path.clone(), SortOrder::Descending)),
            _ => Err(StoreError::invalid_pipeline(format!(
                "$sort direction for '{path}' must be 1 or -1"
            ))),
        })
        .collect()
}

fn parse_count(stage: &str, arg: &Value, allow_zero: bool) -> Result<usize, StoreError> {
    arg.as_u64()
        .filter(|n| allow_zero || *n > 0)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StoreError::invalid_pipeline(format!("{stage} requires a valid count")))
}

// -- Evaluation --------------------------------------------------------------

/// Collect every value reachable at a dotted path.
fn resolve_path<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect(doc, &segments, &mut out);
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect(item, rest, out);
                }
            }
            for item in items.iter().filter(|i| i.is_object()) {
                collect(item, segments, out);
            }
        }
        _ => {}
    }
}

fn condition_holds(condition: &Condition, candidates: &[&Value]) -> bool {
    match condition {
        Condition::Eq(v) => any_equal(candidates, v),
        Condition::Ne(v) => !any_equal(candidates, v),
        Condition::Gt(v) => any_compare(candidates, v, |o| o == Ordering::Greater),
        Condition::Gte(v) => any_compare(candidates, v, |o| o != Ordering::Less),
        Condition::Lt(v) => any_compare(candidates, v, |o| o == Ordering::Less),
        Condition::Lte(v) => any_compare(candidates, v, |o| o != Ordering::Greater),
        Condition::In(values) => values.iter().any(|v| any_equal(candidates, v)),
        Condition::Exists(expected) => !candidates.is_empty() == *expected,
    }
}

fn any_equal(candidates: &[&Value], expected: &Value) -> bool {
    if expected.is_null() && candidates.is_empty() {
        return true;
    }
    candidates.iter().any(|c| match c {
        Value::Array(items) => *c == expected || items.iter().any(|i| values_equal(i, expected)),
        other => values_equal(other, expected),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn any_compare(candidates: &[&Value], expected: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    candidates.iter().any(|c| match c {
        Value::Array(items) => items
            .iter()
            .any(|i| compare_values(i, expected).is_some_and(&pred)),
        other => compare_values(other, expected).is_some_and(&pred),
    })
}

/// Compare two values of the same kind; `None` across kinds.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_by_keys(a: &Value, b: &Value, keys: &[(String, SortOrder)]) -> Ordering {
    for (path, order) in keys {
        let left = resolve_path(a, path).first().copied();
        let right = resolve_path(b, path).first().copied();
        let ordering = type_rank(left).cmp(&type_rank(right)).then_with(|| {
            match (left, right) {
                (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            }
        });
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

//! Evaluates the `where`/`sort`/`select`/`skip`/`limit`/`count` query
//! parameters of the list endpoints over JSON documents.
//!
//! Semantics follow MongoDB's for the subset supported here: field equality
//! (an array field matches when any element matches), the comparison
//! operators `$eq $ne $gt $gte $lt $lte $in $nin $exists`, and the logical
//! `$and $or $nor`. Strings that are RFC 3339 timestamps compare as instants.
//! Everything is parsed up front, so a bad parameter is a validation error
//! before any document is looked at.

use std::cmp::Ordering;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use crate::errors::{AppError, AppResult};
use crate::models::ListParams;

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field(String, Vec<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    include: bool,
    fields: Vec<String>,
    keep_id: bool,
}

/// A parsed list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    filter: Option<Filter>,
    sort: Vec<(String, Direction)>,
    projection: Option<Projection>,
    skip: usize,
    limit: Option<usize>,
    count: bool,
}

/// Result of running a [`ListQuery`]: the page of records, or its size when
/// `count=true` was asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Records(Vec<Value>),
    Count(usize),
}

fn parse_json(raw: &str, param: &str) -> AppResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Validation(format!("Invalid '{}' parameter: {}", param, e)))
}

fn parse_count(raw: &str, param: &str) -> AppResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| AppError::Validation(format!("Invalid '{}' parameter: expected a non-negative integer, got '{}'", param, raw)))
}

impl ListQuery {
    pub fn from_params(params: &ListParams) -> AppResult<Self> {
        let filter = match params.filter.as_deref() {
            Some(raw) => Some(parse_filter(&parse_json(raw, "where")?)?),
            None => None,
        };
        let sort = match params.sort.as_deref() {
            Some(raw) => parse_sort(&parse_json(raw, "sort")?)?,
            None => Vec::new(),
        };
        let projection = Projection::from_param(params.select.as_deref())?;
        let skip = match params.skip.as_deref() {
            Some(raw) => parse_count(raw, "skip")?,
            None => 0,
        };
        // limit(0) means no limit, as in MongoDB
        let limit = match params.limit.as_deref() {
            Some(raw) => Some(parse_count(raw, "limit")?).filter(|l| *l > 0),
            None => None,
        };

        Ok(Self {
            filter,
            sort,
            projection,
            skip,
            limit,
            count: params.count.as_deref() == Some("true"),
        })
    }

    pub fn run(&self, mut docs: Vec<Value>) -> QueryOutput {
        if let Some(filter) = &self.filter {
            docs.retain(|doc| filter.matches(doc));
        }

        docs.sort_by(creation_order);
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| self.compare(a, b));
        }

        let page = docs
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX));

        if self.count {
            return QueryOutput::Count(page.count());
        }

        match &self.projection {
            Some(projection) => QueryOutput::Records(page.map(|doc| projection.apply(doc)).collect()),
            None => QueryOutput::Records(page.collect()),
        }
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, direction) in &self.sort {
            let ordering = sort_order(lookup(a, field), lookup(b, field));
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

// Natural order of a collection: oldest first
fn creation_order(a: &Value, b: &Value) -> Ordering {
    sort_order(lookup(a, "dateCreated"), lookup(b, "dateCreated"))
        .then_with(|| sort_order(lookup(a, "_id"), lookup(b, "_id")))
}

fn parse_filter(value: &Value) -> AppResult<Filter> {
    let object = value
        .as_object()
        .ok_or_else(|| AppError::validation("'where' must be a JSON object"))?;

    let mut clauses = Vec::with_capacity(object.len());
    for (key, cond) in object {
        let clause = match key.as_str() {
            "$and" => Filter::And(parse_filter_list(key, cond)?),
            "$or" => Filter::Or(parse_filter_list(key, cond)?),
            "$nor" => Filter::Nor(parse_filter_list(key, cond)?),
            op if op.starts_with('$') => {
                return Err(AppError::Validation(format!("Unsupported operator '{}' in 'where'", op)));
            }
            field => Filter::Field(field.to_string(), parse_conditions(cond)?),
        };
        clauses.push(clause);
    }
    Ok(Filter::And(clauses))
}

fn parse_filter_list(op: &str, value: &Value) -> AppResult<Vec<Filter>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| AppError::Validation(format!("'{}' expects a non-empty array", op)))?;
    items.iter().map(parse_filter).collect()
}

fn is_operator_object(value: &Value) -> Option<&Map<String, Value>> {
    value
        .as_object()
        .filter(|obj| !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')))
}

fn parse_conditions(value: &Value) -> AppResult<Vec<Condition>> {
    let Some(ops) = is_operator_object(value) else {
        return Ok(vec![Condition::Eq(value.clone())]);
    };

    let mut conditions = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Gt(arg.clone()),
            "$gte" => Condition::Gte(arg.clone()),
            "$lt" => Condition::Lt(arg.clone()),
            "$lte" => Condition::Lte(arg.clone()),
            "$in" | "$nin" => {
                let values = arg
                    .as_array()
                    .cloned()
                    .ok_or_else(|| AppError::Validation(format!("'{}' expects an array", op)))?;
                if op == "$in" {
                    Condition::In(values)
                } else {
                    Condition::Nin(values)
                }
            }
            "$exists" => Condition::Exists(truthy(arg)),
            other => {
                return Err(AppError::Validation(format!("Unsupported operator '{}' in 'where'", other)));
            }
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn parse_sort(value: &Value) -> AppResult<Vec<(String, Direction)>> {
    let object = value
        .as_object()
        .ok_or_else(|| AppError::validation("'sort' must be a JSON object"))?;

    object
        .iter()
        .map(|(field, dir)| {
            let direction = match dir {
                Value::Number(n) if n.as_f64() == Some(1.0) => Direction::Asc,
                Value::Number(n) if n.as_f64() == Some(-1.0) => Direction::Desc,
                Value::String(s) if s == "asc" || s == "ascending" => Direction::Asc,
                Value::String(s) if s == "desc" || s == "descending" => Direction::Desc,
                other => {
                    return Err(AppError::Validation(format!(
                        "Invalid sort direction for '{}': {}", field, other
                    )));
                }
            };
            Ok((field.clone(), direction))
        })
        .collect()
}

impl Projection {
    /// Parses a `select` parameter. An empty object selects everything.
    pub fn from_param(raw: Option<&str>) -> AppResult<Option<Self>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let value = parse_json(raw, "select")?;
        let object = value
            .as_object()
            .ok_or_else(|| AppError::validation("'select' must be a JSON object"))?;

        let mut keep_id = true;
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for (field, flag) in object {
            let on = truthy(flag);
            if field == "_id" {
                keep_id = on;
            } else if on {
                included.push(field.clone());
            } else {
                excluded.push(field.clone());
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(AppError::validation(
                "'select' cannot mix inclusion and exclusion",
            ));
        }
        if included.is_empty() && excluded.is_empty() && keep_id {
            return Ok(None);
        }

        // Only "_id": 0 given: an exclusion of nothing else
        let include = !included.is_empty();
        Ok(Some(Self {
            include,
            fields: if include { included } else { excluded },
            keep_id,
        }))
    }

    pub fn apply(&self, doc: Value) -> Value {
        let Value::Object(mut object) = doc else {
            return doc;
        };

        if self.include {
            let mut projected = Map::new();
            if self.keep_id {
                if let Some(id) = object.remove("_id") {
                    projected.insert("_id".to_string(), id);
                }
            }
            for field in &self.fields {
                if let Some(v) = object.remove(field) {
                    projected.insert(field.clone(), v);
                }
            }
            Value::Object(projected)
        } else {
            for field in &self.fields {
                object.remove(field);
            }
            if !self.keep_id {
                object.remove("_id");
            }
            Value::Object(object)
        }
    }
}

impl Filter {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(doc)),
            Filter::Field(field, conditions) => {
                let value = lookup(doc, field);
                conditions.iter().all(|c| c.matches(value))
            }
        }
    }
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => field_equals(field, expected),
            Condition::Ne(expected) => !field_equals(field, expected),
            Condition::Gt(bound) => any_compares(field, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => any_compares(field, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => any_compares(field, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => any_compares(field, bound, |o| o != Ordering::Greater),
            Condition::In(values) => values.iter().any(|v| field_equals(field, v)),
            Condition::Nin(values) => !values.iter().any(|v| field_equals(field, v)),
            Condition::Exists(expected) => field.is_some() == *expected,
        }
    }
}

// Dotted paths walk nested objects
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

fn field_equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        // A missing field equals null
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| scalar_equals(item, expected))
        }
        Some(value) => scalar_equals(value, expected),
    }
}

fn scalar_equals(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal) || a == b
}

fn any_compares(field: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, bound).map_or(false, &accept)),
        Some(value) => compare_values(value, bound).map_or(false, accept),
    }
}

fn as_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// Ordering between two values of the same kind; None across kinds
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (as_instant(x), as_instant(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
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

// Total order used for sorting: kinds first, then values within a kind
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "where" => params.filter = value,
                "sort" => params.sort = value,
                "select" => params.select = value,
                "skip" => params.skip = value,
                "limit" => params.limit = value,
                "count" => params.count = value,
                other => panic!("unknown param {}", other),
            }
        }
        params
    }

    fn run(pairs: &[(&str, &str)], docs: Vec<Value>) -> QueryOutput {
        ListQuery::from_params(&params(pairs)).unwrap().run(docs)
    }

    fn names(output: QueryOutput) -> Vec<String> {
        match output {
            QueryOutput::Records(docs) => docs
                .iter()
                .map(|d| d["name"].as_str().unwrap_or_default().to_string())
                .collect(),
            QueryOutput::Count(n) => panic!("expected records, got count {}", n),
        }
    }

    fn tasks() -> Vec<Value> {
        vec![
            json!({"_id": "3", "name": "c", "completed": true, "deadline": "2025-01-03T00:00:00Z",
                   "assignedUser": "u1", "dateCreated": "2024-01-03T00:00:00Z"}),
            json!({"_id": "1", "name": "a", "completed": false, "deadline": "2025-01-01T00:00:00.500Z",
                   "assignedUser": "", "dateCreated": "2024-01-01T00:00:00Z"}),
            json!({"_id": "2", "name": "b", "completed": false, "deadline": "2025-01-02T00:00:00Z",
                   "assignedUser": "u1", "dateCreated": "2024-01-02T00:00:00Z"}),
        ]
    }

    #[test]
    fn no_params_returns_creation_order() {
        assert_eq!(names(run(&[], tasks())), vec!["a", "b", "c"]);
    }

    #[test]
    fn where_equality_and_operators() {
        assert_eq!(names(run(&[("where", r#"{"completed": false}"#)], tasks())), vec!["a", "b"]);
        assert_eq!(
            names(run(&[("where", r#"{"assignedUser": {"$ne": ""}, "completed": true}"#)], tasks())),
            vec!["c"]
        );
        assert_eq!(names(run(&[("where", r#"{"_id": {"$in": ["1", "3"]}}"#)], tasks())), vec!["a", "c"]);
        assert_eq!(names(run(&[("where", r#"{"_id": {"$nin": ["1", "3"]}}"#)], tasks())), vec!["b"]);
        assert_eq!(
            names(run(&[("where", r#"{"$or": [{"name": "a"}, {"name": "c"}]}"#)], tasks())),
            vec!["a", "c"]
        );
        assert_eq!(names(run(&[("where", r#"{"missing": {"$exists": false}}"#)], tasks())).len(), 3);
    }

    #[test]
    fn timestamps_compare_as_instants() {
        // "...00.500Z" sorts after "...00Z" even though '.' < 'Z'
        assert_eq!(
            names(run(&[("where", r#"{"deadline": {"$gt": "2025-01-01T00:00:00Z", "$lte": "2025-01-02T00:00:00Z"}}"#)], tasks())),
            vec!["a", "b"]
        );
    }

    #[test]
    fn array_fields_match_any_element() {
        let users = vec![
            json!({"_id": "u1", "name": "ada", "pendingTasks": ["t1", "t2"]}),
            json!({"_id": "u2", "name": "bob", "pendingTasks": []}),
        ];
        assert_eq!(names(run(&[("where", r#"{"pendingTasks": "t2"}"#)], users)), vec!["ada"]);
    }

    #[test]
    fn sort_skip_limit() {
        assert_eq!(names(run(&[("sort", r#"{"name": -1}"#)], tasks())), vec!["c", "b", "a"]);
        assert_eq!(
            names(run(&[("sort", r#"{"completed": 1, "name": "desc"}"#)], tasks())),
            vec!["b", "a", "c"]
        );
        assert_eq!(
            names(run(&[("sort", r#"{"name": 1}"#), ("skip", "1"), ("limit", "1")], tasks())),
            vec!["b"]
        );
        assert_eq!(names(run(&[("limit", "0")], tasks())).len(), 3);
    }

    #[test]
    fn count_applies_filter_and_pagination() {
        assert_eq!(
            run(&[("where", r#"{"completed": false}"#), ("count", "true")], tasks()),
            QueryOutput::Count(2)
        );
        assert_eq!(run(&[("skip", "2"), ("count", "true")], tasks()), QueryOutput::Count(1));
        // Anything but the literal "true" lists records
        assert!(matches!(run(&[("count", "yes")], tasks()), QueryOutput::Records(_)));
    }

    #[test]
    fn select_includes_or_excludes() {
        let output = run(&[("select", r#"{"name": 1}"#), ("limit", "1")], tasks());
        assert_eq!(output, QueryOutput::Records(vec![json!({"_id": "1", "name": "a"})]));

        let output = run(&[("select", r#"{"name": 1, "_id": 0}"#), ("limit", "1")], tasks());
        assert_eq!(output, QueryOutput::Records(vec![json!({"name": "a"})]));

        let QueryOutput::Records(docs) = run(&[("select", r#"{"deadline": 0, "dateCreated": 0}"#)], tasks()) else {
            panic!("expected records");
        };
        assert!(docs.iter().all(|d| d.get("deadline").is_none() && d.get("_id").is_some()));
    }

    #[test]
    fn rejects_malformed_params() {
        for pairs in [
            vec![("where", "{not json")],
            vec![("where", "[1, 2]")],
            vec![("where", r#"{"name": {"$regex": "a"}}"#)],
            vec![("where", r#"{"$or": []}"#)],
            vec![("sort", r#"{"name": 2}"#)],
            vec![("select", r#"{"name": 1, "deadline": 0}"#)],
            vec![("skip", "-1")],
            vec![("limit", "ten")],
        ] {
            let result = ListQuery::from_params(&params(&pairs));
            assert!(matches!(result, Err(AppError::Validation(_))), "{:?}", pairs);
        }
    }
}

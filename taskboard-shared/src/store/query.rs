/// Query language for the document store
///
/// A deliberately small subset of a document-database query language:
/// equality and comparison filters, `$and`/`$or`, ordered sort keys,
/// projections, and skip/limit. Filters, sorts and projections are parsed
/// from the JSON the HTTP layer receives in `where`, `sort` and `select`.
///
/// # Filter grammar
///
/// ```text
/// filter    := { (field: value | field: { op: value, ... } | "$and": [filter] | "$or": [filter])* }
/// op        := $eq | $ne | $in | $nin | $gt | $gte | $lt | $lte | $exists
/// ```
///
/// # Example
///
/// ```
/// use taskboard_shared::store::query::{Filter, FindQuery, Sort};
/// use serde_json::json;
///
/// let filter = Filter::parse(&json!({"completed": false, "deadline": {"$lt": "2030-01-01T00:00:00Z"}})).unwrap();
/// let query = FindQuery::new(filter).sort(Sort::parse(&json!({"deadline": 1})).unwrap()).limit(10);
/// assert_eq!(query.limit, Some(10));
/// ```

use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// A stored record: a JSON object with an `_id` key
pub type Document = Map<String, Value>;

/// Name of the identity field on every document
pub const ID_FIELD: &str = "_id";

/// Errors raised while parsing client-supplied query JSON
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// Filter was not a JSON object or contained an invalid clause
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Unsupported `$` operator
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Sort spec was not an object of field -> direction
    #[error("invalid sort: {0}")]
    InvalidSort(String),

    /// Projection was malformed or mixed inclusion and exclusion
    #[error("invalid projection: {0}")]
    InvalidProjection(String),
}

/// Condition applied to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Exists(bool),
}

/// One clause of a filter; all clauses of a filter must hold
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Field { field: String, condition: Condition },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// A conjunction of clauses. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<Clause>,
}

impl Filter {
    /// Filter matching every document
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses a client-supplied JSON filter
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the value is not an object, a logical operator
    /// is not given an array of objects, or an unknown `$` operator appears.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let object = value
            .as_object()
            .ok_or_else(|| QueryError::InvalidFilter("filter must be a JSON object".to_string()))?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            match key.as_str() {
                "$and" => clauses.push(Clause::And(parse_filter_list(key, value)?)),
                "$or" => clauses.push(Clause::Or(parse_filter_list(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(QueryError::UnsupportedOperator(op.to_string()));
                }
                field => {
                    for condition in parse_conditions(value)? {
                        clauses.push(Clause::Field {
                            field: field.to_string(),
                            condition,
                        });
                    }
                }
            }
        }

        Ok(Self { clauses })
    }

    /// Adds an equality clause
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Field {
            field: field.to_string(),
            condition: Condition::Eq(value.into()),
        });
        self
    }

    /// Adds an inequality clause
    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Field {
            field: field.to_string(),
            condition: Condition::Ne(value.into()),
        });
        self
    }

    /// Adds a membership clause
    pub fn is_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::Field {
            field: field.to_string(),
            condition: Condition::In(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Returns true if the document satisfies every clause
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { field, condition } => condition.matches(doc.get(field)),
            Clause::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Clause::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        })
    }
}

fn parse_filter_list(op: &str, value: &Value) -> Result<Vec<Filter>, QueryError> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::InvalidFilter(format!("{} expects an array", op)))?;
    if items.is_empty() {
        return Err(QueryError::InvalidFilter(format!("{} expects a non-empty array", op)));
    }
    items.iter().map(Filter::parse).collect()
}

fn is_operator_object(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        None => false,
    }
}

fn parse_conditions(value: &Value) -> Result<Vec<Condition>, QueryError> {
    if !is_operator_object(value) {
        return Ok(vec![Condition::Eq(value.clone())]);
    }

    let mut conditions = Vec::new();
    // checked by is_operator_object
    let ops = value.as_object().into_iter().flatten();
    for (op, operand) in ops {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$in" => Condition::In(operand_list(op, operand)?),
            "$nin" => Condition::Nin(operand_list(op, operand)?),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$exists" => Condition::Exists(operand.as_bool().ok_or_else(|| {
                QueryError::InvalidFilter("$exists expects a boolean".to_string())
            })?),
            other => return Err(QueryError::UnsupportedOperator(other.to_string())),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn operand_list(op: &str, operand: &Value) -> Result<Vec<Value>, QueryError> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::InvalidFilter(format!("{} expects an array", op)))
}

impl Condition {
    /// Evaluates the condition against a field value (`None` when missing)
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => equals(field, expected),
            Condition::Ne(expected) => !equals(field, expected),
            Condition::In(values) => values.iter().any(|v| equals(field, v)),
            Condition::Nin(values) => !values.iter().any(|v| equals(field, v)),
            Condition::Gt(bound) => compares(field, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => compares(field, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => compares(field, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => compares(field, bound, |o| o != Ordering::Greater),
            Condition::Exists(expected) => field.is_some() == *expected,
        }
    }
}

/// Equality with array-contains semantics; `null` also matches a missing field
fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual) if actual == expected => true,
        Some(Value::Array(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

/// Range comparison only between values of the same type bracket
fn compares(field: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| {
        type_rank(value) == type_rank(bound) && accept(compare_values(value, bound))
    };
    match field {
        None => false,
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values: null < numbers < strings < objects < arrays < booleans
///
/// Timestamps are stored as RFC 3339 UTC strings and therefore order
/// chronologically as strings.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    pub keys: Vec<(String, SortOrder)>,
}

impl Sort {
    /// Parses `{field: 1 | -1 | "asc" | "desc" | "ascending" | "descending"}`
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let object = value
            .as_object()
            .ok_or_else(|| QueryError::InvalidSort("sort must be a JSON object".to_string()))?;

        let keys = object
            .iter()
            .map(|(field, direction)| {
                let order = match direction {
                    Value::Number(n) if n.as_i64() == Some(1) => SortOrder::Ascending,
                    Value::Number(n) if n.as_i64() == Some(-1) => SortOrder::Descending,
                    Value::String(s) if s == "asc" || s == "ascending" => SortOrder::Ascending,
                    Value::String(s) if s == "desc" || s == "descending" => SortOrder::Descending,
                    other => {
                        return Err(QueryError::InvalidSort(format!(
                            "invalid direction for {}: {}",
                            field, other
                        )))
                    }
                };
                Ok((field.clone(), order))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two documents by the sort keys (missing fields sort as null)
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, order) in &self.keys {
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ord = match order {
                SortOrder::Ascending => compare_values(left, right),
                SortOrder::Descending => compare_values(right, left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Field selection applied to returned documents
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep only these fields (plus `_id` unless `include_id` is false)
    Include { fields: Vec<String>, include_id: bool },
    /// Drop these fields
    Exclude { fields: Vec<String> },
}

impl Projection {
    /// Parses `{field: 1|0|true|false}`
    ///
    /// Inclusion and exclusion cannot be mixed, except that `_id` may be
    /// excluded from an inclusion projection.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let object = value.as_object().ok_or_else(|| {
            QueryError::InvalidProjection("select must be a JSON object".to_string())
        })?;

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut include_id = true;

        for (field, flag) in object {
            let keep = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                other => {
                    return Err(QueryError::InvalidProjection(format!(
                        "invalid flag for {}: {}",
                        field, other
                    )))
                }
            };
            if field == ID_FIELD && !keep {
                include_id = false;
            } else if keep {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }

        if !include.is_empty() && !exclude.is_empty() {
            return Err(QueryError::InvalidProjection(
                "cannot mix inclusion and exclusion".to_string(),
            ));
        }

        if include.is_empty() {
            if !include_id {
                exclude.push(ID_FIELD.to_string());
            }
            Ok(Projection::Exclude { fields: exclude })
        } else {
            Ok(Projection::Include {
                fields: include,
                include_id,
            })
        }
    }

    /// Applies the projection to a document
    pub fn apply(&self, mut doc: Document) -> Document {
        match self {
            Projection::Include { fields, include_id } => {
                doc.retain(|key, _| {
                    (key == ID_FIELD && *include_id) || fields.iter().any(|f| f == key)
                });
                doc
            }
            Projection::Exclude { fields } => {
                for field in fields {
                    doc.remove(field);
                }
                doc
            }
        }
    }
}

/// Complete find request: filter, ordering, field selection and window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: Sort,
    pub projection: Option<Projection>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Orders, windows and projects an already filtered result set
    ///
    /// Shared by backends that evaluate the filter themselves.
    pub fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| self.sort.compare(a, b));
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        docs.into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &self.projection {
                Some(projection) => projection.apply(doc),
                None => doc,
            })
            .collect()
    }
}

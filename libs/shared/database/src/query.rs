use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

/// A single row predicate. Column values are compared as JSON: numbers
/// numerically, strings lexicographically (which orders ISO dates and
/// `HH:MM:SS` times correctly).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Neq(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    /// Case-insensitive substring match.
    ILike(String, String),
    In(String, Vec<Value>),
    Or(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Filter, ordering and paging for a table read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Neq(column.to_string(), value.into()));
        self
    }

    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt(column.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lte(column.to_string(), value.into()));
        self
    }

    pub fn gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gt(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gte(column.to_string(), value.into()));
        self
    }

    pub fn ilike(mut self, column: &str, term: &str) -> Self {
        self.conditions.push(Condition::ILike(column.to_string(), term.to_string()));
        self
    }

    pub fn in_list<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::In(column.to_string(), values));
        self
    }

    pub fn or(mut self, alternatives: Vec<Condition>) -> Self {
        self.conditions.push(Condition::Or(alternatives));
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order.push(OrderBy { column: column.to_string(), descending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn paginate(self, limit: Option<usize>, offset: Option<usize>) -> Self {
        let mut query = self;
        query.limit = limit.or(query.limit);
        query.offset = offset.or(query.offset);
        query
    }

    /// Apply a `column` / `-column` ordering parameter restricted to `allowed` columns.
    pub fn ordering(self, param: Option<&str>, allowed: &[&str]) -> Result<Self, String> {
        let Some(param) = param.filter(|p| !p.is_empty()) else {
            return Ok(self);
        };

        let (column, descending) = match param.strip_prefix('-') {
            Some(column) => (column, true),
            None => (param, false),
        };

        if !allowed.contains(&column) {
            return Err(format!("Cannot order by '{}'", column));
        }

        Ok(self.order_by(column, descending))
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|condition| condition.matches(row))
    }

    /// Render as a PostgREST query string (without the leading `?`).
    pub fn to_postgrest(&self) -> String {
        let mut parts: Vec<String> = self
            .conditions
            .iter()
            .map(|condition| match condition {
                Condition::Or(alternatives) => {
                    let inner: Vec<String> = alternatives.iter().map(Condition::to_postgrest_inline).collect();
                    format!("or=({})", inner.join(","))
                }
                other => other.to_postgrest_param(),
            })
            .collect();

        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.descending { "desc" } else { "asc" }))
                .collect();
            parts.push(format!("order={}", order.join(",")));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("offset={}", offset));
        }

        parts.join("&")
    }
}

impl Condition {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Condition::Eq(column.to_string(), value.into())
    }

    pub fn ilike(column: &str, term: &str) -> Self {
        Condition::ILike(column.to_string(), term.to_string())
    }

    pub fn in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, row: &Value) -> bool {
        let field = |column: &str| row.get(column).unwrap_or(&Value::Null);

        match self {
            Condition::Eq(column, value) => values_equal(field(column), value),
            Condition::Neq(column, value) => !values_equal(field(column), value),
            Condition::Lt(column, value) => compare_values(field(column), value) == Some(Ordering::Less),
            Condition::Lte(column, value) => matches!(
                compare_values(field(column), value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::Gt(column, value) => compare_values(field(column), value) == Some(Ordering::Greater),
            Condition::Gte(column, value) => matches!(
                compare_values(field(column), value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::ILike(column, term) => field(column)
                .as_str()
                .map(|s| s.to_lowercase().contains(&term.to_lowercase()))
                .unwrap_or(false),
            Condition::In(column, values) => values.iter().any(|v| values_equal(field(column), v)),
            Condition::Or(alternatives) => alternatives.iter().any(|c| c.matches(row)),
        }
    }

    fn to_postgrest_param(&self) -> String {
        match self {
            Condition::Eq(column, Value::Null) => format!("{}=is.null", column),
            Condition::Eq(column, value) => format!("{}=eq.{}", column, encode(value)),
            Condition::Neq(column, value) => format!("{}=neq.{}", column, encode(value)),
            Condition::Lt(column, value) => format!("{}=lt.{}", column, encode(value)),
            Condition::Lte(column, value) => format!("{}=lte.{}", column, encode(value)),
            Condition::Gt(column, value) => format!("{}=gt.{}", column, encode(value)),
            Condition::Gte(column, value) => format!("{}=gte.{}", column, encode(value)),
            Condition::ILike(column, term) => {
                format!("{}=ilike.*{}*", column, urlencoding::encode(term))
            }
            Condition::In(column, values) => {
                let list: Vec<String> = values.iter().map(encode).collect();
                format!("{}=in.({})", column, list.join(","))
            }
            Condition::Or(_) => self.to_postgrest_inline(),
        }
    }

    /// Form used inside `or=(...)`: `column.op.value`.
    fn to_postgrest_inline(&self) -> String {
        match self {
            Condition::Eq(column, value) => format!("{}.eq.{}", column, encode(value)),
            Condition::Neq(column, value) => format!("{}.neq.{}", column, encode(value)),
            Condition::Lt(column, value) => format!("{}.lt.{}", column, encode(value)),
            Condition::Lte(column, value) => format!("{}.lte.{}", column, encode(value)),
            Condition::Gt(column, value) => format!("{}.gt.{}", column, encode(value)),
            Condition::Gte(column, value) => format!("{}.gte.{}", column, encode(value)),
            Condition::ILike(column, term) => format!("{}.ilike.*{}*", column, urlencoding::encode(term)),
            Condition::In(column, values) => {
                let list: Vec<String> = values.iter().map(encode).collect();
                format!("{}.in.({})", column, list.join(","))
            }
            Condition::Or(alternatives) => {
                let inner: Vec<String> = alternatives.iter().map(Condition::to_postgrest_inline).collect();
                format!("or({})", inner.join(","))
            }
        }
    }
}

fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => urlencoding::encode(s).into_owned(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// RFC 3339 timestamps carry a variable number of fractional digits, so they
/// are compared as instants rather than as text.
fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    if value.len() < 20 || value.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    DateTime::parse_from_rfc3339(value).ok()
}

/// Ordering between two JSON scalars of the same kind; `None` when incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Query builder for kind queries
///
/// A query accumulates filters, an ancestor constraint, sort orders,
/// projection and distinct-on lists, cursors, limit and offset. Each builder
/// method consumes the query and returns it, so a chain of calls applies in
/// call order and two identical chains produce equal queries.

use crate::entity::Entity;
use crate::key::Key;
use crate::validation::{validate_kind, validate_namespace, validate_property, KEY_PROPERTY};
use crate::value::Value;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Filter comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// property < value
    LessThan,
    /// property <= value
    LessThanOrEqual,
    /// property = value
    Equal,
    /// property >= value
    GreaterThanOrEqual,
    /// property > value
    GreaterThan,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Equal => "=",
            Operator::GreaterThanOrEqual => ">=",
            Operator::GreaterThan => ">",
        }
    }

    /// Whether `property.cmp(value)` satisfies this operator
    pub fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Operator::LessThan => ord == Ordering::Less,
            Operator::LessThanOrEqual => ord != Ordering::Greater,
            Operator::Equal => ord == Ordering::Equal,
            Operator::GreaterThanOrEqual => ord != Ordering::Less,
            Operator::GreaterThan => ord == Ordering::Greater,
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "<" => Ok(Operator::LessThan),
            "<=" => Ok(Operator::LessThanOrEqual),
            "=" => Ok(Operator::Equal),
            ">=" => Ok(Operator::GreaterThanOrEqual),
            ">" => Ok(Operator::GreaterThan),
            other => Err(Error::InvalidQuery(format!(
                "unsupported filter operator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub property: String,
    pub operator: Operator,
    pub value: Value,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Options for `Query::order`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderOptions {
    pub descending: bool,
}

/// Sort directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

/// Opaque continuation token produced by a query run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Cursor(token)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Cursor(token.to_string())
    }
}

/// Read consistency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    Strong,
    Eventual,
}

/// Per-call read options for gets and queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Left to the service when `None`
    pub consistency: Option<Consistency>,
    /// Cap on RPCs issued for one logical query run (`None` = unbounded)
    pub max_api_calls: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn with_max_api_calls(mut self, max_api_calls: usize) -> Self {
        self.max_api_calls = Some(max_api_calls);
        self
    }
}

/// Whether more results exist after a run, and why the run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoreResults {
    /// Stopped at the end cursor (or the API call cap); more may follow
    MoreResultsAfterCursor,
    /// Stopped at the limit; more results follow
    MoreResultsAfterLimit,
    /// Exhausted
    NoMoreResults,
}

/// Continuation metadata returned with query results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    pub end_cursor: Option<Cursor>,
    pub more_results: MoreResults,
}

/// Entities plus continuation metadata
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub entities: Vec<Entity>,
    pub info: QueryInfo,
}

/// Kind query builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    namespace: Option<String>,
    kind: String,
    filters: Vec<Filter>,
    ancestor: Option<Key>,
    orders: Vec<Order>,
    group_by: Vec<String>,
    select: Vec<String>,
    start_cursor: Option<Cursor>,
    end_cursor: Option<Cursor>,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    /// Create a query over a kind in the default namespace
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            namespace: None,
            kind: kind.into(),
            filters: Vec::new(),
            ancestor: None,
            orders: Vec::new(),
            group_by: Vec::new(),
            select: Vec::new(),
            start_cursor: None,
            end_cursor: None,
            limit: None,
            offset: 0,
        }
    }

    /// Create a query over a kind in a namespace
    pub fn in_namespace(namespace: impl Into<String>, kind: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let mut query = Self::new(kind);
        query.namespace = if namespace.is_empty() { None } else { Some(namespace) };
        query
    }

    /// Add a property filter
    pub fn filter(mut self, property: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            property: property.into(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Add an equality filter
    pub fn filter_eq(self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(property, Operator::Equal, value)
    }

    /// Restrict results to descendants of `key` (the key itself included)
    pub fn has_ancestor(mut self, key: Key) -> Self {
        self.ancestor = Some(key);
        self
    }

    /// Add a sort directive; directives apply in call order
    pub fn order(mut self, property: impl Into<String>, options: OrderOptions) -> Self {
        self.orders.push(Order {
            property: property.into(),
            direction: if options.descending {
                Direction::Descending
            } else {
                Direction::Ascending
            },
        });
        self
    }

    pub fn order_asc(self, property: impl Into<String>) -> Self {
        self.order(property, OrderOptions { descending: false })
    }

    pub fn order_desc(self, property: impl Into<String>) -> Self {
        self.order(property, OrderOptions { descending: true })
    }

    /// Keep the first result of each distinct combination of these properties
    pub fn group_by<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Return only these properties (`__key__` alone gives a keys-only query)
    pub fn select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Resume after the position of a cursor from a previous run
    pub fn start(mut self, cursor: Cursor) -> Self {
        self.start_cursor = Some(cursor);
        self
    }

    /// Stop at the position of a cursor from a previous run
    pub fn end(mut self, cursor: Cursor) -> Self {
        self.end_cursor = Some(cursor);
        self
    }

    /// Cap the number of results
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skip leading results
    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ancestor(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn group_by_properties(&self) -> &[String] {
        &self.group_by
    }

    pub fn selected_properties(&self) -> &[String] {
        &self.select
    }

    pub fn start_cursor(&self) -> Option<&Cursor> {
        self.start_cursor.as_ref()
    }

    pub fn end_cursor(&self) -> Option<&Cursor> {
        self.end_cursor.as_ref()
    }

    pub fn limit_count(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_count(&self) -> usize {
        self.offset
    }

    pub fn is_keys_only(&self) -> bool {
        self.select.len() == 1 && self.select[0] == KEY_PROPERTY
    }

    /// Continuation of this query after a partial batch: restart at `cursor`
    /// with the offset and limit reduced by what the batch consumed.
    pub fn continue_from(&self, cursor: Cursor, skipped: usize, returned: usize) -> Query {
        let mut next = self.clone();
        next.start_cursor = Some(cursor);
        next.offset = self.offset.saturating_sub(skipped);
        next.limit = self.limit.map(|n| n.saturating_sub(returned));
        next
    }

    /// Check names, operators and key constraints before execution
    pub fn validate(&self) -> Result<()> {
        validate_kind(&self.kind).map_err(as_query_error)?;
        if let Some(ns) = &self.namespace {
            validate_namespace(ns).map_err(as_query_error)?;
        }

        for filter in &self.filters {
            validate_property(&filter.property)?;
            if filter.property == KEY_PROPERTY {
                let key = filter.value.as_key().ok_or_else(|| {
                    Error::InvalidQuery(format!("{} filter requires a key value", KEY_PROPERTY))
                })?;
                if key.namespace() != self.namespace() {
                    return Err(Error::InvalidQuery(
                        "key filter namespace differs from query namespace".to_string(),
                    ));
                }
            }
        }

        if let Some(ancestor) = &self.ancestor {
            if ancestor.is_incomplete() {
                return Err(Error::InvalidQuery(format!(
                    "ancestor {} must be a complete key",
                    ancestor
                )));
            }
            if ancestor.namespace() != self.namespace() {
                return Err(Error::InvalidQuery(
                    "ancestor namespace differs from query namespace".to_string(),
                ));
            }
        }

        for order in &self.orders {
            validate_property(&order.property)?;
        }
        for property in self.group_by.iter().chain(self.select.iter()) {
            validate_property(property)?;
        }
        if self.select.iter().any(|p| p == KEY_PROPERTY) && self.select.len() > 1 {
            return Err(Error::InvalidQuery(format!(
                "{} cannot be projected together with other properties",
                KEY_PROPERTY
            )));
        }

        Ok(())
    }
}

fn as_query_error(err: Error) -> Error {
    match err {
        Error::InvalidKey(msg) => Error::InvalidQuery(msg),
        other => other,
    }
}

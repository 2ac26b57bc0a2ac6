/// Property values
///
/// `Value` is a tagged union: integers, doubles and geo points are carried as
/// dedicated wrapper types so a reader can always tell them apart from plain
/// numbers or maps by looking at the tag.

use crate::key::{Key, PathToken};
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Property map of an entity or embedded entity
pub type Properties = BTreeMap<String, Value>;

/// 64-bit integer wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Int(i64);

impl Int {
    pub fn new(value: i64) -> Self {
        Int(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Parse a decimal string without going through a float
    pub fn parse(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Int)
            .map_err(|e| Error::InvalidArgument(format!("invalid integer '{}': {}", s, e)))
    }
}

impl FromStr for Int {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Int::parse(s)
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Double-precision float wrapper
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Double(f64);

impl Double {
    pub fn new(value: f64) -> Self {
        Double(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self> {
        s.trim()
            .parse::<f64>()
            .map(Double)
            .map_err(|e| Error::InvalidArgument(format!("invalid double '{}': {}", s, e)))
    }
}

impl FromStr for Double {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Double::parse(s)
    }
}

impl fmt::Display for Double {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Latitude/longitude pair used to build a `GeoPoint`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint(Coordinates);

impl GeoPoint {
    /// Latitude must be within [-90, 90], longitude within [-180, 180]
    pub fn new(coordinates: Coordinates) -> Result<Self> {
        let Coordinates { latitude, longitude } = coordinates;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidArgument(format!(
                "latitude {} out of range [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidArgument(format!(
                "longitude {} out of range [-180, 180]",
                longitude
            )));
        }
        Ok(GeoPoint(coordinates))
    }

    pub fn coordinates(&self) -> Coordinates {
        self.0
    }

    pub fn latitude(&self) -> f64 {
        self.0.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.0.longitude
    }
}

/// Datastore property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(Int),
    Double(Double),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
    String(String),
    Blob(Bytes),
    GeoPoint(GeoPoint),
    Key(Key),
    Array(Vec<Value>),
    Entity(Properties),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Value::Double(_))
    }

    pub fn is_geo_point(&self) -> bool {
        matches!(self, Value::GeoPoint(_))
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Value::Key(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i.value()),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(d.value()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Value::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_geo_point(&self) -> Option<&GeoPoint> {
        match self {
            Value::GeoPoint(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Properties> {
        match self {
            Value::Entity(props) => Some(props),
            _ => None,
        }
    }

    /// Number of index entries this value produces when indexed.
    /// Arrays index each element; embedded entities index their leaves.
    pub fn index_entries(&self) -> u64 {
        match self {
            Value::Array(items) => items.iter().map(Value::index_entries).sum(),
            Value::Entity(props) => props.values().map(Value::index_entries).sum(),
            _ => 1,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Double(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Boolean(_) => 3,
            Value::String(_) => 4,
            Value::Blob(_) => 5,
            Value::GeoPoint(_) => 6,
            Value::Key(_) => 7,
            Value::Array(_) => 8,
            Value::Entity(_) => 9,
        }
    }

    /// Total order used for filters, sort orders and cursors.
    ///
    /// Values of different types order by type rank; `Int` and `Double`
    /// share a rank and compare numerically.
    pub fn index_cmp(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Double(b)) => (a.value() as f64).total_cmp(&b.value()),
            (Value::Double(a), Value::Int(b)) => a.value().total_cmp(&(b.value() as f64)),
            (Value::Double(a), Value::Double(b)) => a.value().total_cmp(&b.value()),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::GeoPoint(a), Value::GeoPoint(b)) => a
                .latitude()
                .total_cmp(&b.latitude())
                .then_with(|| a.longitude().total_cmp(&b.longitude())),
            (Value::Key(a), Value::Key(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => cmp_slices(a, b),
            (Value::Entity(a), Value::Entity(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.index_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal,
        }
    }

    /// Convert from JSON. Integral numbers become `Int`, other numbers `Double`,
    /// objects become embedded entities.
    ///
    /// Unsigned integers above `i64::MAX` are rejected rather than rounded.
    pub fn from_json(json: serde_json::Value) -> Result<Value> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(Int(i)),
                None if n.is_u64() => {
                    return Err(Error::InvalidArgument(format!(
                        "integer {} is out of the signed 64-bit range",
                        n
                    )))
                }
                None => Value::Double(Double(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<_>>()?,
            ),
            serde_json::Value::Object(map) => Value::Entity(
                map.into_iter()
                    .map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Convert to JSON. Blobs become base64 strings, geo points
    /// `{latitude, longitude}` objects, keys `{namespace, path}` objects.
    /// Non-finite doubles have no JSON form and become null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value as Json};
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Int(i) => json!(i.value()),
            Value::Double(d) => serde_json::Number::from_f64(d.value())
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Timestamp(ts) => json!(ts),
            Value::String(s) => Json::String(s.clone()),
            Value::Blob(b) => Json::String(STANDARD.encode(b)),
            Value::GeoPoint(g) => json!({
                "latitude": g.latitude(),
                "longitude": g.longitude(),
            }),
            Value::Key(k) => {
                let path: Vec<Json> = k
                    .path()
                    .into_iter()
                    .map(|t| match t {
                        PathToken::Text(s) => Json::String(s),
                        PathToken::Number(n) => json!(n),
                        PathToken::Int(i) => json!(i.value()),
                    })
                    .collect();
                json!({ "namespace": k.namespace(), "path": path })
            }
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Entity(props) => Json::Object(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn cmp_slices(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.index_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(Int(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(Int(n as i64))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(Double(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Int> for Value {
    fn from(i: Int) -> Self {
        Value::Int(i)
    }
}

impl From<Double> for Value {
    fn from(d: Double) -> Self {
        Value::Double(d)
    }
}

impl From<GeoPoint> for Value {
    fn from(g: GeoPoint) -> Self {
        Value::GeoPoint(g)
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        Value::Key(k)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Blob(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Properties> for Value {
    fn from(props: Properties) -> Self {
        Value::Entity(props)
    }
}

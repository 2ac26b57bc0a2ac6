/// Query cursor tokens
///
/// A cursor is the position of an entity in a query's result order: the
/// values of the ordered properties plus the entity key, bincode-encoded and
/// wrapped in URL-safe base64.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dstore_core::{Cursor, Direction, Error, Key, Order, Result, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub sort_values: Vec<Value>,
    pub key: Key,
}

impl Position {
    pub fn encode(&self) -> Result<Cursor> {
        let bytes = bincode::serialize(self)
            .map_err(|e| Error::Internal(format!("failed to encode cursor: {}", e)))?;
        Ok(Cursor::new(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Decode a cursor issued for a query with `orders`
    pub fn decode(cursor: &Cursor, orders: &[Order]) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.as_str())
            .map_err(|e| Error::InvalidQuery(format!("malformed cursor: {}", e)))?;
        let position: Position = bincode::deserialize(&bytes)
            .map_err(|e| Error::InvalidQuery(format!("malformed cursor: {}", e)))?;
        if position.sort_values.len() != orders.len() {
            return Err(Error::InvalidQuery(
                "cursor does not belong to this query's sort order".to_string(),
            ));
        }
        Ok(position)
    }

    /// Compare two positions under a sort order; ties break on key ascending
    pub fn cmp_under(&self, other: &Position, orders: &[Order]) -> Ordering {
        for ((a, b), order) in self
            .sort_values
            .iter()
            .zip(other.sort_values.iter())
            .zip(orders.iter())
        {
            let ord = match order.direction {
                Direction::Ascending => a.index_cmp(b),
                Direction::Descending => b.index_cmp(a),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.key.cmp(&other.key)
    }
}

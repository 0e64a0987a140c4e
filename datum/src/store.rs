//! Remote record store abstraction.
//!
//! Rows travel as `serde_json::Value` objects in their storage shape. The
//! store only ever sees plaintext columns and base64 ciphertext; it can
//! filter and order on the former and must never be asked to do either on
//! the latter.

use crate::error::Error;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Column prefixes that hold ciphertext or nonces.
const ENCRYPTED_PREFIXES: [&str; 2] = ["encrypted_", "iv_"];

fn ensure_plaintext(column: &str) -> Result<(), Error> {
    if ENCRYPTED_PREFIXES.iter().any(|prefix| column.starts_with(prefix)) {
        return Err(Error::UnsupportedFilter(format!(
            "`{column}` is encrypted and cannot be filtered or ordered by the store"
        )));
    }
    Ok(())
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
}

/// Query sent to a [`RecordStore`].
///
/// Every builder method rejects encrypted columns.
///
/// # Example
///
/// ```
/// use datum::store::{Direction, Selection};
///
/// let selection = Selection::new()
///     .eq("type", "expense")?
///     .gte("transaction_date", "2024-01-01")?
///     .order_by("transaction_date", Direction::Descending)?
///     .limit(20);
///
/// assert!(Selection::new().eq("encrypted_amount", "x").is_err());
/// # Ok::<(), datum::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    conditions: Vec<Condition>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
    offset: usize,
}

impl Selection {
    /// Creates a selection matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps rows whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFilter` for encrypted columns.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Result<Self, Error> {
        ensure_plaintext(column)?;
        self.conditions.push(Condition::Eq(column.to_string(), value.into()));
        Ok(self)
    }

    /// Keeps rows whose `column` is greater than or equal to `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFilter` for encrypted columns.
    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Result<Self, Error> {
        ensure_plaintext(column)?;
        self.conditions.push(Condition::Gte(column.to_string(), value.into()));
        Ok(self)
    }

    /// Keeps rows whose `column` is less than or equal to `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFilter` for encrypted columns.
    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Result<Self, Error> {
        ensure_plaintext(column)?;
        self.conditions.push(Condition::Lte(column.to_string(), value.into()));
        Ok(self)
    }

    /// Orders rows by `column`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFilter` for encrypted columns.
    pub fn order_by(mut self, column: &str, direction: Direction) -> Result<Self, Error> {
        ensure_plaintext(column)?;
        self.order = Some((column.to_string(), direction));
        Ok(self)
    }

    /// Returns at most `limit` rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns `true` if `row` satisfies every condition.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(column, value) => row.get(column) == Some(value),
            Condition::Gte(column, value) => row
                .get(column)
                .and_then(|v| compare(v, value))
                .is_some_and(Ordering::is_ge),
            Condition::Lte(column, value) => row
                .get(column)
                .and_then(|v| compare(v, value))
                .is_some_and(Ordering::is_le),
        })
    }

    /// Applies the selection to an in-memory sequence of rows.
    #[must_use]
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut selected: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();
        if let Some((column, direction)) = &self.order {
            selected.sort_by(|a, b| {
                let ordering = match (a.get(column), b.get(column)) {
                    (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        selected
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

// ISO dates and timestamps order correctly as strings.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Remote table store holding storage-shaped rows.
///
/// Implementations own their transport and retry policy.
pub trait RecordStore: Send + Sync {
    /// Inserts a row and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the row is rejected.
    fn insert(&self, table: &str, row: Value) -> Result<Value, Error>;

    /// Merges `changes` into the row with `id` and returns the updated row.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if no such row exists or the update is rejected.
    fn update(&self, table: &str, id: &str, changes: Value) -> Result<Value, Error>;

    /// Deletes the row with `id`. Deleting a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store rejects the request.
    fn delete(&self, table: &str, id: &str) -> Result<(), Error>;

    /// Returns the rows matching `selection`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the store rejects the request.
    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Value>, Error>;
}

impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    fn insert(&self, table: &str, row: Value) -> Result<Value, Error> {
        (**self).insert(table, row)
    }

    fn update(&self, table: &str, id: &str, changes: Value) -> Result<Value, Error> {
        (**self).update(table, id, changes)
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), Error> {
        (**self).delete(table, id)
    }

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Value>, Error> {
        (**self).select(table, selection)
    }
}

/// In-memory record store. Rows without an `id` get a random UUID.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw row with `id`, exactly as stored.
    #[must_use]
    pub fn raw(&self, table: &str, id: &str) -> Option<Value> {
        self.tables
            .read()
            .get(table)?
            .iter()
            .find(|row| row_id(row) == Some(id))
            .cloned()
            .map(Value::Object)
    }

    /// Overwrites one column of a stored row, bypassing any checks.
    ///
    /// Returns `false` if the row does not exist.
    pub fn put_raw(&self, table: &str, id: &str, column: &str, value: Value) -> bool {
        let mut tables = self.tables.write();
        let Some(row) = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
        else {
            return false;
        };
        row.insert(column.to_string(), value);
        true
    }
}

fn row_id(row: &Map<String, Value>) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn into_object(value: Value) -> Result<Map<String, Value>, Error> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Store(format!("expected a JSON object, got {other}"))),
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, table: &str, row: Value) -> Result<Value, Error> {
        let mut row = into_object(row)?;
        if row_id(&row).is_none() {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|existing| row_id(existing) == row_id(&row)) {
            return Err(Error::Store(format!("duplicate id in `{table}`")));
        }
        rows.push(row.clone());
        debug!(table, rows = rows.len(), "row inserted");
        Ok(Value::Object(row))
    }

    fn update(&self, table: &str, id: &str, changes: Value) -> Result<Value, Error> {
        let changes = into_object(changes)?;
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
            .ok_or_else(|| Error::Store(format!("no row `{id}` in `{table}`")))?;

        for (column, value) in changes {
            if column != "id" {
                row.insert(column, value);
            }
        }
        Ok(Value::Object(row.clone()))
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), Error> {
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.retain(|row| row_id(row) != Some(id));
        }
        Ok(())
    }

    fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Value>, Error> {
        let tables = self.tables.read();
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(selection.apply(rows.iter().cloned().map(Value::Object)))
    }
}

//! Store boundary.
//!
//! The core never talks to a database driver directly. Everything goes
//! through the [`Store`] trait: a statement plus positional parameters in,
//! rows or a [`WriteStatus`] record out. Two implementations ship with the
//! crate: [`PgStore`] over a deadpool-postgres pool, and [`MemoryStore`],
//! an in-process store used by the test suite.

pub mod config;
pub mod memory;
pub mod postgres;

pub use config::StoreConfig;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A statement parameter or result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering between values of the same variant; mixed variants and
    /// nulls sort first. Only used for explicit ORDER BY handling in the
    /// memory store.
    pub(crate) fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A result row: column name to value, ordered by column name.
pub type Row = BTreeMap<String, Value>;

/// A write payload, same shape as a row.
pub type Payload = BTreeMap<String, Value>;

/// Status record returned for writes.
///
/// Mirrors the status record of the underlying driver: affected-row
/// count, the generated key for inserts when the store reports one,
/// changed-row count (rows whose values actually differed), and a
/// warning count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteStatus {
    pub affected_rows: u64,
    pub changed_rows: u64,
    pub insert_id: Option<i64>,
    pub warning_count: u64,
}

/// Connection seam to the relational store.
///
/// Every method is a suspending unit of work; the caller yields until the
/// store responds. Single-statement atomicity is the store's own
/// guarantee, and no retries happen at this layer.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run a statement that produces rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement that writes. Statements carrying a RETURNING
    /// clause report the returned key through [`WriteStatus::insert_id`].
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<WriteStatus>;

    /// Run a single parameter-less DDL statement.
    async fn batch_execute(&self, sql: &str) -> Result<()>;
}

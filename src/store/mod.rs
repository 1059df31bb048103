//! Record store abstraction
//!
//! The routing engine needs four operations over a remote key/value table
//! API: find by field, find by formula, create and update. Nothing here is
//! transactional; callers must not assume a check followed by a write is
//! atomic.

pub mod airtable;
pub mod clients;
pub mod formula;
pub mod projects;
pub mod traffic_log;

pub use airtable::{AirtableConfig, AirtableStore};
pub use clients::ClientDirectory;
pub use formula::Formula;
pub use projects::ProjectDirectory;
pub use traffic_log::TrafficLog;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A single row: store-assigned id plus its field map
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    /// String field; linked-record arrays collapse to their first element
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn flag(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Record store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store not configured: {0}")]
    NotConfigured(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Store request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Store API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("Invalid store response: {0}")]
    InvalidResponse(String),
    #[error("Result set exceeded {0} pages")]
    TooManyPages(usize),
}

/// Record store trait for dependency injection and testing
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows whose formula evaluates to true
    async fn find_by_formula(&self, table: &str, formula: &Formula)
        -> Result<Vec<Record>, StoreError>;

    /// Rows whose `field` equals `value`
    async fn find_by_field(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.find_by_formula(table, &Formula::eq(field, value)).await
    }

    /// Insert a row, returning its record id
    async fn create(&self, table: &str, fields: Map<String, Value>) -> Result<String, StoreError>;

    /// Patch the given fields of an existing row
    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;
}

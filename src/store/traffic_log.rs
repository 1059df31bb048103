//! Traffic log table: dedup key lookups, open clarifications, and the
//! per-message audit rows written by the routing engine.
//!
//! Reads degrade to "nothing found" on store failure. Writes report
//! failure to the caller, which decides whether it is fatal.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{JobNumber, LogStatus, Route, TrafficLogEntry};
use crate::observability::metrics::metrics;
use crate::store::{Formula, Record, RecordStore, StoreError};

pub const FIELD_MESSAGE_ID: &str = "Internet Message ID";
pub const FIELD_CONVERSATION_ID: &str = "Conversation ID";
pub const FIELD_ROUTE: &str = "Route";
pub const FIELD_STATUS: &str = "Status";
pub const FIELD_JOB_NUMBER: &str = "Job Number";
pub const FIELD_SENDER: &str = "Sender Email";
pub const FIELD_SUBJECT: &str = "Subject";
pub const FIELD_CREATED_AT: &str = "Created At";

#[derive(Clone)]
pub struct TrafficLog {
    store: Arc<dyn RecordStore>,
    table: String,
}

impl TrafficLog {
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Existing entry for a message id, if the message was seen before
    pub async fn find_by_message_id(&self, message_id: &str) -> Option<TrafficLogEntry> {
        match self
            .store
            .find_by_field(&self.table, FIELD_MESSAGE_ID, message_id)
            .await
        {
            Ok(records) => records.into_iter().next().map(entry_from_record),
            Err(e) => {
                metrics().store_failure();
                warn!(
                    message_id = %message_id,
                    error = %e,
                    "Dedup lookup failed, treating message as new"
                );
                None
            }
        }
    }

    /// The open clarification on a conversation.
    ///
    /// If a race left several pending rows, the most recent one wins.
    pub async fn find_pending(&self, conversation_id: &str) -> Option<TrafficLogEntry> {
        let formula = Formula::And(vec![
            Formula::eq(FIELD_CONVERSATION_ID, conversation_id),
            Formula::eq(FIELD_STATUS, LogStatus::Pending.as_str()),
        ]);

        match self.store.find_by_formula(&self.table, &formula).await {
            Ok(records) => {
                if records.len() > 1 {
                    debug!(
                        conversation_id = %conversation_id,
                        count = records.len(),
                        "Multiple pending clarifications on conversation"
                    );
                }
                records
                    .into_iter()
                    .map(entry_from_record)
                    .max_by_key(|entry| entry.created_at)
            }
            Err(e) => {
                metrics().store_failure();
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Pending clarification lookup failed, treating message as new"
                );
                None
            }
        }
    }

    /// Write a new entry, returning the store-assigned record id
    pub async fn append(&self, entry: &TrafficLogEntry) -> Result<String, StoreError> {
        let record_id = self.store.create(&self.table, entry_fields(entry)).await?;
        debug!(
            record_id = %record_id,
            route = %entry.route,
            status = entry.status.as_str(),
            "Traffic log entry written"
        );
        Ok(record_id)
    }

    /// Mark a pending entry resolved, optionally recording the job it resolved to
    pub async fn resolve(
        &self,
        record_id: &str,
        job_number: Option<&JobNumber>,
    ) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert(
            FIELD_STATUS.to_string(),
            Value::String(LogStatus::Resolved.as_str().to_string()),
        );
        if let Some(job) = job_number {
            fields.insert(
                FIELD_JOB_NUMBER.to_string(),
                Value::String(job.as_str().to_string()),
            );
        }

        self.store.update(&self.table, record_id, fields).await
    }
}

fn entry_fields(entry: &TrafficLogEntry) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut put = |name: &str, value: String| {
        fields.insert(name.to_string(), Value::String(value));
    };

    if let Some(id) = &entry.message_id {
        put(FIELD_MESSAGE_ID, id.clone());
    }
    if let Some(id) = &entry.conversation_id {
        put(FIELD_CONVERSATION_ID, id.clone());
    }
    put(FIELD_ROUTE, entry.route.as_str().to_string());
    put(FIELD_STATUS, entry.status.as_str().to_string());
    if let Some(job) = &entry.job_number {
        put(FIELD_JOB_NUMBER, job.as_str().to_string());
    }
    put(FIELD_SENDER, entry.sender_email.clone());
    put(FIELD_SUBJECT, entry.subject.clone());
    put(FIELD_CREATED_AT, entry.created_at.to_rfc3339());

    fields
}

fn entry_from_record(record: Record) -> TrafficLogEntry {
    let created_at = record
        .text(FIELD_CREATED_AT)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();

    TrafficLogEntry {
        message_id: record.text(FIELD_MESSAGE_ID),
        conversation_id: record.text(FIELD_CONVERSATION_ID),
        route: Route::from(record.text(FIELD_ROUTE).unwrap_or_default()),
        // A row with an unreadable status is never treated as pending
        status: record
            .text(FIELD_STATUS)
            .and_then(|raw| LogStatus::parse(&raw))
            .unwrap_or(LogStatus::Processed),
        job_number: record
            .text(FIELD_JOB_NUMBER)
            .and_then(|raw| JobNumber::parse(&raw)),
        sender_email: record.text(FIELD_SENDER).unwrap_or_default(),
        subject: record.text(FIELD_SUBJECT).unwrap_or_default(),
        created_at,
        record_id: Some(record.id),
    }
}

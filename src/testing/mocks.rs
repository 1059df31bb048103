//! Mock implementations for testing
//!
//! Provides mock LlmProvider and RecordStore implementations to exercise the
//! routing engine without network access.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::store::{Formula, Record, RecordStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock LLM provider returning scripted responses in order (cycling)
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub should_fail: bool,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Every request the provider has seen
    pub async fn get_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// User-role content of the most recent request
    pub async fn last_user_message(&self) -> Option<String> {
        self.requests.lock().await.last().and_then(|request| {
            request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == crate::llm::MessageRole::User)
                .map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request);

        if self.should_fail {
            return Err(LlmError::NetworkError("Mock LLM failure".to_string()));
        }

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = self
            .responses
            .get(response_idx)
            .cloned()
            .unwrap_or_else(|| "Mock response".to_string());

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
        })
    }
}

/// In-memory record store.
///
/// Evaluates the same [`Formula`] values the HTTP store renders, so query
/// semantics match. Failure switches can be flipped mid-test.
#[derive(Debug, Default)]
pub struct MockRecordStore {
    tables: std::sync::Mutex<HashMap<String, Vec<Record>>>,
    next_id: AtomicU64,
    creates: AtomicU64,
    fail_all: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails
    pub fn with_failure() -> Self {
        let store = Self::default();
        store.fail_all.store(true, Ordering::SeqCst);
        store
    }

    /// Reads succeed, creates and updates fail
    pub fn with_write_failure() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Seed a row directly, bypassing failure switches; returns its id
    pub fn insert(&self, table: &str, fields: Value) -> String {
        let id = self.allocate_id();
        let record = Record {
            id: id.clone(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        };
        self.lock_tables()
            .entry(table.to_string())
            .or_default()
            .push(record);
        id
    }

    pub fn get(&self, table: &str, record_id: &str) -> Option<Map<String, Value>> {
        self.lock_tables()
            .get(table)?
            .iter()
            .find(|r| r.id == record_id)
            .map(|r| r.fields.clone())
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock_tables().get(table).cloned().unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock_tables().get(table).map_or(0, Vec::len)
    }

    /// Number of successful `create` calls across all tables
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("rec{:05}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Record>>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::Network("Mock store failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.check_read()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 422,
                body: "Mock write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn find_by_formula(
        &self,
        table: &str,
        formula: &Formula,
    ) -> Result<Vec<Record>, StoreError> {
        self.check_read()?;
        Ok(self
            .lock_tables()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| formula.matches(&r.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, table: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        self.check_write()?;
        let id = self.allocate_id();
        self.lock_tables()
            .entry(table.to_string())
            .or_default()
            .push(Record {
                id: id.clone(),
                fields,
            });
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        let mut tables = self.lock_tables();
        let record = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| StoreError::Api {
                status: 404,
                body: format!("record {record_id} not found"),
            })?;
        record.fields.extend(fields);
        Ok(())
    }
}

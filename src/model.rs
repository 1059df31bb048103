//! Core data model for traffic routing
//!
//! Inbound messages are owned by the caller and only read here. Job records
//! come from the project table and are read-only. Traffic log entries and
//! routing decisions are owned by the routing engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::TrafficError;

/// Canonical job identifier: three uppercase letters, one space, three digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobNumber(String);

impl JobNumber {
    /// Normalize free text such as `"tow  023"` into `"TOW 023"`.
    ///
    /// Returns `None` when the text is not shaped like a job number. The
    /// prefix is NOT checked against the client registry here.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let prefix = parts.next()?;
        let digits = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let prefix_ok = prefix.len() == 3 && prefix.chars().all(|c| c.is_ascii_alphabetic());
        let digits_ok = digits.len() == 3 && digits.chars().all(|c| c.is_ascii_digit());
        if !prefix_ok || !digits_ok {
            return None;
        }

        Some(Self(format!("{} {}", prefix.to_ascii_uppercase(), digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The client code encoded in the job number prefix
    pub fn client_code(&self) -> ClientCode {
        ClientCode(self.0[..3].to_string())
    }

    /// Placeholder jobs (`998`, `999`) exist per client as catch-alls
    pub fn is_placeholder(&self) -> bool {
        self.0.ends_with("998") || self.0.ends_with("999")
    }
}

impl fmt::Display for JobNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three-letter client account code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientCode(String);

impl ClientCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(trimmed.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel the message arrived on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Email,
    Teams,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Email => "email",
            Source::Teams => "teams",
        }
    }
}

/// Inbound request body for `POST /traffic`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundMessage {
    pub email_content: String,
    pub subject_line: String,
    pub sender_email: String,
    pub sender_name: String,
    pub all_recipients: Vec<String>,
    pub has_attachments: bool,
    pub attachment_names: Vec<String>,
    pub source: Source,
    pub internet_message_id: Option<String>,
    pub conversation_id: Option<String>,
}

impl InboundMessage {
    /// Reject requests the engine cannot route, before any collaborator call
    pub fn validate(&self) -> Result<(), TrafficError> {
        if self.email_content.trim().is_empty() {
            return Err(TrafficError::validation("No content provided"));
        }
        Ok(())
    }

    /// External message id, ignoring blanks
    pub fn message_id(&self) -> Option<&str> {
        non_blank(self.internet_message_id.as_deref())
    }

    /// Conversation/thread id, ignoring blanks
    pub fn conversation(&self) -> Option<&str> {
        non_blank(self.conversation_id.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A project row from the record store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub record_id: String,
    pub job_number: JobNumber,
    pub job_name: String,
    pub client_name: String,
    pub stage: String,
    pub status: String,
    pub round: i64,
    pub with_client: bool,
    pub teams_channel_id: Option<String>,
}

/// Summary of an active job, used as classifier disambiguation context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveJob {
    pub job_number: String,
    pub job_name: String,
    pub description: String,
}

/// An active job with the columns a client WIP report shows
#[derive(Debug, Clone, PartialEq)]
pub struct WipJob {
    pub job_number: String,
    pub job_name: String,
    pub description: String,
    pub client_name: String,
    pub stage: String,
    pub status: String,
    pub with_client: bool,
    pub owner: String,
    pub update_summary: Option<String>,
    pub update_due: Option<String>,
    pub live_date: Option<String>,
}

/// A job completed within the report window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJob {
    pub job_number: String,
    pub job_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_changed: Option<String>,
}

/// Lifecycle status of a traffic log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    /// A clarification was issued and awaits a reply on the conversation
    Pending,
    Processed,
    Resolved,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Pending => "pending",
            LogStatus::Processed => "processed",
            LogStatus::Resolved => "resolved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(LogStatus::Pending),
            "processed" => Some(LogStatus::Processed),
            "resolved" => Some(LogStatus::Resolved),
            _ => None,
        }
    }

    /// Clarify and confirm routes leave the conversation open
    pub fn for_route(route: &Route) -> Self {
        match route {
            Route::Clarify | Route::Confirm => LogStatus::Pending,
            _ => LogStatus::Processed,
        }
    }
}

/// Handling category for a message. Unknown routes from the classifier are
/// carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Route {
    Triage,
    Update,
    Wip,
    Clarify,
    Duplicate,
    Confirm,
    Other(String),
}

impl Route {
    pub fn as_str(&self) -> &str {
        match self {
            Route::Triage => "triage",
            Route::Update => "update",
            Route::Wip => "wip",
            Route::Clarify => "clarify",
            Route::Duplicate => "duplicate",
            Route::Confirm => "confirm",
            Route::Other(other) => other,
        }
    }
}

impl From<String> for Route {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "triage" => Route::Triage,
            "update" => Route::Update,
            "wip" => Route::Wip,
            "clarify" => Route::Clarify,
            "duplicate" => Route::Duplicate,
            "confirm" => Route::Confirm,
            other => Route::Other(other.to_string()),
        }
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.as_str().to_string()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One row of the traffic log table
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLogEntry {
    /// Store-assigned id; `None` until the entry has been written
    pub record_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub route: Route,
    pub status: LogStatus,
    pub job_number: Option<JobNumber>,
    pub sender_email: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

/// Why a clarification is being requested
#[derive(Debug, Clone, PartialEq)]
pub enum ClarifyPrompt {
    /// A job number was named but does not exist
    JobNotFound(JobNumber),
    /// The sender confirmed but no job is on record for the conversation
    MissingJobNumber,
    /// The classifier asked for clarification on its own
    General,
}

/// Reference to the log entry a duplicate message was absorbed into
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateOf {
    pub record_id: Option<String>,
    pub route: Route,
    pub status: LogStatus,
}

/// Final routing decision for one message
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub route: Route,
    pub confidence: Confidence,
    pub job_number: Option<JobNumber>,
    pub reason: String,
    pub source: Source,
    pub client_code: Option<ClientCode>,
    /// Present only when a job record was matched and validated
    pub job: Option<JobRecord>,
    pub clarify: Option<ClarifyPrompt>,
    pub duplicate_of: Option<DuplicateOf>,
    /// Free-text fields returned by the classifier, passed through untouched
    pub extra: Map<String, Value>,
}

impl RoutingDecision {
    pub fn new(route: Route, confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            route,
            confidence,
            job_number: None,
            reason: reason.into(),
            source: Source::default(),
            client_code: None,
            job: None,
            clarify: None,
            duplicate_of: None,
            extra: Map::new(),
        }
    }

    /// Attach a validated job record, taking its job number
    pub fn enrich(&mut self, job: JobRecord) {
        self.job_number = Some(job.job_number.clone());
        self.job = Some(job);
    }

    /// Force a clarification, regardless of what was decided before
    pub fn force_clarify(&mut self, reason: impl Into<String>, prompt: ClarifyPrompt) {
        self.route = Route::Clarify;
        self.confidence = Confidence::Low;
        self.reason = reason.into();
        self.job = None;
        self.clarify = Some(prompt);
    }
}

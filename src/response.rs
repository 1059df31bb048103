//! Caller-visible decision contract
//!
//! Thin mapping from [`RoutingDecision`] to the JSON body returned by
//! `POST /traffic`. Enrichment fields appear only when a job record was
//! matched; `clarifyEmail` only when the route is `clarify`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{
    ClarifyPrompt, ClientCode, Confidence, InboundMessage, JobNumber, Route, RoutingDecision,
    Source,
};

const SIGNATURE: &str = "Dot";

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"));

/// Keys owned by the response itself; classifier extras never override them
const RESERVED_KEYS: &[&str] = &[
    "route",
    "confidence",
    "jobNumber",
    "reason",
    "source",
    "clientCode",
    "jobName",
    "clientName",
    "currentRound",
    "currentStage",
    "withClient",
    "teamsChannelId",
    "projectRecordId",
    "clarifyEmail",
    "originalRoute",
    "originalStatus",
    "originalRecordId",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficResponse {
    pub route: Route,
    pub confidence: Confidence,
    pub job_number: Option<JobNumber>,
    pub reason: String,
    pub source: Source,
    pub client_code: Option<ClientCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_client: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_record_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarify_email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_record_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrafficResponse {
    pub fn from_decision(decision: &RoutingDecision, message: &InboundMessage) -> Self {
        let job = decision.job.as_ref();
        let duplicate = decision.duplicate_of.as_ref();

        let extra = decision
            .extra
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let clarify_email = match (&decision.route, &decision.clarify) {
            (Route::Clarify, prompt) => Some(clarify_email(
                &message.sender_name,
                prompt.as_ref().unwrap_or(&ClarifyPrompt::General),
                &decision.extra,
            )),
            _ => None,
        };

        Self {
            route: decision.route.clone(),
            confidence: decision.confidence,
            job_number: decision.job_number.clone(),
            reason: decision.reason.clone(),
            source: decision.source,
            client_code: decision.client_code.clone(),
            job_name: job.map(|j| j.job_name.clone()),
            client_name: job.map(|j| j.client_name.clone()),
            current_round: job.map(|j| j.round),
            current_stage: job.map(|j| j.stage.clone()),
            with_client: job.map(|j| j.with_client),
            teams_channel_id: job.and_then(|j| j.teams_channel_id.clone()),
            project_record_id: job.map(|j| j.record_id.clone()),
            clarify_email,
            original_route: duplicate.map(|d| d.route.clone()),
            original_status: duplicate.map(|d| d.status.as_str().to_string()),
            original_record_id: duplicate.and_then(|d| d.record_id.clone()),
            extra,
        }
    }
}

/// HTML body asking the sender for what is missing
pub fn clarify_email(sender_name: &str, prompt: &ClarifyPrompt, extra: &Map<String, Value>) -> String {
    let name = match sender_name.trim() {
        "" => "there".to_string(),
        name => escape_html(name),
    };

    let body = match prompt {
        ClarifyPrompt::JobNotFound(job) => format!(
            "<p>I couldn't find job <strong>{}</strong> in our system.</p>\n\
             <p>Could you double-check the job number? Or reply <strong>TRIAGE</strong> if this is a new job.</p>",
            escape_html(job.as_str())
        ),
        ClarifyPrompt::MissingJobNumber => "<p>Thanks for confirming. Which job number does this relate to?</p>\n\
             <p>Reply with the job number, or reply <strong>TRIAGE</strong> if this is a new job.</p>"
            .to_string(),
        ClarifyPrompt::General => {
            // The classifier may draft its own clarification
            if let Some(drafted) = extra
                .get("clarifyEmail")
                .and_then(Value::as_str)
                .and_then(render_drafted)
            {
                return drafted;
            }
            "<p>I wasn't sure which job your message relates to.</p>\n\
             <p>Could you reply with the job number? Or reply <strong>TRIAGE</strong> if this is a new job.</p>"
                .to_string()
        }
    };

    format!("<p>Hi {name},</p>\n{body}\n<p>{SIGNATURE}</p>")
}

/// Classifier-drafted text is untrusted: markup is dropped, the remaining
/// text escaped, and each non-empty line becomes a paragraph.
fn render_drafted(drafted: &str) -> Option<String> {
    let text = MARKUP.replace_all(drafted, "\n");
    let paragraphs: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p>{}</p>", escape_html(line)))
        .collect();

    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n"))
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

//! Classifier gateway
//!
//! Renders the message plus deterministic findings into a text context,
//! asks the oracle for a routing suggestion and parses its JSON answer.
//! A single attempt is made; an unparseable answer is terminal for the
//! request.

use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::config::LlmSection;
use crate::error::TrafficError;
use crate::llm::provider::{CompletionRequest, LlmProvider, Message};
use crate::model::{ActiveJob, ClientCode, InboundMessage, JobNumber};
use crate::observability::metrics::metrics;
use crate::routing::schema::RoutingSuggestion;

pub const NO_ACTIVE_JOBS: &str = "No active jobs found for this client";

/// Everything the classifier is told about one message
#[derive(Debug, Clone, Copy)]
pub struct ClassificationContext<'a> {
    pub message: &'a InboundMessage,
    pub extracted_job: Option<&'a JobNumber>,
    pub job_exists: bool,
    pub client_code: Option<&'a ClientCode>,
    pub active_jobs: &'a [ActiveJob],
}

impl ClassificationContext<'_> {
    /// Text handed to the oracle as the user turn
    pub fn render(&self) -> String {
        let message = self.message;
        let none = "none".to_string();

        let active_jobs = if self.active_jobs.is_empty() {
            NO_ACTIVE_JOBS.to_string()
        } else {
            self.active_jobs
                .iter()
                .map(|job| {
                    format!(
                        "- {} - {}: {}",
                        job.job_number, job.job_name, job.description
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Source: {source}\n\
             Subject: {subject}\n\
             \n\
             From: {sender_name} <{sender_email}>\n\
             Recipients: {recipients}\n\
             Has Attachments: {has_attachments}\n\
             Attachment Names: {attachments}\n\
             \n\
             Job number extracted: {job}\n\
             Job exists in system: {exists}\n\
             Client code: {client}\n\
             \n\
             Active jobs for this client:\n\
             {active_jobs}\n\
             \n\
             Message content:\n\
             {content}",
            source = message.source.as_str(),
            subject = message.subject_line,
            sender_name = message.sender_name,
            sender_email = message.sender_email,
            recipients = message.all_recipients.join(", "),
            has_attachments = message.has_attachments,
            attachments = message.attachment_names.join(", "),
            job = self
                .extracted_job
                .map(|j| j.to_string())
                .unwrap_or_else(|| none.clone()),
            exists = self.job_exists,
            client = self.client_code.map(|c| c.to_string()).unwrap_or(none),
            content = message.email_content,
        )
    }
}

/// Oracle client with a fixed instruction and sampling settings
pub struct ClassifierGateway {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
}

impl ClassifierGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, llm: &LlmSection, system_prompt: &str) -> Self {
        let schema = serde_json::to_string_pretty(&RoutingSuggestion::json_schema())
            .unwrap_or_default();

        Self {
            provider,
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            system_prompt: format!(
                "{}\n\nRespond with a single JSON object matching this schema:\n{}",
                system_prompt.trim_end(),
                schema
            ),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn build_request(&self, context: &ClassificationContext<'_>) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                Message::system(self.system_prompt.clone()),
                Message::user(context.render()),
            ],
            model: self.model.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }

    pub async fn classify(
        &self,
        context: &ClassificationContext<'_>,
    ) -> Result<RoutingSuggestion, TrafficError> {
        let request = self.build_request(context);
        debug!(
            provider = self.provider.name(),
            model = %self.model,
            "Requesting routing suggestion"
        );

        metrics().oracle_called();
        let span = crate::classifier_span!(provider = self.provider.name(), model = %self.model);
        let response = self.provider.complete(request).instrument(span).await.map_err(|e| {
            metrics().oracle_failed();
            warn!(error = %e, "Classifier call failed");
            TrafficError::oracle_unavailable(e.to_string())
        })?;

        let raw = response.content.unwrap_or_default();
        let suggestion = parse_suggestion(&raw)?;

        info!(
            route = %suggestion.route,
            confidence = ?suggestion.confidence,
            job_number = suggestion.job_number.as_deref().unwrap_or(""),
            "Classifier suggested route"
        );
        Ok(suggestion)
    }
}

/// Parse oracle text, tolerating a surrounding markdown code fence
pub fn parse_suggestion(raw: &str) -> Result<RoutingSuggestion, TrafficError> {
    let cleaned = strip_code_fences(raw);

    let suggestion: RoutingSuggestion = serde_json::from_str(cleaned).map_err(|e| {
        metrics().oracle_output_malformed();
        warn!(error = %e, "Classifier returned unparseable output");
        TrafficError::malformed_oracle_output(e.to_string(), raw)
    })?;

    suggestion.validate().map_err(|e| {
        metrics().oracle_output_malformed();
        TrafficError::malformed_oracle_output(e, raw)
    })?;

    Ok(suggestion)
}

/// Drop a leading ```` ```lang ```` line and a trailing ```` ``` ````
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(newline) => &text[newline + 1..],
            None => text.trim_start_matches('`'),
        };
    }
    if let Some(stripped) = text.trim_end().strip_suffix("```") {
        text = stripped;
    }

    text.trim()
}

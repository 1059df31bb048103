//! Traffic routing state machine
//!
//! One call to [`TrafficRouter::route`] handles one inbound message:
//!
//! 0. dedup by external message id
//! 1. resolve an open clarification on the conversation
//! 2. deterministic job / client extraction
//! 3. classifier suggestion
//! 4. reconciliation against the project table
//! 5. traffic log persistence
//!
//! The router holds no mutable state. Check-then-write sequences against
//! the store are not atomic; two deliveries of the same message racing
//! past step 0 both get routed and logged.

use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::TrafficConfig;
use crate::error::TrafficError;
use crate::extraction::{ClientRegistry, Extractor};
use crate::llm::LlmProvider;
use crate::model::{
    ClarifyPrompt, ClientCode, Confidence, DuplicateOf, InboundMessage, JobNumber, LogStatus,
    Route, RoutingDecision, TrafficLogEntry,
};
use crate::observability::metrics::metrics;
use crate::routing::classifier::{ClassificationContext, ClassifierGateway};
use crate::routing::reconcile::{reconcile, ExtractedJob};
use crate::routing::replies::{ReplyInterpreter, ReplyIntent};
use crate::store::{ProjectDirectory, RecordStore, TrafficLog};

pub struct TrafficRouter {
    extractor: Extractor,
    replies: ReplyInterpreter,
    classifier: ClassifierGateway,
    projects: ProjectDirectory,
    log: TrafficLog,
}

/// Outcome of step 1
enum ReplyOutcome {
    /// The reply was fully handled
    Decided(RoutingDecision),
    /// Route as a new message, then retire the superseded pending entry
    FallThrough(TrafficLogEntry),
}

impl TrafficRouter {
    pub fn new(
        config: &TrafficConfig,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, TrafficError> {
        let registry = ClientRegistry::from_config(&config.clients)?;
        let system_prompt = config.system_prompt()?;

        Ok(Self {
            extractor: Extractor::new(registry),
            replies: ReplyInterpreter::new(&config.replies),
            classifier: ClassifierGateway::new(provider, &config.llm, system_prompt),
            projects: ProjectDirectory::new(store.clone(), config.store.projects_table.clone()),
            log: TrafficLog::new(store, config.store.traffic_table.clone()),
        })
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Route one message. Only validation and classifier failures are errors.
    pub async fn route(&self, message: &InboundMessage) -> Result<RoutingDecision, TrafficError> {
        let started = Instant::now();
        metrics().message_received();

        let span = crate::traffic_span!(
            request_id = %Uuid::new_v4(),
            message_id = message.message_id().unwrap_or(""),
            conversation_id = message.conversation().unwrap_or(""),
            source = message.source.as_str(),
        );

        let result = self.route_inner(message).instrument(span).await;

        match &result {
            Ok(decision) => metrics().message_routed(decision.route.as_str(), started.elapsed()),
            Err(TrafficError::Validation { .. }) => metrics().validation_rejected(),
            Err(_) => metrics().request_failed(started.elapsed()),
        }
        result
    }

    async fn route_inner(&self, message: &InboundMessage) -> Result<RoutingDecision, TrafficError> {
        message.validate()?;

        // Step 0
        if let Some(message_id) = message.message_id() {
            if let Some(existing) = self.log.find_by_message_id(message_id).await {
                return Ok(self.duplicate(message, existing));
            }
        }

        // Step 1
        let mut superseded = None;
        if let Some(conversation_id) = message.conversation() {
            if let Some(pending) = self.log.find_pending(conversation_id).await {
                match self.resolve_reply(message, pending).await {
                    ReplyOutcome::Decided(decision) => return Ok(decision),
                    ReplyOutcome::FallThrough(pending) => superseded = Some(pending),
                }
            }
        }

        // Steps 2-4
        let decision = self.classify_and_reconcile(message).await?;

        // Step 5
        let written = self.persist(message, &decision).await;
        if let (Some(pending), true) = (superseded, written) {
            self.retire_superseded(&pending).await;
        }

        Ok(decision)
    }

    fn duplicate(&self, message: &InboundMessage, existing: TrafficLogEntry) -> RoutingDecision {
        metrics().duplicate_detected();
        info!(
            original_route = %existing.route,
            original_status = existing.status.as_str(),
            "Duplicate message, returning original routing"
        );

        let mut decision = RoutingDecision::new(
            Route::Duplicate,
            Confidence::High,
            format!("Message already processed as {}", existing.route),
        );
        decision.source = message.source;
        decision.client_code = existing.job_number.as_ref().map(JobNumber::client_code);
        decision.job_number = existing.job_number;
        decision.duplicate_of = Some(DuplicateOf {
            record_id: existing.record_id,
            route: existing.route,
            status: existing.status,
        });
        decision
    }

    async fn resolve_reply(
        &self,
        message: &InboundMessage,
        pending: TrafficLogEntry,
    ) -> ReplyOutcome {
        let intent = self.replies.interpret(message, &self.extractor);
        debug!(intent = ?intent, "Reply to open clarification");

        let decision = match intent {
            ReplyIntent::NewJob => {
                let mut decision = RoutingDecision::new(
                    Route::Triage,
                    Confidence::High,
                    "New job requested in reply to clarification",
                );
                decision.client_code = self.client_from_text(message);
                self.close_clarification(message, &pending, &mut decision)
                    .await;
                decision
            }
            ReplyIntent::JobNumber(job) => {
                self.confirm_job(message, &pending, job, "Job number provided in reply to clarification")
                    .await
            }
            ReplyIntent::Affirmative => match pending.job_number.clone() {
                Some(job) => {
                    self.confirm_job(message, &pending, job, "Suggested job confirmed in reply")
                        .await
                }
                None => {
                    let mut decision = RoutingDecision::new(
                        Route::Clarify,
                        Confidence::Low,
                        "Confirmation received but no job number is on record",
                    );
                    decision.clarify = Some(ClarifyPrompt::MissingJobNumber);
                    decision.client_code = self.client_from_text(message);
                    decision
                }
            },
            ReplyIntent::Unrecognized => {
                info!("Reply not recognised, routing as a new message");
                return ReplyOutcome::FallThrough(pending);
            }
        };

        let mut decision = decision;
        decision.source = message.source;
        ReplyOutcome::Decided(decision)
    }

    /// Validate a job named (or confirmed) in a reply
    async fn confirm_job(
        &self,
        message: &InboundMessage,
        pending: &TrafficLogEntry,
        job: JobNumber,
        reason: &str,
    ) -> RoutingDecision {
        let client = Some(job.client_code());

        match self.projects.find_job(&job).await {
            Some(record) => {
                let mut decision = RoutingDecision::new(Route::Update, Confidence::High, reason);
                decision.enrich(record);
                decision.client_code = client;
                self.close_clarification(message, pending, &mut decision)
                    .await;
                decision
            }
            None => {
                info!(job_number = %job, "Job in reply not found, clarification stays open");
                let mut decision = RoutingDecision::new(
                    Route::Clarify,
                    Confidence::Low,
                    format!("Job {job} not found in system"),
                );
                decision.clarify = Some(ClarifyPrompt::JobNotFound(job.clone()));
                decision.job_number = Some(job);
                decision.client_code = client;
                decision
            }
        }
    }

    /// Resolve the pending entry, then log this reply as processed
    async fn close_clarification(
        &self,
        message: &InboundMessage,
        pending: &TrafficLogEntry,
        decision: &mut RoutingDecision,
    ) {
        if let Some(record_id) = pending.record_id.as_deref() {
            match self
                .log
                .resolve(record_id, decision.job_number.as_ref())
                .await
            {
                Ok(()) => {
                    metrics().clarification_resolved();
                    info!(pending_record_id = %record_id, "Clarification resolved");
                }
                Err(e) => {
                    metrics().persistence_failure();
                    error!(
                        pending_record_id = %record_id,
                        error = %e,
                        "Failed to resolve pending clarification"
                    );
                }
            }
        }

        self.persist(message, decision).await;
    }

    async fn retire_superseded(&self, pending: &TrafficLogEntry) {
        let Some(record_id) = pending.record_id.as_deref() else {
            return;
        };
        match self.log.resolve(record_id, None).await {
            Ok(()) => {
                metrics().clarification_resolved();
                debug!(pending_record_id = %record_id, "Superseded clarification resolved");
            }
            Err(e) => {
                metrics().persistence_failure();
                error!(
                    pending_record_id = %record_id,
                    error = %e,
                    "Failed to resolve superseded clarification"
                );
            }
        }
    }

    async fn classify_and_reconcile(
        &self,
        message: &InboundMessage,
    ) -> Result<RoutingDecision, TrafficError> {
        let texts = [message.subject_line.as_str(), message.email_content.as_str()];

        // Step 2
        let extracted = match self.extractor.first_job_number(texts) {
            Some(job_number) => {
                let record = self.projects.find_job(&job_number).await;
                Some(ExtractedJob { job_number, record })
            }
            None => None,
        };

        let client_code = extracted
            .as_ref()
            .filter(|e| e.is_valid())
            .map(|e| e.job_number.client_code())
            .or_else(|| self.client_from_text(message));

        debug!(
            job_number = extracted.as_ref().map(|e| e.job_number.as_str()).unwrap_or(""),
            job_exists = extracted.as_ref().is_some_and(ExtractedJob::is_valid),
            client_code = client_code.as_ref().map(ClientCode::as_str).unwrap_or(""),
            "Deterministic extraction complete"
        );

        let active_jobs = match &client_code {
            Some(code) => self.projects.active_jobs(code).await,
            None => Vec::new(),
        };

        // Step 3
        let suggestion = self
            .classifier
            .classify(&ClassificationContext {
                message,
                extracted_job: extracted.as_ref().map(|e| &e.job_number),
                job_exists: extracted.as_ref().is_some_and(ExtractedJob::is_valid),
                client_code: client_code.as_ref(),
                active_jobs: &active_jobs,
            })
            .await?;

        if suggestion.job_number.is_some() && suggestion.suggested_job().is_none() {
            warn!(
                job_number = suggestion.job_number.as_deref().unwrap_or(""),
                "Classifier job number is not a job number, ignoring it"
            );
        }

        let suggested = suggestion.suggested_job();
        let mut decision =
            RoutingDecision::new(suggestion.route, suggestion.confidence, suggestion.reason);
        decision.job_number = suggested.clone();
        decision.extra = suggestion.extra;
        if decision.route == Route::Clarify {
            decision.clarify = Some(ClarifyPrompt::General);
        }

        // Step 4
        reconcile(&mut decision, suggested, extracted.as_ref(), &self.projects).await;

        decision.client_code = client_code
            .or_else(|| decision.job_number.as_ref().map(JobNumber::client_code));
        decision.source = message.source;

        Ok(decision)
    }

    /// Client code from subject, then body, then the sender's domain
    fn client_from_text(&self, message: &InboundMessage) -> Option<ClientCode> {
        self.extractor
            .first_client_code([message.subject_line.as_str(), message.email_content.as_str()])
            .or_else(|| self.extractor.client_from_sender(&message.sender_email))
    }

    /// Append the traffic log entry for this message; `true` when written
    async fn persist(&self, message: &InboundMessage, decision: &RoutingDecision) -> bool {
        let status = LogStatus::for_route(&decision.route);
        let entry = TrafficLogEntry {
            record_id: None,
            message_id: message.message_id().map(str::to_string),
            conversation_id: message.conversation().map(str::to_string),
            route: decision.route.clone(),
            status,
            job_number: decision.job_number.clone(),
            sender_email: message.sender_email.clone(),
            subject: message.subject_line.clone(),
            created_at: Utc::now(),
        };

        match self.log.append(&entry).await {
            Ok(record_id) => {
                if status == LogStatus::Pending {
                    metrics().clarification_opened();
                }
                info!(
                    record_id = %record_id,
                    route = %decision.route,
                    status = status.as_str(),
                    "Routing decision logged"
                );
                true
            }
            Err(e) => {
                metrics().persistence_failure();
                error!(
                    route = %decision.route,
                    error = %e,
                    "Failed to write traffic log entry"
                );
                false
            }
        }
    }
}

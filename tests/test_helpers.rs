//! Test helpers and utilities for integration tests

use dot_traffic::config::TrafficConfig;
use dot_traffic::model::InboundMessage;
use dot_traffic::routing::TrafficRouter;
use dot_traffic::testing::mocks::{MockLlmProvider, MockRecordStore};
use dot_traffic::wip::WipReporter;
use serde_json::json;
use std::sync::Arc;

#[allow(dead_code)]
pub const PROJECTS: &str = "Projects";
#[allow(dead_code)]
pub const TRAFFIC: &str = "Traffic";
#[allow(dead_code)]
pub const CLIENTS: &str = "Clients";

/// Minimal configuration; clients and replies use the built-in defaults
#[allow(dead_code)]
pub fn test_config() -> TrafficConfig {
    TrafficConfig::from_toml_str(
        r#"
[service]
name = "Dot Traffic Test"

[store]
base_id = "appTEST"
api_key_env = "AIRTABLE_API_KEY"

[llm]
model = "claude-sonnet-4-20250514"
api_key_env = "ANTHROPIC_API_KEY"
system_prompt = "You route agency email."
"#,
    )
    .expect("test config should parse")
}

/// Router wired to in-memory collaborators
#[allow(dead_code)]
pub fn router(store: Arc<MockRecordStore>, oracle: Arc<MockLlmProvider>) -> TrafficRouter {
    TrafficRouter::new(&test_config(), store, oracle).expect("router should build")
}

#[allow(dead_code)]
pub fn wip_reporter(store: Arc<MockRecordStore>) -> WipReporter {
    WipReporter::new(&test_config(), store).expect("reporter should build")
}

/// Oracle answer in the shape the classifier expects
#[allow(dead_code)]
pub fn suggestion(route: &str, confidence: &str, job_number: Option<&str>, reason: &str) -> String {
    json!({
        "route": route,
        "confidence": confidence,
        "jobNumber": job_number,
        "reason": reason,
    })
    .to_string()
}

#[allow(dead_code)]
pub fn oracle(route: &str, confidence: &str, job_number: Option<&str>) -> Arc<MockLlmProvider> {
    Arc::new(MockLlmProvider::single_response(suggestion(
        route,
        confidence,
        job_number,
        "test suggestion",
    )))
}

/// Seed an active project row
#[allow(dead_code)]
pub fn seed_job(store: &MockRecordStore, job_number: &str, name: &str) -> String {
    store.insert(
        PROJECTS,
        json!({
            "Job Number": job_number,
            "Project Name": name,
            "Client": ["Client Ltd"],
            "Stage": "Craft",
            "Status": "In Progress",
            "Round": 2,
            "With Client?": false,
            "Description": format!("{name} description"),
        }),
    )
}

/// Seed an open clarification on a conversation
#[allow(dead_code)]
pub fn seed_pending(store: &MockRecordStore, conversation_id: &str, job_number: Option<&str>) -> String {
    let mut fields = json!({
        "Internet Message ID": format!("<pending-{conversation_id}@mail>"),
        "Conversation ID": conversation_id,
        "Route": "clarify",
        "Status": "pending",
        "Sender Email": "jo@one.nz",
        "Subject": "Banner",
        "Created At": "2025-03-01T09:30:00+00:00",
    });
    if let Some(job) = job_number {
        fields["Job Number"] = json!(job);
    }
    store.insert(TRAFFIC, fields)
}

#[allow(dead_code)]
pub fn email(content: &str, subject: &str, sender: &str) -> InboundMessage {
    InboundMessage {
        email_content: content.to_string(),
        subject_line: subject.to_string(),
        sender_email: sender.to_string(),
        sender_name: "Jo".to_string(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn reply(content: &str, message_id: &str, conversation_id: &str) -> InboundMessage {
    InboundMessage {
        internet_message_id: Some(message_id.to_string()),
        conversation_id: Some(conversation_id.to_string()),
        ..email(content, "RE: Banner", "jo@one.nz")
    }
}

/// Seed a project row with an explicit status and reporting columns
#[allow(dead_code)]
pub fn seed_project(
    store: &MockRecordStore,
    job_number: &str,
    name: &str,
    status: &str,
    with_client: bool,
    status_changed: Option<&str>,
) -> String {
    let mut fields = json!({
        "Job Number": job_number,
        "Project Name": name,
        "Client": ["Sky TV"],
        "Stage": "Craft",
        "Status": status,
        "With Client?": with_client,
        "Project Owner": "Mia",
        "Description": format!("{name} description"),
    });
    if let Some(changed) = status_changed {
        fields["Status Changed"] = json!(changed);
    }
    store.insert(PROJECTS, fields)
}

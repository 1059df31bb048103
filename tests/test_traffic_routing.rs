//! End-to-end routing behaviour over in-memory collaborators
//!
//! Covers dedup, the clarification loop, reconciliation of the classifier's
//! job suggestion and the degraded modes of the record store.

mod test_helpers;

use dot_traffic::error::TrafficError;
use dot_traffic::model::{ClarifyPrompt, Confidence, JobNumber, LogStatus, Route, Source};
use dot_traffic::testing::mocks::{MockLlmProvider, MockRecordStore};
use dot_traffic::TrafficResponse;
use serde_json::json;
use std::sync::Arc;
use test_helpers::*;

fn job(raw: &str) -> JobNumber {
    JobNumber::parse(raw).unwrap()
}

fn silent_oracle() -> Arc<MockLlmProvider> {
    Arc::new(MockLlmProvider::new(vec![]))
}

fn status_of(store: &MockRecordStore, record_id: &str) -> String {
    store.get(TRAFFIC, record_id).unwrap()["Status"]
        .as_str()
        .unwrap()
        .to_string()
}

fn pending_rows(store: &MockRecordStore, conversation_id: &str) -> usize {
    store
        .rows(TRAFFIC)
        .iter()
        .filter(|r| {
            r.fields["Conversation ID"] == json!(conversation_id)
                && r.fields["Status"] == json!("pending")
        })
        .count()
}

#[tokio::test]
async fn test_same_message_twice_is_duplicate() {
    let store = Arc::new(MockRecordStore::new());
    let oracle = oracle("triage", "high", None);
    let router = router(store.clone(), oracle.clone());

    let mut message = email("Please start a new campaign", "New project", "x@sky.co.nz");
    message.internet_message_id = Some("<m1@mail>".to_string());

    let first = router.route(&message).await.unwrap();
    assert_eq!(first.route, Route::Triage);
    assert_eq!(store.count(TRAFFIC), 1);

    let second = router.route(&message).await.unwrap();
    assert_eq!(second.route, Route::Duplicate);
    assert_eq!(second.confidence, Confidence::High);
    assert_eq!(second.reason, "Message already processed as triage");

    let original = second.duplicate_of.unwrap();
    assert_eq!(original.route, Route::Triage);
    assert_eq!(original.status, LogStatus::Processed);
    assert!(original.record_id.is_some());

    assert_eq!(store.count(TRAFFIC), 1, "duplicate must not be logged");
    assert_eq!(oracle.call_count().await, 1, "duplicate must not reach the oracle");
}

#[tokio::test]
async fn test_messages_without_id_are_never_duplicates() {
    let store = Arc::new(MockRecordStore::new());
    let router = router(store.clone(), oracle("wip", "medium", None));
    let message = email("Where are we at?", "Status", "jo@one.nz");

    router.route(&message).await.unwrap();
    let again = router.route(&message).await.unwrap();

    assert_eq!(again.route, Route::Wip);
    assert_eq!(store.count(TRAFFIC), 2);
}

#[tokio::test]
async fn test_yes_reply_confirms_stored_job() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "ONE 010", "Brand refresh");
    let pending = seed_pending(&store, "C1", Some("ONE 010"));
    let oracle = silent_oracle();
    let router = router(store.clone(), oracle.clone());

    let decision = router.route(&reply("Yes", "<r1@mail>", "C1")).await.unwrap();

    assert_eq!(decision.route, Route::Update);
    assert_eq!(decision.confidence, Confidence::High);
    assert_eq!(decision.job_number, Some(job("ONE 010")));
    assert_eq!(decision.job.unwrap().job_name, "Brand refresh");
    assert_eq!(status_of(&store, &pending), "resolved");

    let logged = store
        .rows(TRAFFIC)
        .into_iter()
        .find(|r| r.fields["Internet Message ID"] == json!("<r1@mail>"))
        .unwrap();
    assert_eq!(logged.fields["Status"], "processed");
    assert_eq!(logged.fields["Route"], "update");
    assert_eq!(oracle.call_count().await, 0);
}

#[tokio::test]
async fn test_affirmative_ignores_quoted_history() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "ONE 010", "Brand refresh");
    seed_pending(&store, "C1", Some("ONE 010"));
    let router = router(store.clone(), silent_oracle());

    let body = "Yes please!\n\nOn Mon, 3 Mar 2025, Dot wrote:\n> Is this TOW 023?\n";
    let decision = router.route(&reply(body, "<r1@mail>", "C1")).await.unwrap();

    assert_eq!(decision.route, Route::Update);
    assert_eq!(decision.job_number, Some(job("ONE 010")));
}

#[tokio::test]
async fn test_yes_reply_ignores_other_job_in_subject() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "ONE 010", "Brand refresh");
    seed_job(&store, "ONE 011", "Retail posters");
    let pending = seed_pending(&store, "C1", Some("ONE 010"));
    let router = router(store.clone(), silent_oracle());

    let mut message = reply("Yes", "<r1@mail>", "C1");
    message.subject_line = "RE: ONE 011 retail posters".to_string();
    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.route, Route::Update);
    assert_eq!(decision.job_number, Some(job("ONE 010")));
    assert_eq!(decision.job.unwrap().job_name, "Brand refresh");
    assert_eq!(status_of(&store, &pending), "resolved");
}

#[tokio::test]
async fn test_new_job_reply_triages_and_resolves() {
    let store = Arc::new(MockRecordStore::new());
    let pending = seed_pending(&store, "C1", Some("ONE 010"));
    let oracle = silent_oracle();
    let router = router(store.clone(), oracle.clone());

    let decision = router.route(&reply("TRIAGE", "<r1@mail>", "C1")).await.unwrap();

    assert_eq!(decision.route, Route::Triage);
    assert_eq!(decision.confidence, Confidence::High);
    assert_eq!(status_of(&store, &pending), "resolved");
    assert_eq!(store.count(TRAFFIC), 2);
    assert_eq!(pending_rows(&store, "C1"), 0);
    assert_eq!(oracle.call_count().await, 0);
}

#[tokio::test]
async fn test_job_number_reply_resolves_with_named_job() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "ONE 011", "Retail posters");
    let pending = seed_pending(&store, "C1", Some("ONE 010"));
    let router = router(store.clone(), silent_oracle());

    let decision = router
        .route(&reply("Sorry, it's one 011", "<r1@mail>", "C1"))
        .await
        .unwrap();

    assert_eq!(decision.route, Route::Update);
    assert_eq!(decision.job_number, Some(job("ONE 011")));
    assert_eq!(decision.client_code.unwrap().as_str(), "ONE");

    let resolved = store.get(TRAFFIC, &pending).unwrap();
    assert_eq!(resolved["Status"], "resolved");
    assert_eq!(resolved["Job Number"], "ONE 011");
}

#[tokio::test]
async fn test_unknown_job_in_reply_keeps_clarification_open() {
    let store = Arc::new(MockRecordStore::new());
    let pending = seed_pending(&store, "C1", Some("ONE 010"));
    let oracle = silent_oracle();
    let router = router(store.clone(), oracle.clone());

    let decision = router
        .route(&reply("It's ONE 555", "<r1@mail>", "C1"))
        .await
        .unwrap();

    assert_eq!(decision.route, Route::Clarify);
    assert_eq!(decision.confidence, Confidence::Low);
    assert_eq!(decision.clarify, Some(ClarifyPrompt::JobNotFound(job("ONE 555"))));
    assert_eq!(status_of(&store, &pending), "pending");
    assert_eq!(store.count(TRAFFIC), 1, "no new entry while the loop stays open");
    assert_eq!(oracle.call_count().await, 0);
}

#[tokio::test]
async fn test_affirmative_without_stored_job_asks_for_one() {
    let store = Arc::new(MockRecordStore::new());
    let pending = seed_pending(&store, "C1", None);
    let router = router(store.clone(), silent_oracle());

    let message = reply("yep", "<r1@mail>", "C1");
    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.route, Route::Clarify);
    assert_eq!(decision.confidence, Confidence::Low);
    assert_eq!(decision.clarify, Some(ClarifyPrompt::MissingJobNumber));
    assert_eq!(status_of(&store, &pending), "pending");

    let response = TrafficResponse::from_decision(&decision, &message);
    assert!(response
        .clarify_email
        .unwrap()
        .contains("Which job number does this relate to?"));
}

#[tokio::test]
async fn test_unrecognised_reply_is_classified_and_supersedes_pending() {
    let store = Arc::new(MockRecordStore::new());
    let pending = seed_pending(&store, "C1", None);
    let oracle = oracle("wip", "medium", None);
    let router = router(store.clone(), oracle.clone());

    let decision = router
        .route(&reply("Can you send the latest version?", "<r1@mail>", "C1"))
        .await
        .unwrap();

    assert_eq!(decision.route, Route::Wip);
    assert_eq!(oracle.call_count().await, 1);
    assert_eq!(status_of(&store, &pending), "resolved");
    assert_eq!(store.count(TRAFFIC), 2);
}

#[tokio::test]
async fn test_superseding_clarification_leaves_one_pending_entry() {
    let store = Arc::new(MockRecordStore::new());
    seed_pending(&store, "C1", None);
    let router = router(store.clone(), oracle("clarify", "low", None));

    let decision = router
        .route(&reply("Not sure what you mean", "<r1@mail>", "C1"))
        .await
        .unwrap();

    assert_eq!(decision.route, Route::Clarify);
    assert_eq!(pending_rows(&store, "C1"), 1);
}

#[tokio::test]
async fn test_missing_suggested_job_overrides_to_clarify() {
    let store = Arc::new(MockRecordStore::new());
    let router = router(store.clone(), oracle("update", "high", Some("XYZ 999")));

    let message = email("Round 3 changes attached", "Changes", "jo@one.nz");
    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.route, Route::Clarify);
    assert_eq!(decision.confidence, Confidence::Low);
    assert_eq!(decision.reason, "Job XYZ 999 not found in system");
    assert_eq!(decision.job_number, Some(job("XYZ 999")));
    assert!(decision.job.is_none());

    let rows = store.rows(TRAFFIC);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["Status"], "pending");
    assert_eq!(rows[0].fields["Job Number"], "XYZ 999");

    let response = TrafficResponse::from_decision(&decision, &message);
    assert!(response.clarify_email.unwrap().contains("XYZ 999"));
}

#[tokio::test]
async fn test_invalid_extracted_job_still_reaches_oracle() {
    let store = Arc::new(MockRecordStore::new());
    let oracle = oracle("triage", "medium", None);
    let router = router(store.clone(), oracle.clone());

    let decision = router
        .route(&email("Feedback on TOW 777 attached", "Feedback", "jo@agency.nz"))
        .await
        .unwrap();

    let context = oracle.last_user_message().await.unwrap();
    assert!(context.contains("Job number extracted: TOW 777"));
    assert!(context.contains("Job exists in system: false"));
    assert_eq!(decision.route, Route::Triage);
    assert!(decision.job.is_none());
    assert_eq!(decision.client_code.unwrap().as_str(), "TOW");
}

#[tokio::test]
async fn test_new_sky_campaign_end_to_end() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "SKY 101", "Launch");
    seed_job(&store, "SKY 999", "Sky catch-all");
    store.insert(
        PROJECTS,
        json!({"Job Number": "SKY 050", "Project Name": "Old promo", "Status": "Completed"}),
    );
    let oracle = oracle("triage", "high", None);
    let router = router(store.clone(), oracle.clone());

    let decision = router
        .route(&email(
            "Please start a new campaign for Sky",
            "New project",
            "x@sky.co.nz",
        ))
        .await
        .unwrap();

    assert_eq!(decision.route, Route::Triage);
    assert!(decision.job_number.is_none());
    assert_eq!(decision.client_code.unwrap().as_str(), "SKY");
    assert_eq!(decision.source, Source::Email);

    let context = oracle.last_user_message().await.unwrap();
    assert!(context.contains("Job number extracted: none"));
    assert!(context.contains("- SKY 101 - Launch: Launch description"));
    assert!(!context.contains("SKY 999"));
    assert!(!context.contains("SKY 050"));

    let rows = store.rows(TRAFFIC);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["Status"], "processed");
    assert_eq!(rows[0].fields["Route"], "triage");
}

#[tokio::test]
async fn test_validated_extracted_job_is_adopted() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "TOW 023", "Renewals");
    let router = router(store.clone(), oracle("update", "high", None));

    let message = email("Round 2 amends attached", "TOW 023 amends", "jo@tower.co.nz");
    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.route, Route::Update);
    assert_eq!(decision.job_number, Some(job("TOW 023")));
    assert_eq!(decision.client_code.as_ref().unwrap().as_str(), "TOW");

    let body = serde_json::to_value(TrafficResponse::from_decision(&decision, &message)).unwrap();
    assert_eq!(body["jobName"], "Renewals");
    assert_eq!(body["currentRound"], 2);
    assert_eq!(body["currentStage"], "Craft");
}

#[tokio::test]
async fn test_non_ascii_digits_do_not_hide_later_job_number() {
    let store = Arc::new(MockRecordStore::new());
    seed_job(&store, "TOW 023", "Renewals");
    let oracle = oracle("update", "high", None);
    let router = router(store.clone(), oracle.clone());

    let message = email("Amends attached", "ref TOW ١٢٣ then TOW 023", "jo@agency.nz");
    let decision = router.route(&message).await.unwrap();

    let context = oracle.last_user_message().await.unwrap();
    assert!(context.contains("Job number extracted: TOW 023"));
    assert!(context.contains("Job exists in system: true"));
    assert_eq!(decision.job_number, Some(job("TOW 023")));
    assert_eq!(decision.job.unwrap().job_name, "Renewals");
}

#[tokio::test]
async fn test_classifier_clarify_opens_pending_entry() {
    let store = Arc::new(MockRecordStore::new());
    let router = router(store.clone(), oracle("clarify", "low", None));

    let mut message = email("Can we tweak the thing?", "Quick one", "jo@one.nz");
    message.conversation_id = Some("C9".to_string());
    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.route, Route::Clarify);
    assert_eq!(decision.clarify, Some(ClarifyPrompt::General));
    assert_eq!(pending_rows(&store, "C9"), 1);
}

#[tokio::test]
async fn test_teams_source_is_carried_through() {
    let store = Arc::new(MockRecordStore::new());
    let oracle = oracle("wip", "medium", None);
    let router = router(store, oracle.clone());

    let mut message = email("WIP please", "", "jo@one.nz");
    message.source = Source::Teams;
    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.source, Source::Teams);
    let context = oracle.last_user_message().await.unwrap();
    assert!(context.starts_with("Source: teams"));
}

#[tokio::test]
async fn test_empty_content_rejected_before_collaborators() {
    let store = Arc::new(MockRecordStore::new());
    let oracle = oracle("triage", "high", None);
    let router = router(store.clone(), oracle.clone());

    let mut message = email("   ", "Subject", "jo@one.nz");
    message.internet_message_id = Some("<m1@mail>".to_string());
    let err = router.route(&message).await.unwrap_err();

    assert!(matches!(err, TrafficError::Validation { .. }));
    assert_eq!(oracle.call_count().await, 0);
    assert_eq!(store.count(TRAFFIC), 0);
}

#[tokio::test]
async fn test_malformed_oracle_output_fails_without_logging() {
    let store = Arc::new(MockRecordStore::new());
    let oracle = Arc::new(MockLlmProvider::single_response("Definitely triage!"));
    let router = router(store.clone(), oracle);

    let err = router
        .route(&email("New brief attached", "Brief", "jo@one.nz"))
        .await
        .unwrap_err();

    match err {
        TrafficError::MalformedOracleOutput { raw_response, .. } => {
            assert_eq!(raw_response, "Definitely triage!")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.count(TRAFFIC), 0);
}

#[tokio::test]
async fn test_oracle_outage_is_terminal() {
    let store = Arc::new(MockRecordStore::new());
    let router = router(store.clone(), Arc::new(MockLlmProvider::with_failure()));

    let err = router
        .route(&email("New brief attached", "Brief", "jo@one.nz"))
        .await
        .unwrap_err();

    assert!(matches!(err, TrafficError::OracleUnavailable { .. }));
    let (status, _) = err.to_error_body();
    assert_eq!(status, 500);
}

#[tokio::test]
async fn test_store_outage_degrades_to_unverified_routing() {
    let store = Arc::new(MockRecordStore::with_failure());
    let router = router(store.clone(), oracle("update", "medium", None));

    let mut message = email("Amends for TOW 023", "Amends", "jo@tower.co.nz");
    message.internet_message_id = Some("<m1@mail>".to_string());
    message.conversation_id = Some("C1".to_string());

    let decision = router.route(&message).await.unwrap();

    assert_eq!(decision.route, Route::Update);
    assert!(decision.job.is_none());
    assert_eq!(decision.client_code.unwrap().as_str(), "TOW");
}

#[tokio::test]
async fn test_persistence_failure_does_not_fail_request() {
    let store = Arc::new(MockRecordStore::with_write_failure());
    let router = router(store.clone(), oracle("triage", "high", None));

    let decision = router
        .route(&email("New brief attached", "Brief", "jo@one.nz"))
        .await
        .unwrap();

    assert_eq!(decision.route, Route::Triage);
    assert_eq!(store.count(TRAFFIC), 0);
}

#[tokio::test]
async fn test_concurrent_messages_each_logged_once() {
    let store = Arc::new(MockRecordStore::new());
    let router = Arc::new(router(store.clone(), oracle("wip", "medium", None)));

    let requests = (0..10).map(|i| {
        let router = router.clone();
        async move {
            let mut message = email("Status please", "WIP", "jo@one.nz");
            message.internet_message_id = Some(format!("<m{i}@mail>"));
            router.route(&message).await
        }
    });

    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(store.count(TRAFFIC), 10);
}

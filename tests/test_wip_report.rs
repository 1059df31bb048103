//! WIP report assembly over the in-memory record store

mod test_helpers;

use chrono::NaiveDate;
use dot_traffic::error::TrafficError;
use dot_traffic::testing::mocks::MockRecordStore;
use dot_traffic::wip::{WipItem, WipRequest};
use serde_json::json;
use std::sync::Arc;
use test_helpers::*;

fn numbers(items: &[WipItem]) -> Vec<String> {
    items.iter().map(|item| item.job_number.clone()).collect()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

#[tokio::test]
async fn test_report_groups_active_jobs() {
    let store = Arc::new(MockRecordStore::new());
    seed_project(&store, "SKY 101", "Launch", "In Progress", false, None);
    seed_project(&store, "SKY 102", "Billboards", "In Progress", true, None);
    seed_project(&store, "SKY 103", "Paused promo", "On Hold", true, None);
    seed_project(&store, "SKY 999", "Catch-all", "In Progress", false, None);
    seed_project(&store, "TOW 023", "Renewals", "In Progress", false, None);

    let report = wip_reporter(store)
        .report_on(&WipRequest::for_client("SKY"), today())
        .await
        .unwrap();

    assert_eq!(report.client_code.as_str(), "SKY");
    assert_eq!(report.client_name, "Sky TV");
    assert_eq!(report.report_date, "01 March 2025");
    assert_eq!(report.active_count, 3);

    assert_eq!(numbers(&report.in_progress), vec!["SKY 101"]);
    assert_eq!(numbers(&report.with_client), vec!["SKY 102"]);
    assert_eq!(numbers(&report.on_hold), vec!["SKY 103"]);
}

#[tokio::test]
async fn test_recently_completed_respects_window() {
    let store = Arc::new(MockRecordStore::new());
    seed_project(&store, "SKY 101", "Launch", "In Progress", false, None);
    seed_project(&store, "SKY 090", "Summer promo", "Completed", false, Some("2025-02-20"));
    seed_project(&store, "SKY 080", "Old promo", "Completed", false, Some("2025-01-10"));
    seed_project(&store, "SKY 998", "Admin", "Completed", false, Some("2025-02-25"));

    let report = wip_reporter(store)
        .report_on(&WipRequest::for_client("SKY"), today())
        .await
        .unwrap();

    assert_eq!(report.completed_count, 1);
    assert_eq!(report.recently_completed[0].job_number, "SKY 090");
}

#[tokio::test]
async fn test_completed_only_client_still_reports() {
    let store = Arc::new(MockRecordStore::new());
    seed_project(&store, "SKY 090", "Summer promo", "Completed", false, Some("2025-02-20"));
    store.insert(CLIENTS, json!({"Client code": "SKY", "Client": "Sky Network Television"}));

    let report = wip_reporter(store)
        .report_on(&WipRequest::for_client("SKY"), today())
        .await
        .unwrap();

    assert_eq!(report.active_count, 0);
    assert_eq!(report.client_name, "Sky Network Television");
}

#[tokio::test]
async fn test_client_name_falls_back_to_code() {
    let store = Arc::new(MockRecordStore::new());
    store.insert(
        PROJECTS,
        json!({"Job Number": "TOW 023", "Project Name": "Renewals", "Status": "On Hold"}),
    );

    let report = wip_reporter(store)
        .report_on(&WipRequest::for_client("TOW"), today())
        .await
        .unwrap();

    assert_eq!(report.client_name, "TOW");
    assert_eq!(report.on_hold.len(), 1);
}

#[tokio::test]
async fn test_client_name_resolves_through_aliases() {
    let store = Arc::new(MockRecordStore::new());
    seed_project(&store, "TOW 023", "Renewals", "In Progress", false, None);

    let request: WipRequest = serde_json::from_value(json!({"client": "Tower Insurance"})).unwrap();
    let report = wip_reporter(store).report_on(&request, today()).await.unwrap();

    assert_eq!(report.client_code.as_str(), "TOW");
}

#[tokio::test]
async fn test_unknown_client_is_rejected() {
    let result = wip_reporter(Arc::new(MockRecordStore::new()))
        .report_on(&WipRequest::for_client("Acme"), today())
        .await;

    match result {
        Err(TrafficError::Validation { message }) => assert!(message.contains("Acme")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_store_outage_reads_as_no_projects() {
    let result = wip_reporter(Arc::new(MockRecordStore::with_failure()))
        .report_on(&WipRequest::for_client("SKY"), today())
        .await;

    match result {
        Err(TrafficError::NotFound { client_code, .. }) => {
            assert_eq!(client_code.as_deref(), Some("SKY"))
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

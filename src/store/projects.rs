//! Project table lookups
//!
//! Every store failure degrades to "not found" / empty so that an outage
//! never aborts a routing decision. Failures are logged and counted.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{ActiveJob, ClientCode, CompletedJob, JobNumber, JobRecord, WipJob};
use crate::observability::metrics::metrics;
use crate::store::{Formula, Record, RecordStore};

pub const FIELD_JOB_NUMBER: &str = "Job Number";
pub const FIELD_PROJECT_NAME: &str = "Project Name";
pub const FIELD_CLIENT: &str = "Client";
pub const FIELD_STAGE: &str = "Stage";
pub const FIELD_STATUS: &str = "Status";
pub const FIELD_ROUND: &str = "Round";
pub const FIELD_WITH_CLIENT: &str = "With Client?";
pub const FIELD_TEAMS_CHANNEL: &str = "Teams Channel ID";
pub const FIELD_DESCRIPTION: &str = "Description";
pub const FIELD_OWNER: &str = "Project Owner";
pub const FIELD_UPDATE_SUMMARY: &str = "Update View";
pub const FIELD_UPDATE_DUE: &str = "Update due";
pub const FIELD_LIVE_DATE: &str = "Live Date";
pub const FIELD_STATUS_CHANGED: &str = "Status Changed";

pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_ON_HOLD: &str = "On Hold";
pub const STATUS_COMPLETED: &str = "Completed";

/// Read-only view of the project table
#[derive(Clone)]
pub struct ProjectDirectory {
    store: Arc<dyn RecordStore>,
    table: String,
}

impl ProjectDirectory {
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Look up a job; `None` when missing or when the store is unreachable
    pub async fn find_job(&self, job_number: &JobNumber) -> Option<JobRecord> {
        let records = match self
            .store
            .find_by_field(&self.table, FIELD_JOB_NUMBER, job_number.as_str())
            .await
        {
            Ok(records) => records,
            Err(e) => {
                metrics().store_failure();
                warn!(
                    job_number = %job_number,
                    error = %e,
                    "Project lookup failed, treating job as not found"
                );
                return None;
            }
        };

        let Some(record) = records.into_iter().next() else {
            debug!(job_number = %job_number, "Job not found in project table");
            return None;
        };

        Some(job_from_record(record, job_number))
    }

    /// Active (In Progress / On Hold) jobs for a client, placeholders skipped
    pub async fn active_jobs(&self, client: &ClientCode) -> Vec<ActiveJob> {
        self.active_records(client, "Active job lookup failed, continuing without job context")
            .await
            .into_iter()
            .map(|record| ActiveJob {
                job_number: record.text(FIELD_JOB_NUMBER).unwrap_or_default(),
                job_name: record.text(FIELD_PROJECT_NAME).unwrap_or_default(),
                description: record.text(FIELD_DESCRIPTION).unwrap_or_default(),
            })
            .collect()
    }

    /// Active jobs with the reporting columns, placeholders skipped
    pub async fn wip_jobs(&self, client: &ClientCode) -> Vec<WipJob> {
        self.active_records(client, "WIP job lookup failed, reporting no active jobs")
            .await
            .into_iter()
            .map(|record| WipJob {
                job_number: record.text(FIELD_JOB_NUMBER).unwrap_or_default(),
                job_name: record.text(FIELD_PROJECT_NAME).unwrap_or_default(),
                description: record.text(FIELD_DESCRIPTION).unwrap_or_default(),
                client_name: record.text(FIELD_CLIENT).unwrap_or_default(),
                stage: record.text(FIELD_STAGE).unwrap_or_default(),
                status: record.text(FIELD_STATUS).unwrap_or_default(),
                with_client: record.flag(FIELD_WITH_CLIENT),
                owner: record.text(FIELD_OWNER).unwrap_or_default(),
                update_summary: non_blank(record.text(FIELD_UPDATE_SUMMARY)),
                update_due: non_blank(record.text(FIELD_UPDATE_DUE)),
                live_date: non_blank(record.text(FIELD_LIVE_DATE)),
            })
            .collect()
    }

    /// Jobs whose status changed to Completed after `since`, newest first
    pub async fn recently_completed(
        &self,
        client: &ClientCode,
        since: NaiveDate,
    ) -> Vec<CompletedJob> {
        let formula = Formula::And(vec![
            Formula::starts_with(FIELD_JOB_NUMBER, client.as_str()),
            Formula::eq(FIELD_STATUS, STATUS_COMPLETED),
            Formula::is_after(FIELD_STATUS_CHANGED, since),
        ]);

        let mut jobs: Vec<CompletedJob> = self
            .query(&formula, client, "Completed job lookup failed, reporting none")
            .await
            .into_iter()
            .filter(|record| !is_placeholder(record))
            .map(|record| CompletedJob {
                job_number: record.text(FIELD_JOB_NUMBER).unwrap_or_default(),
                job_name: record.text(FIELD_PROJECT_NAME).unwrap_or_default(),
                description: record.text(FIELD_DESCRIPTION).unwrap_or_default(),
                status_changed: record.text(FIELD_STATUS_CHANGED),
            })
            .collect();

        // ISO timestamps sort lexically
        jobs.sort_by(|a, b| b.status_changed.cmp(&a.status_changed));
        jobs
    }

    async fn active_records(&self, client: &ClientCode, failure: &str) -> Vec<Record> {
        let formula = Formula::And(vec![
            Formula::starts_with(FIELD_JOB_NUMBER, client.as_str()),
            Formula::Or(vec![
                Formula::eq(FIELD_STATUS, STATUS_IN_PROGRESS),
                Formula::eq(FIELD_STATUS, STATUS_ON_HOLD),
            ]),
        ]);

        self.query(&formula, client, failure)
            .await
            .into_iter()
            .filter(|record| !is_placeholder(record))
            .collect()
    }

    async fn query(&self, formula: &Formula, client: &ClientCode, failure: &str) -> Vec<Record> {
        match self.store.find_by_formula(&self.table, formula).await {
            Ok(records) => records,
            Err(e) => {
                metrics().store_failure();
                warn!(client_code = %client, error = %e, "{failure}");
                Vec::new()
            }
        }
    }
}

fn is_placeholder(record: &Record) -> bool {
    record
        .text(FIELD_JOB_NUMBER)
        .and_then(|raw| JobNumber::parse(&raw))
        .map(|job| job.is_placeholder())
        .unwrap_or(false)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn job_from_record(record: Record, requested: &JobNumber) -> JobRecord {
    let job_number = record
        .text(FIELD_JOB_NUMBER)
        .and_then(|raw| JobNumber::parse(&raw))
        .unwrap_or_else(|| requested.clone());

    JobRecord {
        job_number,
        job_name: record.text(FIELD_PROJECT_NAME).unwrap_or_default(),
        client_name: record.text(FIELD_CLIENT).unwrap_or_default(),
        stage: record.text(FIELD_STAGE).unwrap_or_default(),
        status: record.text(FIELD_STATUS).unwrap_or_default(),
        round: record.integer(FIELD_ROUND).unwrap_or(0),
        with_client: record.flag(FIELD_WITH_CLIENT),
        teams_channel_id: record.text(FIELD_TEAMS_CHANNEL),
        record_id: record.id,
    }
}

//! Client work-in-progress report
//!
//! Lists a client's active jobs grouped the way account managers send them
//! (with us, with the client, on hold) plus jobs completed within the
//! configured window. Placeholder jobs never appear. Store failures degrade
//! to empty lists, so an outage reads as "no projects found".

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::TrafficConfig;
use crate::error::TrafficError;
use crate::extraction::ClientRegistry;
use crate::model::{ClientCode, CompletedJob, WipJob};
use crate::observability::metrics::metrics;
use crate::store::projects::{STATUS_IN_PROGRESS, STATUS_ON_HOLD};
use crate::store::{ClientDirectory, ProjectDirectory, RecordStore};

const NO_UPDATE: &str = "No updates yet";
const TO_BE_CONFIRMED: &str = "TBC";

/// Body of `POST /wip`; `clientCode` wins over `client`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipRequest {
    #[serde(default)]
    pub client_code: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
}

impl WipRequest {
    pub fn for_client(client: impl Into<String>) -> Self {
        Self {
            client_code: Some(client.into()),
            client: None,
        }
    }

    fn requested_client(&self) -> Option<&str> {
        [self.client_code.as_deref(), self.client.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|c| !c.is_empty())
    }
}

/// One job line on the report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WipItem {
    pub job_number: String,
    pub job_name: String,
    pub description: String,
    pub owner: String,
    pub update: String,
    pub due_on: String,
    pub live_by: String,
    pub stage: String,
}

impl From<&WipJob> for WipItem {
    fn from(job: &WipJob) -> Self {
        Self {
            job_number: job.job_number.clone(),
            job_name: job.job_name.clone(),
            description: job.description.clone(),
            owner: job.owner.clone(),
            update: job
                .update_summary
                .clone()
                .unwrap_or_else(|| NO_UPDATE.to_string()),
            due_on: job
                .update_due
                .as_deref()
                .map(display_date)
                .unwrap_or_else(|| TO_BE_CONFIRMED.to_string()),
            live_by: job
                .live_date
                .as_deref()
                .map(display_live_date)
                .unwrap_or_else(|| TO_BE_CONFIRMED.to_string()),
            stage: job.stage.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WipReport {
    pub client_code: ClientCode,
    pub client_name: String,
    pub report_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_url: Option<String>,
    pub active_count: usize,
    pub completed_count: usize,
    pub in_progress: Vec<WipItem>,
    pub with_client: Vec<WipItem>,
    pub on_hold: Vec<WipItem>,
    pub recently_completed: Vec<CompletedJob>,
}

/// Assembles WIP reports from the project and client tables
pub struct WipReporter {
    projects: ProjectDirectory,
    clients: ClientDirectory,
    registry: ClientRegistry,
    completed_window_days: u32,
    header_url: Option<String>,
}

impl WipReporter {
    pub fn new(config: &TrafficConfig, store: Arc<dyn RecordStore>) -> Result<Self, TrafficError> {
        Ok(Self {
            projects: ProjectDirectory::new(store.clone(), config.store.projects_table.clone()),
            clients: ClientDirectory::new(store, config.store.clients_table.clone()),
            registry: ClientRegistry::from_config(&config.clients)?,
            completed_window_days: config.wip.completed_window_days,
            header_url: config.wip.header_url.clone(),
        })
    }

    /// Report as of today's local date
    pub async fn report(&self, request: &WipRequest) -> Result<WipReport, TrafficError> {
        self.report_on(request, Local::now().date_naive()).await
    }

    pub async fn report_on(
        &self,
        request: &WipRequest,
        today: NaiveDate,
    ) -> Result<WipReport, TrafficError> {
        let Some(requested) = request.requested_client() else {
            metrics().validation_rejected();
            return Err(TrafficError::validation("No client code provided"));
        };
        let Some(code) = self.registry.resolve_client(requested) else {
            metrics().validation_rejected();
            return Err(TrafficError::validation(format!("Unknown client: {requested}")));
        };

        let since = today
            .checked_sub_days(Days::new(u64::from(self.completed_window_days)))
            .unwrap_or(NaiveDate::MIN);
        let (active, completed) = tokio::join!(
            self.projects.wip_jobs(&code),
            self.projects.recently_completed(&code, since)
        );

        if active.is_empty() && completed.is_empty() {
            return Err(TrafficError::not_found(
                "No projects found",
                Some(code.to_string()),
            ));
        }

        let client_name = match active
            .iter()
            .map(|job| job.client_name.trim())
            .find(|name| !name.is_empty())
        {
            Some(name) => name.to_string(),
            None => self
                .clients
                .client_name(&code)
                .await
                .unwrap_or_else(|| code.to_string()),
        };

        let group = |keep: fn(&WipJob) -> bool| -> Vec<WipItem> {
            active.iter().filter(|job| keep(job)).map(WipItem::from).collect()
        };
        let in_progress = group(|job| job.status == STATUS_IN_PROGRESS && !job.with_client);
        let with_client = group(|job| job.status == STATUS_IN_PROGRESS && job.with_client);
        let on_hold = group(|job| job.status == STATUS_ON_HOLD);

        info!(
            client_code = %code,
            active = active.len(),
            completed = completed.len(),
            "WIP report assembled"
        );

        Ok(WipReport {
            client_code: code,
            client_name,
            report_date: today.format("%d %B %Y").to_string(),
            header_url: self.header_url.clone(),
            active_count: active.len(),
            completed_count: completed.len(),
            in_progress,
            with_client,
            on_hold,
            recently_completed: completed,
        })
    }
}

/// `2025-03-07`, `07/03/2025` or `07-03-2025` as `7 Mar`; anything else as given
pub fn display_date(raw: &str) -> String {
    let raw = raw.trim();
    let candidates = [raw, raw.get(..10).unwrap_or(raw)];

    for candidate in candidates {
        for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return date.format("%-d %b").to_string();
            }
        }
    }
    raw.to_string()
}

/// Loose live dates ("Mid April", "TBC") pass through untouched
fn display_live_date(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let loose = lowered == "tbc" || ["early", "mid", "late"].iter().any(|w| lowered.contains(w));
    if loose {
        raw.trim().to_string()
    } else {
        display_date(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: &str, with_client: bool) -> WipJob {
        WipJob {
            job_number: "SKY 101".to_string(),
            job_name: "Launch".to_string(),
            description: "Spring launch".to_string(),
            client_name: "Sky TV".to_string(),
            stage: "Craft".to_string(),
            status: status.to_string(),
            with_client,
            owner: "Mia".to_string(),
            update_summary: None,
            update_due: None,
            live_date: None,
        }
    }

    #[test]
    fn test_display_date_formats() {
        assert_eq!(display_date("2025-03-07"), "7 Mar");
        assert_eq!(display_date("07/03/2025"), "7 Mar");
        assert_eq!(display_date("17-11-2025"), "17 Nov");
        assert_eq!(display_date("2025-03-07T09:00:00.000Z"), "7 Mar");
        assert_eq!(display_date("next week"), "next week");
    }

    #[test]
    fn test_loose_live_dates_pass_through() {
        assert_eq!(display_live_date("Mid April"), "Mid April");
        assert_eq!(display_live_date("TBC"), "TBC");
        assert_eq!(display_live_date("late May"), "late May");
        assert_eq!(display_live_date("2025-05-01"), "1 May");
    }

    #[test]
    fn test_item_defaults_for_missing_columns() {
        let item = WipItem::from(&job(STATUS_IN_PROGRESS, false));
        assert_eq!(item.update, "No updates yet");
        assert_eq!(item.due_on, "TBC");
        assert_eq!(item.live_by, "TBC");
    }

    #[test]
    fn test_item_formats_present_columns() {
        let mut wip = job(STATUS_IN_PROGRESS, true);
        wip.update_summary = Some("Round 2 with client".to_string());
        wip.update_due = Some("2025-03-07".to_string());
        wip.live_date = Some("2025-04-14".to_string());

        let item = WipItem::from(&wip);
        assert_eq!(item.update, "Round 2 with client");
        assert_eq!(item.due_on, "7 Mar");
        assert_eq!(item.live_by, "14 Apr");
    }

    #[test]
    fn test_request_prefers_client_code_over_name() {
        let request: WipRequest =
            serde_json::from_str(r#"{"clientCode": "SKY", "client": "Tower"}"#).unwrap();
        assert_eq!(request.requested_client(), Some("SKY"));

        let by_name: WipRequest = serde_json::from_str(r#"{"client": "Tower"}"#).unwrap();
        assert_eq!(by_name.requested_client(), Some("Tower"));

        let blank: WipRequest = serde_json::from_str(r#"{"clientCode": "  "}"#).unwrap();
        assert_eq!(blank.requested_client(), None);
    }
}

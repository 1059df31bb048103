//! Reconciliation of the classifier's job suggestion against the project table
//!
//! Ordered decision table, first matching row wins:
//!
//! | suggested job            | extracted job         | action                         |
//! |--------------------------|-----------------------|--------------------------------|
//! | same as extracted        | validated             | reuse the fetched record       |
//! | same as extracted        | failed validation     | force clarify, no second lookup|
//! | present, different       | any                   | look up; missing forces clarify|
//! | none                     | validated             | adopt the extracted job        |
//! | none                     | none or not validated | no enrichment                  |

use tracing::{debug, info};

use crate::model::{ClarifyPrompt, JobNumber, JobRecord, RoutingDecision};
use crate::store::ProjectDirectory;

/// Step 2 findings carried into reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedJob {
    pub job_number: JobNumber,
    /// `Some` when the job was found in the project table
    pub record: Option<JobRecord>,
}

impl ExtractedJob {
    pub fn is_valid(&self) -> bool {
        self.record.is_some()
    }
}

/// Which row of the decision table applies
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    ReuseExtracted,
    RejectSuggested(JobNumber),
    LookupSuggested(JobNumber),
    AdoptExtracted,
    NoEnrichment,
}

/// Select the table row; performs no I/O
pub fn plan(suggested: Option<&JobNumber>, extracted: Option<&ExtractedJob>) -> Reconciliation {
    match (suggested, extracted) {
        (Some(job), Some(found)) if *job == found.job_number => {
            if found.is_valid() {
                Reconciliation::ReuseExtracted
            } else {
                Reconciliation::RejectSuggested(job.clone())
            }
        }
        (Some(job), _) => Reconciliation::LookupSuggested(job.clone()),
        (None, Some(found)) if found.is_valid() => Reconciliation::AdoptExtracted,
        (None, _) => Reconciliation::NoEnrichment,
    }
}

/// Apply the decision table to `decision`, looking up the suggested job when
/// the table asks for it
pub async fn reconcile(
    decision: &mut RoutingDecision,
    suggested: Option<JobNumber>,
    extracted: Option<&ExtractedJob>,
    projects: &ProjectDirectory,
) {
    let row = plan(suggested.as_ref(), extracted);
    debug!(row = ?row, "Reconciling classifier suggestion");

    let extracted_record = || extracted.and_then(|e| e.record.clone());

    match row {
        Reconciliation::ReuseExtracted | Reconciliation::AdoptExtracted => {
            if let Some(record) = extracted_record() {
                decision.enrich(record);
            }
        }
        Reconciliation::RejectSuggested(job) => reject(decision, job),
        Reconciliation::LookupSuggested(job) => match projects.find_job(&job).await {
            Some(record) => decision.enrich(record),
            None => reject(decision, job),
        },
        Reconciliation::NoEnrichment => {}
    }
}

fn reject(decision: &mut RoutingDecision, job: JobNumber) {
    info!(
        job_number = %job,
        original_route = %decision.route,
        "Suggested job not found, overriding to clarify"
    );
    decision.force_clarify(
        format!("Job {job} not found in system"),
        ClarifyPrompt::JobNotFound(job.clone()),
    );
    decision.job_number = Some(job);
}

//! Read-only projection of jobs for the HTTP layer and the CLI.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jobs::{
    Job, JobId, JobMode, JobStatus, JobStore, ProviderModels, ProviderOutcome, ProviderResult,
    ProviderStatus,
};
use crate::providers::{ProviderId, Transcript};

/// Serialized view of a job, as returned by `GET /api/v1/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub mode: JobMode,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "is_default_models")]
    pub models: ProviderModels,
    pub providers: BTreeSet<ProviderId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_results: Option<BTreeMap<ProviderId, ProviderResultView>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResultView {
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn is_default_models(models: &ProviderModels) -> bool {
    *models == ProviderModels::default()
}

impl From<&ProviderResult> for ProviderResultView {
    fn from(result: &ProviderResult) -> Self {
        let (transcript, error) = match &result.outcome {
            Some(ProviderOutcome::Success(t)) => (Some(t.clone()), None),
            Some(ProviderOutcome::Failure(msg)) => (None, Some(msg.clone())),
            None => (None, None),
        };
        Self {
            status: result.status,
            transcript,
            error,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let provider_results = match job.mode {
            JobMode::Comparison => Some(
                job.provider_results
                    .iter()
                    .map(|(id, result)| (*id, ProviderResultView::from(result)))
                    .collect(),
            ),
            JobMode::Single => None,
        };

        Self {
            job_id: job.id,
            status: job.status,
            mode: job.mode,
            file_name: job.input.file_name.clone(),
            language: job.input.language.clone(),
            models: job.input.models.clone(),
            providers: job.providers.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            result: job.result.clone(),
            error: job.error.clone(),
            provider_results,
        }
    }
}

/// Thin read-only façade over the [`JobStore`]. Never waits on running providers.
#[derive(Clone)]
pub struct StatusQuery {
    store: Arc<JobStore>,
}

impl StatusQuery {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// `None` when the id was never issued or the job has been swept.
    pub fn query(&self, id: JobId) -> Option<JobView> {
        self.store.get(id).as_ref().map(JobView::from)
    }
}

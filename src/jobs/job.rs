use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::{ProviderId, Transcript};

pub type JobId = Uuid;

/// Lifecycle status of a job. Ordered: `Pending < Processing < {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the lifecycle; both terminal statuses share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status of one provider inside a comparison job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Pending,
    Completed,
    Failed,
}

impl ProviderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProviderStatus::Pending)
    }
}

/// Whether a job runs one back-end or compares several on the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Single,
    Comparison,
}

/// Per-provider model choice for a job. `None` uses the provider's default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderModels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepgram: Option<String>,
}

impl ProviderModels {
    pub fn model_for(&self, provider: ProviderId) -> Option<String> {
        match provider {
            ProviderId::OpenAi => self.openai.clone(),
            ProviderId::Deepgram => self.deepgram.clone(),
        }
    }
}

/// Immutable inputs captured when the job is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub file_name: String,
    pub language: Option<String>,
    pub models: ProviderModels,
}

/// What a provider task reports back once its call settled.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success(Transcript),
    Failure(String),
}

/// Result slot for one provider of a comparison job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub status: ProviderStatus,
    /// Set together with a terminal `status`.
    pub outcome: Option<ProviderOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProviderResult {
    pub fn pending() -> Self {
        Self {
            status: ProviderStatus::Pending,
            outcome: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Write the terminal outcome. The caller checks that the slot is still pending.
    pub(super) fn settle(&mut self, outcome: ProviderOutcome, now: DateTime<Utc>) {
        self.status = match outcome {
            ProviderOutcome::Success(_) => ProviderStatus::Completed,
            ProviderOutcome::Failure(_) => ProviderStatus::Failed,
        };
        self.outcome = Some(outcome);
        self.completed_at = Some(now);
    }
}

/// One submitted transcription request and its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub mode: JobMode,
    pub input: JobInput,
    /// Requested providers, fixed at creation.
    pub providers: BTreeSet<ProviderId>,
    /// Single mode only: the transcript of the one provider.
    pub result: Option<Transcript>,
    /// Single mode only: the failure message of the one provider.
    pub error: Option<String>,
    /// Comparison mode only: one slot per requested provider, seeded at creation.
    pub provider_results: BTreeMap<ProviderId, ProviderResult>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, input: JobInput, providers: BTreeSet<ProviderId>) -> Self {
        let mode = if providers.len() > 1 {
            JobMode::Comparison
        } else {
            JobMode::Single
        };
        let provider_results = match mode {
            JobMode::Comparison => providers
                .iter()
                .map(|p| (*p, ProviderResult::pending()))
                .collect(),
            JobMode::Single => BTreeMap::new(),
        };

        Self {
            id,
            status: JobStatus::Pending,
            mode,
            input,
            providers,
            result: None,
            error: None,
            provider_results,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether `provider` still owes this job an outcome.
    pub fn awaits(&self, provider: ProviderId) -> bool {
        match self.mode {
            JobMode::Single => self.providers.contains(&provider) && !self.status.is_terminal(),
            JobMode::Comparison => self
                .provider_results
                .get(&provider)
                .is_some_and(|r| !r.status.is_terminal()),
        }
    }
}

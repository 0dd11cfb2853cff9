use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tempfile::TempPath;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, StoreError};
use crate::jobs::{JobId, JobInput, JobStatus, JobStore, ProviderOutcome};
use crate::providers::{ProviderId, ProviderRegistry, TranscriptionProvider, TranscriptionRequest};

/// The audio file a job reads from.
///
/// An `Upload` is owned by the job and deleted when the artifact is dropped,
/// whichever way the job's supervisor task exits. A `File` belongs to the
/// caller and is left in place.
#[derive(Debug)]
pub enum InputArtifact {
    Upload(TempPath),
    File(PathBuf),
}

impl InputArtifact {
    pub fn path(&self) -> &Path {
        match self {
            InputArtifact::Upload(temp) => temp,
            InputArtifact::File(path) => path,
        }
    }

    /// Release the artifact, reporting a failed delete instead of ignoring it.
    fn release(self, job_id: JobId) {
        match self {
            InputArtifact::Upload(temp) => {
                let path = temp.to_path_buf();
                match temp.close() {
                    Ok(()) => debug!(%job_id, path = %path.display(), "released upload"),
                    Err(err) => warn!(
                        %job_id,
                        path = %path.display(),
                        error = %err,
                        "failed to delete upload"
                    ),
                }
            }
            InputArtifact::File(_) => {}
        }
    }
}

/// Handle to a submitted job.
pub struct Submission {
    pub job_id: JobId,
    /// Resolves once every provider task settled and the input was released.
    pub handle: JoinHandle<()>,
}

/// Turns a request into a job and drives its provider calls concurrently.
pub struct JobOrchestrator {
    store: Arc<JobStore>,
    providers: ProviderRegistry,
    provider_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<JobStore>,
        providers: ProviderRegistry,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            providers,
            provider_timeout,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Create the job and start its provider tasks without waiting for them.
    ///
    /// Must be called from within a tokio runtime. On error no job is created
    /// and the artifact is released on drop.
    pub fn submit(
        &self,
        input: JobInput,
        artifact: InputArtifact,
        providers: BTreeSet<ProviderId>,
    ) -> Result<Submission, OrchestratorError> {
        if providers.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }
        let adapters = providers
            .iter()
            .map(|id| {
                self.providers
                    .get(*id)
                    .ok_or(OrchestratorError::ProviderUnavailable(*id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let job_id = self.store.create_job(input.clone(), &providers)?;
        info!(%job_id, file = %input.file_name, providers = ?providers, "job submitted");

        let run = JobRun {
            job_id,
            store: Arc::clone(&self.store),
            adapters,
            input,
            timeout: self.provider_timeout,
        };
        let handle = tokio::spawn(run.supervise(artifact));

        Ok(Submission { job_id, handle })
    }
}

/// Everything the supervisor task of one job needs.
struct JobRun {
    job_id: JobId,
    store: Arc<JobStore>,
    adapters: Vec<Arc<dyn TranscriptionProvider>>,
    input: JobInput,
    timeout: Duration,
}

impl JobRun {
    async fn supervise(self, artifact: InputArtifact) {
        let audio = match tokio::fs::read(artifact.path()).await {
            Ok(bytes) => Arc::new(bytes),
            Err(err) => {
                warn!(job_id = %self.job_id, error = %err, "failed to read input");
                for adapter in &self.adapters {
                    record(
                        &self.store,
                        self.job_id,
                        adapter.id(),
                        ProviderOutcome::Failure(format!("failed to read input: {err}")),
                    );
                }
                artifact.release(self.job_id);
                return;
            }
        };

        let single = self.adapters.len() == 1;
        let mut tasks = JoinSet::new();
        for adapter in &self.adapters {
            let request = TranscriptionRequest {
                audio: Arc::clone(&audio),
                file_name: self.input.file_name.clone(),
                language: self.input.language.clone(),
                model: self.input.models.model_for(adapter.id()),
            };
            tasks.spawn(run_provider(
                Arc::clone(&self.store),
                self.job_id,
                Arc::clone(adapter),
                request,
                self.timeout,
                single,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(job_id = %self.job_id, error = %err, "provider task aborted");
            }
        }

        self.settle_stragglers();
        artifact.release(self.job_id);
    }

    /// A provider that never reported (its task was aborted) is recorded as failed,
    /// so the job still reaches a terminal status.
    fn settle_stragglers(&self) {
        let Some(job) = self.store.get(self.job_id) else {
            return;
        };
        for adapter in &self.adapters {
            let provider = adapter.id();
            if job.awaits(provider) {
                record(
                    &self.store,
                    self.job_id,
                    provider,
                    ProviderOutcome::Failure(
                        "provider task ended without reporting an outcome".into(),
                    ),
                );
            }
        }
    }
}

/// One provider call. Never propagates a failure: errors, timeouts and panics
/// all become a failed outcome for this provider only.
async fn run_provider(
    store: Arc<JobStore>,
    job_id: JobId,
    adapter: Arc<dyn TranscriptionProvider>,
    request: TranscriptionRequest,
    timeout: Duration,
    single: bool,
) {
    let provider = adapter.id();
    let started = if single {
        store.set_status(job_id, JobStatus::Processing)
    } else {
        store.mark_provider_started(job_id, provider)
    };
    if let Err(err) = started {
        error!(%job_id, %provider, error = %err, "could not mark provider as started");
    }

    debug!(%job_id, %provider, "calling provider");
    let call = AssertUnwindSafe(adapter.transcribe(&request)).catch_unwind();
    let outcome = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(Ok(transcript))) => ProviderOutcome::Success(transcript),
        Ok(Ok(Err(err))) => {
            warn!(%job_id, %provider, error = %err, "provider failed");
            ProviderOutcome::Failure(err.to_string())
        }
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(%job_id, %provider, panic = %message, "provider panicked");
            ProviderOutcome::Failure(format!("provider panicked: {message}"))
        }
        Err(_) => {
            warn!(%job_id, %provider, timeout_secs = timeout.as_secs(), "provider timed out");
            ProviderOutcome::Failure(format!("timed out after {}s", timeout.as_secs()))
        }
    };

    record(&store, job_id, provider, outcome);
}

fn record(store: &JobStore, job_id: JobId, provider: ProviderId, outcome: ProviderOutcome) {
    let succeeded = matches!(outcome, ProviderOutcome::Success(_));
    match store.record_provider_outcome(job_id, provider, outcome) {
        Ok(status) => {
            debug!(%job_id, %provider, succeeded, "provider settled");
            if status.is_terminal() {
                info!(%job_id, %status, "job settled");
            }
        }
        // Invariant violations were already logged by the store.
        Err(StoreError::InvariantViolation { .. }) => {}
        Err(err) => error!(%job_id, %provider, error = %err, "could not record provider outcome"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! The authoritative in-memory job table.
//!
//! Every read and write goes through [`JobStore`]. The table sits behind a
//! single `RwLock`, so each operation, including the read-modify-write in
//! [`JobStore::record_provider_outcome`], is applied atomically with respect to
//! every other operation. No lock is ever held across an `.await`.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use super::job::{Job, JobId, JobInput, JobMode, JobStatus, ProviderOutcome};
use super::state::StateMachine;
use crate::error::StoreError;
use crate::providers::ProviderId;

// UUID v4 collisions are not expected; this only bounds a pathological loop.
const MAX_ID_ATTEMPTS: usize = 8;

/// Number of jobs per status, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

/// Log and build an invariant violation. These are synchronization bugs and must be loud.
fn violation(job_id: JobId, detail: String) -> StoreError {
    error!(%job_id, %detail, "job store invariant violation");
    StoreError::InvariantViolation { job_id, detail }
}

/// Move `job` to `to`, stamping `completed_at` on the way into a terminal status.
fn transition(job: &mut Job, to: JobStatus, now: DateTime<Utc>) -> Result<(), StoreError> {
    if job.status == to {
        return Ok(());
    }
    if !StateMachine::can_transition(job.status, to) {
        return Err(violation(job.id, format!("illegal transition {} -> {to}", job.status)));
    }
    debug!(job_id = %job.id, from = %job.status, %to, "job status changed");
    job.status = to;
    if to.is_terminal() {
        job.completed_at = Some(now);
    }
    Ok(())
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a job half-written: every
    // mutation validates before it writes, so the poisoned table is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new pending job and return its id.
    pub fn create_job(
        &self,
        input: JobInput,
        providers: &BTreeSet<ProviderId>,
    ) -> Result<JobId, StoreError> {
        if providers.is_empty() {
            return Err(StoreError::NoProviders);
        }

        let mut jobs = self.write();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = Uuid::new_v4();
            if let Entry::Vacant(slot) = jobs.entry(id) {
                slot.insert(Job::new(id, input, providers.clone()));
                debug!(job_id = %id, "job created");
                return Ok(id);
            }
        }
        Err(StoreError::IdExhausted)
    }

    /// Consistent snapshot of one job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    /// Direct status transition, used by the single-provider path.
    pub fn set_status(&self, id: JobId, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        transition(job, status, Utc::now())
    }

    /// Stamp the start of a comparison provider's call and move the job to `Processing`.
    pub fn mark_provider_started(&self, id: JobId, provider: ProviderId) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.status.is_terminal() {
            return Err(violation(id, format!("provider {provider} started after the job settled")));
        }
        let result = job
            .provider_results
            .get_mut(&provider)
            .ok_or_else(|| violation(id, format!("provider {provider} has no result slot")))?;
        if result.status.is_terminal() {
            return Err(violation(id, format!("provider {provider} started after it settled")));
        }
        result.started_at.get_or_insert(now);

        transition(job, JobStatus::Processing, now)
    }

    /// Record the terminal outcome of `provider` and re-derive the job status,
    /// all under one write lock. Returns the job status after the update.
    pub fn record_provider_outcome(
        &self,
        id: JobId,
        provider: ProviderId,
        outcome: ProviderOutcome,
    ) -> Result<JobStatus, StoreError> {
        let now = Utc::now();
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !job.providers.contains(&provider) {
            return Err(violation(id, format!("provider {provider} was not requested")));
        }

        match job.mode {
            JobMode::Single => {
                if job.status.is_terminal() {
                    return Err(violation(id, format!("provider {provider} already settled")));
                }
                let status = match outcome {
                    ProviderOutcome::Success(transcript) => {
                        job.result = Some(transcript);
                        JobStatus::Completed
                    }
                    ProviderOutcome::Failure(message) => {
                        job.error = Some(message);
                        JobStatus::Failed
                    }
                };
                transition(job, status, now)?;
            }
            JobMode::Comparison => {
                let result = job
                    .provider_results
                    .get_mut(&provider)
                    .ok_or_else(|| {
                        violation(id, format!("provider {provider} has no result slot"))
                    })?;
                if result.status.is_terminal() {
                    return Err(violation(id, format!("provider {provider} already settled")));
                }
                result.settle(outcome, now);

                let next = StateMachine::aggregate(job.provider_results.values());
                transition(job, next, now)?;
            }
        }

        Ok(job.status)
    }

    /// Permanently remove a terminal job.
    pub fn evict(&self, id: JobId) -> Result<Job, StoreError> {
        let mut jobs = self.write();
        let terminal = jobs
            .get(&id)
            .map(|job| job.status.is_terminal())
            .ok_or(StoreError::NotFound(id))?;
        if !terminal {
            return Err(StoreError::NotTerminal(id));
        }
        let job = jobs.remove(&id).ok_or(StoreError::NotFound(id))?;
        debug!(job_id = %id, "job evicted");
        Ok(job)
    }

    /// Ids of terminal jobs that completed strictly before `cutoff`.
    pub fn terminal_before(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        self.read()
            .values()
            .filter(|job| job.status.is_terminal())
            .filter(|job| job.completed_at.is_some_and(|at| at < cutoff))
            .map(|job| job.id)
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let jobs = self.read();
        let mut stats = StoreStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::jobs::{ProviderModels, ProviderStatus};
    use crate::providers::Transcript;

    fn input() -> JobInput {
        JobInput {
            file_name: "clip.wav".into(),
            language: None,
            models: ProviderModels::default(),
        }
    }

    fn both() -> BTreeSet<ProviderId> {
        BTreeSet::from([ProviderId::OpenAi, ProviderId::Deepgram])
    }

    fn success(text: &str) -> ProviderOutcome {
        ProviderOutcome::Success(Transcript {
            text: text.into(),
            confidence: None,
            detected_language: None,
            duration_seconds: None,
            model: None,
            processing_time_ms: 0,
        })
    }

    #[test]
    fn create_rejects_empty_provider_set() {
        let store = JobStore::new();
        let err = store.create_job(input(), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, StoreError::NoProviders));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = JobStore::new();
        assert!(store.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn single_job_settles_directly() {
        let store = JobStore::new();
        let id = store.create_job(input(), &BTreeSet::from([ProviderId::OpenAi])).unwrap();

        store.set_status(id, JobStatus::Processing).unwrap();
        let status = store
            .record_provider_outcome(id, ProviderId::OpenAi, success("hi"))
            .unwrap();

        assert_eq!(status, JobStatus::Completed);
        let job = store.get(id).unwrap();
        assert_eq!(job.result.unwrap().text, "hi");
        assert!(job.error.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn single_job_failure_keeps_result_empty() {
        let store = JobStore::new();
        let id = store.create_job(input(), &BTreeSet::from([ProviderId::Deepgram])).unwrap();

        let status = store
            .record_provider_outcome(
                id,
                ProviderId::Deepgram,
                ProviderOutcome::Failure("bad key".into()),
            )
            .unwrap();

        assert_eq!(status, JobStatus::Failed);
        let job = store.get(id).unwrap();
        assert!(job.result.is_none());
        assert_eq!(job.error.as_deref(), Some("bad key"));
    }

    #[test]
    fn comparison_job_waits_for_every_provider() {
        let store = JobStore::new();
        let id = store.create_job(input(), &both()).unwrap();

        let status = store
            .record_provider_outcome(
                id,
                ProviderId::Deepgram,
                ProviderOutcome::Failure("quota exceeded".into()),
            )
            .unwrap();
        assert_eq!(status, JobStatus::Processing);
        assert!(store.get(id).unwrap().completed_at.is_none());

        let status = store
            .record_provider_outcome(id, ProviderId::OpenAi, success("hello"))
            .unwrap();
        assert_eq!(status, JobStatus::Completed);

        let job = store.get(id).unwrap();
        assert_eq!(job.provider_results[&ProviderId::OpenAi].status, ProviderStatus::Completed);
        assert_eq!(job.provider_results[&ProviderId::Deepgram].status, ProviderStatus::Failed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn comparison_job_fails_when_all_fail() {
        let store = JobStore::new();
        let id = store.create_job(input(), &both()).unwrap();
        for provider in both() {
            store
                .record_provider_outcome(id, provider, ProviderOutcome::Failure("down".into()))
                .unwrap();
        }
        assert_eq!(store.get(id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn mark_started_moves_job_to_processing() {
        let store = JobStore::new();
        let id = store.create_job(input(), &both()).unwrap();

        store.mark_provider_started(id, ProviderId::OpenAi).unwrap();
        store.mark_provider_started(id, ProviderId::Deepgram).unwrap();

        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.provider_results.values().all(|r| r.started_at.is_some()));
    }

    #[test]
    fn double_terminal_write_is_an_invariant_violation() {
        let store = JobStore::new();
        let id = store.create_job(input(), &both()).unwrap();
        store
            .record_provider_outcome(id, ProviderId::OpenAi, success("first"))
            .unwrap();

        let err = store
            .record_provider_outcome(id, ProviderId::OpenAi, success("second"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation { .. }));

        let job = store.get(id).unwrap();
        match &job.provider_results[&ProviderId::OpenAi].outcome {
            Some(ProviderOutcome::Success(t)) => assert_eq!(t.text, "first"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unrequested_provider_is_rejected() {
        let store = JobStore::new();
        let id = store.create_job(input(), &BTreeSet::from([ProviderId::OpenAi])).unwrap();
        let err = store
            .record_provider_outcome(id, ProviderId::Deepgram, success("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation { .. }));
        assert_eq!(store.get(id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn status_never_moves_backwards() {
        let store = JobStore::new();
        let id = store.create_job(input(), &BTreeSet::from([ProviderId::OpenAi])).unwrap();
        store.set_status(id, JobStatus::Processing).unwrap();

        assert!(store.set_status(id, JobStatus::Pending).is_err());
        store
            .record_provider_outcome(id, ProviderId::OpenAi, ProviderOutcome::Failure("x".into()))
            .unwrap();
        assert!(store.set_status(id, JobStatus::Processing).is_err());
        assert_eq!(store.get(id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn evict_refuses_running_jobs() {
        let store = JobStore::new();
        let id = store.create_job(input(), &both()).unwrap();
        assert!(matches!(store.evict(id), Err(StoreError::NotTerminal(_))));

        for provider in both() {
            store
                .record_provider_outcome(id, provider, ProviderOutcome::Failure("x".into()))
                .unwrap();
        }
        assert!(store.evict(id).is_ok());
        assert!(store.get(id).is_none());
        assert!(matches!(store.evict(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn terminal_before_only_lists_settled_jobs() {
        let store = JobStore::new();
        let running = store.create_job(input(), &both()).unwrap();
        let done = store.create_job(input(), &BTreeSet::from([ProviderId::OpenAi])).unwrap();
        store
            .record_provider_outcome(done, ProviderId::OpenAi, success("ok"))
            .unwrap();

        let later = Utc::now() + Duration::hours(2);
        assert_eq!(store.terminal_before(later), vec![done]);
        assert!(store.terminal_before(Utc::now() - Duration::hours(2)).is_empty());
        assert!(store.get(running).is_some());
    }

    #[test]
    fn stats_count_each_status() {
        let store = JobStore::new();
        store.create_job(input(), &both()).unwrap();
        let failed = store.create_job(input(), &BTreeSet::from([ProviderId::OpenAi])).unwrap();
        store
            .record_provider_outcome(
                failed,
                ProviderId::OpenAi,
                ProviderOutcome::Failure("x".into()),
            )
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed + stats.processing, 0);
    }

    #[test]
    fn concurrent_outcomes_are_never_lost() {
        for _ in 0..200 {
            let store = Arc::new(JobStore::new());
            let id = store.create_job(input(), &both()).unwrap();
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let handles: Vec<_> = both()
                .into_iter()
                .map(|provider| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.record_provider_outcome(id, provider, success("x")).unwrap()
                    })
                })
                .collect();

            let statuses: Vec<JobStatus> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            // Exactly one writer observed the terminal transition.
            assert_eq!(statuses.iter().filter(|s| s.is_terminal()).count(), 1);
            let job = store.get(id).unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            assert!(job.provider_results.values().all(|r| r.status == ProviderStatus::Completed));
        }
    }
}

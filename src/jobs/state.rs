use super::job::{JobStatus, ProviderResult, ProviderStatus};

/// Lifecycle rules shared by every job.
///
/// Jobs flow `Pending → Processing → {Completed | Failed}` and never leave a
/// terminal status. Single-provider jobs may jump from `Pending` straight to a
/// terminal status; comparison jobs always pass through `Processing`.
pub struct StateMachine;

impl StateMachine {
    /// Whether a job may move from `from` to `to`. Staying put is not a transition.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        !from.is_terminal() && to.rank() > from.rank()
    }

    /// Job-level status of a comparison job derived from its provider slots.
    ///
    /// - any provider still pending: `Processing`
    /// - all settled, at least one succeeded: `Completed`
    /// - all settled, none succeeded: `Failed`
    ///
    /// Only called after at least one outcome was recorded, which is why an
    /// unsettled job is `Processing` rather than `Pending`.
    pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a ProviderResult>) -> JobStatus {
        let mut any_pending = false;
        let mut any_completed = false;

        for result in results {
            match result.status {
                ProviderStatus::Pending => any_pending = true,
                ProviderStatus::Completed => any_completed = true,
                ProviderStatus::Failed => {}
            }
        }

        if any_pending {
            JobStatus::Processing
        } else if any_completed {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }
}

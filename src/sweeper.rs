//! Periodic eviction of finished jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::jobs::JobStore;

/// Evicts terminal jobs once they have been finished for longer than the retention window.
///
/// Pending and processing jobs are never evicted, however old they are.
pub struct RetentionSweeper {
    store: Arc<JobStore>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<JobStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    /// Run one sweep as of `now`, returning the number of evicted jobs.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return 0;
        };

        let mut evicted = 0;
        for job_id in self.store.terminal_before(cutoff) {
            match self.store.evict(job_id) {
                Ok(_) => evicted += 1,
                // Already gone; nothing else removes jobs, but the outcome is the same.
                Err(StoreError::NotFound(_)) => {}
                Err(err) => warn!(%job_id, error = %err, "could not evict job"),
            }
        }

        if evicted > 0 {
            info!(evicted, remaining = self.store.len(), "swept expired jobs");
        } else {
            debug!(remaining = self.store.len(), "sweep found nothing to evict");
        }
        evicted
    }

    /// Sweep on a fixed interval until the runtime shuts down.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep(Utc::now());
            }
        })
    }
}

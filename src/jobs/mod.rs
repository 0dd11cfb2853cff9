mod job;
mod state;
mod store;

pub use job::{
    Job, JobId, JobInput, JobMode, JobStatus, ProviderModels, ProviderOutcome, ProviderResult,
    ProviderStatus,
};
pub use store::JobStore;

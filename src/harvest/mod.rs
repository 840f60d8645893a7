//! Harvesting images from every source into watched regions.

pub mod orchestrator;
pub mod sweep;

pub use orchestrator::{
    FailureReason, HarvestOrchestrator, HarvestOutcome, HarvestSource, RetryPolicy, SourceFailure,
};
pub use sweep::{DEFAULT_REGION, ensure_default_region, run_sweeps};

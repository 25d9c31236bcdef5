//! Pipeline entry points for the listing watcher.
//!
//! - `detect_changes`: diff one source's scan batch against its state
//! - `Orchestrator`: run one bounded-concurrency cycle over all sources
//! - `run_scheduler`: trigger cycles on a timer until shutdown

mod cycle;
mod detect;
mod schedule;

pub use cycle::Orchestrator;
pub use detect::detect_changes;
pub use schedule::{log_summary, run_scheduler};

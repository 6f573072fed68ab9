/// Monitoring engine
///
/// This module is responsible for:
/// - Probing pages over HTTP
/// - Running a full check (probe, screenshot, diff, persistence, alerts)
/// - Scheduling rounds of due checks
/// - Validating page settings
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use checker::{Checker, HttpChecker};
pub use executor::{CheckComponents, CheckError, CheckExecutor, ExecutorSettings};
pub use scheduler::{RoundSummary, Scheduler, SchedulerHandle};
pub use types::{PendingCheck, ProbeOutcome, VisualArtifacts};

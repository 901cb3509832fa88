//! Step handler and callback traits
//!
//! These traits keep the runner free of any dependency on how steps are
//! actually carried out (provider APIs, SSH) or displayed.

use crate::step::BatchStep;
use crate::types::{BatchSummary, StepOutcome};
use anyhow::Result;

/// Carries out the operation named by a step
///
/// Implementations hold their collaborators (provider registry, remote
/// executor, record store) and are shared across worker threads when the
/// per-resource strategy is used.
pub trait StepHandler<O>: Send + Sync {
    /// Run one step
    fn run_step(&self, step: &BatchStep<O>) -> Result<StepOutcome>;

    /// Whether an error returned by `run_step` should block the remaining
    /// steps of the same resource regardless of the step's policy
    fn is_blocking(&self, _error: &anyhow::Error) -> bool {
        false
    }
}

/// Progress callback for batch execution
pub trait ProgressCallback: Send {
    /// Called once before the first step
    fn on_batch_start(&mut self, total: usize);

    /// Called before a step runs
    fn on_step_start(&mut self, index: usize, total: usize, label: &str);

    /// Called when a step completes
    fn on_step_complete(&mut self, label: &str, outcome: &StepOutcome);

    /// Called once after the last step
    fn on_batch_complete(&mut self);
}

/// Receives the aggregate result once the batch is over
pub trait FinishCallback<O> {
    fn finished(&mut self, success: bool, summary: &BatchSummary, steps: &[BatchStep<O>]);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _total: usize) {}
    fn on_step_start(&mut self, _index: usize, _total: usize, _label: &str) {}
    fn on_step_complete(&mut self, _label: &str, _outcome: &StepOutcome) {}
    fn on_batch_complete(&mut self) {}
}

/// Progress callback that writes to the `log` facade
pub struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_batch_start(&mut self, total: usize) {
        log::info!("Starting batch of {} steps", total);
    }

    fn on_step_start(&mut self, index: usize, total: usize, label: &str) {
        log::info!("[{}/{}] {}", index + 1, total, label);
    }

    fn on_step_complete(&mut self, label: &str, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Failed { error, .. } => log::warn!("{} failed: {}", label, error),
            StepOutcome::Skipped { reason } => log::info!("{} skipped: {}", label, reason),
            StepOutcome::Done { .. } => log::debug!("{} done", label),
        }
    }

    fn on_batch_complete(&mut self) {
        log::info!("Batch complete");
    }
}

/// No-op finish callback
pub struct NoFinish;

impl<O> FinishCallback<O> for NoFinish {
    fn finished(&mut self, _success: bool, _summary: &BatchSummary, _steps: &[BatchStep<O>]) {}
}

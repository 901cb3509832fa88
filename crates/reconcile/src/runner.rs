//! Batch runner - executes steps with per-step failure isolation

use crate::context::{FinishCallback, ProgressCallback, StepHandler};
use crate::step::{BatchStep, group_by_resource};
use crate::types::{BatchSummary, RunOptions, StepOutcome, StepPolicy, StepReport, Strategy};
use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Run a list of steps and report the aggregate result
///
/// # Arguments
/// * `steps` - Steps in execution order
/// * `handler` - Carries out each step's operation
/// * `opts` - Dry run flag and execution strategy
/// * `progress` - Progress callback
/// * `finish` - Receives the summary and the original step list
///
/// Step failures never abort the batch. A blocking failure skips the
/// remaining steps of the same resource only.
pub fn run<O, H, P, F>(
    steps: &[BatchStep<O>],
    handler: &H,
    opts: &RunOptions,
    progress: &mut P,
    finish: &mut F,
) -> Result<BatchSummary>
where
    O: Sync,
    H: StepHandler<O>,
    P: ProgressCallback,
    F: FinishCallback<O>,
{
    let mut summary = BatchSummary::default();
    progress.on_batch_start(steps.len());

    match opts.strategy {
        Strategy::PerResource { jobs } if jobs > 1 && !opts.dry_run => {
            for report in run_parallel(steps, handler, jobs, progress)? {
                summary.add_report(report);
            }
        }
        _ => {
            let mut blocked: HashSet<&str> = HashSet::new();
            for (index, step) in steps.iter().enumerate() {
                progress.on_step_start(index, steps.len(), &step.label);
                let outcome = if opts.dry_run {
                    StepOutcome::Skipped {
                        reason: "Dry run".to_string(),
                    }
                } else {
                    run_guarded(step, handler, &mut blocked)
                };
                progress.on_step_complete(&step.label, &outcome);
                summary.add_report(report_for(step, outcome));
            }
        }
    }

    progress.on_batch_complete();
    finish.finished(summary.is_success(), &summary, steps);
    Ok(summary)
}

/// Run steps with one worker per resource group
///
/// Workers report progress as their steps start and finish; `index` counts
/// steps in the order they were started.
fn run_parallel<O, H, P>(
    steps: &[BatchStep<O>],
    handler: &H,
    jobs: usize,
    progress: &mut P,
) -> Result<Vec<StepReport>>
where
    O: Sync,
    H: StepHandler<O>,
    P: ProgressCallback,
{
    let groups = group_by_resource(steps);
    let total = steps.len();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create batch thread pool: {}", e))?;

    let progress = Mutex::new(progress);
    let started = AtomicUsize::new(0);

    let per_group: Vec<Vec<StepReport>> = pool.install(|| {
        groups
            .par_iter()
            .map(|group| {
                let mut blocked: HashSet<&str> = HashSet::new();
                group
                    .iter()
                    .map(|&step| {
                        let index = started.fetch_add(1, Ordering::SeqCst);
                        lock(&progress).on_step_start(index, total, &step.label);
                        let outcome = run_guarded(step, handler, &mut blocked);
                        lock(&progress).on_step_complete(&step.label, &outcome);
                        report_for(step, outcome)
                    })
                    .collect()
            })
            .collect()
    });

    Ok(per_group.into_iter().flatten().collect())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking callback must not silence the other workers
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run one step unless its resource is already blocked
fn run_guarded<'a, O, H>(
    step: &'a BatchStep<O>,
    handler: &H,
    blocked: &mut HashSet<&'a str>,
) -> StepOutcome
where
    H: StepHandler<O>,
{
    if blocked.contains(step.resource_id.as_str()) {
        return StepOutcome::Skipped {
            reason: format!("an earlier step for {} failed", step.resource_id),
        };
    }

    let fail_fast = step.policy == StepPolicy::FailFast;
    let outcome = match handler.run_step(step) {
        Ok(StepOutcome::Failed { error, blocking }) => StepOutcome::Failed {
            error,
            blocking: blocking || fail_fast,
        },
        Ok(outcome) => outcome,
        Err(e) => StepOutcome::Failed {
            blocking: fail_fast || handler.is_blocking(&e),
            error: format!("{:#}", e),
        },
    };

    if outcome.is_blocking() {
        log::warn!(
            "{} failed; skipping remaining steps for {}",
            step.label,
            step.resource_id
        );
        blocked.insert(step.resource_id.as_str());
    }

    outcome
}

fn report_for<O>(step: &BatchStep<O>, outcome: StepOutcome) -> StepReport {
    StepReport {
        label: step.label.clone(),
        resource_id: step.resource_id.clone(),
        outcome,
    }
}

/// Run sequentially without callbacks
pub fn run_simple<O, H>(steps: &[BatchStep<O>], handler: &H) -> Result<BatchSummary>
where
    O: Sync,
    H: StepHandler<O>,
{
    use crate::context::{NoFinish, NoProgress};

    run(
        steps,
        handler,
        &RunOptions::default(),
        &mut NoProgress,
        &mut NoFinish,
    )
}

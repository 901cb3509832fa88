//! # Reconcile
//!
//! Desired-state reconciliation and batch execution for provisioned resources.
//!
//! This crate holds the two pieces of the provisioning engine that know
//! nothing about providers or SSH:
//!
//! - **Diff**: compares the resources an operator currently wants against the
//!   previously submitted snapshot and yields what to create and delete
//! - **Runner**: executes named steps one resource at a time, isolating
//!   failures and reporting progress
//!
//! ## Core Concepts
//!
//! - **ResourceDescriptor**: a VPS, app or manual host with desired config and
//!   (once created) observed provider state
//! - **BatchStep**: a named unit of work bound to one resource
//! - **StepHandler**: carries out the operation behind a step
//! - **Strategy**: sequential, or one worker per independent resource
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{diff, BatchStep, ResourceDescriptor, ResourceKind, run_simple};
//!
//! let current = vec![ResourceDescriptor::new("1", ResourceKind::Vps, "hetzner")];
//! let rec = diff(&current, &[]);
//! assert_eq!(rec.create_ids(), vec!["1"]);
//!
//! let steps: Vec<_> = rec
//!     .to_create
//!     .iter()
//!     .map(|r| BatchStep::fail_fast(format!("VPS created (id: {})", r.id), &r.id, Op::Create))
//!     .collect();
//! let summary = run_simple(&steps, &handler)?;
//! ```

pub mod context;
pub mod diff;
pub mod runner;
pub mod step;
pub mod types;

// Re-export main types at crate root
pub use context::{FinishCallback, LogProgress, NoFinish, NoProgress, ProgressCallback, StepHandler};
pub use diff::{DiffSummary, Reconciliation, diff};
pub use runner::{run, run_simple};
pub use step::{BatchStep, group_by_resource};
pub use types::{
    BatchSummary, ResourceDescriptor, ResourceKind, RunOptions, StepOutcome, StepPolicy,
    StepReport, Strategy,
};

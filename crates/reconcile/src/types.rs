//! Core types for resource reconciliation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of provisionable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A virtual server created through a provider API
    Vps,
    /// A containerized application running on a VPS
    App,
    /// A pre-existing server entered by IP address
    Manual,
}

impl ResourceKind {
    /// Whether this resource is a host (something apps can run on)
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Vps | Self::Manual)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vps => write!(f, "vps"),
            Self::App => write!(f, "app"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One provisionable unit, as the record store knows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Stable local identifier
    pub id: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Provider adapter owning this resource ("manual" or empty for external hosts)
    #[serde(default)]
    pub provider_key: String,
    /// Desired shape (server type, tools, container image, ...)
    #[serde(default)]
    pub desired_config: Map<String, Value>,
    /// Last provider response; absent until the resource exists remotely
    #[serde(default)]
    pub observed_state: Option<Value>,
    /// Hosting VPS for apps
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Server the provider accepted but never reported ready.
    ///
    /// Does not count as existing; the next create resumes from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_state: Option<Value>,
}

impl ResourceDescriptor {
    /// Create a descriptor with no desired config and no observed state
    pub fn new(id: impl Into<String>, kind: ResourceKind, provider_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            provider_key: provider_key.into(),
            desired_config: Map::new(),
            observed_state: None,
            parent_id: None,
            pending_state: None,
        }
    }

    /// Set the hosting VPS
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set one desired config entry
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.desired_config.insert(key.into(), value.into());
        self
    }

    /// Set the observed state
    pub fn with_observed(mut self, observed: Value) -> Self {
        self.observed_state = Some(observed);
        self
    }

    /// Whether the provider has confirmed this resource exists
    ///
    /// `null`, `{}`, `[]` and `""` all count as "not created yet".
    pub fn exists_remotely(&self) -> bool {
        match &self.observed_state {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Observed state of an existing resource, else the pending state of an
    /// unfinished create
    pub fn known_remote(&self) -> Option<&Value> {
        if self.exists_remotely() {
            self.observed_state.as_ref()
        } else {
            self.pending_state.as_ref().filter(|v| !v.is_null())
        }
    }

    /// Whether the resource is managed outside any provider API
    pub fn is_externally_managed(&self) -> bool {
        self.kind == ResourceKind::Manual
            || self.provider_key.is_empty()
            || self.provider_key == "manual"
    }

    /// Get a desired config value as a string
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.desired_config.get(key).and_then(Value::as_str)
    }
}

/// Failure isolation policy for a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepPolicy {
    /// A failure blocks the remaining steps of the same resource
    FailFast,
    /// A failure is recorded and the resource's next step still runs
    #[default]
    BestEffort,
}

/// Result of running one batch step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Step completed
    Done { detail: Option<String> },
    /// Step was not run
    Skipped { reason: String },
    /// Step failed
    Failed { error: String, blocking: bool },
}

impl StepOutcome {
    /// Completed without detail
    pub fn done() -> Self {
        Self::Done { detail: None }
    }

    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome blocks the rest of the resource's steps
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Failed { blocking: true, .. })
    }
}

/// One executed step, as reported to the finish callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub label: String,
    pub resource_id: String,
    pub outcome: StepOutcome,
}

/// Summary of a batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Per-step reports in completion order
    pub reports: Vec<StepReport>,
    /// Error messages, prefixed with the step label
    pub errors: Vec<String>,
}

impl BatchSummary {
    /// Check if the batch was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of steps processed
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// Add a report to the summary
    pub fn add_report(&mut self, report: StepReport) {
        match &report.outcome {
            StepOutcome::Done { .. } => self.succeeded += 1,
            StepOutcome::Skipped { .. } => self.skipped += 1,
            StepOutcome::Failed { error, .. } => {
                self.failed += 1;
                self.errors.push(format!("{}: {}", report.label, error));
            }
        }
        self.reports.push(report);
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: BatchSummary) {
        for report in other.reports {
            self.add_report(report);
        }
    }
}

/// Execution strategy for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// One step at a time, in list order
    #[default]
    Sequential,
    /// Independent resources in parallel, each resource's steps in order
    PerResource { jobs: usize },
}

/// Options for a batch run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Report every step as skipped without running it
    pub dry_run: bool,
    pub strategy: Strategy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exists_remotely() {
        let r = ResourceDescriptor::new("1", ResourceKind::Vps, "hetzner");
        assert!(!r.exists_remotely());
        assert!(!r.clone().with_observed(Value::Null).exists_remotely());
        assert!(!r.clone().with_observed(json!({})).exists_remotely());
        assert!(r.with_observed(json!({"id": 42})).exists_remotely());
    }

    #[test]
    fn test_pending_state_is_not_existence() {
        let mut r = ResourceDescriptor::new("1", ResourceKind::Vps, "hetzner");
        assert_eq!(r.known_remote(), None);

        r.pending_state = Some(json!({"id": 42, "status": "initializing"}));
        assert!(!r.exists_remotely());
        assert_eq!(r.known_remote().unwrap()["id"], 42);

        let r = r.with_observed(json!({"id": 42, "status": "running"}));
        assert_eq!(r.known_remote().unwrap()["status"], "running");
    }

    #[test]
    fn test_externally_managed() {
        assert!(ResourceDescriptor::new("1", ResourceKind::Manual, "manual").is_externally_managed());
        assert!(ResourceDescriptor::new("1", ResourceKind::Vps, "").is_externally_managed());
        assert!(!ResourceDescriptor::new("1", ResourceKind::Vps, "vultr").is_externally_managed());
    }

    #[test]
    fn test_summary_counts_and_errors() {
        let mut summary = BatchSummary::default();
        summary.add_report(StepReport {
            label: "a".into(),
            resource_id: "1".into(),
            outcome: StepOutcome::done(),
        });
        summary.add_report(StepReport {
            label: "b".into(),
            resource_id: "1".into(),
            outcome: StepOutcome::Failed {
                error: "boom".into(),
                blocking: false,
            },
        });
        assert_eq!(summary.total(), 2);
        assert!(!summary.is_success());
        assert_eq!(summary.errors, vec!["b: boom".to_string()]);
    }
}

//! Diff computation between desired and previously observed resources

use crate::types::{ResourceDescriptor, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Operations needed to converge infrastructure to the desired state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Resources to create, in `current` order
    pub to_create: Vec<ResourceDescriptor>,
    /// Resources to delete, in `previous` order (apps before their parent VPS)
    pub to_delete: Vec<ResourceDescriptor>,
    /// Ids of apps still desired whose hosting VPS is being deleted
    pub orphaned: Vec<String>,
}

impl Reconciliation {
    /// Check if there is anything to do
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }

    /// Ids of resources to create
    pub fn create_ids(&self) -> Vec<&str> {
        self.to_create.iter().map(|r| r.id.as_str()).collect()
    }

    /// Ids of resources to delete
    pub fn delete_ids(&self) -> Vec<&str> {
        self.to_delete.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Compute the create/delete sets for `current` against `previous`
///
/// Creation is driven by the absence of observed state, not by membership in
/// `previous`. Deletion covers every previous id missing from `current`.
pub fn diff(current: &[ResourceDescriptor], previous: &[ResourceDescriptor]) -> Reconciliation {
    let current_ids: HashSet<&str> = current.iter().map(|r| r.id.as_str()).collect();

    let to_create: Vec<ResourceDescriptor> = current
        .iter()
        .filter(|r| !r.exists_remotely())
        .cloned()
        .collect();

    let removed: Vec<&ResourceDescriptor> = previous
        .iter()
        .filter(|r| !current_ids.contains(r.id.as_str()))
        .collect();

    let to_delete = order_deletions(&removed);

    let deleted_hosts: HashSet<&str> = to_delete
        .iter()
        .filter(|r| r.kind.is_host())
        .map(|r| r.id.as_str())
        .collect();

    let orphaned = current
        .iter()
        .filter(|r| r.kind == ResourceKind::App)
        .filter(|r| {
            r.parent_id
                .as_deref()
                .is_some_and(|p| deleted_hosts.contains(p))
        })
        .map(|r| r.id.clone())
        .collect();

    Reconciliation {
        to_create,
        to_delete,
        orphaned,
    }
}

/// Keep `previous` order, but pull each deleted app in front of its deleted parent
fn order_deletions(removed: &[&ResourceDescriptor]) -> Vec<ResourceDescriptor> {
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(removed.len());

    for resource in removed {
        if emitted.contains(resource.id.as_str()) {
            continue;
        }

        if resource.kind.is_host() {
            for child in removed.iter().filter(|c| {
                c.kind == ResourceKind::App && c.parent_id.as_deref() == Some(resource.id.as_str())
            }) {
                if emitted.insert(child.id.as_str()) {
                    ordered.push((*child).clone());
                }
            }
        }

        emitted.insert(resource.id.as_str());
        ordered.push((*resource).clone());
    }

    ordered
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of VPS/manual hosts to create
    pub host_creates: usize,
    /// Number of apps to create
    pub app_creates: usize,
    /// Number of resources to delete
    pub deletions: usize,
    /// Number of orphaned apps
    pub orphans: usize,
}

impl DiffSummary {
    /// Create a summary from a reconciliation
    pub fn from_reconciliation(rec: &Reconciliation) -> Self {
        let app_creates = rec
            .to_create
            .iter()
            .filter(|r| r.kind == ResourceKind::App)
            .count();
        Self {
            host_creates: rec.to_create.len() - app_creates,
            app_creates,
            deletions: rec.to_delete.len(),
            orphans: rec.orphaned.len(),
        }
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.host_creates + self.app_creates + self.deletions
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vps(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(id, ResourceKind::Vps, "hetzner")
            .with_config("server_type", "cx11_fsn1")
    }

    fn app(id: &str, parent: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(id, ResourceKind::App, "").with_parent(parent)
    }

    fn created(r: ResourceDescriptor) -> ResourceDescriptor {
        let id = r.id.clone();
        r.with_observed(json!({ "id": id }))
    }

    #[test]
    fn test_new_resource_is_created() {
        let current = vec![vps("1")];
        let rec = diff(&current, &[]);
        assert_eq!(rec.create_ids(), vec!["1"]);
        assert!(rec.to_delete.is_empty());
    }

    #[test]
    fn test_rediff_after_create_is_idempotent() {
        let current = vec![vps("1")];
        let rec = diff(&current, &[]);
        assert_eq!(rec.create_ids(), vec!["1"]);

        let after: Vec<_> = current.into_iter().map(created).collect();
        let rec = diff(&after, &after);
        assert!(rec.to_create.is_empty());
        assert!(rec.to_delete.is_empty());
        assert!(rec.is_empty());
    }

    #[test]
    fn test_removed_resource_is_deleted_once() {
        let current = vec![vps("2")];
        let previous = vec![created(vps("5")), created(vps("2"))];
        let rec = diff(&current, &previous);
        assert_eq!(rec.delete_ids(), vec!["5"]);
    }

    #[test]
    fn test_unfinished_create_is_created_again() {
        let mut pending = vps("4");
        pending.pending_state = Some(json!({ "id": 4, "status": "initializing" }));
        let rec = diff(&[pending.clone()], &[pending]);
        assert_eq!(rec.create_ids(), vec!["4"]);
    }

    #[test]
    fn test_creation_ignores_previous_membership() {
        // Present in both snapshots but never created: still a create
        let current = vec![vps("3")];
        let previous = vec![vps("3")];
        let rec = diff(&current, &previous);
        assert_eq!(rec.create_ids(), vec!["3"]);
        assert!(rec.to_delete.is_empty());
    }

    #[test]
    fn test_create_order_follows_current() {
        let current = vec![vps("b"), created(vps("x")), vps("a"), app("c", "b")];
        let rec = diff(&current, &[]);
        assert_eq!(rec.create_ids(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_apps_deleted_before_parent() {
        let previous = vec![
            created(vps("v1")),
            created(vps("v2")),
            created(app("a1", "v1")),
            created(app("a2", "v2")),
        ];
        let rec = diff(&[], &previous);
        assert_eq!(rec.delete_ids(), vec!["a1", "v1", "a2", "v2"]);
    }

    #[test]
    fn test_surviving_app_of_deleted_vps_is_orphaned() {
        let previous = vec![created(vps("v1")), created(app("a1", "v1"))];
        let current = vec![created(app("a1", "v1"))];
        let rec = diff(&current, &previous);
        assert_eq!(rec.delete_ids(), vec!["v1"]);
        assert_eq!(rec.orphaned, vec!["a1".to_string()]);
    }

    #[test]
    fn test_every_missing_previous_appears_exactly_once() {
        let previous: Vec<_> = (0..20)
            .map(|i| {
                if i % 3 == 0 {
                    created(app(&format!("app{i}"), &format!("vps{}", i + 1)))
                } else {
                    created(vps(&format!("vps{i}")))
                }
            })
            .collect();
        let current: Vec<_> = previous.iter().step_by(2).cloned().collect();
        let rec = diff(&current, &previous);

        for r in &previous {
            let in_current = current.iter().any(|c| c.id == r.id);
            let count = rec.to_delete.iter().filter(|d| d.id == r.id).count();
            assert_eq!(count, usize::from(!in_current), "resource {}", r.id);
        }
        assert!(rec.to_create.is_empty());
    }

    #[test]
    fn test_diff_summary() {
        let current = vec![vps("1"), app("2", "1")];
        let previous = vec![created(vps("9"))];
        let summary = DiffSummary::from_reconciliation(&diff(&current, &previous));
        assert_eq!(summary.host_creates, 1);
        assert_eq!(summary.app_creates, 1);
        assert_eq!(summary.deletions, 1);
        assert!(summary.has_changes());
    }
}

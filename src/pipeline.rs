//! Provisioning pipeline: turns a reconciliation into ordered batch steps.
//!
//! Per host the order is fixed: create, package index update, package
//! upgrade, SSH hardening, shell, Docker, login user, DDEV, then the reverse
//! proxy when virtual hosts are declared. Creation is fail-fast; every later
//! step is best-effort.
//!
//! App steps are bound to the hosting VPS so they run after it is created
//! and are skipped when it is unreachable.

use anyhow::{Context, Result};
use reconcile::{BatchStep, Reconciliation, ResourceDescriptor, ResourceKind};
use std::collections::HashSet;

use crate::desired::{ToolSet, vhosts_of};

/// Operation carried out by [`crate::handler::DevboxHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateVps,
    /// Record the address of a manual host
    RegisterHost,
    UpdatePackages,
    UpgradePackages,
    HardenSsh,
    InstallShell,
    InstallDocker,
    CreateUser,
    InstallDevEnv,
    InstallProxy,
    SyncVhosts,
    DeleteVps,
    CreateApp(String),
    DeleteApp(String),
    CleanupApp(String),
}

impl Op {
    /// Progress label for a step on `id`
    pub fn label(&self, id: &str) -> String {
        let what = match self {
            Op::CreateVps => "VPS created",
            Op::RegisterHost => "Host registered",
            Op::UpdatePackages => "OS package info updated",
            Op::UpgradePackages => "OS system upgraded",
            Op::HardenSsh => "SSH configs updated",
            Op::InstallShell => "OhMyBASH! installed",
            Op::InstallDocker => "Docker installed",
            Op::CreateUser => "User created",
            Op::InstallDevEnv => "DDEV installed",
            Op::InstallProxy => "Reverse proxy installed",
            Op::SyncVhosts => "Virtual hosts synced",
            Op::DeleteVps => "VPS deleted",
            Op::CreateApp(_) => "App created",
            Op::DeleteApp(_) => "App deleted",
            Op::CleanupApp(_) => "App cleanup",
        };
        format!("{what} (id: {id})")
    }
}

/// Steps that bring a new host to its desired configuration
pub fn vps_steps(resource: &ResourceDescriptor) -> Result<Vec<BatchStep<Op>>> {
    let tools = ToolSet::from_descriptor(resource)?;
    let vhosts = vhosts_of(resource)?;
    let id = resource.id.as_str();

    let create = if resource.kind == ResourceKind::Manual {
        Op::RegisterHost
    } else {
        Op::CreateVps
    };
    let mut steps = vec![BatchStep::fail_fast(create.label(id), id, create)];

    let mut push = |enabled: bool, op: Op| {
        if enabled {
            steps.push(BatchStep::new(op.label(id), id, op));
        }
    };
    push(tools.package_updates, Op::UpdatePackages);
    push(tools.package_upgrades, Op::UpgradePackages);
    push(true, Op::HardenSsh);
    push(tools.shell_customization, Op::InstallShell);
    push(tools.docker_engine, Op::InstallDocker);
    push(true, Op::CreateUser);
    push(tools.dev_environment, Op::InstallDevEnv);
    let proxy = tools.docker_engine && !vhosts.is_empty();
    push(proxy, Op::InstallProxy);
    push(proxy, Op::SyncVhosts);

    Ok(steps)
}

/// Steps that start an app on its host
pub fn app_steps(resource: &ResourceDescriptor) -> Result<Vec<BatchStep<Op>>> {
    let host = parent_of(resource)?;
    let op = Op::CreateApp(resource.id.clone());
    Ok(vec![BatchStep::new(op.label(&resource.id), host, op)])
}

/// Steps that remove a resource
pub fn delete_steps(resource: &ResourceDescriptor) -> Result<Vec<BatchStep<Op>>> {
    let id = resource.id.as_str();
    if resource.kind == ResourceKind::App {
        let host = parent_of(resource)?;
        let delete = Op::DeleteApp(id.to_string());
        let cleanup = Op::CleanupApp(id.to_string());
        return Ok(vec![
            BatchStep::new(delete.label(id), host, delete),
            BatchStep::new(cleanup.label(id), host, cleanup),
        ]);
    }
    Ok(vec![BatchStep::new(Op::DeleteVps.label(id), id, Op::DeleteVps)])
}

fn parent_of(resource: &ResourceDescriptor) -> Result<&str> {
    resource
        .parent_id
        .as_deref()
        .with_context(|| format!("App {} has no hosting VPS", resource.id))
}

/// Full batch: deletions first, then creations.
///
/// Apps whose host is being deleted are not started.
pub fn plan(reconciliation: &Reconciliation) -> Result<Vec<BatchStep<Op>>> {
    let orphaned: HashSet<&str> = reconciliation.orphaned.iter().map(String::as_str).collect();
    let mut steps = Vec::new();

    for resource in &reconciliation.to_delete {
        steps.extend(delete_steps(resource)?);
    }

    for resource in &reconciliation.to_create {
        match resource.kind {
            ResourceKind::Vps | ResourceKind::Manual => steps.extend(vps_steps(resource)?),
            ResourceKind::App if orphaned.contains(resource.id.as_str()) => {
                log::warn!("Not starting {}: its VPS is being deleted", resource.id);
            }
            ResourceKind::App => steps.extend(app_steps(resource)?),
        }
    }

    Ok(steps)
}

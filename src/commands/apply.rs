use anyhow::{Context as _, Result};
use colored::Colorize;
use reconcile::{
    BatchStep, BatchSummary, DiffSummary, FinishCallback, LogProgress, Reconciliation,
    ResourceDescriptor, ResourceKind, RunOptions, StepHandler, StepOutcome, Strategy, diff,
};
use sshkit::RemoteExecutor;
use std::collections::HashSet;
use std::sync::Arc;
use vpskit::ProviderRegistry;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands;
use crate::credential::Credential;
use crate::handler::DevboxHandler;
use crate::pipeline::{self, Op};
use crate::progress::BarProgress;
use crate::store::{FileStore, RecordStore};
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    if !ctx.quiet {
        ui::header("Applying Desired State");
    }
    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let config = ctx.load_config()?;
    let desired = commands::desired_resources(&config)?;
    let store = Arc::new(FileStore::open_default()?);

    // Previous snapshot is read before anything is written back
    let previous = store.records();
    let current = commands::with_observed_state(desired, &previous);
    let reconciliation = diff(&current, &previous);
    let steps = pipeline::plan(&reconciliation)?;

    display_plan(&reconciliation);

    if reconciliation.is_empty() {
        if !args.dry_run {
            record_desired(store.as_ref(), &current)?;
        }
        return Ok(());
    }

    let jobs = args.jobs.unwrap_or(config.provisioning.jobs).max(1);
    let opts = RunOptions {
        dry_run: args.dry_run,
        strategy: if jobs > 1 {
            Strategy::PerResource { jobs }
        } else {
            Strategy::Sequential
        },
    };

    if args.dry_run {
        execute(ctx, &steps, &Preview, &opts)?;
        return Ok(());
    }

    // No provider or host is contacted without a usable key pair
    let (private_path, public_path) = config.credential_paths()?;
    let credential = match Credential::load(&private_path, &public_path) {
        Ok(credential) => credential,
        Err(e) => {
            ui::error(&e.to_string());
            ui::dim(e.advice());
            return Err(e.into());
        }
    };

    if !args.yes && console::user_attended() && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(());
    }

    record_desired(store.as_ref(), &current)?;

    let executor = RemoteExecutor::new()
        .with_retry(config.ssh.retry())
        .with_port(config.ssh.port);
    let handler = DevboxHandler::new(
        ProviderRegistry::with_defaults(),
        config,
        executor,
        store.clone(),
        credential,
    );
    if ctx.verbose > 0 {
        ui::kv("Remote login", handler.login());
        ui::kv("Steps", &steps.len().to_string());
    }

    let summary = execute(ctx, &steps, &handler, &opts)?;
    if !summary.is_success() {
        anyhow::bail!("{} of {} steps failed", summary.failed, summary.total());
    }
    Ok(())
}

fn execute<H: StepHandler<Op>>(
    ctx: &Context,
    steps: &[BatchStep<Op>],
    handler: &H,
    opts: &RunOptions,
) -> Result<BatchSummary> {
    let mut finish = SummaryPrinter {
        dry_run: opts.dry_run,
    };
    if ctx.quiet {
        reconcile::run(steps, handler, opts, &mut LogProgress, &mut finish)
    } else {
        reconcile::run(steps, handler, opts, &mut BarProgress::new(), &mut finish)
    }
}

fn record_desired(store: &dyn RecordStore, current: &[ResourceDescriptor]) -> Result<()> {
    for resource in current {
        store.put(resource.clone());
    }
    store.save().context("Failed to save resource records")
}

fn describe(resource: &ResourceDescriptor) -> String {
    match resource.kind {
        ResourceKind::Vps => format!(
            "(vps on {}, {})",
            resource.provider_key,
            resource.config_str("server_type").unwrap_or("?")
        ),
        ResourceKind::Manual => format!(
            "(manual host {})",
            resource.config_str("ip").unwrap_or("?")
        ),
        ResourceKind::App => format!(
            "(app on {}, {})",
            resource.parent_id.as_deref().unwrap_or("?"),
            resource.config_str("image").unwrap_or("?")
        ),
    }
}

fn display_plan(reconciliation: &Reconciliation) {
    let counts = DiffSummary::from_reconciliation(reconciliation);
    if !counts.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Plan".bold()
    );
    println!("│");
    for resource in &reconciliation.to_delete {
        println!("│  {} {} {}", "-".red(), resource.id, describe(resource).dimmed());
    }
    for resource in &reconciliation.to_create {
        println!("│  {} {} {}", "+".green(), resource.id, describe(resource).dimmed());
    }
    for id in &reconciliation.orphaned {
        println!(
            "│  {} {} {}",
            "⚠".yellow(),
            id,
            "hosting VPS is being deleted; the app will not be started".dimmed()
        );
    }
    println!("│");
    println!(
        "│  {} to create ({} hosts, {} apps), {} to delete",
        counts.host_creates + counts.app_creates,
        counts.host_creates,
        counts.app_creates,
        counts.deletions
    );
    println!("└──────────────────────────────────────────────────┘");
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}

/// Stands in for the real handler when nothing may be executed
struct Preview;

impl StepHandler<Op> for Preview {
    fn run_step(&self, _step: &BatchStep<Op>) -> Result<StepOutcome> {
        Ok(StepOutcome::Skipped {
            reason: "Dry run".to_string(),
        })
    }
}

struct SummaryPrinter {
    dry_run: bool,
}

impl FinishCallback<Op> for SummaryPrinter {
    fn finished(&mut self, success: bool, summary: &BatchSummary, steps: &[BatchStep<Op>]) {
        let resources: HashSet<&str> = steps.iter().map(|s| s.resource_id.as_str()).collect();

        println!();
        if self.dry_run {
            println!(
                "  {} {} steps would run on {} resources",
                "ℹ".blue(),
                steps.len(),
                resources.len()
            );
            return;
        }

        if success {
            println!("  {} Desired state applied", "✓".green().bold());
        } else {
            println!("  {} Desired state applied with errors", "⚠".yellow().bold());
        }

        if summary.succeeded > 0 {
            println!("    • {} steps succeeded", summary.succeeded);
        }
        if summary.skipped > 0 {
            println!("    • {} steps skipped", summary.skipped);
        }
        if summary.failed > 0 {
            println!("    • {} {} failed", summary.failed, "steps".red());
            for error in &summary.errors {
                println!("      {} {}", "✗".red(), error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observed_state_drives_the_diff() {
        let desired = vec![
            ResourceDescriptor::new("web", ResourceKind::Vps, "hetzner"),
            ResourceDescriptor::new("new", ResourceKind::Vps, "vultr"),
        ];
        let previous = vec![
            ResourceDescriptor::new("web", ResourceKind::Vps, "hetzner").with_observed(json!({"id": 1})),
            ResourceDescriptor::new("gone", ResourceKind::Vps, "hetzner").with_observed(json!({"id": 2})),
        ];

        let current = commands::with_observed_state(desired, &previous);
        assert!(current[0].exists_remotely());
        assert!(!current[1].exists_remotely());

        let rec = diff(&current, &previous);
        assert_eq!(rec.create_ids(), vec!["new"]);
        assert_eq!(rec.delete_ids(), vec!["gone"]);
    }

    #[test]
    fn test_describe() {
        let app = ResourceDescriptor::new("a", ResourceKind::App, "")
            .with_parent("web")
            .with_config("image", "nginx");
        assert_eq!(describe(&app), "(app on web, nginx)");

        let manual = ResourceDescriptor::new("m", ResourceKind::Manual, "manual")
            .with_config("ip", "10.0.0.1");
        assert_eq!(describe(&manual), "(manual host 10.0.0.1)");
    }

    #[test]
    fn test_preview_never_fails() {
        let steps = vec![BatchStep::new("x", "1", Op::HardenSsh)];
        let summary = reconcile::run_simple(&steps, &Preview).unwrap();
        assert_eq!(summary.skipped, 1);
    }
}

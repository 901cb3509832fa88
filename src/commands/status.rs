use anyhow::Result;
use colored::Colorize;
use reconcile::{DiffSummary, ResourceDescriptor, diff};
use vpskit::{KeyHandleStore, ProviderRegistry};

use crate::Context;
use crate::commands;
use crate::config::DevboxConfig;
use crate::store::{FileStore, RecordStore};
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let store = FileStore::open_default()?;

    ui::header("DevBox Status");
    ui::kv("Desired state", &config.desired_state_path()?.display().to_string());
    ui::kv("Records", &store.path().display().to_string());
    ui::kv(
        "Last saved",
        &store.updated_at().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    let records = store.records();
    show_records(&config, &records, ctx.verbose > 0);

    // A broken desired-state file should not hide what is already recorded
    match commands::desired_resources(&config) {
        Ok(desired) => show_pending(desired, &records),
        Err(e) => {
            ui::section("Pending");
            ui::warn(&format!("Desired state is invalid: {e:#}"));
        }
    }

    ui::section("SSH Keys");
    let mut any = false;
    for provider in ProviderRegistry::with_defaults().keys() {
        if let Some(handle) = store.key_handle(provider) {
            any = true;
            println!("  {:<14} {} {}", provider, handle.name, handle.id.dimmed());
        }
    }
    if !any {
        ui::dim("No keys uploaded");
    }

    println!();
    Ok(())
}

fn show_records(config: &DevboxConfig, records: &[ResourceDescriptor], verbose: bool) {
    ui::section("Resources");
    let registry = ProviderRegistry::with_defaults();
    if records.is_empty() {
        ui::dim("Nothing recorded yet. Run `devbox apply`.");
        return;
    }

    for record in records {
        let (mark, state) = if record.exists_remotely() {
            ("●".green(), "created".green())
        } else if record.pending_state.is_some() {
            ("◐".yellow(), "starting".yellow())
        } else {
            ("○".yellow(), "pending".yellow())
        };
        let location = match &record.parent_id {
            Some(parent) => format!("on {parent}"),
            None => record.provider_key.clone(),
        };
        println!(
            "  {} {:<20} {:<6} {:<14} {}{}",
            mark,
            record.id,
            record.kind.to_string(),
            location,
            state,
            address(&registry, config, record)
                .map(|a| format!(" {}", a.dimmed()))
                .unwrap_or_default()
        );
        if verbose {
            if let Some(remote) = record.known_remote() {
                ui::dim(&format!("    {remote}"));
            }
        }
    }
}

/// Public address of a created host, as its provider reports it
fn address(
    registry: &ProviderRegistry,
    config: &DevboxConfig,
    record: &ResourceDescriptor,
) -> Option<String> {
    if !record.kind.is_host() {
        return None;
    }
    let observed = record.observed_state.as_ref()?;
    let adapter = registry
        .create(&record.provider_key, &config.provider_settings(&record.provider_key))
        .ok()?;
    adapter.public_address(observed)
}

fn show_pending(desired: Vec<ResourceDescriptor>, records: &[ResourceDescriptor]) {
    ui::section("Pending");

    let current = commands::with_observed_state(desired, records);
    let rec = diff(&current, records);
    let counts = DiffSummary::from_reconciliation(&rec);
    if !counts.has_changes() {
        println!("  {} Up to date", "✓".green());
        return;
    }

    for id in rec.create_ids() {
        println!("  {} {}", "+".green(), id);
    }
    for id in rec.delete_ids() {
        println!("  {} {}", "-".red(), id);
    }
    println!();
    ui::dim(&format!(
        "{} change(s): {} hosts and {} apps to create, {} to delete. Run `devbox apply`.",
        counts.total(),
        counts.host_creates,
        counts.app_creates,
        counts.deletions
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::ResourceKind;
    use serde_json::json;

    #[test]
    fn test_address() {
        let registry = ProviderRegistry::with_defaults();
        let config = DevboxConfig::default();

        let manual = ResourceDescriptor::new("m", ResourceKind::Manual, "manual")
            .with_observed(json!({"ip": "10.0.0.1"}));
        assert_eq!(address(&registry, &config, &manual).as_deref(), Some("10.0.0.1"));

        let pending = ResourceDescriptor::new("p", ResourceKind::Vps, "hetzner");
        assert_eq!(address(&registry, &config, &pending), None);

        let app = ResourceDescriptor::new("a", ResourceKind::App, "")
            .with_parent("m")
            .with_observed(json!({"host": "m"}));
        assert_eq!(address(&registry, &config, &app), None);
    }
}

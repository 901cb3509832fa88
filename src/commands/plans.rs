use anyhow::{Context as _, Result};
use colored::Colorize;
use vpskit::{ProviderRegistry, ServerType};

use crate::Context;
use crate::progress;
use crate::ui;

pub fn run(ctx: &Context, provider: &str, filter: Option<&str>) -> Result<()> {
    let config = ctx.load_config()?;
    let registry = ProviderRegistry::with_defaults();
    if !registry.contains(provider) {
        anyhow::bail!(
            "Unknown provider '{}' (available: {})",
            provider,
            registry.keys().join(", ")
        );
    }

    let adapter = registry.create(provider, &config.provider_settings(provider))?;

    let pb = progress::spinner(&format!("Fetching plans from {}...", adapter.display_name()));
    let listed = adapter.list_server_types();
    pb.finish_and_clear();

    let types = match listed {
        Ok(types) => types,
        Err(e) => {
            ui::error(&format!("{} ({})", e, e.category().description()));
            ui::dim(e.category().advice());
            return Err(e).with_context(|| format!("Failed to list plans from {provider}"));
        }
    };

    let shown = filter_types(&types, filter);

    if !ctx.quiet {
        ui::header(&format!("{} Server Types", adapter.display_name()));
    }
    if shown.is_empty() {
        ui::info("No server types match");
        return Ok(());
    }

    let key_width = shown.iter().map(|t| t.key.len()).max().unwrap_or(0);
    let location_width = shown.iter().map(|t| t.location.len()).max().unwrap_or(0);
    for server_type in &shown {
        println!(
            "  {:<kw$}  {:<lw$}  {:>18}  {}",
            server_type.key.cyan(),
            server_type.location,
            server_type.price_label,
            server_type.specs.dimmed(),
            kw = key_width,
            lw = location_width,
        );
    }

    if !ctx.quiet {
        println!();
        ui::dim(&format!(
            "{} of {} shown. Use the first column as server_type in the desired state.",
            shown.len(),
            types.len()
        ));
    }
    Ok(())
}

/// Case-insensitive substring match over key, location and specs
fn filter_types<'a>(types: &'a [ServerType], filter: Option<&str>) -> Vec<&'a ServerType> {
    let needle = filter.map(str::to_lowercase);
    types
        .iter()
        .filter(|t| match &needle {
            Some(n) => [&t.key, &t.location, &t.specs]
                .iter()
                .any(|field| field.to_lowercase().contains(n.as_str())),
            None => true,
        })
        .collect()
}

use anyhow::Result;
use colored::Colorize;
use reconcile::ResourceDescriptor;

use crate::Context;
use crate::caddy;
use crate::cli::CaddyCommand;
use crate::commands;
use crate::desired::{VirtualHost, vhosts_of};
use crate::ui;

pub fn run(ctx: &Context, cmd: CaddyCommand) -> Result<()> {
    match cmd {
        CaddyCommand::Preview { vps } => preview(ctx, vps.as_deref()),
    }
}

fn preview(ctx: &Context, vps: Option<&str>) -> Result<()> {
    let config = ctx.load_config()?;
    let resources = commands::desired_resources(&config)?;
    let hosts = select_hosts(&resources, vps)?;

    if hosts.is_empty() {
        ui::info("No VPS declares virtual hosts");
        return Ok(());
    }

    let global = caddy::render(&caddy::global_config(&config.operator, &config.proxy), 0);

    for (host, vhosts) in hosts {
        ui::header(&format!("{} ({} virtual hosts)", host.id, vhosts.len()));

        println!("{}", format!("# {}/Caddyfile", caddy::CADDY_DIR).dimmed());
        println!("{global}");

        for vhost in &vhosts {
            println!();
            println!("{}", format!("# {}", caddy::site_path(vhost)).dimmed());
            println!("{}", caddy::render(&caddy::site_config(vhost), 0));
        }

        if ctx.verbose > 0 {
            ui::section("Commands");
            for command in caddy::install_commands(&config.operator, &config.proxy)
                .iter()
                .chain(caddy::vhost_commands(&vhosts).iter())
            {
                ui::dim(command);
            }
        }
    }
    Ok(())
}

/// Hosts with at least one virtual host, or the single requested one
fn select_hosts<'a>(
    resources: &'a [ResourceDescriptor],
    vps: Option<&str>,
) -> Result<Vec<(&'a ResourceDescriptor, Vec<VirtualHost>)>> {
    let mut selected = Vec::new();
    for resource in resources.iter().filter(|r| r.kind.is_host()) {
        if vps.is_some_and(|id| id != resource.id) {
            continue;
        }
        let vhosts = vhosts_of(resource)?;
        if !vhosts.is_empty() {
            selected.push((resource, vhosts));
        }
    }

    if let Some(id) = vps {
        if !resources.iter().any(|r| r.id == id && r.kind.is_host()) {
            anyhow::bail!("No VPS '{}' in the desired state", id);
        }
    }
    Ok(selected)
}

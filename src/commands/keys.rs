use anyhow::Result;
use colored::Colorize;
use vpskit::{KeyHandleStore, ProviderRegistry};

use crate::Context;
use crate::cli::KeysCommand;
use crate::credential::{self, Credential};
use crate::store::FileStore;
use crate::ui;

pub fn run(ctx: &Context, cmd: KeysCommand) -> Result<()> {
    match cmd {
        KeysCommand::Generate { force } => generate(ctx, force),
        KeysCommand::Upload { provider } => upload(ctx, &provider),
        KeysCommand::Show => show(ctx),
    }
}

fn generate(ctx: &Context, force: bool) -> Result<()> {
    let config = ctx.load_config()?;
    let (private_path, _) = config.credential_paths()?;
    let comment = if config.operator.email.is_empty() {
        credential::key_name(&config.operator.id)
    } else {
        config.operator.email.clone()
    };

    let public_path = Credential::generate(&private_path, &comment, force)?;

    ui::success("Key pair generated");
    ui::kv("Private", &private_path.display().to_string());
    ui::kv("Public", &public_path.display().to_string());
    if force {
        ui::dim("Uploaded copies are replaced on the next apply or `devbox keys upload`");
    }
    Ok(())
}

fn upload(ctx: &Context, provider: &str) -> Result<()> {
    let config = ctx.load_config()?;
    let (private_path, public_path) = config.credential_paths()?;
    let credential = match Credential::load(&private_path, &public_path) {
        Ok(credential) => credential,
        Err(e) => {
            ui::error(&e.to_string());
            ui::dim(e.advice());
            return Err(e.into());
        }
    };

    let registry = ProviderRegistry::with_defaults();
    let adapter = registry.create(provider, &config.provider_settings(provider))?;
    let store = FileStore::open_default()?;

    let name = credential::key_name(&config.operator.id);
    match adapter.upload_key(&store, &name, &credential.public_key) {
        Ok(handle) => {
            ui::success(&format!(
                "Key {} available on {} (id: {})",
                handle.name,
                adapter.display_name(),
                handle.id
            ));
            Ok(())
        }
        Err(e) => {
            ui::error(&e.to_string());
            ui::dim(e.category().advice());
            Err(e.into())
        }
    }
}

fn show(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let (private_path, public_path) = config.credential_paths()?;

    ui::header("Operator Key");
    ui::kv("Private", &private_path.display().to_string());
    ui::kv("Public", &public_path.display().to_string());

    let public_key = match Credential::load(&private_path, &public_path) {
        Ok(credential) => {
            ui::kv("Status", &"ok".green().to_string());
            if ctx.verbose > 0 {
                ui::kv("Key", &credential.public_key);
            }
            Some(credential.public_key)
        }
        Err(e) => {
            ui::kv("Status", &e.reason.red().to_string());
            ui::dim(e.advice());
            None
        }
    };

    let store = FileStore::open_default()?;
    ui::section("Uploaded");
    let registry = ProviderRegistry::with_defaults();
    let mut any = false;
    for provider in registry.keys() {
        let Some(handle) = store.key_handle(provider) else {
            continue;
        };
        any = true;
        let state = match &public_key {
            Some(pk) if handle.matches(pk) => "current".green(),
            Some(_) => "stale".yellow(),
            None => "unknown".dimmed(),
        };
        println!("  {:<14} {} ({})", provider, handle.id, state);
    }
    if !any {
        ui::dim("Not uploaded anywhere yet");
    }
    Ok(())
}

mod app;
mod caddy;
mod cli;
mod commands;
mod config;
mod credential;
mod desired;
mod handler;
mod paths;
mod pipeline;
mod progress;
mod runner;
mod scripts;
mod store;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

use config::DevboxConfig;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Config file given on the command line
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load the config file, honoring `--config`
    pub fn load_config(&self) -> Result<DevboxConfig> {
        match &self.config_path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                DevboxConfig::load_from(path)
            }
            None => DevboxConfig::load(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: cli.config,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Status => commands::status::run(&ctx),
        Command::Plans { provider, filter } => {
            commands::plans::run(&ctx, &provider, filter.as_deref())
        }
        Command::Keys(cmd) => commands::keys::run(&ctx, cmd),
        Command::Caddy(cmd) => commands::proxy::run(&ctx, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "devbox", &mut io::stdout());
            Ok(())
        }
    }
}

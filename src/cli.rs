use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "devbox")]
#[command(author = "DevBox Contributors")]
#[command(version)]
#[command(about = "Provision developer VPS instances and containerized apps", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/devbox/config.toml)
    #[arg(short, long, global = true, env = "DEVBOX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create and delete resources until infrastructure matches the desired state
    Apply(ApplyArgs),

    /// Show recorded resources and pending changes
    Status,

    /// List a provider's server types, cheapest first
    Plans {
        /// Provider key: hetzner, digitalocean, vultr or linode
        provider: String,

        /// Only show entries containing this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Manage the operator SSH key pair
    #[command(subcommand)]
    Keys(KeysCommand),

    /// Inspect generated reverse-proxy configuration
    #[command(subcommand)]
    Caddy(CaddyCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Show the steps without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Resources provisioned in parallel (overrides the config file)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Keys
// ============================================================================

#[derive(Subcommand)]
pub enum KeysCommand {
    /// Generate a new RSA key pair with ssh-keygen
    Generate {
        /// Replace an existing key pair
        #[arg(short, long)]
        force: bool,
    },

    /// Upload the public key to a provider (no-op when already uploaded)
    Upload {
        /// Provider key
        provider: String,
    },

    /// Show key paths and uploaded handles
    Show,
}

// ============================================================================
// Caddy
// ============================================================================

#[derive(Subcommand)]
pub enum CaddyCommand {
    /// Print the Caddyfile and site files a VPS would get
    Preview {
        /// VPS id (default: every VPS declaring virtual hosts)
        vps: Option<String>,
    },
}

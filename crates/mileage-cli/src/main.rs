//! Mileage CLI
//!
//! Terminal front-end for the loyalty program: operator review portal and
//! member app.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use mileage_cli::admin_cmd::{self, AdminAction};
use mileage_cli::auth_cmd::{self, AuthAction};
use mileage_cli::context::AppContext;
use mileage_cli::member_cmd::{self, MemberAction};
use mileage_cli::upload_cmd::{self, Resource};
use mileage_core::config::{global_config_path, load_config_with};
use mileage_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "mileage")]
#[command(version, about = "Loyalty program CLI", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Settings file (defaults to the global settings.json)
    #[arg(long, global = true, env = "MILEAGE_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and out.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Review portal.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Member app.
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },
    /// Upload a document to the media host.
    Upload {
        /// File to upload.
        file: PathBuf,
        /// Resource type.
        #[arg(short, long, value_enum, default_value_t)]
        resource: Resource,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = cli.settings.or_else(global_config_path);
    let config = load_config_with(settings.as_deref(), |key| std::env::var(key).ok())?;
    init_tracing(&default_filter(&config.log_level), cli.json_logs);
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        "Configuration loaded"
    );

    let ctx = AppContext::load(config);
    match cli.command {
        Commands::Auth { action } => auth_cmd::run(action, &ctx).await,
        Commands::Admin { action } => admin_cmd::run(action, &ctx).await,
        Commands::Member { action } => member_cmd::run(action, &ctx).await,
        Commands::Upload { file, resource } => upload_cmd::run(file, resource, &ctx).await,
    }
}

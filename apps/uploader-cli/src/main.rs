//! AppVault uploader entry point.

mod app;
mod config;

use std::path::PathBuf;

use appvault_protocol::Platform;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "appvault",
    version,
    about = "Upload APK and IPA builds to an AppVault server"
)]
struct Cli {
    /// Path to the uploader.toml configuration file
    #[arg(long, short = 'c', env = "APPVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Server base URL (overrides the config file)
    #[arg(long, env = "APPVAULT_SERVER_URL")]
    server_url: Option<String>,

    /// API key sent as X-API-Key (overrides the config file)
    #[arg(long, env = "APPVAULT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a build in chunks and commit it as a new version
    Upload {
        /// APK or IPA file
        file: PathBuf,

        /// Application identifier, e.g. com.example.app
        #[arg(long)]
        app: String,

        /// Semantic version (major.minor.patch)
        #[arg(long)]
        version: String,

        #[arg(long, default_value_t = 1)]
        version_code: u32,

        /// android or ios (inferred from the extension when omitted)
        #[arg(long)]
        platform: Option<Platform>,

        /// Mark the version as a mandatory update
        #[arg(long)]
        mandatory: bool,

        /// Changelog entry (repeatable)
        #[arg(long)]
        changelog: Vec<String>,
    },

    /// Check that the server is reachable
    Health,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = config::Config::load(cli.config.as_deref())?;
    config.apply_overrides(cli.server_url, cli.api_key);
    tracing::debug!(server_url = %config.server_url, "configuration ready");

    match cli.command {
        Commands::Upload {
            file,
            app,
            version,
            version_code,
            platform,
            mandatory,
            changelog,
        } => {
            let args = app::UploadArgs {
                file,
                app,
                version,
                version_code,
                platform,
                mandatory,
                changelog,
            };
            app::upload(&config, args).await
        }
        Commands::Health => app::health(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => app::show_config(&config, cli.config.as_deref()),
    }
}

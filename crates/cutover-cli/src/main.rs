use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cutover",
    about = "Cutover — zero-downtime blue/green deployment for the inference service",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy an artifact to the standby slot and switch traffic to it.
    ///
    /// Registry, region, tracking endpoint, and the notification
    /// channel are read from the environment (CUTOVER_REGISTRY,
    /// AWS_REGION, MLFLOW_TRACKING_URI, CUTOVER_NOTIFY_URL, ...).
    Deploy {
        /// Image tag or digest to deploy.
        #[arg(default_value = "latest")]
        artifact: String,
        /// Path to the cutover config file.
        #[arg(short, long, default_value = "cutover.toml")]
        config: PathBuf,
        /// Extra KEY=VALUE environment for the launched instance, repeatable.
        #[arg(short, long = "env")]
        env: Vec<String>,
        /// Extra volume binding (host:container), repeatable.
        #[arg(short, long = "volume")]
        volume: Vec<String>,
    },
    /// Show which slot is active and whether its instance is healthy.
    Status {
        /// Path to the cutover config file.
        #[arg(short, long, default_value = "cutover.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so stdout stays scriptable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy {
            artifact,
            config,
            env,
            volume,
        } => commands::deploy::deploy(artifact, &config, env, volume).await,
        Commands::Status { config } => commands::status::status(&config).await,
    }
}

mod config_commands;
mod routes_commands;
mod run;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    ferry_config::FerryConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ferry", about = "Ferry: channel-to-channel message relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (overrides discovery of ./ferry.toml and friends).
    #[arg(long, global = true, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (default when no subcommand is provided).
    Run {
        /// Use an in-memory chat client instead of Telegram.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration and report errors and warnings.
    CheckConfig {
        /// Show informational diagnostics too.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the persisted route table.
    Routes {
        /// Print the raw JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one, then apply env overrides.
fn load_config(cli: &Cli) -> anyhow::Result<FerryConfig> {
    let mut config = match &cli.config {
        Some(path) => ferry_config::load_config(path)?,
        None => ferry_config::discover_and_load(),
    };
    ferry_config::apply_env_overrides(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None => {
            info!(version = env!("CARGO_PKG_VERSION"), "ferry starting");
            run::run(load_config(&cli)?, false).await
        },
        Some(Commands::Run { dry_run }) => {
            info!(version = env!("CARGO_PKG_VERSION"), dry_run, "ferry starting");
            run::run(load_config(&cli)?, dry_run).await
        },
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(cli.config.as_deref(), verbose)
        },
        Some(Commands::Routes { json }) => {
            routes_commands::print_routes(&load_config(&cli)?, json).await
        },
    }
}

//! Tollgate CLI — the main entry point.
//!
//! Commands:
//! - `serve`      — Start the HTTP gateway
//! - `init`       — Write a commented default config file
//! - `mint-token` — Sign a bearer token for an account (dev tool)
//! - `usage`      — Print the usage snapshot of a running gateway

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "tollgate",
    about = "Tollgate — metered retrieval-augmented query gateway",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Config file path
        #[arg(short, long, default_value = "tollgate.toml")]
        config: PathBuf,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,

        /// Create a development account at startup and print its token
        #[arg(long)]
        dev_account: bool,
    },

    /// Write a commented default config file
    Init {
        /// Where to write the config
        #[arg(short, long, default_value = "tollgate.toml")]
        path: PathBuf,
    },

    /// Sign a bearer token for an account id (dev tool)
    MintToken {
        /// Config file path (for the signing secret)
        #[arg(short, long, default_value = "tollgate.toml")]
        config: PathBuf,

        /// Account id to embed in the token
        #[arg(short, long)]
        account: String,

        /// Subscription tier: free, standard, or enterprise
        #[arg(short, long, default_value = "standard")]
        tier: String,

        /// Token lifetime in seconds (config default when omitted)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Print the usage snapshot of a running gateway
    Usage {
        /// Gateway base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Bearer token
        #[arg(short, long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            config,
            port,
            dev_account,
        } => commands::serve::run(&config, port, dev_account).await?,
        Commands::Init { path } => commands::init::run(&path)?,
        Commands::MintToken {
            config,
            account,
            tier,
            ttl_secs,
        } => commands::mint_token::run(&config, &account, &tier, ttl_secs)?,
        Commands::Usage { url, token } => commands::usage::run(&url, &token).await?,
    }

    Ok(())
}

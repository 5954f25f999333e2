//! simulado CLI: runs the API server and the operator commands.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "simulado",
    version,
    about = "Adaptive practice exams API for police recruitment candidates"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overrides the config
        #[arg(long)]
        bind: Option<String>,
    },

    /// Create a starter config and an example question bank
    Init,

    /// Validate question bank TOML files
    Validate {
        /// Path to a question bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Load question banks into the configured storage
    Seed {
        /// Path to a question bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a user's per-subject statistics
    Stats {
        /// User id
        #[arg(long)]
        user: String,

        /// Restrict to one subject
        #[arg(long)]
        subject: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Rebuild a user's subject statistics and the rollups of the questions they answered
    Recompute {
        /// User id
        #[arg(long)]
        user: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("simulado=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, bind } => commands::serve::execute(config, bind).await,
        Commands::Init => commands::init::execute(),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Seed { bank, config } => commands::seed::execute(bank, config).await,
        Commands::Stats {
            user,
            subject,
            config,
        } => commands::stats::execute(user, subject, config).await,
        Commands::Recompute { user, config } => commands::recompute::execute(user, config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "warden",
    about = "Policy-as-code enforcement for repository workflows",
    version,
    propagate_version = true
)]
struct Cli {
    /// Snapshot root: a directory tree of <org>/<repo>/ fixtures
    #[arg(long, global = true, env = "WARDEN_ROOT", default_value = ".")]
    root: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the action policy against one repository
    Check {
        /// Repository as owner/name
        repo: String,
    },

    /// Validate a policy configuration file
    Validate { file: PathBuf },

    /// Run every registered policy across every installation
    Enforce {
        /// Seconds between reconciliation passes (omit for a single pass)
        #[arg(long)]
        interval_seconds: Option<u64>,

        /// Evaluate only the named policy
        #[arg(long)]
        policy: Option<String>,

        /// Repository name globs to allow (empty list allows everything)
        #[arg(long = "allow")]
        allow: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Enforce { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Check { repo } => cmd::check::run(&cli.root, &repo, cli.json),
        Commands::Validate { file } => cmd::validate::run(&file, cli.json),
        Commands::Enforce {
            interval_seconds,
            policy,
            allow,
        } => cmd::enforce::run(&cli.root, interval_seconds, policy, &allow, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

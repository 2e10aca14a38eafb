// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use fixture_cache::cli;
use fixture_cache::config::Config;

#[derive(Parser)]
#[command(
    name = "fixture-cache",
    about = "Cached, JSON-shaped fixtures from a script-rendered site",
    version,
    after_help = "Configuration is read from FIXTURE_* environment variables.\nRun 'fixture-cache doctor' to check the environment."
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen on this port instead of $PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch fixtures once through the cache and print them as JSON
    Fetch {
        /// Past week to fetch (e.g. "2024-03-10"); omit for current fixtures
        #[arg(long)]
        date: Option<String>,
    },
    /// List the weeks the origin currently offers
    Weeks,
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let json_logs = cli.json_logs
        || std::env::var("FIXTURE_LOG_FORMAT").is_ok_and(|f| f.trim().eq_ignore_ascii_case("json"));

    let result = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "fixture-cache", &mut std::io::stdout());
            Ok(())
        }
        Commands::Doctor => cli::doctor::run().await,
        Commands::Serve { port } => {
            async { cli::serve::run(startup(json_logs)?, port).await }.await
        }
        Commands::Fetch { date } => {
            async { cli::fetch_cmd::run(startup(json_logs)?, date.as_deref()).await }.await
        }
        Commands::Weeks => async { cli::weeks_cmd::run(startup(json_logs)?).await }.await,
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}

/// Logging first, so configuration errors are reported through it too.
fn startup(json_logs: bool) -> Result<Config> {
    cli::init_tracing(json_logs);
    Config::from_env()
}

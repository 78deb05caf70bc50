//! The blocktype command-line driver.
//!
//! Provides the `blocktypec` command with the following subcommands:
//!
//! - `blocktypec check <workspace.json>` - Load a saved workspace and print the inferred types
//! - `blocktypec replay <workspace.json> <script.json>` - Replay scripted edits against a workspace
//!
//! Options:
//! - `--config` - Propagator configuration file (TOML)
//! - `--json` - Print the report as JSON
//! - `--verbose` - Log propagation decisions to stderr

mod session;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blocktype_common::PersistedGraph;
use blocktype_typeck::PropagatorConfig;

use crate::session::{parse_script, Report, Session};

#[derive(Parser)]
#[command(name = "blocktypec", version, about = "Type propagation for block editor procedures")]
struct Cli {
    /// Log propagation decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a saved workspace and print every procedure's type
    Check {
        /// Path to the workspace JSON file
        workspace: PathBuf,

        /// Path to a propagator configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Load a workspace, apply an edit script, and print the final types
    Replay {
        /// Path to the workspace JSON file
        workspace: PathBuf,

        /// Path to the edit script (a JSON array of edits)
        script: PathBuf,

        /// Path to a propagator configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (result, json) = match cli.command {
        Commands::Check {
            workspace,
            config,
            json,
        } => (check(&workspace, config.as_deref()), json),
        Commands::Replay {
            workspace,
            script,
            config,
            json,
        } => (replay(&workspace, &script, config.as_deref()), json),
    };

    match result {
        Ok(report) => print_report(&report, json),
        Err(e) => {
            if json {
                eprintln!("{}", serde_json::json!({ "error": e }));
            } else {
                eprintln!("error: {}", e);
            }
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PropagatorConfig, String> {
    match path {
        Some(path) => PropagatorConfig::from_file(path),
        None => Ok(PropagatorConfig::default()),
    }
}

/// Load a workspace into a fresh session. A type conflict in the saved
/// workspace is reported as an error.
fn open(workspace: &Path, config: Option<&Path>) -> Result<Session, String> {
    let config = load_config(config)?;
    let persisted = PersistedGraph::from_file(workspace).map_err(|e| e.to_string())?;
    let mut session = Session::new(config);
    session
        .load(&persisted)
        .map_err(|e| format!("{}: {}", workspace.display(), e))?;
    Ok(session)
}

fn check(workspace: &Path, config: Option<&Path>) -> Result<Report, String> {
    let mut session = open(workspace, config)?;
    Ok(session.report())
}

fn replay(workspace: &Path, script: &Path, config: Option<&Path>) -> Result<Report, String> {
    let mut session = open(workspace, config)?;
    let content = std::fs::read_to_string(script)
        .map_err(|e| format!("Failed to read '{}': {}", script.display(), e))?;
    let ops = parse_script(&content)?;
    session.replay(&ops);
    Ok(session.report())
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: failed to serialize report: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", report);
    }
}

//! Command-line surface (C9 CLI Shell). `clap` owns the fixed flags and
//! subcommand names; everything after a `open`/`test`/`submit`/`plan`
//! subcommand is handed to the Argument Parser (C3) as free-form tokens,
//! since those tokens parse in any order.

use std::path::PathBuf;
use std::sync::OnceLock;

use clap::{Parser, Subcommand};

use cph_core::OutputFormat;

fn build_version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        let describe = env!("CPH_GIT_DESCRIBE");
        if describe.is_empty() {
            env!("CARGO_PKG_VERSION").to_string()
        } else {
            format!("{} ({describe})", env!("CARGO_PKG_VERSION"))
        }
    })
}

#[derive(Parser)]
#[command(name = "cph", version = build_version())]
#[command(about = "Contest workspace, test, and submit orchestration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Raise logging verbosity and enable the debug config overlay.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Workspace root to operate in (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// Plan the workflow and print it without executing any step.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Echo every driver invocation (filesystem, subprocess, container) as
    /// it runs, in addition to the command's normal output.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up a problem workspace: stash the previous problem into
    /// contest_stock, then restore this one from stock or the language
    /// template into contest_current.
    Open {
        /// Free-form tokens: language, contest, problem, env — any order.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },
    /// Run the test workflow for a problem.
    Test {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },
    /// Submit a problem's solution.
    Submit {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },
    /// Show the planned steps for a command without running it.
    Plan {
        /// Also print each step's declared read/write paths (its I/O
        /// manifest), the same data the Dependency Resolver consults.
        #[arg(long)]
        explain: bool,
        /// Free-form tokens, including the command itself (e.g. `test abc300 a`).
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },
    /// Scaffold a workspace's `contest_env/` configuration layer.
    Init {
        /// Overwrite files that already exist.
        #[arg(long)]
        force: bool,
    },
    /// Check environment and tool availability.
    Doctor,
    /// Inspect the merged Config Graph.
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Inspect and prune execution history.
    History {
        #[command(subcommand)]
        cmd: HistoryCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration tree.
    Show,
    /// Validate the merged configuration graph.
    Validate,
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List recent operations.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete operations older than a cutoff.
    Gc {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = 90)]
        max_age_days: u64,
    },
}

//! Binary entry point (C9 CLI Shell). Parses argv, wires a [`Session`]
//! (Config Graph + State Store), dispatches to the subcommand, and maps
//! any [`CphError`] to its exit code and stable error code.

mod cli;
mod config_cmds;
mod context;
mod doctor;
mod history_cmds;
mod init_cmd;
mod output;
mod plan_build;
mod run_cmd;

use clap::Parser;

use cli::{Cli, Commands, ConfigCommands, HistoryCommands};
use context::Session;
use cph_core::CphError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `--verbose` echoes all driver invocations — the drivers log
    // each call at debug level, so verbose mode just needs that level
    // visible; an explicit `RUST_LOG` still wins over this default.
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .ok();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error [{}]: {e}", e.code());
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32, CphError> {
    let format = cli.format;
    let mut session = Session::open(cli.config.as_ref(), cli.debug)?;

    match &cli.command {
        Commands::Init { force } => {
            init_cmd::run(&session.workspace_root, *force)?;
            Ok(0)
        }
        Commands::Open { tokens } => run_session_command(&mut session, "open", tokens, cli.dry_run, format).await,
        Commands::Test { tokens } => run_session_command(&mut session, "test", tokens, cli.dry_run, format).await,
        Commands::Submit { tokens } => run_session_command(&mut session, "submit", tokens, cli.dry_run, format).await,
        Commands::Plan { explain, tokens } => {
            let ctx = context::build_context(&session, tokens)?;
            let snapshot = session.store.load_context()?;
            let plan = plan_build::build(&session.workspace_root, &snapshot, &ctx)?;
            if *explain {
                output::print_plan_explain(&plan, format);
            } else {
                output::print_plan(&plan, format, false);
            }
            Ok(0)
        }
        Commands::Doctor => {
            doctor::run(&session)?;
            Ok(0)
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => {
                config_cmds::show(&session, format)?;
                Ok(0)
            }
            ConfigCommands::Validate => match config_cmds::validate(&session) {
                Ok(()) => Ok(0),
                Err(e) => Err(e),
            },
        },
        Commands::History { cmd } => match cmd {
            HistoryCommands::List { limit } => {
                history_cmds::list(&session, *limit, format)?;
                Ok(0)
            }
            HistoryCommands::Gc { dry_run, max_age_days } => {
                history_cmds::gc(&session, *max_age_days, *dry_run)?;
                Ok(0)
            }
        },
    }
}

async fn run_session_command(
    session: &mut Session,
    command: &str,
    tokens: &[String],
    dry_run: bool,
    format: cph_core::OutputFormat,
) -> Result<i32, CphError> {
    let ctx = context::build_context_for_command(session, command, tokens)?;
    let outcome = run_cmd::run(session, &ctx, dry_run).await?;
    let return_code = outcome.return_code;
    run_cmd::print_outcome(&outcome, format);
    Ok(return_code)
}

//! Assembles the pieces the CLI Shell needs before it can plan anything:
//! loads the Config Graph (C1), registers the `--debug` overlay, opens the
//! State Store (C4), parses tokens into an [`ExecutionContext`] (C3) seeded
//! from the last snapshot, then fills in the path/command fields C5 needs
//! from config.

use std::path::PathBuf;

use cph_config::graph::ConfigValue;
use cph_config::ConfigGraph;
use cph_core::{ContextField, CphError, EnvType, ExecutionContext};
use cph_state::StateStore;

pub struct Session {
    pub graph: ConfigGraph,
    pub store: StateStore,
    pub workspace_root: PathBuf,
}

impl Session {
    pub fn open(config_override: Option<&PathBuf>, debug: bool) -> Result<Self, CphError> {
        let workspace_root = cph_config::paths::workspace_root(config_override.map(|p| p.as_path()));
        let mut graph = cph_config::load_config_graph(&workspace_root)?;
        if debug {
            graph.register_overlay("debug", ConfigValue::Boolean(true));
        }
        let store = StateStore::open(&cph_config::paths::history_db_path(&workspace_root))?;
        Ok(Self {
            graph,
            store,
            workspace_root,
        })
    }
}

/// Parse `tokens` against the snapshot and config (C3), then enrich the
/// resulting context with the path and language fields the Step Planner
/// (C5) needs (`workspace_path`, `current_path`,
/// `stock_path`, `template_path`, `source_file_name`, `run_command`,
/// `language_id`).
pub fn build_context(session: &Session, tokens: &[String]) -> Result<ExecutionContext, CphError> {
    let snapshot = session.store.load_context()?;
    let mut ctx = cph_args::parse(tokens, &session.graph, &snapshot)?;
    enrich_paths(session, &mut ctx)?;
    Ok(ctx)
}

/// Same as [`build_context`] but for a `command` supplied explicitly (the
/// `open`/`test`/`submit` subcommand forms) rather than scanned from
/// `tokens` — the command token is prepended so the usual scan still
/// finds it uniformly.
pub fn build_context_for_command(
    session: &Session,
    command: &str,
    tokens: &[String],
) -> Result<ExecutionContext, CphError> {
    let mut with_command = vec![command.to_string()];
    with_command.extend_from_slice(tokens);
    build_context(session, &with_command)
}

fn enrich_paths(session: &Session, ctx: &mut ExecutionContext) -> Result<(), CphError> {
    let workspace = session.workspace_root.clone();
    let vars = ctx.template_vars();

    let current = session
        .graph
        .resolve_template("shared.paths.current", &vars)
        .unwrap_or_else(|_| "contest_current".to_string());
    ctx.current_path = Some(workspace.join(current));

    if ctx.contest_name.is_some() && ctx.problem_name.is_some() {
        let stock = session.graph.resolve_template("shared.paths.stock", &vars)?;
        ctx.stock_path = Some(workspace.join(stock));
    }

    let template = session.graph.resolve_template("shared.paths.template", &vars)?;
    ctx.template_path = Some(workspace.join(template));
    ctx.workspace_path = Some(workspace);

    if let Some(language) = ctx.language.clone() {
        ctx.source_file_name = session
            .graph
            .resolve_string(&format!("languages.{language}.source_file_name"))
            .ok();
        ctx.language_id = session
            .graph
            .resolve_string(&format!("languages.{language}.language_id"))
            .ok();

        let mut run_vars = vars;
        if let Some(sfn) = &ctx.source_file_name {
            run_vars.insert("source_file_name".to_string(), sfn.clone());
        }
        ctx.run_command = session
            .graph
            .resolve_template(&format!("languages.{language}.run_command"), &run_vars)
            .ok();
    }

    Ok(())
}

/// Persist `ctx`'s identifying fields back to the State Store, so the next
/// invocation's snapshot reflects this run (`update_context`,
/// distinguishing user-specified fields from ones carried over).
pub fn persist_context(session: &mut Session, ctx: &ExecutionContext) -> Result<(), CphError> {
    session.store.update_context(
        ContextField::Language,
        ctx.language.as_deref(),
        ctx.is_user_specified(ContextField::Language),
    )?;
    session.store.update_context(
        ContextField::ContestName,
        ctx.contest_name.as_deref(),
        ctx.is_user_specified(ContextField::ContestName),
    )?;
    session.store.update_context(
        ContextField::ProblemName,
        ctx.problem_name.as_deref(),
        ctx.is_user_specified(ContextField::ProblemName),
    )?;
    session.store.update_context(
        ContextField::CommandType,
        ctx.command_type.as_deref(),
        ctx.is_user_specified(ContextField::CommandType),
    )?;
    let env_str = ctx.env_type.map(|e| e.as_str().to_string());
    session.store.update_context(
        ContextField::EnvType,
        env_str.as_deref(),
        ctx.is_user_specified(ContextField::EnvType),
    )?;
    Ok(())
}

/// The `(language, contest, problem)` tuple last recorded in the snapshot,
/// if every field was present — used by the `open` orchestration to decide
/// whether the previous problem's work needs stashing.
pub fn previous_tuple(snapshot: &cph_core::ContextSnapshot) -> Option<(String, String, String)> {
    let language = snapshot.get(ContextField::Language)?.to_string();
    let contest = snapshot.get(ContextField::ContestName)?.to_string();
    let problem = snapshot.get(ContextField::ProblemName)?.to_string();
    Some((language, contest, problem))
}

pub fn env_or_default(ctx: &ExecutionContext) -> EnvType {
    ctx.env_type.unwrap_or(EnvType::Local)
}

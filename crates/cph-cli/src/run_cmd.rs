//! Drives one `open`/`test`/`submit` invocation end to end: build the
//! context, plan the steps, execute them (unless `--dry-run`), persist the
//! context, and record a [`SessionRecord`] for a real run.

use std::sync::Arc;
use std::time::Instant;

use cph_core::{CphError, EnvType, ExecutionContext, OutputFormat, SessionRecord, WorkflowPlan};
use cph_exec::{
    Executor, ExecutorConfig, RealContainerDriver, RealFilesystemDriver, RealSubprocessDriver,
};

use crate::context::Session;
use crate::output;

/// Result of one `open`/`test`/`submit` run, printed per `--format`.
pub struct RunOutcome {
    pub plan: WorkflowPlan,
    pub executed: bool,
    pub return_code: i32,
}

fn executor_config(session: &Session) -> ExecutorConfig {
    let mut cfg = ExecutorConfig::default();
    if let Ok(n) = session.graph.resolve(
        "executor.max_workers",
        cph_config::graph::TypeTag::Integer,
    ) {
        if let cph_config::graph::ConfigValue::Integer(n) = n {
            cfg.max_workers = n.max(1) as usize;
        }
    }
    if let Ok(cph_config::graph::ConfigValue::Integer(ms)) = session
        .graph
        .resolve("executor.grace_period_ms", cph_config::graph::TypeTag::Integer)
    {
        cfg.grace_period = std::time::Duration::from_millis(ms.max(0) as u64);
    }
    cfg
}

fn container_binary(session: &Session) -> String {
    session
        .graph
        .resolve_string("executor.container_binary")
        .unwrap_or_else(|_| "docker".to_string())
}

/// Execute `ctx`'s command: builds the plan, runs it (unless `dry_run`),
/// persists context/history, and returns the outcome for display.
pub async fn run(
    session: &mut Session,
    ctx: &ExecutionContext,
    dry_run: bool,
) -> Result<RunOutcome, CphError> {
    let snapshot = session.store.load_context()?;
    let plan = crate::plan_build::build(&session.workspace_root, &snapshot, ctx)?;

    if dry_run {
        crate::context::persist_context(session, ctx)?;
        return Ok(RunOutcome {
            plan,
            executed: false,
            return_code: 0,
        });
    }

    let fs = Arc::new(RealFilesystemDriver);
    let subprocess = Arc::new(RealSubprocessDriver);
    let container = Arc::new(RealContainerDriver::new(container_binary(session)));
    let executor = Executor::new(fs, subprocess, container, executor_config(session));

    let backup_root = cph_config::paths::backup_root(&session.workspace_root)
        .join(format!("run-{}", std::process::id()));

    let started = Instant::now();
    let result = executor.execute(&plan, &backup_root).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    crate::context::persist_context(session, ctx)?;

    let (return_code, result_label) = match &result {
        Ok(_) => (0, "ok"),
        Err(_) => (1, "fail"),
    };

    if let (Some(language), Some(contest), Some(problem), Some(command)) = (
        &ctx.language,
        &ctx.contest_name,
        &ctx.problem_name,
        &ctx.command_type,
    ) {
        let record = SessionRecord {
            timestamp: chrono::Utc::now(),
            language: language.clone(),
            contest_name: contest.clone(),
            problem_name: problem.clone(),
            command: command.clone(),
            env_type: ctx.env_type.unwrap_or(EnvType::Local),
            result: result_label.to_string(),
            stdout_digest: String::new(),
            stderr_digest: String::new(),
            return_code,
            duration_ms,
            details_json: None,
        };
        session.store.append_operation(&record)?;
    }

    result?;

    Ok(RunOutcome {
        plan,
        executed: true,
        return_code,
    })
}

pub fn print_outcome(outcome: &RunOutcome, format: OutputFormat) {
    output::print_plan(&outcome.plan, format, outcome.executed);
}

//! Builds the final [`WorkflowPlan`] for a run: loads the workflow document
//! (C5 template source), expands it for `(language, command, env)`, prepends
//! the `open` command's stash-previous-problem step when the contest/problem
//! tuple changed, then runs it through the Dependency
//! Resolver (C6).

use std::collections::BTreeMap;
use std::path::Path;

use cph_core::{ContextSnapshot, CphError, ExecutionContext, Step, StepKind, WorkflowPlan};

use crate::context::previous_tuple;

/// Path to an on-disk workflow-document override, if the workspace has one
/// (under `contest_env/`; the workflow document is a sibling concern of
/// the TOML config layers, merged the same way — the merge order
/// generalized in `cph_plan::defaults::load`).
fn workflow_override_path(workspace_root: &Path) -> std::path::PathBuf {
    cph_config::paths::config_dir(workspace_root).join("workflows.json")
}

/// Builds the `MOVE {current} -> {old_stock}` prerequisite for `open` when
/// the previous session touched a different `(language, contest, problem)`
/// and `current` actually has something in it.
fn stash_previous_step(
    workspace_root: &Path,
    current_path: &Path,
    snapshot: &ContextSnapshot,
    new_ctx: &ExecutionContext,
) -> Result<Option<Step>, CphError> {
    let Some((prev_lang, prev_contest, prev_problem)) = previous_tuple(snapshot) else {
        return Ok(None);
    };
    let new_tuple = (
        new_ctx.language.clone().unwrap_or_default(),
        new_ctx.contest_name.clone().unwrap_or_default(),
        new_ctx.problem_name.clone().unwrap_or_default(),
    );
    if (prev_lang.clone(), prev_contest.clone(), prev_problem.clone()) == new_tuple {
        return Ok(None);
    }
    if !current_path.is_dir() {
        return Ok(None);
    }
    if std::fs::read_dir(current_path).map(|mut d| d.next().is_none()).unwrap_or(true) {
        return Ok(None);
    }

    let mut vars = BTreeMap::new();
    vars.insert("language".to_string(), prev_lang.clone());
    vars.insert("contest".to_string(), prev_contest.clone());
    vars.insert("contest_name".to_string(), prev_contest);
    vars.insert("problem".to_string(), prev_problem.clone());
    vars.insert("problem_name".to_string(), prev_problem);
    let vars: std::collections::HashMap<String, String> = vars.into_iter().collect();

    // Resolving through the graph directly (rather than carrying a whole
    // second `ExecutionContext`) keeps this to the one path template it
    // actually needs.
    let graph = cph_config::load_config_graph(workspace_root)?;
    let stock_template = graph.resolve_string("shared.paths.stock")?;
    let (expanded, _unresolved) = cph_config::expand(&stock_template, &vars, false)?;
    let old_stock = workspace_root.join(expanded);

    let mut args = std::collections::BTreeMap::new();
    args.insert("src".to_string(), current_path.display().to_string());
    args.insert("dst".to_string(), old_stock.display().to_string());
    Ok(Some(Step {
        kind: StepKind::Move,
        description: format!(
            "stash previous problem {} into stock",
            current_path.display()
        ),
        args,
        when: None,
        allow_failure: false,
        parallel_group: None,
    }))
}

/// Expand and resolve the full plan for `ctx`'s `(language, command, env)`,
/// including the `open`-specific stash step.
pub fn build(
    workspace_root: &Path,
    snapshot: &ContextSnapshot,
    ctx: &ExecutionContext,
) -> Result<WorkflowPlan, CphError> {
    let language = ctx
        .language
        .as_deref()
        .ok_or_else(|| CphError::ArgMissingRequiredField("language".to_string()))?;
    let command = ctx
        .command_type
        .as_deref()
        .ok_or_else(|| CphError::ArgMissingRequiredField("command".to_string()))?;
    let env = crate::context::env_or_default(ctx);
    let current_path = ctx
        .current_path
        .clone()
        .unwrap_or_else(|| workspace_root.join("contest_current"));

    let doc = cph_plan::defaults::load(Some(&workflow_override_path(workspace_root)))?;
    let templates = doc.lookup(language, command, env);

    let mut plan = cph_plan::planner::expand(templates, ctx, &current_path)?;

    if command == "open" {
        if let Some(stash) = stash_previous_step(workspace_root, &current_path, snapshot, ctx)? {
            plan.steps.insert(0, stash);
        }
    }

    let resolved = cph_plan::deps::resolve(plan, |p| p.exists());
    Ok(resolved)
}

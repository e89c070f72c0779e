//! Step Planner (C5): expands [`StepTemplate`]s into concrete, `READY`
//! [`Step`]s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cph_core::{CphError, ExecutionContext, Step, StepArgs, StepKind, WorkflowPlan};

use crate::condition;
use crate::template::StepTemplate;

const GLOB_METACHARS: [char; 3] = ['*', '?', '['];

/// The arg key whose value may be a glob pattern for a given kind, and
/// the companion key (if any) that names the per-match destination
/// directory, configured as such by kind.
fn glob_arg_key(kind: StepKind) -> Option<(&'static str, Option<&'static str>)> {
    match kind {
        StepKind::Copy | StepKind::Move => Some(("src", Some("dst"))),
        StepKind::Remove | StepKind::Chmod => Some(("path", None)),
        _ => None,
    }
}

fn looks_like_glob(s: &str) -> bool {
    s.chars().any(|c| GLOB_METACHARS.contains(&c))
}

/// Required, non-empty arg keys per kind.
fn required_args(kind: StepKind) -> &'static [&'static str] {
    match kind {
        StepKind::Copy | StepKind::Move => &["src", "dst"],
        StepKind::Remove | StepKind::Mkdir | StepKind::Touch | StepKind::EditorOpen => &["path"],
        StepKind::Chmod => &["path", "mode"],
        StepKind::ContainerRun | StepKind::ContainerBuild => &["image"],
        StepKind::ContainerStop | StepKind::ContainerRemove => &["container"],
        StepKind::Shell | StepKind::Python | StepKind::Test => &["command"],
        StepKind::BrowserOpen => &["url"],
        StepKind::SubmitFetch => &["url"],
    }
}

fn validate_args(kind: StepKind, args: &StepArgs) -> Result<(), CphError> {
    for key in required_args(kind) {
        match args.get(*key) {
            Some(value) if !value.is_empty() => {}
            _ => {
                return Err(CphError::PlanInvalidStepArgs {
                    kind: kind.to_string(),
                    reason: format!("missing '{key}'"),
                })
            }
        }
    }
    Ok(())
}

fn expand_args(
    template: &StepTemplate,
    vars: &std::collections::HashMap<String, String>,
) -> Result<StepArgs, CphError> {
    let mut expanded = StepArgs::new();
    for (key, value) in &template.args {
        let (out, _unresolved) = cph_config::expand(value, vars, true)?;
        expanded.insert(key.clone(), out);
    }
    Ok(expanded)
}

fn fanout_step(
    kind: StepKind,
    args: StepArgs,
    template: &StepTemplate,
    base_dir: &Path,
) -> Result<Vec<Step>, CphError> {
    let Some((glob_key, dest_key)) = glob_arg_key(kind) else {
        return Ok(vec![build_step(kind, args, template)]);
    };
    let Some(pattern) = args.get(glob_key).cloned() else {
        return Ok(vec![build_step(kind, args, template)]);
    };
    if !looks_like_glob(&pattern) {
        return Ok(vec![build_step(kind, args, template)]);
    }

    let matches = cph_config::expand_file_pattern(&pattern, base_dir)?;
    if matches.is_empty() {
        return Err(CphError::PlanFileMatchEmpty {
            pattern,
            base: base_dir.to_path_buf(),
        });
    }

    let dest_base: Option<PathBuf> = dest_key.and_then(|k| args.get(k).cloned()).map(PathBuf::from);

    let mut steps = Vec::with_capacity(matches.len());
    for matched in &matches {
        let mut per_file = args.clone();
        per_file.insert(glob_key.to_string(), matched.display().to_string());
        if let (Some(dest_key), Some(dest_base)) = (dest_key, &dest_base) {
            let file_name = matched
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            per_file.insert(dest_key.to_string(), dest_base.join(file_name).display().to_string());
        }
        steps.push(build_step(kind, per_file, template));
    }
    Ok(steps)
}

fn build_step(kind: StepKind, args: StepArgs, template: &StepTemplate) -> Step {
    let description = format!("{kind} {}", summarize_args(&args));
    Step {
        kind,
        args,
        when: None,
        allow_failure: template.allow_failure,
        parallel_group: template.parallel_group.clone(),
        description,
    }
}

fn summarize_args(args: &StepArgs) -> String {
    args.values()
        .next()
        .cloned()
        .unwrap_or_else(|| "(no args)".to_string())
}

/// Expand `templates` into a [`WorkflowPlan`] in the context of `ctx`,
/// resolving glob patterns relative to `base_dir`.
pub fn expand(
    templates: &[StepTemplate],
    ctx: &ExecutionContext,
    base_dir: &Path,
) -> Result<WorkflowPlan, CphError> {
    let vars = ctx.template_vars();
    let mut steps = Vec::new();

    for template in templates {
        let kind: StepKind = template
            .kind
            .parse()
            .map_err(|reason| CphError::PlanInvalidStepArgs {
                kind: template.kind.clone(),
                reason,
            })?;

        if let Some(cond) = &template.when {
            let (expanded_cond, _) = cph_config::expand(cond, &vars, true)?;
            if !condition::evaluate(&expanded_cond)? {
                continue;
            }
        }

        let args = expand_args(template, &vars)?;
        validate_args(kind, &args)?;

        steps.extend(fanout_step(kind, args, template, base_dir)?);
    }

    Ok(WorkflowPlan {
        steps,
        prepared_paths: Vec::new(),
    })
}

//! `--format text|json` aware printing of a resolved
//! [`WorkflowPlan`].

use cph_core::{OutputFormat, StepKind, WorkflowPlan};

pub fn print_plan(plan: &WorkflowPlan, format: OutputFormat, executed: bool) {
    match format {
        OutputFormat::Json => print_plan_json(plan, executed),
        OutputFormat::Text => print_plan_text(plan, executed),
    }
}

fn print_plan_text(plan: &WorkflowPlan, executed: bool) {
    println!(
        "Plan ({} step{}){}:",
        plan.steps.len(),
        if plan.steps.len() == 1 { "" } else { "s" },
        if executed { ", executed" } else { ", not executed (dry run)" }
    );
    for (i, step) in plan.steps.iter().enumerate() {
        let group = step
            .parallel_group
            .as_ref()
            .map(|g| format!(" [group={g}]"))
            .unwrap_or_default();
        let allow = if step.allow_failure { " [allow_failure]" } else { "" };
        println!("  {}. {} — {}{}{}", i + 1, step.kind, step.description, group, allow);
    }
}

fn print_plan_json(plan: &WorkflowPlan, executed: bool) {
    let steps: Vec<serde_json::Value> = plan
        .steps
        .iter()
        .map(|s| {
            serde_json::json!({
                "kind": s.kind.to_string(),
                "description": s.description,
                "args": s.args,
                "allow_failure": s.allow_failure,
                "parallel_group": s.parallel_group,
            })
        })
        .collect();
    let doc = serde_json::json!({
        "executed": executed,
        "step_count": plan.steps.len(),
        "steps": steps,
    });
    println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
}

/// Human label for a step kind used outside `print_plan` (history/doctor
/// summaries that just need a short tag, not the full step line).
pub fn kind_label(kind: StepKind) -> &'static str {
    kind.as_str()
}

/// `cph plan --explain`: the same step list as [`print_plan`], with each
/// step's declared read/write paths (its I/O manifest) alongside it —
/// the data the Dependency Resolver already consulted to build this plan.
pub fn print_plan_explain(plan: &WorkflowPlan, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_plan_explain_json(plan),
        OutputFormat::Text => print_plan_explain_text(plan),
    }
}

fn print_plan_explain_text(plan: &WorkflowPlan) {
    println!(
        "Plan ({} step{}), not executed (dry run):",
        plan.steps.len(),
        if plan.steps.len() == 1 { "" } else { "s" }
    );
    for (i, step) in plan.steps.iter().enumerate() {
        let (reads, writes) = cph_plan::deps::io_manifest(step.kind, &step.args);
        println!("  {}. {} — {}", i + 1, step.kind, step.description);
        if !reads.is_empty() {
            println!(
                "       reads:  {}",
                reads.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
            );
        }
        if !writes.is_empty() {
            println!(
                "       writes: {}",
                writes.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
            );
        }
    }
    if !plan.prepared_paths.is_empty() {
        println!(
            "  prepared_paths: {}",
            plan.prepared_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}

fn print_plan_explain_json(plan: &WorkflowPlan) {
    let steps: Vec<serde_json::Value> = plan
        .steps
        .iter()
        .map(|s| {
            let (reads, writes) = cph_plan::deps::io_manifest(s.kind, &s.args);
            serde_json::json!({
                "kind": s.kind.to_string(),
                "description": s.description,
                "args": s.args,
                "allow_failure": s.allow_failure,
                "parallel_group": s.parallel_group,
                "reads": reads.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                "writes": writes.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();
    let doc = serde_json::json!({
        "executed": false,
        "step_count": plan.steps.len(),
        "steps": steps,
        "prepared_paths": plan.prepared_paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
}

//! Dependency Resolver (C6): makes a planned step sequence self-sufficient
//! and minimal. Three total-function passes run in a fixed order: insert
//! missing prerequisites, drop redundant operations, then group
//! independent reads into parallel batches.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cph_core::{Step, StepArgs, StepKind, WorkflowPlan};

/// Declarative `reads`/`writes` manifest for a step kind given its
/// (already-expanded) args: which paths it reads, which it writes. Also
/// consulted directly by the Executor (C7) to decide which paths need
/// backing up before a step runs.
pub fn io_manifest(kind: StepKind, args: &StepArgs) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let get = |key: &str| args.get(key).map(PathBuf::from);
    match kind {
        StepKind::Copy => {
            let mut reads = Vec::new();
            let mut writes = Vec::new();
            if let Some(src) = get("src") {
                reads.push(src);
            }
            if let Some(dst) = get("dst") {
                writes.push(dst);
            }
            (reads, writes)
        }
        StepKind::Move => {
            let mut reads = Vec::new();
            let mut writes = Vec::new();
            if let Some(src) = get("src") {
                writes.push(src.clone());
                reads.push(src);
            }
            if let Some(dst) = get("dst") {
                writes.push(dst);
            }
            (reads, writes)
        }
        StepKind::Remove => (get("path").into_iter().collect(), get("path").into_iter().collect()),
        StepKind::Mkdir | StepKind::Touch => (Vec::new(), get("path").into_iter().collect()),
        StepKind::Chmod => (get("path").into_iter().collect(), get("path").into_iter().collect()),
        _ => (Vec::new(), Vec::new()),
    }
}

/// Directory-like paths (trailing separator, or a kind that always
/// produces a directory) get `MKDIR`; everything else gets `TOUCH`.
fn prerequisite_kind(kind: StepKind, path: &Path) -> StepKind {
    let is_dir_like = matches!(kind, StepKind::Mkdir)
        || path
            .to_str()
            .map(|s| s.ends_with('/'))
            .unwrap_or(false);
    if is_dir_like {
        StepKind::Mkdir
    } else {
        StepKind::Touch
    }
}

fn push_prerequisite(out: &mut Vec<Step>, kind: StepKind, path: &Path) {
    let mut args = StepArgs::new();
    args.insert("path".to_string(), path.display().to_string());
    out.push(Step {
        kind,
        description: format!("{kind} {} (auto-inserted prerequisite)", path.display()),
        args,
        when: None,
        allow_failure: false,
        parallel_group: None,
    });
}

/// The parent directory a write target needs to already exist in, or
/// `None` for a bare filename / the filesystem root (nothing to insert).
fn write_parent(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() || parent == Path::new("/") {
        None
    } else {
        Some(parent.to_path_buf())
    }
}

/// Pass 1: for every path read by step *i* and not written by any step
/// *j < i*, insert a MKDIR/TOUCH before *i* if `exists` reports the path
/// absent pre-execution. Likewise, for every path *written* by step *i*
/// whose parent directory is neither produced by an earlier step nor
/// already on disk, insert a MKDIR of that parent before *i*.
pub fn insert_missing_prerequisites(
    steps: Vec<Step>,
    exists: impl Fn(&Path) -> bool,
) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    let mut written: Vec<PathBuf> = Vec::new();

    for step in steps {
        let (reads, writes) = io_manifest(step.kind, &step.args);
        for read in &reads {
            if written.iter().any(|w| w == read) {
                continue;
            }
            if exists(read) {
                continue;
            }
            let prereq_kind = prerequisite_kind(step.kind, read);
            push_prerequisite(&mut out, prereq_kind, read);
            written.push(read.clone());
        }
        for write in &writes {
            let Some(parent) = write_parent(write) else {
                continue;
            };
            if written.iter().any(|w| w == &parent) {
                continue;
            }
            if exists(&parent) {
                continue;
            }
            push_prerequisite(&mut out, StepKind::Mkdir, &parent);
            written.push(parent);
        }
        written.extend(writes);
        out.push(step);
    }

    out
}

fn normalized(path: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        out.push(component);
    }
    out
}

/// Pass 2: drop no-op COPYs, collapse consecutive same-path
/// MKDIRs, and turn a REMOVE-then-MKDIR-of-the-same-path pair into a
/// single MKDIR.
pub fn eliminate_redundant(steps: Vec<Step>) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());

    for step in steps {
        if step.kind == StepKind::Copy {
            let same_path = match (step.args.get("src"), step.args.get("dst")) {
                (Some(src), Some(dst)) => normalized(src) == normalized(dst),
                _ => false,
            };
            if same_path {
                continue;
            }
        }

        if step.kind == StepKind::Mkdir {
            if let Some(prev) = out.last() {
                if prev.kind == StepKind::Mkdir && prev.args.get("path") == step.args.get("path") {
                    continue;
                }
                if prev.kind == StepKind::Remove && prev.args.get("path") == step.args.get("path") {
                    out.pop();
                    out.push(step);
                    continue;
                }
            }
        }

        out.push(step);
    }

    out
}

/// Pass 3: move read-only steps into their template-assigned
/// `parallel_group` only when no step in the group writes a path any
/// other step in the group reads.
pub fn reassign_parallel_groups(steps: Vec<Step>) -> Vec<Step> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, step) in steps.iter().enumerate() {
        if let Some(group) = &step.parallel_group {
            groups.entry(group.clone()).or_default().push(i);
        }
    }

    let manifests: Vec<(Vec<PathBuf>, Vec<PathBuf>)> = steps
        .iter()
        .map(|s| io_manifest(s.kind, &s.args))
        .collect();

    let mut safe_groups: Vec<String> = Vec::new();
    'groups: for (group, indices) in &groups {
        for &i in indices {
            for &j in indices {
                if i == j {
                    continue;
                }
                let (_, writes_i) = &manifests[i];
                let (reads_j, _) = &manifests[j];
                if writes_i.iter().any(|w| reads_j.contains(w)) {
                    continue 'groups;
                }
            }
        }
        safe_groups.push(group.clone());
    }

    let mut out = steps;
    for step in out.iter_mut() {
        if let Some(group) = &step.parallel_group {
            if !safe_groups.contains(group) {
                step.parallel_group = None;
            }
        }
    }
    out
}

/// Run all three passes in order, producing the final
/// [`WorkflowPlan`] ready for the Executor.
pub fn resolve(plan: WorkflowPlan, exists: impl Fn(&Path) -> bool) -> WorkflowPlan {
    let steps = insert_missing_prerequisites(plan.steps, exists);
    let steps = eliminate_redundant(steps);
    let steps = reassign_parallel_groups(steps);
    WorkflowPlan {
        steps,
        prepared_paths: plan.prepared_paths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(kind: StepKind, args: &[(&str, &str)]) -> Step {
        let mut map = StepArgs::new();
        for (k, v) in args {
            map.insert(k.to_string(), v.to_string());
        }
        Step {
            kind,
            args: map,
            when: None,
            allow_failure: false,
            parallel_group: None,
            description: "test step".to_string(),
        }
    }

    #[test]
    fn inserts_mkdir_for_missing_write_target_parent() {
        let steps = vec![step(StepKind::Copy, &[("src", "/a"), ("dst", "/missing/b")])];
        let out = insert_missing_prerequisites(steps, |_| false);
        // src (a read) doesn't pre-exist, so it gets a TOUCH; dst's parent
        // ("/missing", a write target's parent) doesn't pre-exist either, so
        // it gets a MKDIR. Both land ahead of the Copy.
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, StepKind::Touch);
        assert_eq!(out[0].args.get("path").map(String::as_str), Some("/a"));
        assert_eq!(out[1].kind, StepKind::Mkdir);
        assert_eq!(out[1].args.get("path").map(String::as_str), Some("/missing"));
        assert_eq!(out[2].kind, StepKind::Copy);
    }

    #[test]
    fn no_prerequisite_when_path_already_exists() {
        let steps = vec![step(StepKind::Copy, &[("src", "/a"), ("dst", "/b")])];
        let out = insert_missing_prerequisites(steps, |_| true);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn no_prerequisite_when_written_by_earlier_step() {
        let steps = vec![
            step(StepKind::Mkdir, &[("path", "/d1")]),
            step(StepKind::Copy, &[("src", "/d1"), ("dst", "/d1/out")]),
        ];
        let out = insert_missing_prerequisites(steps, |_| false);
        // /d1 is written by step 0, so step 1's read of /d1 needs no
        // prerequisite, and dst's parent (also /d1) is covered by the
        // same earlier write.
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn inserts_mkdir_for_copy_then_shell_with_no_explicit_mkdir() {
        // [COPY src->out/file, SHELL "process out/file"] with no explicit
        // MKDIR out: the planner must insert MKDIR out before the COPY.
        let steps = vec![
            step(StepKind::Copy, &[("src", "/work/src"), ("dst", "/work/out/file")]),
            step(StepKind::Shell, &[("cmd", "process /work/out/file")]),
        ];
        let out = insert_missing_prerequisites(steps, |p| p == Path::new("/work/src"));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, StepKind::Mkdir);
        assert_eq!(out[0].args.get("path").map(String::as_str), Some("/work/out"));
        assert_eq!(out[1].kind, StepKind::Copy);
        assert_eq!(out[2].kind, StepKind::Shell);
    }

    #[test]
    fn no_mkdir_inserted_when_write_target_parent_preexists() {
        // With `out` pre-existing, no MKDIR is inserted.
        let steps = vec![step(StepKind::Copy, &[("src", "/work/src"), ("dst", "/work/out/file")])];
        let out = insert_missing_prerequisites(steps, |_| true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, StepKind::Copy);
    }

    #[test]
    fn copy_same_normalized_path_is_dropped() {
        let steps = vec![step(StepKind::Copy, &[("src", "/a/./b"), ("dst", "/a/b")])];
        let out = eliminate_redundant(steps);
        assert!(out.is_empty());
    }

    #[test]
    fn consecutive_mkdir_of_same_path_collapses() {
        let steps = vec![
            step(StepKind::Mkdir, &[("path", "/d1")]),
            step(StepKind::Mkdir, &[("path", "/d1")]),
        ];
        let out = eliminate_redundant(steps);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn remove_then_mkdir_same_path_becomes_single_mkdir() {
        let steps = vec![
            step(StepKind::Remove, &[("path", "/d1")]),
            step(StepKind::Mkdir, &[("path", "/d1")]),
        ];
        let out = eliminate_redundant(steps);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, StepKind::Mkdir);
    }

    #[test]
    fn disjoint_group_keeps_parallel_group_assignment() {
        let mut a = step(StepKind::Copy, &[("src", "/a"), ("dst", "/out/a")]);
        a.parallel_group = Some("g1".to_string());
        let mut b = step(StepKind::Copy, &[("src", "/b"), ("dst", "/out/b")]);
        b.parallel_group = Some("g1".to_string());
        let out = reassign_parallel_groups(vec![a, b]);
        assert_eq!(out[0].parallel_group.as_deref(), Some("g1"));
        assert_eq!(out[1].parallel_group.as_deref(), Some("g1"));
    }

    #[test]
    fn conflicting_group_loses_parallel_group_assignment() {
        let mut a = step(StepKind::Copy, &[("src", "/a"), ("dst", "/shared")]);
        a.parallel_group = Some("g1".to_string());
        let mut b = step(StepKind::Copy, &[("src", "/shared"), ("dst", "/out/b")]);
        b.parallel_group = Some("g1".to_string());
        let out = reassign_parallel_groups(vec![a, b]);
        assert!(out[0].parallel_group.is_none());
        assert!(out[1].parallel_group.is_none());
    }
}

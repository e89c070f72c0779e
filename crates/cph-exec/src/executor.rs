//! Transaction Executor (C7): runs a [`WorkflowPlan`] to completion or rolls
//! every written path back to its pre-execution state. Applies a
//! backup-then-mutate discipline per step, generalized to cover every
//! driver family and to the parallel-group batches the Dependency
//! Resolver (C6) leaves intact.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use cph_core::{CphError, FileBackup, Step, StepKind, StepStatus, WorkflowPlan};

use crate::drivers::{ContainerDriver, FilesystemDriver, SubprocessDriver};

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Tunables for a single [`Executor::execute`] run
/// (config keys: `max_workers`, `grace_period_ms`).
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub max_workers: usize,
    pub grace_period: Duration,
    pub step_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            grace_period: DEFAULT_GRACE_PERIOD,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// Terminal record of one Step's run, kept in original plan order regardless
/// of how parallel batches actually interleaved.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub index: usize,
    pub description: String,
    pub status: StepStatus,
    pub error: Option<String>,
}

/// Full record of an [`Executor::execute`] run, returned on success.
#[derive(Clone, Debug, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<StepOutcome>,
}

fn sanitize_for_backup_name(path: &Path) -> String {
    path.display()
        .to_string()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Orchestrates Steps against the injected drivers, backing up every path a
/// step is about to write and restoring them all if any non-`allow_failure`
/// step fails.
pub struct Executor {
    fs: Arc<dyn FilesystemDriver>,
    subprocess: Arc<dyn SubprocessDriver>,
    container: Arc<dyn ContainerDriver>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        fs: Arc<dyn FilesystemDriver>,
        subprocess: Arc<dyn SubprocessDriver>,
        container: Arc<dyn ContainerDriver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            fs,
            subprocess,
            container,
            config,
        }
    }

    /// Run `plan` to completion under `backup_root`. On failure, every write
    /// recorded so far is rolled back before the original error is returned;
    /// a failure during rollback itself surfaces as
    /// [`CphError::ExecRollbackFailed`] instead, naming `backup_root` so the
    /// workspace can be inspected by hand.
    pub async fn execute(&self, plan: &WorkflowPlan, backup_root: &Path) -> Result<ExecutionReport, CphError> {
        self.fs.create_dir(backup_root).await?;

        for path in &plan.prepared_paths {
            self.fs.create_dir(path).await?;
        }

        let backups: Mutex<Vec<FileBackup>> = Mutex::new(Vec::new());
        let mut outcomes = Vec::with_capacity(plan.steps.len());

        match self.run_steps(&plan.steps, backup_root, &backups, &mut outcomes).await {
            Ok(()) => {
                let _ = self.fs.remove(backup_root).await;
                Ok(ExecutionReport { outcomes })
            }
            Err(e) => {
                let recorded = backups.into_inner().unwrap();
                self.rollback(&recorded, backup_root).await?;
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        steps: &[Step],
        backup_root: &Path,
        backups: &Mutex<Vec<FileBackup>>,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Result<(), CphError> {
        let mut i = 0;
        while i < steps.len() {
            let group = steps[i].parallel_group.clone();
            let mut j = i + 1;
            if group.is_some() {
                while j < steps.len() && steps[j].parallel_group == group {
                    j += 1;
                }
            }
            let batch = &steps[i..j];

            if batch.len() == 1 {
                self.run_one(i, &batch[0], backup_root, backups, outcomes).await?;
            } else {
                self.run_batch_parallel(i, batch, backup_root, backups, outcomes).await?;
            }
            i = j;
        }
        Ok(())
    }

    async fn run_one(
        &self,
        index: usize,
        step: &Step,
        backup_root: &Path,
        backups: &Mutex<Vec<FileBackup>>,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Result<(), CphError> {
        self.backup_before(index, step, backup_root, backups).await?;

        let result = dispatch_step(step, self.config.step_timeout, self.config.grace_period, &self.fs, &self.subprocess, &self.container).await;

        match result {
            Ok(()) => {
                outcomes.push(StepOutcome {
                    index,
                    description: step.description.clone(),
                    status: StepStatus::Success,
                    error: None,
                });
                Ok(())
            }
            Err(e) if step.allow_failure => {
                outcomes.push(StepOutcome {
                    index,
                    description: step.description.clone(),
                    status: StepStatus::Failed,
                    error: Some(e.to_string()),
                });
                Ok(())
            }
            Err(e) => {
                outcomes.push(StepOutcome {
                    index,
                    description: step.description.clone(),
                    status: StepStatus::Failed,
                    error: Some(e.to_string()),
                });
                Err(CphError::ExecStepFailed {
                    index,
                    description: step.description.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Backs every step in the batch up sequentially first (single-owner
    /// discipline), then runs them concurrently under a
    /// semaphore of width `max_workers`, aborting the remainder on the first
    /// failure that isn't `allow_failure`.
    async fn run_batch_parallel(
        &self,
        base_index: usize,
        batch: &[Step],
        backup_root: &Path,
        backups: &Mutex<Vec<FileBackup>>,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Result<(), CphError> {
        for (offset, step) in batch.iter().enumerate() {
            self.backup_before(base_index + offset, step, backup_root, backups).await?;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut set: JoinSet<(usize, Result<(), CphError>)> = JoinSet::new();
        let mut descriptions: HashMap<usize, (String, bool)> = HashMap::new();

        for (offset, step) in batch.iter().enumerate() {
            let idx = base_index + offset;
            descriptions.insert(idx, (step.description.clone(), step.allow_failure));

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let step = step.clone();
            let fs = self.fs.clone();
            let subprocess = self.subprocess.clone();
            let container = self.container.clone();
            let timeout = self.config.step_timeout;
            let grace = self.config.grace_period;

            set.spawn(async move {
                let _permit = permit;
                let result = dispatch_step(&step, timeout, grace, &fs, &subprocess, &container).await;
                (idx, result)
            });
        }

        let mut results: BTreeMap<usize, Result<(), CphError>> = BTreeMap::new();
        let mut should_abort = false;

        while let Some(joined) = set.join_next_with_id().await {
            if let Ok((_id, (idx, result))) = joined {
                let is_real_failure = match &result {
                    Ok(()) => false,
                    Err(_) => !descriptions.get(&idx).map(|(_, allow)| *allow).unwrap_or(false),
                };
                results.insert(idx, result);
                if is_real_failure && !should_abort {
                    should_abort = true;
                    set.abort_all();
                }
            }
            // Aborted or panicked tasks drop their join output; such steps
            // are backfilled as EXEC_CANCELLED below, keyed by their spawn-
            // time index in `descriptions` rather than the join error.
        }

        for idx in descriptions.keys() {
            results.entry(*idx).or_insert(Err(CphError::ExecCancelled));
        }

        let mut first_failure: Option<CphError> = None;
        for (idx, result) in results {
            let (description, allow_failure) = descriptions
                .get(&idx)
                .cloned()
                .unwrap_or_else(|| ("unknown step".to_string(), false));
            match result {
                Ok(()) => outcomes.push(StepOutcome {
                    index: idx,
                    description,
                    status: StepStatus::Success,
                    error: None,
                }),
                Err(e) => {
                    outcomes.push(StepOutcome {
                        index: idx,
                        description: description.clone(),
                        status: StepStatus::Failed,
                        error: Some(e.to_string()),
                    });
                    if !allow_failure && first_failure.is_none() {
                        first_failure = Some(CphError::ExecStepFailed {
                            index: idx,
                            description,
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }
        Ok(())
    }

    /// Copies every pre-existing path a step is about to write into
    /// `backup_root`, recording a [`FileBackup`] for each write target
    /// (existing or not) so [`Executor::rollback`] knows whether to restore
    /// or simply remove it.
    async fn backup_before(
        &self,
        index: usize,
        step: &Step,
        backup_root: &Path,
        backups: &Mutex<Vec<FileBackup>>,
    ) -> Result<(), CphError> {
        let (_, writes) = cph_plan::io_manifest(step.kind, &step.args);
        for (n, original_path) in writes.iter().enumerate() {
            let existed_before = self.fs.exists(original_path).await;
            let backup_path = backup_root.join(format!("{index}_{n}_{}", sanitize_for_backup_name(original_path)));
            if existed_before {
                self.fs.copy(original_path, &backup_path).await?;
            }
            backups.lock().unwrap().push(FileBackup {
                original_path: original_path.clone(),
                backup_path,
                operation_kind: step.kind,
                existed_before,
            });
        }
        Ok(())
    }

    /// Reverses every recorded [`FileBackup`] in LIFO order: restores paths
    /// that existed pre-execution, removes paths that didn't.
    async fn rollback(&self, backups: &[FileBackup], backup_root: &Path) -> Result<(), CphError> {
        for (i, backup) in backups.iter().enumerate().rev() {
            let result = if backup.existed_before {
                self.fs.copy(&backup.backup_path, &backup.original_path).await
            } else {
                self.fs.remove(&backup.original_path).await
            };
            if let Err(e) = result {
                return Err(CphError::ExecRollbackFailed {
                    index: i,
                    description: format!("{} {}", backup.operation_kind, backup.original_path.display()),
                    reason: e.to_string(),
                    backup_root: backup_root.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

fn required_path(step: &Step, key: &str) -> Result<PathBuf, CphError> {
    step.args
        .get(key)
        .map(PathBuf::from)
        .ok_or_else(|| CphError::PlanInvalidStepArgs {
            kind: step.kind.to_string(),
            reason: format!("missing '{key}'"),
        })
}

fn required_arg<'a>(step: &'a Step, key: &str) -> Result<&'a str, CphError> {
    step.args
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| CphError::PlanInvalidStepArgs {
            kind: step.kind.to_string(),
            reason: format!("missing '{key}'"),
        })
}

fn default_browser_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Run a single Step against whichever driver owns its `StepKind`.
/// One branch per kind.
async fn dispatch_step(
    step: &Step,
    timeout: Duration,
    grace_period: Duration,
    fs: &Arc<dyn FilesystemDriver>,
    subprocess: &Arc<dyn SubprocessDriver>,
    container: &Arc<dyn ContainerDriver>,
) -> Result<(), CphError> {
    match step.kind {
        StepKind::Mkdir => {
            let path = required_path(step, "path")?;
            fs.create_dir(&path).await
        }
        StepKind::Touch => {
            let path = required_path(step, "path")?;
            fs.touch(&path).await
        }
        StepKind::Copy => {
            let src = required_path(step, "src")?;
            let dst = required_path(step, "dst")?;
            fs.copy(&src, &dst).await
        }
        StepKind::Move => {
            let src = required_path(step, "src")?;
            let dst = required_path(step, "dst")?;
            fs.move_path(&src, &dst).await
        }
        StepKind::Remove => {
            let path = required_path(step, "path")?;
            fs.remove(&path).await
        }
        StepKind::Chmod => {
            let path = required_path(step, "path")?;
            let mode_str = required_arg(step, "mode")?;
            let mode = u32::from_str_radix(mode_str, 8).map_err(|_| CphError::PlanInvalidStepArgs {
                kind: step.kind.to_string(),
                reason: format!("'{mode_str}' is not a valid octal mode"),
            })?;
            fs.chmod(&path, mode).await
        }
        StepKind::Shell | StepKind::Python | StepKind::Test => {
            let command = required_arg(step, "command")?;
            let cwd = step.args.get("cwd").map(PathBuf::from);
            let output = subprocess
                .run_command("sh", &["-c".to_string(), command.to_string()], cwd.as_deref(), timeout)
                .await?;
            if output.return_code != 0 {
                return Err(CphError::DriverSubprocess {
                    program: step.kind.to_string(),
                    reason: format!("exited with status {}: {}", output.return_code, output.stderr),
                });
            }
            Ok(())
        }
        StepKind::ContainerBuild => {
            let image = required_arg(step, "image")?;
            match step.args.get("dockerfile") {
                Some(dockerfile) => container.image_build(dockerfile, image).await,
                None => container.image_pull(image).await,
            }
        }
        StepKind::ContainerRun => {
            let image = required_arg(step, "image")?;
            let name = step
                .args
                .get("container")
                .cloned()
                .unwrap_or_else(|| crate::drivers::container_name(image));
            let command: Vec<String> = step
                .args
                .get("command")
                .map(|c| c.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            container.container_run(image, &name, &command).await.map(|_| ())
        }
        StepKind::ContainerStop => {
            let name = required_arg(step, "container")?;
            container.container_stop(name, grace_period).await
        }
        StepKind::ContainerRemove => {
            let name = required_arg(step, "container")?;
            container.container_remove(name).await
        }
        StepKind::EditorOpen => {
            let path = required_path(step, "path")?;
            let editor = step
                .args
                .get("editor")
                .cloned()
                .or_else(|| std::env::var("EDITOR").ok())
                .unwrap_or_else(|| "vi".to_string());
            subprocess
                .run_command(&editor, &[path.display().to_string()], None, timeout)
                .await
                .map(|_| ())
        }
        StepKind::BrowserOpen => {
            let url = required_arg(step, "url")?;
            let browser = step
                .args
                .get("browser")
                .cloned()
                .unwrap_or_else(|| default_browser_opener().to_string());
            subprocess.run_command(&browser, &[url.to_string()], None, timeout).await.map(|_| ())
        }
        StepKind::SubmitFetch => {
            let url = required_arg(step, "url")?;
            let tool = step.args.get("tool").map(String::as_str).unwrap_or("oj");
            let output = if let Some(source) = step.args.get("source") {
                let language_id = step.args.get("language_id").map(String::as_str).unwrap_or("");
                subprocess
                    .run_command(
                        tool,
                        &[
                            "submit".to_string(),
                            url.to_string(),
                            source.clone(),
                            "--language".to_string(),
                            language_id.to_string(),
                        ],
                        None,
                        timeout,
                    )
                    .await?
            } else {
                let dir = step.args.get("dir").map(String::as_str).unwrap_or(".");
                subprocess
                    .run_command(
                        tool,
                        &["download".to_string(), url.to_string(), "-d".to_string(), dir.to_string()],
                        None,
                        timeout,
                    )
                    .await?
            };
            if output.return_code != 0 {
                return Err(CphError::DriverSubprocess {
                    program: tool.to_string(),
                    reason: format!("exited with status {}: {}", output.return_code, output.stderr),
                });
            }
            Ok(())
        }
    }
}

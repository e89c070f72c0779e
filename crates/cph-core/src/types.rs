use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Execution environment for a run: on the host, or inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvType {
    Local,
    Container,
}

impl EnvType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Container => "container",
        }
    }
}

impl std::fmt::Display for EnvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output format for CLI responses (SPEC_FULL supplement #2).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Discriminant of the fields an [`ExecutionContext`] carries, used to
/// track which were explicitly user-specified versus recovered from the
/// state store's [`ContextSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContextField {
    Language,
    ContestName,
    ProblemName,
    CommandType,
    EnvType,
}

impl ContextField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::ContestName => "contest_name",
            Self::ProblemName => "problem_name",
            Self::CommandType => "command_type",
            Self::EnvType => "env_type",
        }
    }
}

impl std::fmt::Display for ContextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable execution context assembled by the Argument Parser (C3) and
/// the State Store (C4), consumed by the Step Planner (C5).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub language: Option<String>,
    pub contest_name: Option<String>,
    pub problem_name: Option<String>,
    pub command_type: Option<String>,
    pub env_type: Option<EnvType>,
    pub workspace_path: Option<PathBuf>,
    pub current_path: Option<PathBuf>,
    pub stock_path: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    pub source_file_name: Option<String>,
    pub run_command: Option<String>,
    pub language_id: Option<String>,
    /// Fields the user explicitly supplied on the command line this run,
    /// as opposed to ones recovered from the snapshot or left defaulted.
    pub user_specified: BTreeSet<ContextField>,
}

impl ExecutionContext {
    pub fn is_user_specified(&self, field: ContextField) -> bool {
        self.user_specified.contains(&field)
    }

    pub fn mark_user_specified(&mut self, field: ContextField) {
        self.user_specified.insert(field);
    }

    /// Build a `{placeholder}` substitution map for the Template Expander (C2).
    pub fn template_vars(&self) -> std::collections::HashMap<String, String> {
        let mut m = std::collections::HashMap::new();
        if let Some(v) = &self.language {
            m.insert("language".into(), v.clone());
        }
        if let Some(v) = &self.contest_name {
            m.insert("contest".into(), v.clone());
            m.insert("contest_name".into(), v.clone());
        }
        if let Some(v) = &self.problem_name {
            m.insert("problem".into(), v.clone());
            m.insert("problem_name".into(), v.clone());
        }
        if let Some(v) = &self.command_type {
            m.insert("command".into(), v.clone());
        }
        if let Some(v) = &self.env_type {
            m.insert("env".into(), v.to_string());
        }
        if let Some(v) = &self.source_file_name {
            m.insert("source_file_name".into(), v.clone());
        }
        if let Some(v) = &self.language_id {
            m.insert("language_id".into(), v.clone());
        }
        if let Some(v) = &self.workspace_path {
            m.insert("workspace".into(), v.display().to_string());
        }
        if let Some(v) = &self.current_path {
            m.insert("current".into(), v.display().to_string());
        }
        if let Some(v) = &self.stock_path {
            m.insert("stock".into(), v.display().to_string());
        }
        if let Some(v) = &self.template_path {
            m.insert("template".into(), v.display().to_string());
        }
        m
    }
}

/// Discriminant of a [`Step`]'s action (representative set;
/// additional kinds may be added without breaking the interface).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    Shell,
    Python,
    Copy,
    Move,
    Remove,
    Mkdir,
    Touch,
    ContainerRun,
    ContainerBuild,
    ContainerStop,
    ContainerRemove,
    Chmod,
    EditorOpen,
    BrowserOpen,
    SubmitFetch,
    Test,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "SHELL",
            Self::Python => "PYTHON",
            Self::Copy => "COPY",
            Self::Move => "MOVE",
            Self::Remove => "REMOVE",
            Self::Mkdir => "MKDIR",
            Self::Touch => "TOUCH",
            Self::ContainerRun => "CONTAINER_RUN",
            Self::ContainerBuild => "CONTAINER_BUILD",
            Self::ContainerStop => "CONTAINER_STOP",
            Self::ContainerRemove => "CONTAINER_REMOVE",
            Self::Chmod => "CHMOD",
            Self::EditorOpen => "EDITOR_OPEN",
            Self::BrowserOpen => "BROWSER_OPEN",
            Self::SubmitFetch => "SUBMIT_FETCH",
            Self::Test => "TEST",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHELL" => Ok(Self::Shell),
            "PYTHON" => Ok(Self::Python),
            "COPY" => Ok(Self::Copy),
            "MOVE" => Ok(Self::Move),
            "REMOVE" => Ok(Self::Remove),
            "MKDIR" => Ok(Self::Mkdir),
            "TOUCH" => Ok(Self::Touch),
            "CONTAINER_RUN" => Ok(Self::ContainerRun),
            "CONTAINER_BUILD" => Ok(Self::ContainerBuild),
            "CONTAINER_STOP" => Ok(Self::ContainerStop),
            "CONTAINER_REMOVE" => Ok(Self::ContainerRemove),
            "CHMOD" => Ok(Self::Chmod),
            "EDITOR_OPEN" => Ok(Self::EditorOpen),
            "BROWSER_OPEN" => Ok(Self::BrowserOpen),
            "SUBMIT_FETCH" => Ok(Self::SubmitFetch),
            "TEST" => Ok(Self::Test),
            other => Err(format!("unknown step kind '{other}'")),
        }
    }
}

/// Kind-specific structured payload for a [`Step`]. Plain string map; kinds
/// validate their own required keys in the Step Planner.
pub type StepArgs = std::collections::BTreeMap<String, String>;

/// Immutable record produced only by the Step Planner; once produced, never
/// mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub args: StepArgs,
    pub when: Option<String>,
    pub allow_failure: bool,
    pub parallel_group: Option<String>,
    pub description: String,
}

/// Runtime status of a Step as it is executed: INIT/READY belong to
/// the Planner, the rest to the Executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
}

/// Ordered sequence of Steps with optional parallel groups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub steps: Vec<Step>,
    /// Directories/files the executor must ensure exist before running.
    pub prepared_paths: Vec<PathBuf>,
}

/// Persistent row capturing one completed operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub language: String,
    pub contest_name: String,
    pub problem_name: String,
    pub command: String,
    pub env_type: EnvType,
    pub result: String,
    pub stdout_digest: String,
    pub stderr_digest: String,
    pub return_code: i32,
    pub duration_ms: u64,
    pub details_json: Option<String>,
}

/// Persistent key-value mapping of the last-used ExecutionContext fields,
/// one logical snapshot, per-field `user_specified` flags.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub values: std::collections::BTreeMap<String, Option<String>>,
    pub user_specified: BTreeSet<ContextField>,
}

impl ContextSnapshot {
    pub fn get(&self, field: ContextField) -> Option<&str> {
        self.values
            .get(field.as_str())
            .and_then(|v| v.as_deref())
    }
}

/// Executor-scoped backup record consulted during rollback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileBackup {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub operation_kind: StepKind,
    /// `false` when `original_path` did not exist pre-execution: rollback
    /// removes it rather than restoring from `backup_path`.
    pub existed_before: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kind_round_trips_through_str() {
        for kind in [
            StepKind::Shell,
            StepKind::Python,
            StepKind::Copy,
            StepKind::Move,
            StepKind::Remove,
            StepKind::Mkdir,
            StepKind::Touch,
            StepKind::ContainerRun,
            StepKind::ContainerBuild,
            StepKind::ContainerStop,
            StepKind::ContainerRemove,
            StepKind::Chmod,
            StepKind::EditorOpen,
            StepKind::BrowserOpen,
            StepKind::SubmitFetch,
            StepKind::Test,
        ] {
            let s = kind.to_string();
            let parsed: StepKind = s.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn step_kind_from_str_is_case_insensitive() {
        assert_eq!("mkdir".parse::<StepKind>().unwrap(), StepKind::Mkdir);
        assert_eq!("Mkdir".parse::<StepKind>().unwrap(), StepKind::Mkdir);
    }

    #[test]
    fn step_kind_from_str_rejects_unknown() {
        assert!("FROBNICATE".parse::<StepKind>().is_err());
    }

    #[test]
    fn execution_context_template_vars_includes_set_fields_only() {
        let ctx = ExecutionContext {
            language: Some("python".into()),
            contest_name: Some("abc300".into()),
            problem_name: Some("a".into()),
            ..Default::default()
        };
        let vars = ctx.template_vars();
        assert_eq!(vars.get("language").unwrap(), "python");
        assert_eq!(vars.get("contest").unwrap(), "abc300");
        assert_eq!(vars.get("problem").unwrap(), "a");
        assert!(!vars.contains_key("command"));
    }

    #[test]
    fn execution_context_user_specified_tracking() {
        let mut ctx = ExecutionContext::default();
        assert!(!ctx.is_user_specified(ContextField::Language));
        ctx.mark_user_specified(ContextField::Language);
        assert!(ctx.is_user_specified(ContextField::Language));
        assert!(!ctx.is_user_specified(ContextField::ContestName));
    }

    #[test]
    fn context_snapshot_get_distinguishes_absent_from_null() {
        let mut snap = ContextSnapshot::default();
        snap.values.insert("language".into(), Some("rust".into()));
        snap.values.insert("contest_name".into(), None);
        assert_eq!(snap.get(ContextField::Language), Some("rust"));
        assert_eq!(snap.get(ContextField::ContestName), None);
        assert_eq!(snap.get(ContextField::ProblemName), None);
    }

    #[test]
    fn env_type_display_matches_config_tokens() {
        assert_eq!(EnvType::Local.to_string(), "local");
        assert_eq!(EnvType::Container.to_string(), "container");
    }
}

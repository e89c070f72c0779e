use std::path::PathBuf;

/// Stable error taxonomy for the engine. Each variant's `code()`
/// is the identifier logged and asserted on in tests; `Display` is the
/// user-facing message.
#[derive(thiserror::Error, Debug)]
pub enum CphError {
    #[error("config path '{0}' not found")]
    ConfigNotFound(String),

    #[error("config path '{path}' expected {expected}, found {found}")]
    ConfigTypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("ambiguous alias '{alias}' at '{path}': matches multiple siblings")]
    ConfigAmbiguousAlias { path: String, alias: String },

    #[error("unresolved template token(s) in '{template}': {}", .unresolved.join(", "))]
    ConfigUnresolvedTemplate {
        template: String,
        unresolved: Vec<String>,
    },

    #[error("unrecognized argument token '{0}'")]
    ArgUnknownToken(String),

    #[error("too many positional arguments: {0:?}")]
    ArgTooMany(Vec<String>),

    #[error("missing required field '{0}'")]
    ArgMissingRequiredField(String),

    #[error("invalid args for step '{kind}': {reason}")]
    PlanInvalidStepArgs { kind: String, reason: String },

    #[error("invalid condition syntax: '{0}'")]
    PlanInvalidCondition(String),

    #[error("file pattern '{pattern}' matched no files under {base}")]
    PlanFileMatchEmpty { pattern: String, base: PathBuf },

    #[error("step {index} ('{description}') failed: {source}")]
    ExecStepFailed {
        index: usize,
        description: String,
        #[source]
        source: Box<CphError>,
    },

    #[error("rollback failed after step {index} ('{description}'): {reason}; workspace may be in an inconsistent state; inspect {backup_root}")]
    ExecRollbackFailed {
        index: usize,
        description: String,
        reason: String,
        backup_root: PathBuf,
    },

    #[error("execution cancelled")]
    ExecCancelled,

    #[error("step {index} ('{description}') timed out after {timeout_secs}s")]
    ExecTimeout {
        index: usize,
        description: String,
        timeout_secs: u64,
    },

    #[error("filesystem driver error on {path}: {reason}")]
    DriverFilesystem { path: PathBuf, reason: String },

    #[error("subprocess driver error running '{program}': {reason}")]
    DriverSubprocess { program: String, reason: String },

    #[error("container driver error ({op}): {reason}")]
    DriverContainer { op: String, reason: String },

    #[error("state database busy: locked by pid {locked_by_pid} ({reason})")]
    StateDatabaseBusy { locked_by_pid: u32, reason: String },

    #[error("state store migration failed at version {version}: {reason}")]
    StateMigrationFailed { version: u32, reason: String },

    #[error("state store integrity error: {0}")]
    StateIntegrity(String),
}

impl CphError {
    /// Stable code string, logged and asserted on in tests.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigTypeMismatch { .. } => "CONFIG_TYPE_MISMATCH",
            Self::ConfigAmbiguousAlias { .. } => "CONFIG_AMBIGUOUS_ALIAS",
            Self::ConfigUnresolvedTemplate { .. } => "CONFIG_UNRESOLVED_TEMPLATE",
            Self::ArgUnknownToken(_) => "ARG_UNKNOWN_TOKEN",
            Self::ArgTooMany(_) => "ARG_TOO_MANY",
            Self::ArgMissingRequiredField(_) => "ARG_MISSING_REQUIRED_FIELD",
            Self::PlanInvalidStepArgs { .. } => "PLAN_INVALID_STEP_ARGS",
            Self::PlanInvalidCondition(_) => "PLAN_INVALID_CONDITION",
            Self::PlanFileMatchEmpty { .. } => "PLAN_FILE_PATTERN_EMPTY",
            Self::ExecStepFailed { .. } => "EXEC_STEP_FAILED",
            Self::ExecRollbackFailed { .. } => "EXEC_ROLLBACK_FAILED",
            Self::ExecCancelled => "EXEC_CANCELLED",
            Self::ExecTimeout { .. } => "EXEC_TIMEOUT",
            Self::DriverFilesystem { .. } => "DRIVER_FILESYSTEM",
            Self::DriverSubprocess { .. } => "DRIVER_SUBPROCESS",
            Self::DriverContainer { .. } => "DRIVER_CONTAINER",
            Self::StateDatabaseBusy { .. } => "STATE_DATABASE_BUSY",
            Self::StateMigrationFailed { .. } => "STATE_MIGRATION_FAILED",
            Self::StateIntegrity(_) => "STATE_INTEGRITY",
        }
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigNotFound(_)
            | Self::ConfigTypeMismatch { .. }
            | Self::ConfigAmbiguousAlias { .. }
            | Self::ConfigUnresolvedTemplate { .. } => 2,
            Self::ArgUnknownToken(_) | Self::ArgTooMany(_) | Self::ArgMissingRequiredField(_) => 3,
            Self::StateDatabaseBusy { .. } | Self::StateIntegrity(_) => 4,
            Self::StateMigrationFailed { .. } => 4,
            Self::ExecRollbackFailed { .. } => 5,
            Self::PlanInvalidStepArgs { .. }
            | Self::PlanInvalidCondition(_)
            | Self::PlanFileMatchEmpty { .. }
            | Self::ExecStepFailed { .. }
            | Self::ExecCancelled
            | Self::ExecTimeout { .. }
            | Self::DriverFilesystem { .. }
            | Self::DriverSubprocess { .. }
            | Self::DriverContainer { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_config_not_found() {
        let err = CphError::ConfigNotFound("languages.rust".into());
        assert_eq!(err.to_string(), "config path 'languages.rust' not found");
        assert_eq!(err.code(), "CONFIG_NOT_FOUND");
    }

    #[test]
    fn test_display_config_type_mismatch() {
        let err = CphError::ConfigTypeMismatch {
            path: "output.preset".into(),
            expected: "string".into(),
            found: "integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "config path 'output.preset' expected string, found integer"
        );
    }

    #[test]
    fn test_display_config_ambiguous_alias() {
        let err = CphError::ConfigAmbiguousAlias {
            path: "commands".into(),
            alias: "t".into(),
        };
        assert_eq!(
            err.to_string(),
            "ambiguous alias 't' at 'commands': matches multiple siblings"
        );
    }

    #[test]
    fn test_display_config_unresolved_template() {
        let err = CphError::ConfigUnresolvedTemplate {
            template: "{contest}/{problem}".into(),
            unresolved: vec!["contest".into(), "problem".into()],
        };
        assert_eq!(
            err.to_string(),
            "unresolved template token(s) in '{contest}/{problem}': contest, problem"
        );
    }

    #[test]
    fn test_display_arg_unknown_token() {
        let err = CphError::ArgUnknownToken("--bogus".into());
        assert_eq!(err.to_string(), "unrecognized argument token '--bogus'");
    }

    #[test]
    fn test_display_arg_too_many() {
        let err = CphError::ArgTooMany(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(
            err.to_string(),
            "too many positional arguments: [\"a\", \"b\", \"c\"]"
        );
    }

    #[test]
    fn test_display_arg_missing_required_field() {
        let err = CphError::ArgMissingRequiredField("language".into());
        assert_eq!(err.to_string(), "missing required field 'language'");
    }

    #[test]
    fn test_display_plan_invalid_step_args() {
        let err = CphError::PlanInvalidStepArgs {
            kind: "COPY".into(),
            reason: "missing 'dst'".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid args for step 'COPY': missing 'dst'"
        );
    }

    #[test]
    fn test_display_plan_invalid_condition() {
        let err = CphError::PlanInvalidCondition("exists PATH".into());
        assert_eq!(err.to_string(), "invalid condition syntax: 'exists PATH'");
    }

    #[test]
    fn test_display_plan_file_match_empty() {
        let err = CphError::PlanFileMatchEmpty {
            pattern: "*.rs".into(),
            base: PathBuf::from("/tmp/x"),
        };
        assert_eq!(
            err.to_string(),
            "file pattern '*.rs' matched no files under /tmp/x"
        );
    }

    #[test]
    fn test_display_exec_step_failed() {
        let inner = CphError::DriverFilesystem {
            path: PathBuf::from("/a"),
            reason: "permission denied".into(),
        };
        let err = CphError::ExecStepFailed {
            index: 2,
            description: "copy a to b".into(),
            source: Box::new(inner),
        };
        assert_eq!(
            err.to_string(),
            "step 2 ('copy a to b') failed: filesystem driver error on /a: permission denied"
        );
    }

    #[test]
    fn test_display_exec_rollback_failed() {
        let err = CphError::ExecRollbackFailed {
            index: 3,
            description: "shell test".into(),
            reason: "backup copy missing".into(),
            backup_root: PathBuf::from("/tmp/.temp"),
        };
        assert_eq!(
            err.to_string(),
            "rollback failed after step 3 ('shell test'): backup copy missing; workspace may be in an inconsistent state; inspect /tmp/.temp"
        );
    }

    #[test]
    fn test_display_exec_cancelled() {
        assert_eq!(CphError::ExecCancelled.to_string(), "execution cancelled");
    }

    #[test]
    fn test_display_exec_timeout() {
        let err = CphError::ExecTimeout {
            index: 1,
            description: "run tests".into(),
            timeout_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "step 1 ('run tests') timed out after 30s"
        );
    }

    #[test]
    fn test_display_driver_filesystem() {
        let err = CphError::DriverFilesystem {
            path: PathBuf::from("/x/y"),
            reason: "no such file".into(),
        };
        assert_eq!(
            err.to_string(),
            "filesystem driver error on /x/y: no such file"
        );
    }

    #[test]
    fn test_display_driver_subprocess() {
        let err = CphError::DriverSubprocess {
            program: "oj".into(),
            reason: "not found on PATH".into(),
        };
        assert_eq!(
            err.to_string(),
            "subprocess driver error running 'oj': not found on PATH"
        );
    }

    #[test]
    fn test_display_driver_container() {
        let err = CphError::DriverContainer {
            op: "image_pull".into(),
            reason: "registry timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "container driver error (image_pull): registry timeout"
        );
    }

    #[test]
    fn test_display_state_database_busy() {
        let err = CphError::StateDatabaseBusy {
            locked_by_pid: 4242,
            reason: "lock held".into(),
        };
        assert_eq!(
            err.to_string(),
            "state database busy: locked by pid 4242 (lock held)"
        );
    }

    #[test]
    fn test_display_state_migration_failed() {
        let err = CphError::StateMigrationFailed {
            version: 2,
            reason: "syntax error".into(),
        };
        assert_eq!(
            err.to_string(),
            "state store migration failed at version 2: syntax error"
        );
    }

    #[test]
    fn test_display_state_integrity() {
        let err = CphError::StateIntegrity("checksum mismatch".into());
        assert_eq!(
            err.to_string(),
            "state store integrity error: checksum mismatch"
        );
    }

    #[test]
    fn exit_codes_match_documented_values() {
        assert_eq!(CphError::ConfigNotFound("x".into()).exit_code(), 2);
        assert_eq!(CphError::ArgTooMany(vec![]).exit_code(), 3);
        assert_eq!(
            CphError::StateDatabaseBusy {
                locked_by_pid: 1,
                reason: "x".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            CphError::ExecRollbackFailed {
                index: 0,
                description: "x".into(),
                reason: "x".into(),
                backup_root: PathBuf::from("/tmp")
            }
            .exit_code(),
            5
        );
        assert_eq!(CphError::ExecCancelled.exit_code(), 1);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CphError>();
    }

    #[test]
    fn test_display_boundary_values() {
        let err = CphError::ArgTooMany(vec![]);
        assert_eq!(err.to_string(), "too many positional arguments: []");

        let err = CphError::StateDatabaseBusy {
            locked_by_pid: 0,
            reason: String::new(),
        };
        assert_eq!(err.to_string(), "state database busy: locked by pid 0 ()");
    }
}

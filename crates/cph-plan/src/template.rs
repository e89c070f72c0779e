//! Workflow template shape and the
//! JSON document loader that groups templates by `(language, command,
//! env)`, with an optional-field layout
//! generalized for file-pattern fan-out and parallel groups.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cph_core::{CphError, EnvType};

/// One step template as it appears in a workflow JSON document. `kind` is
/// validated against [`cph_core::StepKind`] only at expansion time, not at
/// deserialization, so an unknown kind surfaces as `PlanInvalidStepArgs`
/// with full plan context rather than a generic serde error.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StepTemplate {
    pub kind: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub parallel_group: Option<String>,
}

/// `{language: {command: {env: [StepTemplate, ...]}}}`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WorkflowDocument {
    #[serde(flatten)]
    languages: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<StepTemplate>>>>,
}

impl WorkflowDocument {
    pub fn parse(json: &str) -> Result<Self, CphError> {
        serde_json::from_str(json).map_err(|e| CphError::PlanInvalidStepArgs {
            kind: "<workflow document>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, CphError> {
        let content = std::fs::read_to_string(path).map_err(|e| CphError::ConfigNotFound(
            format!("{}: {e}", path.display())
        ))?;
        Self::parse(&content)
    }

    /// Templates registered for `(language, command, env)`, or an empty
    /// slice if the workflow document has nothing for this triple.
    pub fn lookup(&self, language: &str, command: &str, env: EnvType) -> &[StepTemplate] {
        self.languages
            .get(language)
            .and_then(|by_command| by_command.get(command))
            .and_then(|by_env| by_env.get(env.as_str()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

//! Shared types and the stable error taxonomy for the `cph` orchestration
//! engine: [`types::ExecutionContext`], [`types::Step`]/[`types::WorkflowPlan`],
//! and [`error::CphError`].

pub mod error;
pub mod types;

pub use error::CphError;
pub use types::{
    ContextField, ContextSnapshot, EnvType, ExecutionContext, FileBackup, OutputFormat,
    SessionRecord, Step, StepArgs, StepKind, StepStatus, WorkflowPlan,
};

pub type Result<T> = std::result::Result<T, CphError>;

//! Step Planner (C5) and Dependency Resolver (C6): expands workflow
//! templates into a self-sufficient, minimal sequence of `READY` Steps.

pub mod condition;
pub mod defaults;
pub mod deps;
pub mod planner;
pub mod template;

pub use deps::io_manifest;
pub use planner::expand;
pub use template::{StepTemplate, WorkflowDocument};

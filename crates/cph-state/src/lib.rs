//! State & History Store (C4): persists session context and execution
//! history in an embedded SQL database, distinguishing "user-specified"
//! context fields from ones merely recovered from a prior run.

pub mod lock;
pub mod migrate;
pub mod store;

pub use lock::DatabaseLock;
pub use store::{OperationRecord, StateStore, DEFAULT_LOCK_WAIT};

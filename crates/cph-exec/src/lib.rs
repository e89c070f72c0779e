//! Operation Drivers (C8) and Transaction Executor (C7): the side-effecting
//! half of the engine.

pub mod drivers;
pub mod executor;

pub use drivers::{
    image_name, container_name, CommandOutput, ContainerDriver, FilesystemDriver,
    MockContainerDriver, MockFilesystemDriver, MockSubprocessDriver, RealContainerDriver,
    RealFilesystemDriver, RealSubprocessDriver, SubprocessDriver,
};
pub use executor::{
    ExecutionReport, Executor, ExecutorConfig, StepOutcome, DEFAULT_GRACE_PERIOD,
    DEFAULT_MAX_WORKERS, DEFAULT_STEP_TIMEOUT,
};

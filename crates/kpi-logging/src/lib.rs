pub mod init;
pub mod job;
pub mod report;

pub use init::{init_logging, LoggingConfig, LoggingError};
pub use job::JobLog;
pub use report::{CycleReport, OutcomeEntry, OutcomeStatus};

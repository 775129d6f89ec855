//! Error types for the scheduler surface.

use thiserror::Error;

/// Errors returned by fallible scheduler operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedError {
    /// The scheduler has been shut down and accepts no new work.
    #[error("scheduler is shut down")]
    ShutDown,
}

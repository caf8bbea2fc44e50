use std::{fmt, io};
use thiserror::Error;

/// A task that stopped with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Name of the task.
    pub task: &'static str,
    /// The error it reported.
    pub error: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.error)
    }
}

/// Errors returned by the [`IndexerService`](crate::IndexerService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The read API could not bind its address. No task was started.
    #[error("failed to bind read API: {0}")]
    Bind(#[source] io::Error),
    /// One or more tasks failed.
    #[error("tasks failed: {}", display_failures(.0))]
    Tasks(Vec<TaskFailure>),
}

fn display_failures(failures: &[TaskFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

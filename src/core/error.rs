//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by host queues and scheduler plumbing.
///
/// Facade operations never surface these directly; a refused enqueue is
/// reported to callers as `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The queue has quit and accepts no more entries.
    #[error("queue closed")]
    QueueClosed,
    /// The queue reached its configured depth.
    #[error("queue full: depth {0}")]
    QueueFull(usize),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The run-loop thread could not be started.
    #[error("spawn error: {0}")]
    Spawn(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

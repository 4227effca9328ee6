// ABOUTME: Error taxonomy of the dispatch engine
// ABOUTME: Channel, computation, admission, task and shutdown failures as explicit types

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Communication with the front-end failed
#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    /// Recoverable failure talking to the front-end
    #[error("front-end communication failed: {message}")]
    Communication {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// The front-end will never produce another message
    #[error("front-end channel closed")]
    Closed,
}

impl FrontendError {
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Communication {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the dispatch loop may keep awaiting after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Communication { .. })
    }
}

/// A response could not be computed
#[derive(Debug, thiserror::Error)]
#[error("response computation failed: {message}")]
pub struct ComputationError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ComputationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// A task was submitted after the pool stopped accepting work
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

/// Why a dispatch task ended without sending a response
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Channel(#[from] FrontendError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error("task cancelled during shutdown")]
    Cancelled,
}

impl TaskError {
    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Computation(_) => "computation",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Misuse of the dispatcher surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch loop already started")]
    AlreadyStarted,
}

/// The stop sequence could not bring the pool down cleanly
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShutdownError {
    /// In-flight work outlived both the drain and the cancel deadline
    #[error(
        "dispatcher could not be stopped safely (drain {graceful_drain:?}, cancel {forced_cancel:?})"
    )]
    Timeout {
        graceful_drain: Duration,
        forced_cancel: Duration,
    },
    /// The task driving the stop sequence was cancelled while waiting
    #[error("stop sequence interrupted; forced cancellation was requested")]
    Interrupted,
}

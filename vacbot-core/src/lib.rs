// ABOUTME: Platform-agnostic message dispatch engine for conversational bots
// ABOUTME: Front-end and responder traits, elastic worker pool, dispatch loop and shutdown

pub mod dispatcher;
pub mod error;
pub mod limits;
pub mod message;
pub mod metrics;
pub mod pool;
pub mod shutdown;
pub mod task;
pub mod traits;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherState};
pub use error::{
    ComputationError, DispatchError, FrontendError, PoolClosed, ShutdownError, TaskError,
};
pub use message::{Message, MessageId};
pub use pool::{Admission, PoolConfig, PoolStatus, WorkerPool};
pub use shutdown::{ShutdownOutcome, ShutdownReport, ShutdownTimeouts};
pub use task::{DispatchOutcome, DispatchTask};
pub use traits::{Frontend, Responder};

// ABOUTME: Dispatch loop pulling messages from a front-end into the worker pool
// ABOUTME: Owns the collaborators, the pool and the stop sequence

use crate::error::{DispatchError, FrontendError, PoolClosed};
use crate::metrics;
use crate::pool::{PoolConfig, WorkerPool};
use crate::shutdown::{ShutdownOutcome, ShutdownTimeouts, StopSequence};
use crate::task::DispatchTask;
use crate::traits::{Frontend, Responder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Construction parameters of a [`Dispatcher`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub pool: PoolConfig,
    pub shutdown: ShutdownTimeouts,
}

impl DispatcherConfig {
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_shutdown_timeouts(mut self, shutdown: ShutdownTimeouts) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Lifecycle of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Stopping,
    Stopped,
}

/// Message dispatch engine.
///
/// `run` consumes messages one at a time and hands each to the worker pool;
/// `stop` may be called from any other task, any number of times. Responses
/// are not guaranteed to be sent in the order messages arrived.
pub struct Dispatcher<F: Frontend, R> {
    frontend: Arc<F>,
    responder: Arc<R>,
    pool: WorkerPool,
    interrupt: CancellationToken,
    started: AtomicBool,
    timeouts: ShutdownTimeouts,
    stop: StopSequence,
}

impl<F, R> Dispatcher<F, R>
where
    F: Frontend,
    R: Responder<F::Metadata>,
{
    /// Build the dispatcher and start its baseline workers.
    ///
    /// The front-end is closed once the pool has terminated.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(frontend: F, responder: R, config: DispatcherConfig) -> Self {
        let frontend = Arc::new(frontend);
        let pool = WorkerPool::new(config.pool);

        let closing = frontend.clone();
        pool.set_termination_hook(move || async move { closing.close().await });

        Self {
            frontend,
            responder: Arc::new(responder),
            pool,
            interrupt: CancellationToken::new(),
            started: AtomicBool::new(false),
            timeouts: config.shutdown,
            stop: StopSequence::new(),
        }
    }

    /// Run the dispatch loop until it is interrupted, the pool closes or the
    /// front-end runs dry, then wait for the dispatcher to be stopped. May
    /// only be called once.
    pub async fn run(&self) -> Result<(), DispatchError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyStarted);
        }

        tracing::info!(
            min_workers = self.pool.config().min_workers,
            max_workers = self.pool.config().max_workers,
            "Dispatch loop started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = self.interrupt.cancelled() => {
                    tracing::debug!("Dispatch loop interrupted");
                    break;
                }
                next = self.frontend.await_next_message() => next,
            };

            match next {
                Ok(message) => {
                    tracing::debug!(
                        message_id = %message.id(),
                        text = %message.text(),
                        "Received message"
                    );
                    metrics::record_message_received();

                    let task =
                        DispatchTask::new(self.frontend.clone(), self.responder.clone(), message);
                    if let Err(PoolClosed) = self.pool.submit(move |token| task.execute(token)).await
                    {
                        tracing::debug!("Worker pool closed, leaving dispatch loop");
                        break;
                    }
                }
                Err(FrontendError::Closed) => {
                    tracing::info!("Front-end closed, leaving dispatch loop");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to receive message");
                }
            }
        }

        tracing::info!("Dispatch loop finished");

        // Joins an ongoing stop, or starts one when the front-end ran dry
        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "Dispatcher stopped with an error");
        }
        Ok(())
    }

    /// Stop the dispatcher: interrupt the loop, drain the pool, then force it.
    ///
    /// Concurrent and repeated calls share one stop sequence and observe the
    /// same outcome.
    pub async fn stop(&self) -> ShutdownOutcome {
        self.stop.run(&self.interrupt, &self.pool, self.timeouts).await
    }

    pub fn state(&self) -> DispatcherState {
        self.stop.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DispatcherState> {
        self.stop.subscribe_state()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }
}

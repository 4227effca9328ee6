// ABOUTME: Two-phase, time-bounded stop sequence for the dispatcher
// ABOUTME: Graceful drain first, forced cancellation second, one shared outcome for every caller

use crate::dispatcher::DispatcherState;
use crate::error::ShutdownError;
use crate::metrics;
use crate::pool::WorkerPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Deadlines of the two shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// How long in-flight and queued work may keep running
    pub graceful_drain: Duration,
    /// How long cancelled work may take to wind down
    pub forced_cancel: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            graceful_drain: Duration::from_secs(60),
            forced_cancel: Duration::from_secs(30),
        }
    }
}

/// How the pool came down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReport {
    /// All work finished within the drain deadline
    Graceful,
    /// Running work had to be cancelled and `discarded` queued tasks were dropped
    Forced { discarded: usize },
}

pub type ShutdownOutcome = Result<ShutdownReport, ShutdownError>;

/// Interrupt the dispatch loop, then bring the pool down within `timeouts`.
pub async fn coordinate(
    interrupt: &CancellationToken,
    pool: &WorkerPool,
    timeouts: ShutdownTimeouts,
) -> ShutdownOutcome {
    tracing::info!("Stopping dispatcher");
    interrupt.cancel();
    pool.shutdown();

    if pool.await_termination(timeouts.graceful_drain).await {
        tracing::info!("Dispatcher stopped gracefully");
        metrics::record_shutdown("graceful");
        return Ok(ShutdownReport::Graceful);
    }

    tracing::warn!(
        timeout = ?timeouts.graceful_drain,
        "Graceful drain timed out, cancelling in-flight tasks"
    );
    let discarded = pool.shutdown_now();

    if pool.await_termination(timeouts.forced_cancel).await {
        tracing::info!(discarded, "Dispatcher stopped after forced cancellation");
        metrics::record_shutdown("forced");
        return Ok(ShutdownReport::Forced { discarded });
    }

    tracing::error!(
        graceful_drain = ?timeouts.graceful_drain,
        forced_cancel = ?timeouts.forced_cancel,
        "Dispatcher could not be stopped safely"
    );
    metrics::record_shutdown("timeout");
    Err(ShutdownError::Timeout {
        graceful_drain: timeouts.graceful_drain,
        forced_cancel: timeouts.forced_cancel,
    })
}

/// Runs the stop sequence at most once and shares its outcome.
pub(crate) struct StopSequence {
    started: AtomicBool,
    state: watch::Sender<DispatcherState>,
    outcome: watch::Sender<Option<ShutdownOutcome>>,
}

impl StopSequence {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            state: watch::Sender::new(DispatcherState::Running),
            outcome: watch::Sender::new(None),
        }
    }

    pub(crate) fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Lead the sequence if nobody did yet, otherwise wait for the leader's outcome
    pub(crate) async fn run(
        &self,
        interrupt: &CancellationToken,
        pool: &WorkerPool,
        timeouts: ShutdownTimeouts,
    ) -> ShutdownOutcome {
        if self.started.swap(true, Ordering::AcqRel) {
            return self.wait().await;
        }

        self.state.send_replace(DispatcherState::Stopping);
        let guard = InterruptGuard {
            sequence: self,
            pool,
            armed: true,
        };
        let outcome = coordinate(interrupt, pool, timeouts).await;
        guard.finish(outcome.clone());
        outcome
    }

    async fn wait(&self) -> ShutdownOutcome {
        let mut rx = self.outcome.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(ShutdownError::Interrupted)),
            Err(_) => Err(ShutdownError::Interrupted),
        };
        outcome
    }

    fn publish(&self, outcome: ShutdownOutcome) {
        self.outcome.send_replace(Some(outcome));
        self.state.send_replace(DispatcherState::Stopped);
    }
}

/// Forces cancellation and reports `Interrupted` if the leading stop future is dropped
struct InterruptGuard<'a> {
    sequence: &'a StopSequence,
    pool: &'a WorkerPool,
    armed: bool,
}

impl InterruptGuard<'_> {
    fn finish(mut self, outcome: ShutdownOutcome) {
        self.armed = false;
        self.sequence.publish(outcome);
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("Stop sequence interrupted, forcing cancellation");
            self.pool.shutdown_now();
            metrics::record_shutdown("interrupted");
            self.sequence.publish(Err(ShutdownError::Interrupted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;

    #[test]
    fn test_default_timeouts() {
        let timeouts = ShutdownTimeouts::default();
        assert_eq!(timeouts.graceful_drain, Duration::from_secs(60));
        assert_eq!(timeouts.forced_cancel, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_coordinate_idle_pool_is_graceful() {
        let pool = WorkerPool::new(PoolConfig::new(2).with_max_queued_tasks(4));
        let interrupt = CancellationToken::new();

        let outcome = coordinate(&interrupt, &pool, ShutdownTimeouts::default()).await;

        assert_eq!(outcome, Ok(ShutdownReport::Graceful));
        assert!(interrupt.is_cancelled());
        assert!(pool.is_terminated());
    }

    #[tokio::test]
    async fn test_dropped_leader_publishes_interrupted() {
        let pool = WorkerPool::new(PoolConfig::new(1).with_max_queued_tasks(4));
        let interrupt = CancellationToken::new();
        let sequence = StopSequence::new();

        // A task that only ends when cancelled keeps the drain phase waiting
        pool.submit(|token| async move { token.cancelled().await })
            .await
            .expect("pool open");

        let timeouts = ShutdownTimeouts {
            graceful_drain: Duration::from_secs(3600),
            forced_cancel: Duration::from_secs(3600),
        };
        let leader = sequence.run(&interrupt, &pool, timeouts);
        let timed_out = tokio::time::timeout(Duration::from_millis(50), leader).await;
        assert!(timed_out.is_err());

        assert_eq!(sequence.state(), DispatcherState::Stopped);
        let follower = sequence.run(&interrupt, &pool, timeouts).await;
        assert_eq!(follower, Err(ShutdownError::Interrupted));
        assert!(pool.await_termination(Duration::from_secs(2)).await);
    }
}

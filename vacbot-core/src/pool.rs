// ABOUTME: Admission-controlled elastic worker pool
// ABOUTME: Hands work to idle workers, grows to a ceiling, queues with a bound, then runs on the caller

use crate::error::PoolClosed;
use crate::limits;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Unit of work executed by the pool. The token is cancelled by `shutdown_now`.
pub type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send + 'static>;

/// Error returned by a termination hook
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

type TerminationHook =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), HookError>> + Send + 'static>;

// ============================================================================
// Configuration
// ============================================================================

/// Sizing of a worker pool, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers kept alive even when idle
    pub min_workers: usize,
    /// Upper bound on concurrently running workers
    pub max_workers: usize,
    /// How long a surplus worker stays parked before retiring
    pub worker_idle_timeout: Duration,
    /// Bound on admitted-but-not-started tasks
    pub max_queued_tasks: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(limits::default_min_workers())
    }
}

impl PoolConfig {
    /// Config with `min_workers` baseline workers and host-derived defaults for the rest
    pub fn new(min_workers: usize) -> Self {
        let min_workers = min_workers.max(1);
        Self {
            min_workers,
            max_workers: min_workers.saturating_mul(limits::DEFAULT_MAX_WORKERS_MULTIPLIER),
            worker_idle_timeout: Duration::from_secs(60),
            max_queued_tasks: limits::default_max_queued_tasks(),
        }
    }

    /// Set the worker ceiling (never below `min_workers`)
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(self.min_workers);
        self
    }

    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    pub fn with_max_queued_tasks(mut self, max_queued_tasks: usize) -> Self {
        self.max_queued_tasks = max_queued_tasks;
        self
    }
}

// ============================================================================
// Status types
// ============================================================================

/// How a submitted job was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Given directly to a parked worker
    HandedOff,
    /// A new worker was started for it
    Spawned,
    /// Waiting in the queue for a worker to free up
    Queued,
    /// Ran to completion on the submitting task
    CallerRuns,
}

impl Admission {
    pub fn label(&self) -> &'static str {
        match self {
            Self::HandedOff => "handed_off",
            Self::Spawned => "spawned",
            Self::Queued => "queued",
            Self::CallerRuns => "caller_runs",
        }
    }
}

/// Lifecycle of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Running,
    ShuttingDown,
    Terminated,
}

// ============================================================================
// Shared state
// ============================================================================

struct State {
    status: PoolStatus,
    workers: usize,
    next_worker_id: u64,
    /// Parked workers, most recently parked last
    idle: Vec<(u64, oneshot::Sender<Job>)>,
    queue: VecDeque<Job>,
    inline: usize,
}

impl State {
    /// Move to `Terminated` if nothing is left to run. Returns true exactly once.
    fn try_terminate(&mut self) -> bool {
        if self.status == PoolStatus::ShuttingDown
            && self.workers == 0
            && self.queue.is_empty()
            && self.inline == 0
        {
            self.status = PoolStatus::Terminated;
            true
        } else {
            false
        }
    }
}

struct Shared {
    config: PoolConfig,
    state: Mutex<State>,
    cancel: CancellationToken,
    terminated: watch::Sender<bool>,
    hook: Mutex<Option<TerminationHook>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn finish_termination(&self) {
        let hook = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            if let Err(e) = hook().await {
                tracing::error!(error = %e, "Failed to release resources on pool termination");
            }
        }
        tracing::info!("Worker pool terminated");
        self.terminated.send_replace(true);
    }
}

enum Decision {
    HandedOff,
    Spawn(u64, Job),
    Queued,
    RunInline(Job),
}

// ============================================================================
// WorkerPool
// ============================================================================

/// Elastic pool of Tokio worker tasks with admission control.
///
/// Admission order for every submission: hand off to a parked worker, start
/// a new worker while below `max_workers`, queue while below
/// `max_queued_tasks`, and otherwise run the job on the submitting task.
/// Submissions only fail once shutdown has begun.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create the pool and start `min_workers` parked workers.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        let (terminated, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                status: PoolStatus::Running,
                workers: 0,
                next_worker_id: 0,
                idle: Vec::new(),
                queue: VecDeque::new(),
                inline: 0,
            }),
            config,
            cancel: CancellationToken::new(),
            terminated,
            hook: Mutex::new(None),
        });

        let count = shared.config.min_workers;
        {
            let mut state = shared.lock();
            state.workers = count;
            state.next_worker_id = count as u64;
        }
        for id in 0..count as u64 {
            tokio::spawn(run_worker(shared.clone(), id, None));
        }

        tracing::debug!(
            min_workers = shared.config.min_workers,
            max_workers = shared.config.max_workers,
            max_queued_tasks = shared.config.max_queued_tasks,
            "Worker pool started"
        );

        Self { shared }
    }

    /// Install an async hook awaited once, right before termination is published
    pub fn set_termination_hook<F, Fut, E>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HookError> + Send + 'static,
    {
        let hook: TerminationHook = Box::new(move || {
            async move { hook().await.map_err(Into::into) }.boxed()
        });
        *self.shared.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Admit a job. Returns after hand-off, or after the job finished when it
    /// had to run on the caller.
    pub async fn submit<F, Fut>(&self, task: F) -> Result<Admission, PoolClosed>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::new(move |token| task(token).boxed());
        self.submit_job(job).await
    }

    pub async fn submit_job(&self, job: Job) -> Result<Admission, PoolClosed> {
        let decision = self.admit(job)?;

        let admission = match decision {
            Decision::HandedOff => Admission::HandedOff,
            Decision::Spawn(id, job) => {
                tracing::debug!(worker_id = id, "Spawning worker");
                tokio::spawn(run_worker(self.shared.clone(), id, Some(job)));
                Admission::Spawned
            }
            Decision::Queued => Admission::Queued,
            Decision::RunInline(job) => {
                tracing::debug!("Pool saturated, running task on the submitter");
                let _slot = InlineSlot {
                    shared: &self.shared,
                };
                run_job(job, self.shared.cancel.clone()).await;
                Admission::CallerRuns
            }
        };

        crate::metrics::record_admission(admission);
        Ok(admission)
    }

    fn admit(&self, job: Job) -> Result<Decision, PoolClosed> {
        let mut state = self.shared.lock();
        if state.status != PoolStatus::Running {
            return Err(PoolClosed);
        }

        let mut job = job;
        while let Some((id, slot)) = state.idle.pop() {
            match slot.send(job) {
                Ok(()) => return Ok(Decision::HandedOff),
                Err(returned) => {
                    // Parked worker was torn down with its runtime
                    tracing::warn!(worker_id = id, "Parked worker vanished");
                    state.workers -= 1;
                    job = returned;
                }
            }
        }

        if state.workers < self.shared.config.max_workers {
            state.workers += 1;
            let id = state.next_worker_id;
            state.next_worker_id += 1;
            return Ok(Decision::Spawn(id, job));
        }

        if state.queue.len() < self.shared.config.max_queued_tasks {
            state.queue.push_back(job);
            return Ok(Decision::Queued);
        }

        state.inline += 1;
        Ok(Decision::RunInline(job))
    }

    /// Stop accepting work. Queued and running jobs still complete.
    pub fn shutdown(&self) {
        let terminate = {
            let mut state = self.shared.lock();
            if state.status != PoolStatus::Running {
                return;
            }
            state.status = PoolStatus::ShuttingDown;
            // Dropping the slots wakes parked workers so they can exit
            state.idle.clear();
            state.try_terminate()
        };
        tracing::info!("Worker pool shutting down");
        if terminate {
            spawn_termination(self.shared.clone());
        }
    }

    /// Stop accepting work, discard queued jobs and cancel running ones.
    /// Returns how many queued jobs were discarded.
    pub fn shutdown_now(&self) -> usize {
        let (discarded, terminate) = {
            let mut state = self.shared.lock();
            if state.status == PoolStatus::Running {
                state.status = PoolStatus::ShuttingDown;
                state.idle.clear();
            }
            let discarded = std::mem::take(&mut state.queue);
            (discarded, state.try_terminate())
        };
        let count = discarded.len();
        drop(discarded);

        tracing::warn!(discarded = count, "Cancelling running tasks");
        self.shared.cancel.cancel();
        if terminate {
            spawn_termination(self.shared.clone());
        }
        count
    }

    /// Wait up to `timeout` for the pool to terminate. Returns whether it did.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut rx = self.shared.terminated.subscribe();
        let terminated = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|done| *done)).await,
            Ok(Ok(_))
        );
        terminated
    }

    pub fn is_terminated(&self) -> bool {
        *self.shared.terminated.borrow()
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.lock().status
    }

    pub fn worker_count(&self) -> usize {
        self.shared.lock().workers
    }

    pub fn idle_count(&self) -> usize {
        self.shared.lock().idle.len()
    }

    pub fn queued_count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn inline_count(&self) -> usize {
        self.shared.lock().inline
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_termination(shared: Arc<Shared>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { shared.finish_termination().await });
        }
        Err(_) => {
            shared.terminated.send_replace(true);
        }
    }
}

/// Accounts for a job running on a submitter, even if the submitter is dropped mid-job
struct InlineSlot<'a> {
    shared: &'a Arc<Shared>,
}

impl Drop for InlineSlot<'_> {
    fn drop(&mut self) {
        let terminate = {
            let mut state = self.shared.lock();
            state.inline -= 1;
            state.try_terminate()
        };
        if terminate {
            spawn_termination(self.shared.clone());
        }
    }
}

// ============================================================================
// Workers
// ============================================================================

async fn run_job(job: Job, token: CancellationToken) {
    if AssertUnwindSafe(job(token)).catch_unwind().await.is_err() {
        tracing::error!("Task panicked");
    }
}

async fn run_worker(shared: Arc<Shared>, id: u64, first: Option<Job>) {
    let mut job = first;
    loop {
        if let Some(current) = job.take() {
            run_job(current, shared.cancel.clone()).await;
        }
        match next_job(&shared, id).await {
            Next::Run(next) => job = Some(next),
            Next::Retire => {
                tracing::debug!(worker_id = id, "Idle worker retired");
                return;
            }
            Next::Exit { terminate } => {
                tracing::debug!(worker_id = id, "Worker exiting");
                if terminate {
                    shared.finish_termination().await;
                }
                return;
            }
        }
    }
}

enum Next {
    Run(Job),
    Retire,
    Exit { terminate: bool },
}

async fn next_job(shared: &Shared, id: u64) -> Next {
    loop {
        let mut slot = {
            let mut state = shared.lock();
            if let Some(job) = state.queue.pop_front() {
                return Next::Run(job);
            }
            if state.status != PoolStatus::Running {
                state.workers -= 1;
                return Next::Exit {
                    terminate: state.try_terminate(),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.idle.push((id, tx));
            rx
        };

        match tokio::time::timeout(shared.config.worker_idle_timeout, &mut slot).await {
            Ok(Ok(job)) => return Next::Run(job),
            // Slot dropped by shutdown; re-check the queue and lifecycle
            Ok(Err(_)) => continue,
            Err(_) => {
                let mut state = shared.lock();
                match state.idle.iter().position(|(worker, _)| *worker == id) {
                    Some(pos) => {
                        state.idle.remove(pos);
                        if state.workers > shared.config.min_workers {
                            state.workers -= 1;
                            return Next::Retire;
                        }
                    }
                    None => {
                        // A submitter claimed the slot while the timer fired
                        drop(state);
                        if let Ok(job) = slot.try_recv() {
                            return Next::Run(job);
                        }
                    }
                }
            }
        }
    }
}

//! Fixed-size thread pool for asynchronous paging operations.
//!
//! Every submitted closure yields an [`OperationHandle`], which can either be
//! blocked on with [`OperationHandle::wait`] or awaited as a `Future`.
//! The pool tracks in-flight work so callers can drain it.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use parking_lot::{Condvar, Mutex, RwLock};

/// Configuration for the thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (0 = auto-detect).
    pub num_threads: usize,
    /// Thread stack size in bytes (0 = platform default).
    pub stack_size: usize,
    /// Thread name prefix.
    pub thread_name_prefix: String,
    /// How long an idle worker sleeps before re-checking for shutdown (milliseconds).
    pub idle_timeout_ms: u64,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0, // Auto-detect
            stack_size: 0,
            thread_name_prefix: "hd-pager".to_string(),
            idle_timeout_ms: 50,
        }
    }
}

impl ThreadPoolConfig {
    /// Config with a specific thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self { num_threads, ..Default::default() }
    }
}

/// A task to be executed by the thread pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Statistics for thread pool performance.
#[derive(Debug, Default, Clone)]
pub struct ThreadPoolStats {
    pub total_tasks_executed: u64,
    pub panicked_tasks: u64,
    pub avg_exec_time_us: u64,
    pub pending: usize,
    pub threads_active: usize,
    pub threads_idle: usize,
}

/// Result of one submitted operation.
///
/// Resolves to `Err(ThreadPoolError::OperationDropped)` if the task panicked
/// or was never run because the pool was shutting down.
#[must_use = "an operation handle does nothing unless waited on or awaited"]
pub struct OperationHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> OperationHandle<T> {
    /// Block the calling thread until the operation completes.
    ///
    /// Do not call this from inside a pool worker for an operation queued on
    /// the same pool; with every worker blocked the queue never drains.
    pub fn wait(self) -> Result<T, ThreadPoolError> {
        futures::executor::block_on(self.receiver).map_err(|_| ThreadPoolError::OperationDropped)
    }

    /// A handle that is already resolved.
    pub fn ready(value: T) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(value);
        Self { receiver }
    }
}

impl<T, E> OperationHandle<Result<T, E>>
where
    E: From<ThreadPoolError>,
{
    /// Block until completion, folding a dropped operation into `E`.
    pub fn join(self) -> Result<T, E> {
        self.wait()?
    }
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T, ThreadPoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map_err(|_| ThreadPoolError::OperationDropped)
    }
}

/// Worker thread state.
struct Worker {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    // Submitted but not yet finished.
    pending: Mutex<usize>,
    drained: Condvar,
    shutdown: AtomicBool,
    stats: RwLock<ThreadPoolStats>,
}

/// Fixed-size pool of worker threads sharing one FIFO queue.
pub struct ThreadPool {
    workers: Vec<Worker>,
    shared: Arc<Shared>,
}

impl ThreadPool {
    /// Create a new thread pool with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let num_threads = if config.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.num_threads
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            pending: Mutex::new(0),
            drained: Condvar::new(),
            shutdown: AtomicBool::new(false),
            stats: RwLock::new(ThreadPoolStats::default()),
        });

        let mut pool = Self { workers: Vec::with_capacity(num_threads), shared };
        let idle_timeout = Duration::from_millis(config.idle_timeout_ms.max(1));

        for id in 0..num_threads {
            let active = Arc::new(AtomicBool::new(false));
            let active_clone = active.clone();
            let shared = pool.shared.clone();

            let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
            if config.stack_size > 0 {
                builder = builder.stack_size(config.stack_size);
            }

            // On failure `pool` drops here and joins the workers spawned so far.
            let handle = builder
                .spawn(move || Self::worker_loop(shared, active_clone, idle_timeout))
                .map_err(|e| ThreadPoolError::ThreadSpawnFailed(e.to_string()))?;

            pool.workers.push(Worker { active, handle: Some(handle) });
        }

        tracing::debug!(threads = num_threads, "thread pool started");
        Ok(pool)
    }

    /// Queue `operation` and return a handle to its result.
    pub fn submit<F, T>(&self, operation: F) -> OperationHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        if self.shared.shutdown.load(Ordering::SeqCst) {
            // Dropping the sender resolves the handle as dropped.
            return OperationHandle { receiver };
        }

        let task: Task = Box::new(move || {
            let _ = sender.send(operation());
        });

        *self.shared.pending.lock() += 1;
        self.shared.queue.lock().push_back(task);
        self.shared.work_ready.notify_one();

        OperationHandle { receiver }
    }

    /// Number of submitted operations that have not finished yet.
    pub fn pending(&self) -> usize {
        *self.shared.pending.lock()
    }

    /// Block until every submitted operation has finished.
    pub fn wait_idle(&self) {
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.drained.wait(&mut pending);
        }
    }

    fn worker_loop(shared: Arc<Shared>, active: Arc<AtomicBool>, idle_timeout: Duration) {
        loop {
            let task = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(task) = queue.pop_front() {
                        break Some(task);
                    }
                    // Queue is drained before a worker exits.
                    if shared.shutdown.load(Ordering::SeqCst) {
                        break None;
                    }
                    shared.work_ready.wait_for(&mut queue, idle_timeout);
                }
            };
            let Some(task) = task else {
                break;
            };

            active.store(true, Ordering::SeqCst);
            let start = Instant::now();
            let panicked = panic::catch_unwind(AssertUnwindSafe(task)).is_err();
            let exec_us = start.elapsed().as_micros() as u64;

            {
                let mut s = shared.stats.write();
                s.total_tasks_executed += 1;
                if panicked {
                    s.panicked_tasks += 1;
                }
                // Rolling average of execution time
                if s.avg_exec_time_us == 0 {
                    s.avg_exec_time_us = exec_us;
                } else {
                    s.avg_exec_time_us = (s.avg_exec_time_us * 9 + exec_us) / 10;
                }
            }
            if panicked {
                tracing::warn!("pool task panicked");
            }
            active.store(false, Ordering::SeqCst);

            let mut pending = shared.pending.lock();
            *pending = pending.saturating_sub(1);
            if *pending == 0 {
                shared.drained.notify_all();
            }
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> ThreadPoolStats {
        let mut stats = self.shared.stats.read().clone();
        stats.pending = self.pending();
        stats.threads_active = self
            .workers
            .iter()
            .filter(|w| w.active.load(Ordering::SeqCst))
            .count();
        stats.threads_idle = self.workers.len() - stats.threads_active;
        stats
    }

    /// Get number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Check if pool is shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.work_ready.notify_all();

        for worker in self.workers.drain(..) {
            if let Some(handle) = worker.handle {
                let _ = handle.join();
            }
        }
    }
}

/// Errors for thread pool operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadPoolError {
    #[error("Operation dropped before completion")]
    OperationDropped,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawnFailed(String),
}

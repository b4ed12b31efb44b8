//! Resizable worker pool
//!
//! A bounded FIFO queue of work items drained by a set of tokio tasks. The
//! set is replaced as a whole on `resize`: the current generation is told to
//! stop through its shared `done` signal and a fresh generation starts on
//! the same queue, so queued items are neither lost nor run twice.
//!
//! Callers get a [`WorkHandle`] per item that resolves to the item's output.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::PoolError;

/// Default bound on queued (not yet running) work items.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default ceiling for runtime resizes requested from outside the process.
pub const DEFAULT_MAX_WORKERS: usize = 64;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Lifecycle state of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    Running,
    Resizing,
    Closed,
}

/// Point-in-time view of the pool, for status endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub state: PoolState,
    pub workers: usize,
    pub live_workers: usize,
    pub outstanding: usize,
    pub queued: usize,
}

/// State shared with the worker tasks. Holds no sender, so dropping every
/// pool handle closes the queue: workers run what is left and then exit.
struct Shared {
    receiver: async_channel::Receiver<Job>,
    outstanding: watch::Sender<usize>,
    live: AtomicUsize,
}

/// Worker generation bookkeeping, guarded by one lock for resize and close.
struct Control {
    generation: u64,
    done: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    retired: Vec<JoinHandle<()>>,
}

struct Inner {
    sender: async_channel::Sender<Job>,
    shared: Arc<Shared>,
    control: Mutex<Control>,
    state: watch::Sender<PoolState>,
    worker_count: AtomicUsize,
}

/// Counts a worker as live from spawn until its task ends or is dropped.
struct LiveGuard(Arc<Shared>);

impl LiveGuard {
    fn new(shared: &Arc<Shared>) -> Self {
        shared.live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(shared))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_worker(
    guard: LiveGuard,
    mut done: watch::Receiver<bool>,
    generation: u64,
    worker: usize,
) {
    let shared = Arc::clone(&guard.0);
    let mut draining = false;
    tracing::debug!(generation, worker, "worker started");

    loop {
        let job = if draining {
            match shared.receiver.recv().await {
                Ok(job) => job,
                Err(_) => break,
            }
        } else {
            tokio::select! {
                biased;
                changed = done.changed() => match changed {
                    // stop signal from resize or close
                    Ok(()) => break,
                    // every pool handle dropped: run the backlog until the queue closes
                    Err(_) => {
                        draining = true;
                        continue;
                    }
                },
                job = shared.receiver.recv() => match job {
                    Ok(job) => job,
                    Err(_) => break,
                },
            }
        };

        if AssertUnwindSafe(async move { job().await })
            .catch_unwind()
            .await
            .is_err()
        {
            tracing::warn!(generation, worker, "work item panicked");
        }
        shared.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    tracing::debug!(generation, worker, "worker stopped");
    drop(guard);
}

/// Resolve once the outstanding count reaches zero.
async fn wait_idle(outstanding: &watch::Sender<usize>) {
    let mut rx = outstanding.subscribe();
    loop {
        let idle = *rx.borrow_and_update() == 0;
        if idle || rx.changed().await.is_err() {
            return;
        }
    }
}

fn spawn_generation(
    shared: &Arc<Shared>,
    generation: u64,
    count: usize,
) -> (watch::Sender<bool>, Vec<JoinHandle<()>>) {
    let (done_tx, done_rx) = watch::channel(false);
    let workers = (0..count)
        .map(|worker| {
            let guard = LiveGuard::new(shared);
            tokio::spawn(run_worker(guard, done_rx.clone(), generation, worker))
        })
        .collect();
    (done_tx, workers)
}

/// Bounded queue of work items drained by a resizable set of workers.
///
/// Cloning yields another handle to the same pool. Must be created from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Start a pool of `workers` workers with the default queue capacity.
    pub fn new(workers: usize) -> Self {
        Self::with_capacity(workers, DEFAULT_QUEUE_CAPACITY)
    }

    /// Start a pool with an explicit queue bound. A zero bound is raised to 1.
    pub fn with_capacity(workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        let (outstanding, _) = watch::channel(0usize);
        let shared = Arc::new(Shared {
            receiver,
            outstanding,
            live: AtomicUsize::new(0),
        });

        let (done, handles) = spawn_generation(&shared, 0, workers);
        let (state, _) = watch::channel(PoolState::Running);
        tracing::info!(workers, capacity, "worker pool started");

        Self {
            inner: Arc::new(Inner {
                sender,
                shared,
                control: Mutex::new(Control {
                    generation: 0,
                    done,
                    workers: handles,
                    retired: Vec::new(),
                }),
                state,
                worker_count: AtomicUsize::new(workers),
            }),
        }
    }

    /// Enqueue a work item.
    ///
    /// Waits only while the queue is full. The returned handle resolves to
    /// the item's output once a worker has run it; dropping the handle does
    /// not cancel the item.
    pub async fn submit<F, Fut, T>(&self, work: F) -> Result<WorkHandle<T>, PoolError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let value = work().await;
                // receiver gone means the caller stopped waiting
                let _ = result_tx.send(value);
            })
        });

        let outstanding = &self.inner.shared.outstanding;
        outstanding.send_modify(|n| *n += 1);
        if self.inner.sender.send(job).await.is_err() {
            outstanding.send_modify(|n| *n = n.saturating_sub(1));
            return Err(PoolError::Closed);
        }

        Ok(WorkHandle { result: result_rx })
    }

    /// Submit a work item and wait for its output.
    pub async fn run<F, Fut, T>(&self, work: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(work).await?.await
    }

    /// Replace the current worker generation with `count` fresh workers.
    ///
    /// Workers of the old generation finish the item they are running and
    /// exit; queued items are picked up by the new generation.
    pub async fn resize(&self, count: usize) -> Result<(), PoolError> {
        let mut control = self.inner.control.lock().await;
        if self.state() == PoolState::Closed {
            return Err(PoolError::Closed);
        }
        self.inner.state.send_replace(PoolState::Resizing);

        // no receivers when the old generation was empty
        let _ = control.done.send(true);
        let old = std::mem::take(&mut control.workers);
        control.retired.retain(|handle| !handle.is_finished());
        control.retired.extend(old);

        control.generation += 1;
        let generation = control.generation;
        let (done, handles) = spawn_generation(&self.inner.shared, generation, count);
        control.done = done;
        control.workers = handles;

        let previous = self.inner.worker_count.swap(count, Ordering::SeqCst);
        self.inner.state.send_replace(PoolState::Running);
        tracing::info!(generation, from = previous, to = count, "worker pool resized");
        Ok(())
    }

    /// Wait until every item submitted so far has completed and retired
    /// workers have exited.
    ///
    /// Items submitted while waiting may or may not be waited for.
    pub async fn wait(&self) {
        wait_idle(&self.inner.shared.outstanding).await;

        let retired = std::mem::take(&mut self.inner.control.lock().await.retired);
        for handle in retired {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "retired worker did not exit cleanly");
            }
        }
    }

    /// Stop accepting work, run the remaining backlog and join every worker.
    ///
    /// Later `submit` calls fail with [`PoolError::Closed`]. Calling `close`
    /// again is a no-op.
    pub async fn close(&self) {
        let mut control = self.inner.control.lock().await;
        if self.state() == PoolState::Closed {
            return;
        }
        self.inner.state.send_replace(PoolState::Closed);
        self.inner.sender.close();

        if control.workers.is_empty() {
            control.generation += 1;
            let generation = control.generation;
            tracing::debug!(generation, "spawning drain worker for empty pool");
            let (done, handles) = spawn_generation(&self.inner.shared, generation, 1);
            control.done = done;
            control.workers = handles;
        }

        wait_idle(&self.inner.shared.outstanding).await;

        let control = &mut *control;
        let _ = control.done.send(true);
        let handles: Vec<_> = control
            .workers
            .drain(..)
            .chain(control.retired.drain(..))
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "worker did not exit cleanly");
            }
        }

        self.inner.worker_count.store(0, Ordering::SeqCst);
        tracing::info!(generation = control.generation, "worker pool closed");
    }

    pub fn state(&self) -> PoolState {
        *self.inner.state.borrow()
    }

    /// Configured size of the current generation.
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count.load(Ordering::SeqCst)
    }

    /// Worker tasks currently alive, including retired ones still finishing.
    pub fn live_workers(&self) -> usize {
        self.inner.shared.live.load(Ordering::SeqCst)
    }

    /// Submitted items that have not completed yet (queued or running).
    pub fn outstanding(&self) -> usize {
        *self.inner.shared.outstanding.borrow()
    }

    /// Items waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner.sender.len()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            state: self.state(),
            workers: self.worker_count(),
            live_workers: self.live_workers(),
            outstanding: self.outstanding(),
            queued: self.queued(),
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.state())
            .field("workers", &self.worker_count())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Pending output of one submitted work item.
///
/// Resolves to [`PoolError::Abandoned`] if the item panicked or was dropped
/// before producing a value.
#[must_use = "a work handle does nothing unless awaited"]
#[derive(Debug)]
pub struct WorkHandle<T> {
    result: oneshot::Receiver<T>,
}

impl<T> Future for WorkHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result)
            .poll(cx)
            .map(|result| result.map_err(|_| PoolError::Abandoned))
    }
}

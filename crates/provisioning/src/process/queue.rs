//! Worker queue of operation ids
//!
//! An id is queued at most once, and never processed by two workers at the
//! same time: adding an id that is being processed marks it dirty and it is
//! queued again as soon as the current run finishes.

use super::EngineError;
use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};

/// Processes one queued operation
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Returns the delay after which the id must be processed again, zero when done
    async fn execute(&self, operation_id: &str) -> Result<Duration, EngineError>;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<String>,
    queued: HashSet<String>,
    processing: HashSet<String>,
    dirty: HashSet<String>,
    shutting_down: bool,
}

struct Inner {
    name: String,
    executor: Arc<dyn Executor>,
    state: Mutex<QueueState>,
    ready: Notify,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    speed_factor: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue feeding an [`Executor`] from a pool of workers
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.inner.name)
            .field("state", &*lock(&self.inner.state))
            .finish_non_exhaustive()
    }
}

impl Queue {
    pub fn new(name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                executor,
                state: Mutex::new(QueueState::default()),
                ready: Notify::new(),
                shutdown,
                workers: Mutex::new(Vec::new()),
                speed_factor: AtomicU32::new(1),
            }),
        }
    }

    /// Divide re-add delays by `factor`; for tests only
    pub fn speed_up(&self, factor: u32) {
        self.inner.speed_factor.store(factor.max(1), Ordering::Relaxed);
        info!("Queue {} speed factor set to {}", self.inner.name, factor);
    }

    /// Number of ids waiting for a worker
    pub fn len(&self) -> usize {
        lock(&self.inner.state).queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&self, operation_id: &str) {
        let mut state = lock(&self.inner.state);
        if state.shutting_down {
            debug!("Queue {} is shutting down, dropping item {}", self.inner.name, operation_id);
            return;
        }
        if state.queued.contains(operation_id) {
            return;
        }
        if state.processing.contains(operation_id) {
            state.dirty.insert(operation_id.to_string());
            return;
        }
        state.queued.insert(operation_id.to_string());
        state.pending.push_back(operation_id.to_string());
        info!(
            "Added item {} to the queue {}, queue length is {}",
            operation_id,
            self.inner.name,
            state.queued.len()
        );
        drop(state);
        self.inner.ready.notify_one();
    }

    /// Add once `delay` has passed, unless the queue is shut down first
    pub fn add_after(&self, operation_id: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(operation_id);
            return;
        }
        info!(
            "Item {} will be added to the queue {} after {:?}",
            operation_id, self.inner.name, delay
        );
        let queue = self.clone();
        let id = operation_id.to_string();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(delay) => queue.add(&id),
            }
        });
    }

    /// Start `workers` workers
    pub fn run(&self, workers: usize) {
        info!("Starting {} worker(s), queue length is {}", workers, self.len());
        let mut handles = lock(&self.inner.workers);
        for worker_id in 0..workers {
            let queue = self.clone();
            let span = info_span!("worker", queue = %self.inner.name, worker_id);
            handles.push(tokio::spawn(queue.worker().instrument(span)));
        }
    }

    /// Stop accepting items and wait for workers to finish their current item
    pub async fn shutdown(&self) {
        info!("Shutting down the queue {}, queue length is {}", self.inner.name, self.len());
        lock(&self.inner.state).shutting_down = true;
        self.inner.shutdown.send_replace(true);

        let handles: Vec<JoinHandle<()>> = lock(&self.inner.workers).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker of queue {} ended abnormally: {}", self.inner.name, e);
            }
        }
    }

    async fn worker(self) {
        info!("Worker starting");
        let mut shutdown = self.inner.shutdown.subscribe();
        while let Some(id) = self.next_item(&mut shutdown).await {
            self.process(&id).await;
        }
        info!("Worker done");
    }

    /// Next id, moved from queued to processing under one lock
    async fn next_item(&self, shutdown: &mut watch::Receiver<bool>) -> Option<String> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            // registered before looking so an add in between is not missed
            let ready = self.inner.ready.notified();
            {
                let mut state = lock(&self.inner.state);
                if state.shutting_down {
                    return None;
                }
                if let Some(id) = state.pending.pop_front() {
                    state.queued.remove(&id);
                    state.processing.insert(id.clone());
                    return Some(id);
                }
            }
            tokio::select! {
                _ = shutdown.changed() => return None,
                () = ready => {}
            }
        }
    }

    async fn process(&self, id: &str) {
        info!("Processing item {}, queue length is {}", id, self.len());
        let result = AssertUnwindSafe(self.inner.executor.execute(id))
            .catch_unwind()
            .await;

        let requeue = {
            let mut state = lock(&self.inner.state);
            state.processing.remove(id);
            state.dirty.remove(id)
        };
        if requeue {
            self.add(id);
        }

        match result {
            Ok(Ok(when)) if !when.is_zero() => {
                let factor = self.inner.speed_factor.load(Ordering::Relaxed);
                info!("Adding {} again after {:?}", id, when);
                self.add_after(id, when / factor);
            }
            Ok(Ok(_)) => info!("Item {} has been processed, no retry", id),
            Ok(Err(e)) => error!("Error from processing {}: {}", id, e),
            Err(_) => error!("Panic while processing {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Counts executions; the first run of an id returns its scripted backoff
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<HashMap<String, u32>>,
        first_backoff: HashMap<String, Duration>,
    }

    impl RecordingExecutor {
        fn calls(&self, id: &str) -> u32 {
            lock(&self.calls).get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(&self, operation_id: &str) -> Result<Duration, EngineError> {
            let n = {
                let mut calls = lock(&self.calls);
                let n = calls.entry(operation_id.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if operation_id == "panic" {
                panic!("executor exploded");
            }
            if operation_id == "fail" {
                return Err(EngineError::UnknownStage("missing".to_string()));
            }
            match self.first_backoff.get(operation_id) {
                Some(backoff) if n == 1 => Ok(*backoff),
                _ => Ok(Duration::ZERO),
            }
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_processes_items_and_dedups() {
        let executor = Arc::new(RecordingExecutor::default());
        let queue = Queue::new("test", executor.clone());

        queue.add("op-1");
        queue.add("op-1");
        queue.add("op-2");
        assert_eq!(queue.len(), 2);

        queue.run(2);
        wait_for(|| executor.calls("op-1") == 1 && executor.calls("op-2") == 1).await;
        queue.shutdown().await;

        assert_eq!(executor.calls("op-1"), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_re_adds_after_backoff() {
        let executor = Arc::new(RecordingExecutor {
            first_backoff: HashMap::from([("op-1".to_string(), Duration::from_millis(20))]),
            ..Default::default()
        });
        let queue = Queue::new("test", executor.clone());

        queue.add("op-1");
        queue.run(1);
        wait_for(|| executor.calls("op-1") == 2).await;
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_after_zero_adds_immediately() {
        let executor = Arc::new(RecordingExecutor::default());
        let queue = Queue::new("test", executor.clone());

        queue.add_after("op-1", Duration::ZERO);
        assert_eq!(queue.len(), 1);
        queue.run(1);
        wait_for(|| executor.calls("op-1") == 1).await;
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_panics_and_errors_are_contained() {
        let executor = Arc::new(RecordingExecutor::default());
        let queue = Queue::new("test", executor.clone());

        queue.add("panic");
        queue.add("fail");
        queue.add("op-1");
        queue.run(1);
        wait_for(|| executor.calls("op-1") == 1).await;
        queue.shutdown().await;

        assert_eq!(executor.calls("panic"), 1);
        assert_eq!(executor.calls("fail"), 1);
    }

    /// Blocks the first run of each id until released
    struct GatedExecutor {
        calls: Mutex<HashMap<String, u32>>,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl Executor for GatedExecutor {
        async fn execute(&self, operation_id: &str) -> Result<Duration, EngineError> {
            let first = {
                let mut calls = lock(&self.calls);
                let n = calls.entry(operation_id.to_string()).or_insert(0);
                *n += 1;
                *n == 1
            };
            if first {
                self.release.notified().await;
            }
            Ok(Duration::ZERO)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_while_processing_runs_once_more() {
        let executor = Arc::new(GatedExecutor {
            calls: Mutex::new(HashMap::new()),
            release: Notify::new(),
        });
        let queue = Queue::new("test", executor.clone());
        let calls = |id: &str| lock(&executor.calls).get(id).copied().unwrap_or(0);

        queue.add("op-1");
        queue.run(2);
        wait_for(|| calls("op-1") == 1).await;

        // in flight: both adds collapse into a single follow-up run
        queue.add("op-1");
        queue.add("op-1");
        assert!(queue.is_empty());
        executor.release.notify_one();

        wait_for(|| calls("op-1") == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.shutdown().await;

        assert_eq!(calls("op-1"), 2);
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_ignored() {
        let executor = Arc::new(RecordingExecutor::default());
        let queue = Queue::new("test", executor.clone());
        queue.run(1);
        queue.shutdown().await;

        queue.add("op-1");
        assert!(queue.is_empty());
    }
}

//! Write-behind queue and its background flush worker.
//!
//! The queue maps id to the latest value written for it, so repeated writes
//! to one id between flushes collapse into a single backing-store write.
//! The map lock is only held to mutate the map, never across backing-store
//! I/O. A separate flush lock serializes whole flush passes, so a caller's
//! `flush_now` and a worker tick cannot write the same id out of order.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::backing::BackingStore;
use crate::stores::metrics::{CacheMetric, MetricsSink, elapsed_ms};

/// Lifecycle of the flush worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Flushing once per interval.
    Running,
    /// Shutdown was signalled; performing the final flush.
    Draining,
    /// The worker task has exited.
    Stopped,
}

/// Pending writes plus everything a flush pass needs.
pub(crate) struct WriteQueue<T> {
    collection: String,
    backing: Arc<dyn BackingStore<T>>,
    pending: Mutex<HashMap<String, T>>,
    flush_lock: Mutex<()>,
    metrics: OnceLock<Arc<dyn MetricsSink>>,
}

impl<T> WriteQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(collection: &str, backing: Arc<dyn BackingStore<T>>) -> Self {
        WriteQueue {
            collection: collection.to_string(),
            backing,
            pending: Mutex::new(HashMap::new()),
            flush_lock: Mutex::new(()),
            metrics: OnceLock::new(),
        }
    }

    pub(crate) fn collection(&self) -> &str {
        &self.collection
    }

    pub(crate) fn backing(&self) -> &Arc<dyn BackingStore<T>> {
        &self.backing
    }

    /// Attach a metrics sink. Only the first sink is kept.
    pub(crate) fn set_metrics(&self, sink: Arc<dyn MetricsSink>) -> bool {
        self.metrics.set(sink).is_ok()
    }

    pub(crate) fn emit(&self, metric: CacheMetric) {
        if let Some(sink) = self.metrics.get() {
            sink.emit(metric);
        }
    }

    /// Flush the attached metrics sink, if any.
    pub(crate) async fn flush_metrics(&self) {
        if let Some(sink) = self.metrics.get()
            && let Err(e) = sink.flush().await
        {
            tracing::warn!(
                "Metrics sink flush failed: collection={}, error={}",
                self.collection,
                e
            );
        }
    }

    /// Queue `value` under `id`, replacing any write still pending for it.
    pub(crate) async fn enqueue(&self, id: String, value: T) {
        self.pending.lock().await.insert(id, value);
    }

    /// Drop the pending writes for `ids`.
    pub(crate) async fn cancel(&self, ids: &[&str]) {
        let mut pending = self.pending.lock().await;
        for id in ids {
            pending.remove(*id);
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drain the queue into the backing store, returning how many writes were
    /// persisted.
    ///
    /// With `requeue`, failed writes go back into the live queue for the next
    /// pass unless a newer write for the same id has arrived meanwhile.
    /// Without it (final drain) they are logged and dropped.
    ///
    /// Passes never overlap: a pass waits for the one in progress to finish
    /// before taking its snapshot.
    pub(crate) async fn flush(&self, requeue: bool) -> usize {
        let _pass = self.flush_lock.lock().await;
        let snapshot = std::mem::take(&mut *self.pending.lock().await);
        if snapshot.is_empty() {
            return 0;
        }

        let start = std::time::Instant::now();
        let mut persisted = 0;
        let mut failed = 0;

        for (id, value) in snapshot {
            match self.backing.store(value.clone()).await {
                Ok(_) => persisted += 1,
                Err(e) => {
                    failed += 1;
                    if requeue {
                        tracing::error!(
                            "Flush failed, write re-queued: collection={}, id={}, error={}",
                            self.collection,
                            id,
                            e
                        );
                        self.pending
                            .lock()
                            .await
                            .entry(id.clone())
                            .or_insert(value);
                    } else {
                        tracing::error!(
                            "Final flush failed, write dropped: collection={}, id={}, error={}",
                            self.collection,
                            id,
                            e
                        );
                    }
                    self.emit(CacheMetric::FlushFailed {
                        collection: self.collection.clone(),
                        id,
                        error: e.to_string(),
                        requeued: requeue,
                    });
                }
            }
        }

        tracing::debug!(
            "Flushed pending writes: collection={}, persisted={}, failed={}",
            self.collection,
            persisted,
            failed
        );
        self.emit(CacheMetric::Flushed {
            collection: self.collection.clone(),
            persisted,
            failed,
            latency_ms: elapsed_ms(start),
        });

        persisted
    }
}

/// Handle to the background task flushing a [`WriteQueue`].
///
/// Dropping the handle without calling [`stop`](FlushWorker::stop) closes the
/// shutdown channel, which the task treats like a stop signal.
pub(crate) struct FlushWorker {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<WorkerState>,
    handle: JoinHandle<()>,
}

impl FlushWorker {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// The first flush happens one full `period` after spawning.
    pub(crate) fn spawn<T>(queue: Arc<WriteQueue<T>>, period: Duration) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (state_tx, state) = watch::channel(WorkerState::Running);
        let handle = tokio::spawn(run(queue, period, shutdown_rx, state_tx));

        FlushWorker {
            shutdown,
            state,
            handle,
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Signal shutdown and wait for the final flush to finish.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("Flush worker terminated abnormally: error={}", e);
        }
    }
}

async fn run<T>(
    queue: Arc<WriteQueue<T>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<WorkerState>,
) where
    T: Clone + Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(
        "Flush worker started: collection={}, interval_ms={}",
        queue.collection(),
        period.as_millis()
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // An error means the store was dropped without being closed
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                queue.flush(true).await;
            }
        }
    }

    state_tx.send_replace(WorkerState::Draining);
    queue.flush(false).await;
    state_tx.send_replace(WorkerState::Stopped);

    tracing::debug!("Flush worker stopped: collection={}", queue.collection());
}

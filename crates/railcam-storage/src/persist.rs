//! Timed batch persistence.
//!
//! The control loop appends to the accumulator every iteration and calls
//! [`BatchPersister::flush_if_due`]. A due flush hands the accumulated batch
//! to a spawned write task and returns at once. Writes to the same file are
//! serialized by an async mutex. A failed write is logged and the batch is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use railcam_queue::QueueReceiver;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

use crate::drain::drain;
use crate::error::{StorageError, StorageResult};
use crate::store::JsonArrayStore;

/// Accumulates records and flushes them to a [`JsonArrayStore`].
#[derive(Debug)]
pub struct BatchPersister<T> {
    name: String,
    store: Arc<JsonArrayStore>,
    write_lock: Arc<Mutex<()>>,
    pending: Vec<T>,
    period: Duration,
    last_flush: Instant,
    in_flight: Vec<JoinHandle<StorageResult<usize>>>,
}

impl<T> BatchPersister<T>
where
    T: Serialize + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, store: JsonArrayStore, period: Duration) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(store),
            write_lock: Arc::new(Mutex::new(())),
            pending: Vec::new(),
            period,
            last_flush: Instant::now(),
            in_flight: Vec::new(),
        }
    }

    pub fn store(&self) -> &JsonArrayStore {
        &self.store
    }

    pub fn push(&mut self, record: T) {
        self.pending.push(record);
    }

    /// Drain every available entry of `queue` into the accumulator.
    pub fn drain_from(&mut self, queue: &mut QueueReceiver<T>) -> usize {
        drain(queue, &mut self.pending)
    }

    pub fn pending(&self) -> &[T] {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the flush period has elapsed at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.period
    }

    /// Start a background write if the period elapsed and records are pending.
    ///
    /// Returns the number of records handed to the writer.
    pub fn flush_if_due(&mut self, now: Instant) -> usize {
        self.in_flight.retain(|h| !h.is_finished());
        if self.pending.is_empty() || !self.is_due(now) {
            return 0;
        }

        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        self.last_flush = now;

        let name = self.name.clone();
        let store = Arc::clone(&self.store);
        let lock = Arc::clone(&self.write_lock);
        self.in_flight.push(tokio::spawn(async move {
            let _guard = lock.lock().await;
            write_batch(&name, &store, &batch).await
        }));
        count
    }

    /// Wait for background writes, then write whatever is pending.
    ///
    /// Used at shutdown. Returns the number of records written by this call.
    pub async fn flush_now(&mut self) -> StorageResult<usize> {
        for handle in self.in_flight.drain(..) {
            // Failures were logged by the task
            if let Err(e) = handle.await {
                error!(persister = %self.name, "Write task panicked: {}", e);
            }
        }
        if self.pending.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::take(&mut self.pending);
        self.last_flush = Instant::now();
        let _guard = self.write_lock.lock().await;
        write_batch(&self.name, &self.store, &batch).await?;
        Ok(batch.len())
    }
}

async fn write_batch<T: Serialize>(
    name: &str,
    store: &JsonArrayStore,
    batch: &[T],
) -> StorageResult<usize> {
    match store.append(batch).await {
        Ok(total) => {
            info!(
                persister = name,
                path = %store.path().display(),
                written = batch.len(),
                total,
                "Batch persisted"
            );
            Ok(total)
        }
        Err(e) => {
            error!(
                persister = name,
                path = %store.path().display(),
                lost = batch.len(),
                "Failed to persist batch: {}", e
            );
            Err(StorageError::write_task(e.to_string()))
        }
    }
}

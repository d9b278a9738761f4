//! Named bounded MPSC queue.
//!
//! Both ends are non-blocking: producers drop on full, the consumer pops
//! whatever is available and returns immediately otherwise. Entries are
//! delivered in enqueue order.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Create a named bounded queue.
pub fn bounded<T>(name: impl Into<String>, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let name: Arc<str> = Arc::from(name.into());
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender {
            name: Arc::clone(&name),
            capacity,
            tx,
        },
        QueueReceiver { name, rx },
    )
}

/// Producer side. Cheap to clone.
#[derive(Debug)]
pub struct QueueSender<T> {
    name: Arc<str>,
    capacity: usize,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            capacity: self.capacity,
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Push without waiting.
    pub fn try_push(&self, item: T) -> QueueResult<()> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(QueueError::full(self.name.as_ref(), self.capacity)),
            Err(TrySendError::Closed(_)) => Err(QueueError::closed(self.name.as_ref())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    name: Arc<str>,
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Pop one entry if one is available.
    ///
    /// A queue whose producers are all gone reads as empty.
    pub fn try_pop(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Pop every entry currently available into `sink`.
    ///
    /// Returns the number of entries moved.
    pub fn drain_into(&mut self, sink: &mut Vec<T>) -> usize {
        let before = sink.len();
        while let Some(item) = self.try_pop() {
            sink.push(item);
        }
        let moved = sink.len() - before;
        if moved > 0 {
            debug!(queue = %self.name, moved, "Drained queue");
        }
        moved
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (tx, mut rx) = bounded("stats", 3);
        tx.try_push(1).unwrap();
        tx.try_push(2).unwrap();
        tx.try_push(3).unwrap();

        let mut out = Vec::new();
        assert_eq!(rx.drain_into(&mut out), 3);
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (tx, mut rx) = bounded("stats", 2);
        tx.try_push("a").unwrap();
        tx.try_push("b").unwrap();

        let err = tx.try_push("c").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err, QueueError::full("stats", 2));

        assert_eq!(rx.try_pop(), Some("a"));
        assert_eq!(rx.try_pop(), Some("b"));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_empty_drain_returns_immediately() {
        let (_tx, mut rx) = bounded::<u32>("grass", 5);
        let mut out = Vec::new();
        assert_eq!(rx.drain_into(&mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_disconnected_reads_as_empty() {
        let (tx, mut rx) = bounded("grass", 5);
        tx.try_push(9).unwrap();
        drop(tx);
        assert_eq!(rx.try_pop(), Some(9));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_push_after_receiver_dropped_is_closed() {
        let (tx, rx) = bounded("stats", 1);
        drop(rx);
        assert_eq!(tx.try_push(1).unwrap_err(), QueueError::closed("stats"));
    }

    #[test]
    fn test_producers_on_other_threads() {
        let (tx, mut rx) = bounded("stats", 16);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                std::thread::spawn(move || tx.try_push(i).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let mut out = Vec::new();
        rx.drain_into(&mut out);
        out.sort();
        assert_eq!(out, vec![0, 1, 2, 3]);
    }
}

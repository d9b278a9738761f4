//! Non-blocking queue drain.

use railcam_queue::QueueReceiver;

/// Move every entry currently in `queue` into `sink`, in enqueue order.
///
/// Never waits; an empty queue returns 0 immediately.
pub fn drain<T>(queue: &mut QueueReceiver<T>, sink: &mut Vec<T>) -> usize {
    queue.drain_into(sink)
}

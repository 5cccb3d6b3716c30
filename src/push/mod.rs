//! Prioritised outbound queues feeding a connection's chunk writer.
//!
//! Responses, REPORTs and the binding SEND travel on the high priority queue.
//! Message data travels on the low priority queue and its chunks may be
//! interrupted while high priority traffic is waiting. Order is FIFO within
//! each priority. After [`HIGH_PRIORITY_BURST_LIMIT`] consecutive high
//! priority items one waiting low priority item is let through, so a flood of
//! responses cannot starve message data.

mod handle;

use thiserror::Error;
use tokio::sync::mpsc;

pub use handle::PushHandle;

/// Largest capacity accepted for either queue.
pub const MAX_QUEUE_CAPACITY: usize = 10_000;
/// High priority items received in a row before low priority gets a turn.
pub const HIGH_PRIORITY_BURST_LIMIT: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PushPriority {
    High,
    Low,
}

/// Failure to enqueue an item.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue was full and the caller asked not to wait.
    #[error("outbound queue full")]
    QueueFull,
    /// The writer has stopped.
    #[error("outbound queue closed")]
    Closed,
}

/// Rejected queue capacities.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushConfigError {
    #[error(
        "invalid queue capacities high={high} low={low}; each must be between 1 and {max}",
        max = MAX_QUEUE_CAPACITY
    )]
    InvalidCapacity { high: usize, low: usize },
}

/// Receiving side of the queues, owned by the chunk writer.
pub struct PushQueues<F> {
    high: mpsc::Receiver<F>,
    low: mpsc::Receiver<F>,
    high_streak: usize,
}

impl<F: Send + 'static> PushQueues<F> {
    /// Create bounded queues and the handle producers push through.
    ///
    /// ```
    /// use msrp::push::{PushPriority, PushQueues};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let (mut queues, handle) = PushQueues::<u8>::bounded(1, 1).expect("valid capacities");
    /// handle.push_low_priority(1).await.expect("queued");
    /// handle.push_high_priority(2).await.expect("queued");
    /// assert_eq!(queues.recv().await, Some((PushPriority::High, 2)));
    /// assert_eq!(queues.recv().await, Some((PushPriority::Low, 1)));
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`PushConfigError::InvalidCapacity`] when a capacity is zero
    /// or above [`MAX_QUEUE_CAPACITY`].
    pub fn bounded(high: usize, low: usize) -> Result<(Self, PushHandle<F>), PushConfigError> {
        let valid = 1..=MAX_QUEUE_CAPACITY;
        if !valid.contains(&high) || !valid.contains(&low) {
            return Err(PushConfigError::InvalidCapacity { high, low });
        }
        let (high_tx, high_rx) = mpsc::channel(high);
        let (low_tx, low_rx) = mpsc::channel(low);
        Ok((
            Self {
                high: high_rx,
                low: low_rx,
                high_streak: 0,
            },
            PushHandle::new(high_tx, low_tx),
        ))
    }

    /// Next item with its priority, or `None` once every handle is gone and
    /// both queues are drained.
    pub async fn recv(&mut self) -> Option<(PushPriority, F)> {
        if self.high_streak >= HIGH_PRIORITY_BURST_LIMIT
            && let Ok(item) = self.low.try_recv()
        {
            self.high_streak = 0;
            return Some((PushPriority::Low, item));
        }
        let mut high_open = true;
        let mut low_open = true;
        loop {
            tokio::select! {
                biased;
                item = self.high.recv(), if high_open => match item {
                    Some(item) => {
                        self.high_streak += 1;
                        return Some((PushPriority::High, item));
                    }
                    None => high_open = false,
                },
                item = self.low.recv(), if low_open => match item {
                    Some(item) => {
                        self.high_streak = 0;
                        return Some((PushPriority::Low, item));
                    }
                    None => low_open = false,
                },
                else => return None,
            }
        }
    }

    /// Whether a high priority item is waiting.
    ///
    /// Polled between body slices to decide whether to interrupt the chunk
    /// being written.
    #[must_use]
    pub fn high_pending(&self) -> bool { !self.high.is_empty() }

    /// Refuse further pushes. Queued items can still be received.
    pub fn close(&mut self) {
        self.high.close();
        self.low.close();
    }
}

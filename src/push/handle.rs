use std::{fmt, sync::Arc};

use tokio::sync::mpsc;
use tracing::debug;

use super::{PushError, PushPriority};

struct Senders<F> {
    high: mpsc::Sender<F>,
    low: mpsc::Sender<F>,
}

/// Cloneable producer side of [`PushQueues`](super::PushQueues).
pub struct PushHandle<F>(Arc<Senders<F>>);

impl<F> Clone for PushHandle<F> {
    fn clone(&self) -> Self { Self(Arc::clone(&self.0)) }
}

impl<F> fmt::Debug for PushHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<F> PushHandle<F> {
    pub(super) fn new(high: mpsc::Sender<F>, low: mpsc::Sender<F>) -> Self {
        Self(Arc::new(Senders { high, low }))
    }

    /// Whether the writer has stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.high.is_closed() }

    fn sender(&self, priority: PushPriority) -> &mpsc::Sender<F> {
        match priority {
            PushPriority::High => &self.0.high,
            PushPriority::Low => &self.0.low,
        }
    }
}

impl<F: Send + 'static> PushHandle<F> {
    /// Enqueue `item`, waiting for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] once the writer has stopped.
    pub async fn push(&self, item: F, priority: PushPriority) -> Result<(), PushError> {
        self.sender(priority)
            .send(item)
            .await
            .map_err(|_| PushError::Closed)?;
        debug!(?priority, "outbound item queued");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`PushError::Closed`] once the writer has stopped.
    pub async fn push_high_priority(&self, item: F) -> Result<(), PushError> {
        self.push(item, PushPriority::High).await
    }

    /// # Errors
    ///
    /// Returns [`PushError::Closed`] once the writer has stopped.
    pub async fn push_low_priority(&self, item: F) -> Result<(), PushError> {
        self.push(item, PushPriority::Low).await
    }

    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::QueueFull`] when the queue has no room and
    /// [`PushError::Closed`] once the writer has stopped.
    pub fn try_push(&self, item: F, priority: PushPriority) -> Result<(), PushError> {
        match self.sender(priority).try_send(item) {
            Ok(()) => {
                debug!(?priority, "outbound item queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(PushError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PushError::Closed),
        }
    }
}

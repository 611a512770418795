//! Channel-backed event sink for progress reporting.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

use super::{EventSink, StageEvent};

/// Forwards events into a bounded tokio channel.
///
/// `emit` waits for capacity; `try_emit` drops the event when the channel
/// is full. Events are dropped silently once the receiver is gone.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<StageEvent>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver that consumes its events.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StageEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    /// Returns the number of delivered events.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Returns the number of dropped events.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &StageEvent) {
        if self.tx.send(event.clone()).await.is_ok() {
            self.emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn try_emit(&self, event: &StageEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped_total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id,
                    dropped_total,
                    "Event dropped due to backpressure"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

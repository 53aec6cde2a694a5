//! Broadcast + history event bus.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::traits::EventSink;

/// Default number of events retained for late subscribers.
const DEFAULT_HISTORY: usize = 1024;

/// Default broadcast buffer per subscriber.
const DEFAULT_CAPACITY: usize = 10_000;

/// Event bus with broadcast and bounded history.
///
/// Emitting never blocks: a subscriber that falls more than the broadcast
/// capacity behind loses the oldest events and is told how many it missed.
pub struct EventBus<E> {
    history: RwLock<VecDeque<E>>,
    history_limit: usize,
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create a bus with default capacity and history.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_HISTORY)
    }

    /// Create a bus with explicit broadcast capacity and history length.
    #[must_use]
    pub fn with_limits(capacity: usize, history_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            history: RwLock::new(VecDeque::with_capacity(history_limit.min(32))),
            history_limit,
            sender,
        }
    }

    /// Push an event to live subscribers and history.
    pub fn push(&self, event: E) {
        let _ = self.sender.send(event.clone()); // no subscribers is fine

        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Get a receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<E> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Stream that yields history first, then live events.
    ///
    /// Lagged gaps in the live part are skipped with a warning.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, E> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Event subscriber lagged: {e}");
                    None
                }
            }
        });

        Box::pin(hist.chain(live))
    }
}

impl<E: Clone + Send + Sync + 'static> EventSink<E> for EventBus<E> {
    fn emit(&self, event: E) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_live_subscriber_receives_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.push(1);
        bus.push(2);
        assert_eq!(rx.recv().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }

    #[test]
    fn test_receiver_wakes_on_push() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());
        bus.push(5);
        assert!(recv.is_woken());
        assert_eq!(tokio_test::assert_ready_ok!(recv.poll()), 5);
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::with_limits(16, 3);
        for i in 0..5 {
            bus.emit(i);
        }
        assert_eq!(bus.history(), vec![2, 3, 4]);
    }

    #[test]
    fn test_zero_history_keeps_nothing() {
        let bus = EventBus::with_limits(16, 0);
        bus.push("a");
        assert!(bus.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_then_live() {
        let bus = EventBus::new();
        bus.push("old");
        let mut stream = bus.history_plus_stream();
        bus.push("new");
        assert_eq!(stream.next().await, Some("old"));
        assert_eq!(stream.next().await, Some("new"));
    }
}

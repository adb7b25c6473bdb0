//! Broadcast fan-out with a bounded replay ring.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Stream handed to live subscribers.
pub type EventStream = BroadcastStream<EventEnvelope>;

/// Clonable event bus shared by tasks and build workers.
///
/// Publishing never blocks and needs no runtime, so plain threads can emit
/// events. Only consuming an [`EventStream`] requires async.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    log: Arc<Mutex<ReplayLog>>,
}

/// Id counter and ring share one lock so ids enter the ring in order.
struct ReplayLog {
    next_id: EventId,
    capacity: usize,
    ring: VecDeque<EventEnvelope>,
}

impl EventBus {
    /// Bus retaining the last `replay_capacity` events (at least one).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            log: Arc::new(Mutex::new(ReplayLog {
                next_id: 1,
                capacity,
                ring: VecDeque::with_capacity(capacity),
            })),
        }
    }

    /// Bus with [`DEFAULT_REPLAY_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Stream of events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Retained events after `last` plus a stream of everything newer, with
    /// no gap or overlap between the two.
    #[must_use]
    pub fn resume(&self, last: EventId) -> (Vec<EventEnvelope>, EventStream) {
        let log = self.lock();
        let backlog = log.after(last);
        let stream = BroadcastStream::new(self.sender.subscribe());
        drop(log);
        (backlog, stream)
    }

    /// Stamp `event` with the next id and the current time, retain it, and
    /// fan it out to live subscribers.
    pub fn publish(&self, event: Event) -> EventId {
        let mut log = self.lock();
        let id = log.next_id;
        log.next_id = log.next_id.saturating_add(1);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        if log.ring.len() == log.capacity {
            log.ring.pop_front();
        }
        log.ring.push_back(envelope.clone());
        // No live subscribers is not an error.
        let _ = self.sender.send(envelope);
        id
    }

    /// Id of the newest retained event.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock().ring.back().map(|envelope| envelope.id)
    }

    /// Retained events with an id greater than `id`, oldest first.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        self.lock().after(id)
    }

    fn lock(&self) -> MutexGuard<'_, ReplayLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplayLog {
    fn after(&self, id: EventId) -> Vec<EventEnvelope> {
        let start = self.ring.partition_point(|envelope| envelope.id <= id);
        self.ring.range(start..).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn backlog_starts_after_the_given_id() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(Event::BuildStarted { pending: 2 });
        let second = bus.publish(Event::BuildItemStarted {
            artifact: "data.bin".into(),
        });

        assert_eq!(bus.last_event_id(), Some(second));
        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);
        assert!(bus.backlog_since(second).is_empty());
    }

    #[test]
    fn ring_keeps_only_the_newest_events() {
        let bus = EventBus::with_capacity(2);
        for pending in 0..5 {
            bus.publish(Event::BuildStarted { pending });
        }
        let ids: Vec<EventId> = bus.backlog_since(0).iter().map(|env| env.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn resume_joins_backlog_and_live_events() {
        let bus = EventBus::new();
        let first = bus.publish(Event::BuildStarted { pending: 1 });
        let second = bus.publish(Event::BuildItemStarted {
            artifact: "gui.bin".into(),
        });

        let (backlog, mut stream) = bus.resume(first);
        assert_eq!(backlog.iter().map(|env| env.id).collect::<Vec<_>>(), vec![second]);

        let third = bus.publish(Event::BuildItemFinished {
            artifact: "gui.bin".into(),
            succeeded: true,
        });
        let envelope = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(envelope.id, third);
        assert!(matches!(
            envelope.event,
            Event::BuildItemFinished { succeeded: true, .. }
        ));
    }
}

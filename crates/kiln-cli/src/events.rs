//! Live event capture for a single command run.

use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use kiln_events::{EventBus, EventEnvelope, EventStream};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::error::{CliError, CliResult};

/// Collects every event published on a bus until all publishers are gone.
pub(crate) struct EventRecorder {
    thread: JoinHandle<Vec<EventEnvelope>>,
}

impl EventRecorder {
    /// Subscribe to `bus` and start draining it on a background thread.
    ///
    /// Must be called before anything is published that should be captured.
    pub(crate) fn start(bus: &EventBus) -> CliResult<Self> {
        let (backlog, stream) = bus.resume(bus.last_event_id().unwrap_or(0));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to create event runtime: {err}")))?;
        let thread = thread::Builder::new()
            .name("kiln-events".to_string())
            .spawn(move || runtime.block_on(drain(backlog, stream)))
            .map_err(|err| CliError::failure(anyhow!("failed to spawn event recorder: {err}")))?;
        Ok(Self { thread })
    }

    /// Drop the last handle on `bus` and return what was captured.
    ///
    /// Every other clone of `bus` (tasks, build workers) must already be gone,
    /// otherwise this blocks.
    pub(crate) fn finish(self, bus: EventBus) -> CliResult<Vec<EventEnvelope>> {
        drop(bus);
        self.thread
            .join()
            .map_err(|_| CliError::failure(anyhow!("event recorder panicked")))
    }
}

async fn drain(mut events: Vec<EventEnvelope>, mut stream: EventStream) -> Vec<EventEnvelope> {
    while let Some(item) = stream.next().await {
        match item {
            Ok(envelope) => {
                debug!(id = envelope.id, kind = envelope.event.kind(), "event");
                events.push(envelope);
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event recorder lagged; events dropped");
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_events::{Event, EventId};

    #[test]
    fn recorder_captures_events_in_order() -> anyhow::Result<()> {
        let bus = EventBus::with_capacity(16);
        let recorder = EventRecorder::start(&bus).map_err(|err| anyhow!(err.display_message()))?;
        let publisher = bus.clone();
        let worker = thread::spawn(move || {
            publisher.publish(Event::BuildStarted { pending: 1 });
            publisher.publish(Event::BuildFinished {
                succeeded: 1,
                failed: 0,
                cancelled: false,
            });
        });
        worker.join().map_err(|_| anyhow!("publisher panicked"))?;

        let events = recorder
            .finish(bus)
            .map_err(|err| anyhow!(err.display_message()))?;
        let ids: Vec<EventId> = events.iter().map(|env| env.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(events[1].event.kind(), "build_finished");
        Ok(())
    }
}

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::SessionEvent;
use crate::source::{EventStream, SourceError, Streamer};

/// How many events a cursor buffers ahead of the reader
const STREAM_BUFFER: usize = 64;

/// In-memory event source
///
/// Serves a recording that has been fully loaded into memory, e.g. from a
/// recording file. Also the workhorse for playback tests.
pub struct MemoryStreamer {
    events: Arc<Vec<SessionEvent>>,
    fail_after: Option<usize>,
}

impl MemoryStreamer {
    /// Create a streamer over a loaded recording
    pub fn new(events: Vec<SessionEvent>) -> Self {
        Self {
            events: Arc::new(events),
            fail_after: None,
        }
    }

    /// Create a streamer that fails with a source error once `count` events
    /// have been produced (for testing failure handling)
    pub fn failing_after(events: Vec<SessionEvent>, count: usize) -> Self {
        Self {
            events: Arc::new(events),
            fail_after: Some(count),
        }
    }
}

#[async_trait]
impl Streamer for MemoryStreamer {
    async fn stream_events(
        &self,
        _session_id: &str,
        start_index: u64,
    ) -> Result<EventStream, SourceError> {
        let (event_tx, event_rx) = mpsc::channel(STREAM_BUFFER);
        let (error_tx, error_rx) = mpsc::channel(1);
        let events = self.events.clone();
        let fail_after = self.fail_after;

        tokio::spawn(async move {
            let mut produced = 0usize;
            for event in events.iter().filter(|e| e.index >= start_index) {
                if fail_after.is_some_and(|count| produced >= count) {
                    let _ = error_tx.send(SourceError::new("injected stream failure")).await;
                    return;
                }
                if event_tx.send(event.clone()).await.is_err() {
                    // cursor was dropped, stop producing
                    return;
                }
                produced += 1;
            }
        });

        Ok(EventStream {
            events: event_rx,
            errors: error_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;
    use std::time::Duration;

    fn events(count: u64) -> Vec<SessionEvent> {
        (0..count)
            .map(|i| {
                SessionEvent::new(
                    i,
                    Duration::from_millis(i * 100),
                    EventKind::Print,
                    format!("event {}", i).into_bytes(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn streams_the_whole_recording() {
        let streamer = MemoryStreamer::new(events(3));
        let mut stream = streamer.stream_events("session", 0).await.unwrap();

        for i in 0..3 {
            assert_eq!(stream.events.recv().await.unwrap().index, i);
        }
        assert!(stream.events.recv().await.is_none());
        assert!(stream.errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn honors_the_start_index() {
        let streamer = MemoryStreamer::new(events(5));
        let mut stream = streamer.stream_events("session", 3).await.unwrap();

        assert_eq!(stream.events.recv().await.unwrap().index, 3);
        assert_eq!(stream.events.recv().await.unwrap().index, 4);
        assert!(stream.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn signals_an_injected_failure() {
        let streamer = MemoryStreamer::failing_after(events(5), 2);
        let mut stream = streamer.stream_events("session", 0).await.unwrap();

        assert_eq!(stream.events.recv().await.unwrap().index, 0);
        assert_eq!(stream.events.recv().await.unwrap().index, 1);
        assert!(stream.events.recv().await.is_none());
        assert!(stream.errors.recv().await.is_some());
    }

    #[tokio::test]
    async fn stops_producing_when_the_cursor_is_dropped() {
        let streamer = MemoryStreamer::new(events(500));
        let stream = streamer.stream_events("session", 0).await.unwrap();
        drop(stream);

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        // the producer task has released its copy of the recording
        assert_eq!(Arc::strong_count(&streamer.events), 1);
    }
}

pub mod memory;

pub use memory::MemoryStreamer;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::SessionEvent;

/// Error reported by an event source
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SourceError {
    message: String,
}

impl SourceError {
    /// Create a new source error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One live cursor over a recorded session
///
/// Events arrive in strictly increasing offset order until the recording is
/// exhausted. A mid-stream failure is signaled on `errors` and ends the
/// stream. Dropping the cursor stops production promptly.
pub struct EventStream {
    /// Recorded events, in order
    pub events: mpsc::Receiver<SessionEvent>,
    /// Terminal failure, if any, reported once before the stream ends
    pub errors: mpsc::Receiver<SourceError>,
}

/// Trait for sources of recorded session events
///
/// The playback engine reads one cursor at a time and only ever forward; a
/// backward seek is served by opening a fresh cursor at index 0. Sources that
/// cannot produce the recording (missing session, storage failure) return the
/// error directly from `stream_events`; failures discovered mid-stream go out
/// on the cursor's error channel.
#[async_trait]
pub trait Streamer: Send + Sync {
    /// Open a cursor over the recording identified by `session_id`,
    /// producing events with index `start_index` and up
    async fn stream_events(
        &self,
        session_id: &str,
        start_index: u64,
    ) -> Result<EventStream, SourceError>;
}

pub mod engine;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::SessionEvent;
use crate::source::{SourceError, Streamer};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    /// Terminal: playback finished, failed, or was closed
    Closed,
}

/// Errors returned by the playback control surface
#[derive(Debug, Clone, Error)]
pub enum PlayerError {
    /// A command carried a bad argument; state is unchanged
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The command was issued after playback reached its terminal state
    #[error("player is closed")]
    Closed,

    /// The event source failed mid-session
    #[error("event source failed: {0}")]
    Source(#[from] SourceError),
}

/// Configuration for a new player
pub struct PlayerConfig {
    /// Identifier of the recorded session, passed through to the streamer
    pub session_id: String,
    /// Source of the recorded events
    pub streamer: Arc<dyn Streamer>,
}

/// Control requests serialized into the playback loop
#[derive(Debug)]
pub(crate) enum Command {
    Play,
    Pause,
    SetSpeed(f64),
    SetPos(Duration),
    Close,
}

/// Replays a recorded session with its original timing
///
/// The player owns a background control loop that paces events from the
/// streamer onto a bounded output channel. All control methods are
/// non-blocking; the output channel applies backpressure to the loop, so a
/// slow consumer throttles playback rather than dropping events.
///
/// Playback starts paused: no events are emitted until [`Player::play`] is
/// called. Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct Player {
    cmd_tx: mpsc::UnboundedSender<Command>,
    output: Option<mpsc::Receiver<SessionEvent>>,
    last_played_ms: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    error: Arc<OnceLock<PlayerError>>,
}

impl Player {
    /// Create a player for the configured session and spawn its control loop
    pub fn new(config: PlayerConfig) -> Result<Self, PlayerError> {
        if config.session_id.is_empty() {
            return Err(PlayerError::InvalidParameter(
                "session id must not be empty".into(),
            ));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(1);
        let last_played_ms = Arc::new(AtomicU64::new(0));
        let playing = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let error = Arc::new(OnceLock::new());

        tokio::spawn(
            engine::Engine::new(
                config,
                cmd_rx,
                out_tx,
                last_played_ms.clone(),
                playing.clone(),
                closed.clone(),
                error.clone(),
            )
            .run(),
        );

        Ok(Self {
            cmd_tx,
            output: Some(out_rx),
            last_played_ms,
            playing,
            closed,
            error,
        })
    }

    fn send(&self, cmd: Command) -> Result<(), PlayerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlayerError::Closed);
        }
        self.cmd_tx.send(cmd).map_err(|_| PlayerError::Closed)
    }

    /// Start or resume playback
    pub fn play(&self) -> Result<(), PlayerError> {
        self.send(Command::Play)
    }

    /// Pause playback, freezing the position at the last emitted offset
    ///
    /// A no-op if already paused.
    pub fn pause(&self) -> Result<(), PlayerError> {
        self.send(Command::Pause)
    }

    /// Change the playback speed factor
    ///
    /// Takes effect immediately: the remaining portion of an outstanding
    /// wait is rescaled under the new factor.
    pub fn set_speed(&self, speed: f64) -> Result<(), PlayerError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlayerError::InvalidParameter(format!(
                "speed must be a positive number, got {}",
                speed
            )));
        }
        self.send(Command::SetSpeed(speed))
    }

    /// Seek to an arbitrary position in the recording
    ///
    /// Seeking forward emits the skipped events without waiting; seeking
    /// backward restarts the recording and replays events up to the target
    /// in a rapid burst. Does not change the playing/paused state.
    pub fn set_pos(&self, pos: Duration) -> Result<(), PlayerError> {
        self.send(Command::SetPos(pos))
    }

    /// Stop playback and release the event source; idempotent
    pub fn close(&self) -> Result<(), PlayerError> {
        // closing an already-closed player is not an error
        let _ = self.cmd_tx.send(Command::Close);
        Ok(())
    }

    /// Take the output channel; events arrive in recording order, paced to
    /// their offsets. Closed when playback finishes or the player closes.
    ///
    /// Returns `None` if the output was already taken.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.output.take()
    }

    /// Offset of the most recently emitted event
    pub fn last_played(&self) -> Duration {
        Duration::from_millis(self.last_played_ms.load(Ordering::SeqCst))
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        if self.closed.load(Ordering::SeqCst) {
            PlaybackState::Closed
        } else if self.playing.load(Ordering::SeqCst) {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }

    /// Whether playback has reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The failure that ended playback, if any
    ///
    /// Consult after the output channel closes to distinguish a clean end of
    /// the recording from a source failure.
    pub fn error(&self) -> Option<PlayerError> {
        self.error.get().cloned()
    }
}

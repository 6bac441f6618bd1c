//! Terminal Audit Playback Engine
//!
//! Replays recorded terminal sessions in real time: events are emitted with
//! their original timing, scaled by a playback speed factor, with
//! pause/resume and seeking in both directions.
//!
//! A [`player::Player`] owns a background control loop that is fed by an
//! event source (the [`source::Streamer`] trait); consumers receive paced
//! events from the player's output channel. Recordings can be loaded from
//! JSON-lines or CSV files via [`input`].

pub mod core;
pub mod input;
pub mod player;
pub mod source;

pub use crate::core::{EventKind, SessionEvent};
pub use crate::player::{PlaybackState, Player, PlayerConfig, PlayerError};
pub use crate::source::{EventStream, MemoryStreamer, SourceError, Streamer};

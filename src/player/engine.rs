use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::core::SessionEvent;
use crate::player::{Command, PlayerConfig, PlayerError};
use crate::source::{EventStream, SourceError, Streamer};

/// Why the control loop stopped
enum Stop {
    /// Close command, player handle dropped, or consumer went away
    Closed,
    /// The event source failed
    Source(SourceError),
}

/// Outcome of pacing one event
enum Pace {
    /// The event's wait elapsed; emit it
    Due,
    /// A seek was recorded while paused; resolve it before emitting
    Seek,
}

/// Scale a recorded gap down to a wall-clock wait
fn scaled(gap: Duration, speed: f64) -> Duration {
    Duration::try_from_secs_f64(gap.as_secs_f64() / speed).unwrap_or(Duration::MAX)
}

/// How much recorded time a wall-clock wait covered at the given speed
fn covered(wall: Duration, speed: f64) -> Duration {
    Duration::try_from_secs_f64(wall.as_secs_f64() * speed).unwrap_or(Duration::MAX)
}

/// The playback control loop
///
/// Runs as a single task that owns every piece of mutable playback state:
/// the source cursor, the position, the speed factor, and the play/pause
/// flag. Everything else talks to it through the command channel, so none
/// of this state needs a lock.
pub(crate) struct Engine {
    session_id: String,
    streamer: Arc<dyn Streamer>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Commands picked up while blocked emitting, handled at the next step
    deferred: VecDeque<Command>,
    out_tx: mpsc::Sender<SessionEvent>,
    last_played_ms: Arc<AtomicU64>,
    playing_flag: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    error: Arc<OnceLock<PlayerError>>,

    playing: bool,
    speed: f64,
    /// Offset of the most recently emitted event
    last_emitted: Duration,
    /// Offset the next wait is measured from: the last emitted offset, or
    /// the seek target right after a seek resolves
    position: Duration,
    /// The most recent unresolved seek request
    pending_seek: Option<Duration>,
}

impl Engine {
    pub(crate) fn new(
        config: PlayerConfig,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        out_tx: mpsc::Sender<SessionEvent>,
        last_played_ms: Arc<AtomicU64>,
        playing_flag: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
        error: Arc<OnceLock<PlayerError>>,
    ) -> Self {
        Self {
            session_id: config.session_id,
            streamer: config.streamer,
            cmd_rx,
            deferred: VecDeque::new(),
            out_tx,
            last_played_ms,
            playing_flag,
            closed,
            error,
            playing: false,
            speed: 1.0,
            last_emitted: Duration::ZERO,
            position: Duration::ZERO,
            pending_seek: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("starting playback of session {}", self.session_id);
        match self.play_session().await {
            Ok(()) => info!("session {} finished", self.session_id),
            Err(Stop::Closed) => debug!("session {} playback closed", self.session_id),
            Err(Stop::Source(err)) => {
                warn!("session {} event source failed: {}", self.session_id, err);
                let _ = self.error.set(PlayerError::Source(err));
            }
        }
        self.playing_flag.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        // dropping the engine drops the output sender, closing the channel
    }

    async fn play_session(&mut self) -> Result<(), Stop> {
        let mut cursor = self.open_cursor(0).await?;
        let mut next: Option<SessionEvent> = None;

        loop {
            if let Some(target) = self.pending_seek.take() {
                self.resolve_seek(&mut cursor, &mut next, target).await?;
            }

            let event = match next.take() {
                Some(event) => event,
                None => match self.fetch(&mut cursor).await? {
                    Some(event) => event,
                    None => return Ok(()), // end of the recording
                },
            };

            // a seek that arrived at the fetch point resolves before this
            // event's wait is armed; one recorded mid-wait resolves only
            // after the due event has been emitted
            if self.pending_seek.is_some() {
                next = Some(event);
                continue;
            }

            match self.pace(event.offset).await? {
                Pace::Seek => {
                    next = Some(event);
                    continue;
                }
                Pace::Due => {}
            }

            self.emit(event).await?;
        }
    }

    async fn open_cursor(&self, start_index: u64) -> Result<EventStream, Stop> {
        self.streamer
            .stream_events(&self.session_id, start_index)
            .await
            .map_err(Stop::Source)
    }

    /// Pull the next event from the cursor, staying responsive to commands
    async fn fetch(&mut self, cursor: &mut EventStream) -> Result<Option<SessionEvent>, Stop> {
        loop {
            if let Some(cmd) = self.deferred.pop_front() {
                self.apply_command(cmd)?;
                continue;
            }
            tokio::select! {
                biased;
                event = cursor.events.recv() => {
                    return match event {
                        Some(event) => Ok(Some(event)),
                        // distinguish a clean end of the recording from a
                        // failure reported just before the stream ended
                        None => match cursor.errors.try_recv() {
                            Ok(err) => Err(Stop::Source(err)),
                            Err(_) => Ok(None),
                        },
                    };
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.apply_command(cmd)?,
                    None => return Err(Stop::Closed),
                },
            }
        }
    }

    /// Wait until the event at `offset` is due
    ///
    /// The wait is a select over the timer and the command channel: pause
    /// parks the loop, a speed change rescales the remaining portion of the
    /// gap, a seek is recorded for the next safe point, and close stops
    /// everything. While paused there is no outstanding wait, so a recorded
    /// seek resolves right away.
    async fn pace(&mut self, offset: Duration) -> Result<Pace, Stop> {
        let raw = offset.saturating_sub(self.position);
        let mut consumed = Duration::ZERO;

        loop {
            if !self.playing {
                if self.pending_seek.is_some() {
                    return Ok(Pace::Seek);
                }
                match self.next_command().await {
                    Some(cmd) => self.apply_command(cmd)?,
                    None => return Err(Stop::Closed),
                }
                // resuming re-arms the full remaining wait from the frozen
                // position
                consumed = Duration::ZERO;
                continue;
            }

            let remaining = raw.saturating_sub(consumed);
            if remaining.is_zero() {
                return Ok(Pace::Due);
            }

            let sleep = time::sleep(scaled(remaining, self.speed));
            tokio::pin!(sleep);
            let armed = Instant::now();

            tokio::select! {
                biased;
                _ = &mut sleep => return Ok(Pace::Due),
                cmd = self.next_command() => {
                    // bank the part of the recorded gap this wait already
                    // covered so a speed change only rescales the rest
                    consumed += covered(armed.elapsed(), self.speed);
                    match cmd {
                        Some(cmd) => self.apply_command(cmd)?,
                        None => return Err(Stop::Closed),
                    }
                }
            }
        }
    }

    /// Hand a due event to the consumer, applying backpressure
    ///
    /// Only close can cut an emission short; other commands arriving while
    /// the consumer is slow are deferred until the event is delivered.
    async fn emit(&mut self, event: SessionEvent) -> Result<(), Stop> {
        let offset = event.offset;
        loop {
            tokio::select! {
                biased;
                permit = self.out_tx.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(event);
                        self.last_emitted = offset;
                        self.position = offset;
                        self.last_played_ms
                            .store(offset.as_millis() as u64, Ordering::SeqCst);
                        return Ok(());
                    }
                    // the consumer dropped the output channel
                    Err(_) => return Err(Stop::Closed),
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Close) | None => return Err(Stop::Closed),
                    Some(cmd) => self.deferred.push_back(cmd),
                },
            }
        }
    }

    /// Resolve a seek request
    ///
    /// Forward targets fast-forward the current cursor, emitting everything
    /// at or before the target with no wait. Backward targets abandon the
    /// cursor, open a fresh one at index 0, and replay the recording up to
    /// the target as a burst; the event that straddles the target then waits
    /// out the remainder of its gap.
    async fn resolve_seek(
        &mut self,
        cursor: &mut EventStream,
        next: &mut Option<SessionEvent>,
        target: Duration,
    ) -> Result<(), Stop> {
        let mut target = target;

        // the most recent request wins, and a queued speed change applies
        // before the post-seek wait is computed
        while let Some(cmd) = self.deferred.pop_front() {
            match cmd {
                Command::SetPos(pos) => target = pos,
                cmd => self.apply_command(cmd)?,
            }
        }
        loop {
            match self.cmd_rx.try_recv() {
                Ok(Command::SetPos(pos)) => target = pos,
                Ok(cmd) => self.apply_command(cmd)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(Stop::Closed),
            }
        }

        if target < self.last_emitted {
            // the source only reads forward: replay from the start
            debug!(
                "session {} rewinding to {:?}, restarting the event stream",
                self.session_id, target
            );
            next.take();
            *cursor = self.open_cursor(0).await?;
            self.last_emitted = Duration::ZERO;
            self.position = Duration::ZERO;
            self.last_played_ms.store(0, Ordering::SeqCst);
        } else {
            debug!("session {} seeking forward to {:?}", self.session_id, target);
        }

        // catch up: everything at or before the target goes out with no wait
        loop {
            let event = match next.take() {
                Some(event) => event,
                None => match self.fetch(cursor).await? {
                    Some(event) => event,
                    None => return Ok(()), // the recording ends before the target
                },
            };
            if event.offset > target {
                *next = Some(event);
                break;
            }
            self.emit(event).await?;
        }

        self.position = target;
        Ok(())
    }

    /// The next control request: deferred ones first, then the channel
    async fn next_command(&mut self) -> Option<Command> {
        match self.deferred.pop_front() {
            Some(cmd) => Some(cmd),
            None => self.cmd_rx.recv().await,
        }
    }

    fn apply_command(&mut self, cmd: Command) -> Result<(), Stop> {
        match cmd {
            Command::Play => {
                if !self.playing {
                    debug!("session {} playing", self.session_id);
                    self.playing = true;
                    self.playing_flag.store(true, Ordering::SeqCst);
                }
            }
            Command::Pause => {
                if self.playing {
                    debug!("session {} paused at {:?}", self.session_id, self.last_emitted);
                    self.playing = false;
                    self.playing_flag.store(false, Ordering::SeqCst);
                }
            }
            Command::SetSpeed(speed) => {
                debug!("session {} speed set to {}", self.session_id, speed);
                self.speed = speed;
            }
            Command::SetPos(pos) => {
                self.pending_seek = Some(pos);
            }
            Command::Close => return Err(Stop::Closed),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_gaps_by_speed() {
        assert_eq!(scaled(Duration::from_millis(1000), 2.0), Duration::from_millis(500));
        assert_eq!(scaled(Duration::from_millis(1000), 0.5), Duration::from_millis(2000));
        assert_eq!(scaled(Duration::ZERO, 4.0), Duration::ZERO);
    }

    #[test]
    fn converts_wall_time_back_to_recorded_time() {
        assert_eq!(covered(Duration::from_millis(500), 2.0), Duration::from_millis(1000));
        assert_eq!(covered(Duration::from_millis(500), 1.0), Duration::from_millis(500));
    }
}

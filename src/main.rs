use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tape::core::EventKind;
use tape::input::load_file;
use tape::player::{Player, PlayerConfig};
use tape::source::MemoryStreamer;

/// Replay a recorded terminal session in real time
#[derive(Debug, Parser)]
#[command(name = "tape", version, about = "Terminal Audit Playback Engine")]
struct Args {
    /// Recording file (JSON-lines or CSV)
    recording: PathBuf,

    /// Playback speed multiplier (defaults to the last used speed)
    #[arg(long)]
    speed: Option<f64>,

    /// Start playback this many milliseconds into the recording
    #[arg(long, value_name = "MS")]
    start_at: Option<u64>,

    /// Print events as JSON instead of raw terminal output
    #[arg(long)]
    json: bool,
}

/// Persisted user settings
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Settings {
    default_speed: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { default_speed: 1.0 }
    }
}

impl Settings {
    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tape").join("settings.json"))
    }

    fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn save(&self) {
        let Some(path) = Self::path() else { return };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&path, text) {
                    warn!("failed to save settings: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize settings: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut settings = Settings::load();
    let speed = args.speed.unwrap_or(settings.default_speed);

    let events = load_file(&args.recording)
        .with_context(|| format!("failed to load {}", args.recording.display()))?;
    info!("loaded {} events from {}", events.len(), args.recording.display());

    let session_id = args
        .recording
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording")
        .to_string();

    let streamer = Arc::new(MemoryStreamer::new(events));
    let mut player = Player::new(PlayerConfig {
        session_id,
        streamer,
    })?;
    let Some(mut output) = player.take_output() else {
        anyhow::bail!("player output was already taken");
    };

    player.set_speed(speed)?;
    if let Some(ms) = args.start_at {
        player.set_pos(Duration::from_millis(ms))?;
    }
    player.play()?;

    let mut stdout = std::io::stdout();
    while let Some(event) = output.recv().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match event.kind {
            EventKind::Print => {
                stdout.write_all(&event.data)?;
                stdout.flush()?;
            }
            EventKind::Resize => {
                debug!("terminal resized at {:?}: {}", event.offset, event.hex_data());
            }
        }
    }

    if let Some(err) = player.error() {
        return Err(err).context("playback failed");
    }

    if let Some(speed) = args.speed {
        if speed != settings.default_speed {
            settings.default_speed = speed;
            settings.save();
        }
    }

    info!("replayed session to {:?}", player.last_played());
    Ok(())
}

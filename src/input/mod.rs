pub mod csv;
pub mod jsonl;

pub use csv::{load_csv, parse_csv};
pub use jsonl::{load_jsonl, parse_jsonl};

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::SessionEvent;

/// Recording format detection result
#[derive(Debug, Clone)]
pub enum RecordingFormat {
    JsonLines,
    Csv,
    Unknown,
}

/// Detect the format of a recording by inspecting its content
pub fn detect_format(data: &[u8]) -> RecordingFormat {
    if is_jsonl(data) {
        return RecordingFormat::JsonLines;
    }

    if is_csv(data) {
        return RecordingFormat::Csv;
    }

    RecordingFormat::Unknown
}

fn is_jsonl(data: &[u8]) -> bool {
    // JSON-lines recordings open with an object on the first line
    std::str::from_utf8(&data[..data.len().min(64)])
        .map(|text| text.trim_start().starts_with('{'))
        .unwrap_or(false)
}

fn is_csv(data: &[u8]) -> bool {
    // Check if the data looks like CSV (text with commas)
    if data.len() < 10 {
        return false;
    }

    let sample = std::str::from_utf8(&data[..data.len().min(500)]);
    match sample {
        Ok(text) => {
            // Check for CSV-like patterns (multiple commas on a line)
            text.lines().take(5).any(|line| line.chars().filter(|&c| c == ',').count() >= 2)
        }
        Err(_) => false,
    }
}

/// Load a recorded session from a file, auto-detecting the format
pub fn load_file(path: &Path) -> Result<Vec<SessionEvent>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    match detect_format(&data) {
        RecordingFormat::JsonLines => {
            parse_jsonl(std::str::from_utf8(&data).context("recording is not valid UTF-8")?)
        }
        RecordingFormat::Csv => parse_csv(&data),
        RecordingFormat::Unknown => anyhow::bail!("unknown recording format"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_json_lines() {
        let data = b"{\"index\":0,\"offset_ms\":0,\"kind\":\"print\",\"data\":\"FF\"}\n";
        assert!(matches!(detect_format(data), RecordingFormat::JsonLines));
    }

    #[test]
    fn detects_csv() {
        let data = b"offset,kind,data\n0.0,print,FF\n";
        assert!(matches!(detect_format(data), RecordingFormat::Csv));
    }

    #[test]
    fn flags_unknown_formats() {
        let data = [0u8, 159, 146, 150, 0, 1, 2, 3, 4, 5, 6, 7];
        assert!(matches!(detect_format(&data), RecordingFormat::Unknown));
    }
}

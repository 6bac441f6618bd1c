use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a recorded session event represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Terminal output captured from the session
    Print,
    /// A change of the terminal window size
    Resize,
}

/// A single recorded terminal-session event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// 0-based position in the recording, strictly increasing
    pub index: u64,

    /// Elapsed time since the start of the recording
    pub offset: Duration,

    /// Wall-clock time the event was captured
    pub time: DateTime<Utc>,

    /// Event kind
    pub kind: EventKind,

    /// Raw payload bytes (terminal output, resize dimensions, ...)
    pub data: Vec<u8>,
}

impl SessionEvent {
    /// Create a new event captured now
    pub fn new(index: u64, offset: Duration, kind: EventKind, data: Vec<u8>) -> Self {
        Self {
            index,
            offset,
            time: Utc::now(),
            kind,
            data,
        }
    }

    /// Get the payload as a hex string
    pub fn hex_data(&self) -> String {
        self.data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse a hex string to payload bytes
    pub fn parse_hex(hex: &str) -> anyhow::Result<Vec<u8>> {
        let hex = hex.replace(' ', "");
        // Strip 0x or 0X prefix if present
        let hex = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")).unwrap_or(&hex);

        if hex.len() % 2 != 0 {
            anyhow::bail!("Hex string must have even length");
        }

        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Failed to parse hex: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(
            SessionEvent::parse_hex("12 34 AB CD").unwrap(),
            vec![0x12, 0x34, 0xAB, 0xCD]
        );
        assert_eq!(
            SessionEvent::parse_hex("1234ABCD").unwrap(),
            vec![0x12, 0x34, 0xAB, 0xCD]
        );
        assert!(SessionEvent::parse_hex("ABC").is_err());
    }

    #[test]
    fn test_hex_data_round_trip() {
        let event = SessionEvent::new(
            0,
            Duration::ZERO,
            EventKind::Print,
            vec![0x12, 0x34, 0xAB, 0xCD],
        );
        assert_eq!(event.hex_data(), "12 34 AB CD");
        assert_eq!(SessionEvent::parse_hex(&event.hex_data()).unwrap(), event.data);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EventKind::Print).unwrap(), "\"print\"");
        assert_eq!(serde_json::to_string(&EventKind::Resize).unwrap(), "\"resize\"");
    }
}

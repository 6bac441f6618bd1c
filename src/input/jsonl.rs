use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{EventKind, SessionEvent};

/// One line of a JSON-lines recording
#[derive(Debug, Deserialize)]
struct EventRecord {
    index: u64,
    offset_ms: u64,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    kind: EventKind,
    data: String,
}

/// Parse a JSON-lines recording
///
/// Each non-empty line is one event record with a hex-encoded payload:
///
/// `{"index":0,"offset_ms":0,"kind":"print","data":"48 69"}`
///
/// Records missing a capture time get one derived from the load time plus
/// their offset.
pub fn parse_jsonl(text: &str) -> Result<Vec<SessionEvent>> {
    let base_time = Utc::now();
    let mut events = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: EventRecord = serde_json::from_str(line)
            .with_context(|| format!("bad event record on line {}", line_no + 1))?;

        let data = SessionEvent::parse_hex(&record.data)
            .with_context(|| format!("bad payload on line {}", line_no + 1))?;

        events.push(SessionEvent {
            index: record.index,
            offset: Duration::from_millis(record.offset_ms),
            time: record.time.unwrap_or_else(|| {
                base_time + chrono::Duration::milliseconds(record.offset_ms as i64)
            }),
            kind: record.kind,
            data,
        });
    }

    Ok(events)
}

/// Load a JSON-lines recording from a file
pub fn load_jsonl(path: &Path) -> Result<Vec<SessionEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_jsonl(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_records() {
        let text = r#"
{"index":0,"offset_ms":0,"kind":"print","data":"48 65 6C 6C 6F"}
{"index":1,"offset_ms":1500,"kind":"resize","data":"00 50 00 18"}
"#;
        let events = parse_jsonl(text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[0].data, b"Hello");
        assert_eq!(events[0].kind, EventKind::Print);
        assert_eq!(events[1].offset, Duration::from_millis(1500));
        assert_eq!(events[1].kind, EventKind::Resize);
    }

    #[test]
    fn reports_the_failing_line() {
        let text = "{\"index\":0,\"offset_ms\":0,\"kind\":\"print\",\"data\":\"FF\"}\nnot json\n";
        let err = parse_jsonl(text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn derives_capture_times_from_offsets() {
        let text = "{\"index\":0,\"offset_ms\":0,\"kind\":\"print\",\"data\":\"FF\"}\n\
                    {\"index\":1,\"offset_ms\":1500,\"kind\":\"print\",\"data\":\"FF\"}\n";
        let events = parse_jsonl(text).unwrap();
        assert_eq!(
            events[1].time - events[0].time,
            chrono::Duration::milliseconds(1500)
        );
    }

    #[test]
    fn keeps_explicit_capture_times() {
        let text = "{\"index\":0,\"offset_ms\":0,\"time\":\"2024-03-01T12:00:00Z\",\"kind\":\"print\",\"data\":\"FF\"}\n";
        let events = parse_jsonl(text).unwrap();
        assert_eq!(events[0].time.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }
}

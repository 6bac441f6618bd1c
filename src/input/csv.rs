use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

use crate::core::{EventKind, SessionEvent};

/// Parse a CSV recording
///
/// Supports flexible column formats:
/// - offset,kind,data
/// - time,type,payload
/// - ts,event,hex
///
/// Offsets are relative seconds from the start of the recording; payloads
/// are hex-encoded. Events are indexed in row order.
pub fn parse_csv(data: &[u8]) -> Result<Vec<SessionEvent>> {
    let mut rdr = csv::Reader::from_reader(data);

    let headers = rdr.headers()?;
    let (offset_idx, kind_idx, data_idx) = detect_columns(headers)?;

    let base_time = Utc::now();
    let mut events = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("failed to read CSV row {}", row + 1))?;

        let offset_secs = record
            .get(offset_idx)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .with_context(|| format!("bad offset in row {}", row + 1))?;
        if offset_secs < 0.0 {
            bail!("negative offset in row {}", row + 1);
        }
        let offset = Duration::try_from_secs_f64(offset_secs)
            .with_context(|| format!("offset out of range in row {}", row + 1))?;

        let kind = match record.get(kind_idx).map(|s| s.trim().to_lowercase()).as_deref() {
            Some("print") | Some("") | None => EventKind::Print,
            Some("resize") => EventKind::Resize,
            Some(other) => bail!("unknown event kind {:?} in row {}", other, row + 1),
        };

        let hex_data = record
            .get(data_idx)
            .with_context(|| format!("missing data column in row {}", row + 1))?;
        let data = SessionEvent::parse_hex(hex_data)
            .with_context(|| format!("bad payload in row {}", row + 1))?;

        events.push(SessionEvent {
            index: events.len() as u64,
            offset,
            time: base_time + chrono::Duration::milliseconds((offset_secs * 1000.0) as i64),
            kind,
            data,
        });
    }

    Ok(events)
}

/// Load a CSV recording from a file
pub fn load_csv(path: &Path) -> Result<Vec<SessionEvent>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_csv(&data)
}

/// Detect column indices from CSV headers
fn detect_columns(headers: &csv::StringRecord) -> Result<(usize, usize, usize)> {
    let offset_idx = find_column(headers, &["offset", "time", "timestamp", "t", "ts"])?;
    let kind_idx = find_column(headers, &["kind", "type", "event"])?;
    let data_idx = find_column(headers, &["data", "payload", "hex", "bytes"])?;

    Ok((offset_idx, kind_idx, data_idx))
}

/// Find a column by checking possible names
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.to_lowercase();
        if names.iter().any(|&name| header_lower == name) {
            return Ok(idx);
        }
    }

    bail!("Could not find column with names: {:?}", names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flexible_headers() {
        let data = b"time,type,payload\n0.0,print,48 69\n1.5,resize,00 50 00 18\n";
        let events = parse_csv(data).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[0].kind, EventKind::Print);
        assert_eq!(events[0].data, vec![0x48, 0x69]);
        assert_eq!(events[1].index, 1);
        assert_eq!(events[1].offset, Duration::from_millis(1500));
        assert_eq!(events[1].kind, EventKind::Resize);
    }

    #[test]
    fn rejects_an_unknown_kind() {
        let data = b"offset,kind,data\n0.0,paint,FF\n";
        assert!(parse_csv(data).is_err());
    }

    #[test]
    fn rejects_missing_columns() {
        let data = b"a,b,c\n1,2,3\n";
        assert!(parse_csv(data).is_err());
    }

    #[test]
    fn rejects_a_negative_offset() {
        let data = b"offset,kind,data\n-1.0,print,FF\n";
        assert!(parse_csv(data).is_err());
    }
}

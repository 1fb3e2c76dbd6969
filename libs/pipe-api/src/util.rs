use chrono::{DateTime, SecondsFormat, Utc};

use crate::StoreError;

/// ISO-8601 в UTC с миллисекундами: `2025-01-31T12:00:00.123Z`.
pub fn format_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Распарсить ISO-8601 (RFC 3339) в UTC.
pub fn parse_iso(s: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn iso_keeps_millis_and_zulu_suffix() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let s = format_iso(&ts);
        assert_eq!(s, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_iso(&s).unwrap(), ts);
    }

    #[test]
    fn parse_accepts_offsets() {
        let ts = parse_iso("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(format_iso(&ts), "2024-03-01T08:00:00.000Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = parse_iso("yesterday").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }
}

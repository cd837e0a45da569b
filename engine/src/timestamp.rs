//! Server-assigned update timestamps.
//!
//! The document store hands back `lastUpdated` in one of two shapes: an epoch
//! object (`{"seconds": .., "nanoseconds": ..}`) when the write was confirmed
//! online, or an ISO-8601 string when the value was stamped by a client while
//! offline. Both decode into [`ServerTimestamp`].

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A record update timestamp as stored by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerTimestamp {
    /// Epoch seconds plus sub-second nanoseconds
    Epoch {
        seconds: i64,
        #[serde(default)]
        nanoseconds: u32,
    },
    /// ISO-8601 text
    Text(String),
}

impl ServerTimestamp {
    /// Stamp a point in time as ISO-8601 text (millisecond precision).
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        ServerTimestamp::Text(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Stamp a point in time in the epoch form used by confirmed server writes.
    pub fn epoch(at: DateTime<Utc>) -> Self {
        ServerTimestamp::Epoch {
            seconds: at.timestamp(),
            nanoseconds: at.timestamp_subsec_nanos(),
        }
    }

    /// Resolve to a UTC instant.
    ///
    /// Returns `None` when the value cannot be interpreted. A non-positive
    /// `seconds` is the placeholder of a server timestamp that has not been
    /// resolved yet and is treated the same way.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            ServerTimestamp::Epoch {
                seconds,
                nanoseconds,
            } => {
                if *seconds <= 0 {
                    return None;
                }
                DateTime::from_timestamp(*seconds, *nanoseconds)
            }
            ServerTimestamp::Text(text) => parse_text(text),
        }
    }
}

impl From<DateTime<Utc>> for ServerTimestamp {
    fn from(at: DateTime<Utc>) -> Self {
        ServerTimestamp::from_datetime(at)
    }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Offset-less strings are read as UTC
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_text() {
        let ts = ServerTimestamp::Text("2024-02-01T10:00:00.000Z".into());
        let expected = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(ts.to_datetime(), Some(expected));
    }

    #[test]
    fn parses_text_with_offset() {
        let ts = ServerTimestamp::Text("2024-02-01T12:00:00+02:00".into());
        let expected = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(ts.to_datetime(), Some(expected));
    }

    #[test]
    fn parses_offsetless_text_as_utc() {
        let ts = ServerTimestamp::Text("2024-02-01T10:00:00".into());
        let expected = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(ts.to_datetime(), Some(expected));
    }

    #[test]
    fn parses_epoch_object() {
        let ts: ServerTimestamp =
            serde_json::from_str(r#"{"seconds": 1706745600, "nanoseconds": 0}"#).unwrap();
        let expected = Utc.timestamp_opt(1706745600, 0).unwrap();
        assert_eq!(ts.to_datetime(), Some(expected));
    }

    #[test]
    fn epoch_without_nanoseconds() {
        let ts: ServerTimestamp = serde_json::from_str(r#"{"seconds": 1706745600}"#).unwrap();
        assert!(ts.to_datetime().is_some());
    }

    #[test]
    fn garbage_is_undeterminable() {
        assert_eq!(ServerTimestamp::Text("not a date".into()).to_datetime(), None);
        assert_eq!(ServerTimestamp::Text(String::new()).to_datetime(), None);
        let placeholder = ServerTimestamp::Epoch {
            seconds: 0,
            nanoseconds: 0,
        };
        assert_eq!(placeholder.to_datetime(), None);
    }

    #[test]
    fn epoch_form_keeps_instant() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        assert_eq!(ServerTimestamp::epoch(at).to_datetime(), Some(at));
        assert_eq!(ServerTimestamp::from_datetime(at).to_datetime(), Some(at));
    }
}

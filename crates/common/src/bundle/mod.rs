//! Log-bundle chain model
//!
//! A decrypted payload is an object `{ logs: [...], prev_cid: "..." }`. Each
//! element of `logs` is itself a JSON-encoded entry; elements that fail to
//! parse are not dropped but converted into synthesized entries so nothing
//! silently disappears. The bundle's `prev_cid` is the back-link to the
//! chronological predecessor; an empty string and a missing key both mean the
//! beginning of history.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content_id::ContentId;

/// Entry type assigned to synthesized entries
pub const SYNTHESIZED_KIND: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("payload has no 'logs' field")]
    MissingLogs,
    #[error("payload field 'logs' is not an array")]
    LogsNotArray,
}

/// A single log event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonically related to recency; uniqueness is not enforced
    pub event_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A log entry together with how it was obtained
///
/// `Parsed` entries deserialized cleanly; `Synthesized` entries are recovery
/// wrappers around elements that were not valid entry JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEntry {
    Parsed(LogEntry),
    Synthesized(LogEntry),
}

impl ParsedEntry {
    pub fn entry(&self) -> &LogEntry {
        match self {
            ParsedEntry::Parsed(entry) | ParsedEntry::Synthesized(entry) => entry,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, ParsedEntry::Synthesized(_))
    }
}

/// Field entries are ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    EventId,
    Timestamp,
}

impl FromStr for SortField {
    type Err = UnknownSortParam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event_id" => Ok(SortField::EventId),
            "timestamp" => Ok(SortField::Timestamp),
            other => Err(UnknownSortParam(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl FromStr for SortOrder {
    type Err = UnknownSortParam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            other => Err(UnknownSortParam(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown sort parameter '{0}'")]
pub struct UnknownSortParam(String);

/// One bundle of the back-linked chain
#[derive(Debug, Clone)]
pub struct LogBundle {
    /// Entries in the configured order
    pub entries: Vec<ParsedEntry>,
    /// Back-link to the predecessor; `None` means the beginning of history
    pub prev: Option<ContentId>,
}

impl LogBundle {
    /// Whether the chain continues past this bundle
    pub fn has_predecessor(&self) -> bool {
        self.prev.is_some()
    }
}

/// Parse a decrypted payload into an ordered bundle
///
/// String elements of `logs` are parsed independently; objects are accepted
/// directly. Anything that does not deserialize into a [`LogEntry`] becomes a
/// [`ParsedEntry::Synthesized`] carrying the raw text as its message.
///
/// Sorting compares the numeric key of the configured field (`timestamp`
/// sorts by its parsed unix-millisecond value, unparseable values as 0).
/// `sort_by` is stable, so entries with equal keys keep their arrival order.
pub fn parse_bundle(
    payload: &Value,
    field: SortField,
    order: SortOrder,
) -> Result<LogBundle, BundleError> {
    let logs = payload
        .get("logs")
        .ok_or(BundleError::MissingLogs)?
        .as_array()
        .ok_or(BundleError::LogsNotArray)?;

    let mut entries: Vec<ParsedEntry> = logs.iter().map(parse_element).collect();

    entries.sort_by(|a, b| {
        let (ka, kb) = (sort_key(a.entry(), field), sort_key(b.entry(), field));
        match order {
            SortOrder::Ascending => ka.cmp(&kb),
            SortOrder::Descending => kb.cmp(&ka),
        }
    });

    let prev = payload
        .get("prev_cid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ContentId::from);

    Ok(LogBundle { entries, prev })
}

fn parse_element(element: &Value) -> ParsedEntry {
    let parsed = match element {
        Value::String(s) => serde_json::from_str::<LogEntry>(s),
        other => serde_json::from_value::<LogEntry>(other.clone()),
    };

    match parsed {
        Ok(entry) => ParsedEntry::Parsed(entry),
        Err(e) => {
            let raw = match element {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            tracing::warn!(error = %e, "log element failed to parse, synthesizing entry");
            ParsedEntry::Synthesized(LogEntry {
                event_id: Utc::now().timestamp_millis(),
                kind: SYNTHESIZED_KIND.to_string(),
                message: raw,
                timestamp: Some(Utc::now().to_rfc3339()),
            })
        }
    }
}

fn sort_key(entry: &LogEntry, field: SortField) -> i64 {
    match field {
        SortField::EventId => entry.event_id,
        SortField::Timestamp => entry
            .timestamp
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis())
            .unwrap_or(0),
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] {}", self.event_id, self.kind, self.message)?;
        if let Some(ts) = &self.timestamp {
            write!(f, " @ {}", ts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry_json(event_id: i64, kind: &str) -> Value {
        Value::String(
            serde_json::json!({
                "event_id": event_id,
                "type": kind,
                "message": format!("event {}", event_id),
            })
            .to_string(),
        )
    }

    fn payload(logs: Vec<Value>, prev_cid: Option<&str>) -> Value {
        let mut payload = serde_json::json!({ "logs": logs });
        if let Some(prev) = prev_cid {
            payload["prev_cid"] = Value::String(prev.to_string());
        }
        payload
    }

    #[test]
    fn test_sorts_descending_by_event_id_by_default() {
        let value = payload(
            vec![entry_json(3, "auth"), entry_json(17, "net"), entry_json(9, "auth")],
            None,
        );
        let bundle = parse_bundle(&value, SortField::default(), SortOrder::default()).unwrap();

        let ids: Vec<i64> = bundle.entries.iter().map(|e| e.entry().event_id).collect();
        assert_eq!(ids, vec![17, 9, 3]);
        for window in ids.windows(2) {
            assert!(window[0] >= window[1]);
        }
    }

    #[test]
    fn test_sorts_ascending_when_configured() {
        let value = payload(vec![entry_json(5, "a"), entry_json(1, "b")], None);
        let bundle = parse_bundle(&value, SortField::EventId, SortOrder::Ascending).unwrap();

        let ids: Vec<i64> = bundle.entries.iter().map(|e| e.entry().event_id).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[test]
    fn test_equal_keys_keep_arrival_order() {
        let first = Value::String(
            serde_json::json!({ "event_id": 7, "type": "a", "message": "first" }).to_string(),
        );
        let second = Value::String(
            serde_json::json!({ "event_id": 7, "type": "a", "message": "second" }).to_string(),
        );
        let value = payload(vec![first, second], None);
        let bundle = parse_bundle(&value, SortField::EventId, SortOrder::Descending).unwrap();

        assert_eq!(bundle.entries[0].entry().message, "first");
        assert_eq!(bundle.entries[1].entry().message, "second");
    }

    #[test]
    fn test_unparseable_element_is_synthesized_not_dropped() {
        let value = payload(
            vec![
                entry_json(2, "auth"),
                Value::String("{{corrupt json".to_string()),
            ],
            None,
        );
        let bundle = parse_bundle(&value, SortField::EventId, SortOrder::Descending).unwrap();

        assert_eq!(bundle.entries.len(), 2);
        let synthesized: Vec<&ParsedEntry> = bundle
            .entries
            .iter()
            .filter(|e| e.is_synthesized())
            .collect();
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized[0].entry().kind, SYNTHESIZED_KIND);
        assert_eq!(synthesized[0].entry().message, "{{corrupt json");
        assert!(synthesized[0].entry().timestamp.is_some());
    }

    #[test]
    fn test_plain_object_element_is_accepted() {
        let value = payload(
            vec![serde_json::json!({ "event_id": 4, "type": "sys", "message": "inline" })],
            None,
        );
        let bundle = parse_bundle(&value, SortField::EventId, SortOrder::Descending).unwrap();

        assert!(!bundle.entries[0].is_synthesized());
        assert_eq!(bundle.entries[0].entry().message, "inline");
    }

    #[test]
    fn test_missing_and_empty_prev_cid_are_terminal() {
        let missing = payload(vec![], None);
        let empty = payload(vec![], Some(""));

        let bundle = parse_bundle(&missing, SortField::EventId, SortOrder::Descending).unwrap();
        assert!(bundle.prev.is_none());
        assert!(!bundle.has_predecessor());

        let bundle = parse_bundle(&empty, SortField::EventId, SortOrder::Descending).unwrap();
        assert!(bundle.prev.is_none());
    }

    #[test]
    fn test_prev_cid_is_surfaced_for_traversal() {
        let value = payload(vec![], Some("bafy123"));
        let bundle = parse_bundle(&value, SortField::EventId, SortOrder::Descending).unwrap();

        assert_eq!(bundle.prev, Some(ContentId::from("bafy123")));
        assert!(bundle.has_predecessor());
    }

    #[test]
    fn test_sort_by_timestamp_uses_parsed_millis() {
        let older = serde_json::json!({
            "event_id": 1, "type": "a", "message": "older",
            "timestamp": "2024-01-01T00:00:00Z",
        });
        let newer = serde_json::json!({
            "event_id": 2, "type": "a", "message": "newer",
            "timestamp": "2024-06-01T00:00:00Z",
        });
        let value = payload(vec![older, newer], None);
        let bundle = parse_bundle(&value, SortField::Timestamp, SortOrder::Descending).unwrap();

        assert_eq!(bundle.entries[0].entry().message, "newer");
    }

    #[test]
    fn test_payload_without_logs_is_an_error() {
        let value = serde_json::json!({ "prev_cid": "bafy123" });
        assert!(matches!(
            parse_bundle(&value, SortField::EventId, SortOrder::Descending),
            Err(BundleError::MissingLogs)
        ));

        let value = serde_json::json!({ "logs": "not-an-array" });
        assert!(matches!(
            parse_bundle(&value, SortField::EventId, SortOrder::Descending),
            Err(BundleError::LogsNotArray)
        ));
    }
}

//! Inbound update records and the bounded recent-activity log.

use std::collections::VecDeque;

use chrono::DateTime;
use serde_json::Value;
use trackmint_shared::{DecodeError, UpdateKind};

/// How many updates the log keeps before evicting the oldest.
pub const UPDATE_LOG_CAPACITY: usize = 100;

/// One inbound message, normalized. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: String,
    pub kind: UpdateKind,
    /// The message's `data` field, `Null` when absent.
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub received_at: i64,
}

impl Update {
    /// Decode a raw text frame `{id?, type, data, timestamp?}`.
    ///
    /// `now_ms` supplies the id and timestamp when the frame carries none.
    /// Only a missing or non-string `type` (or a frame that is not a JSON
    /// object) is an error; a malformed payload is left for dispatch to judge.
    pub fn decode(text: &str, now_ms: i64) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::NotJson(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let kind = match fields.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => UpdateKind::from_wire(kind),
            _ => return Err(DecodeError::MissingType),
        };

        let id = match fields.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => now_ms.to_string(),
        };

        let received_at = fields
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or(now_ms);

        Ok(Self {
            id,
            kind,
            payload: fields.remove("data").unwrap_or(Value::Null),
            received_at,
        })
    }
}

/// Accepts epoch milliseconds (integer or float) or an RFC 3339 string.
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Most-recent-first log of updates, capped at a fixed capacity.
#[derive(Debug, Clone)]
pub struct UpdateLog {
    entries: VecDeque<Update>,
    capacity: usize,
}

impl Default for UpdateLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateLog {
    pub fn new() -> Self {
        Self::with_capacity(UPDATE_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an update, evicting the oldest once over capacity.
    pub fn push(&mut self, update: Update) {
        self.entries.push_front(update);
        self.entries.truncate(self.capacity);
    }

    /// Updates, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Update> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Update> {
        self.entries.front()
    }

    /// Owned copy of the log, newest first.
    pub fn snapshot(&self) -> Vec<Update> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn update(n: usize) -> Update {
        Update {
            id: format!("u-{n}"),
            kind: UpdateKind::TimerUpdate,
            payload: json!({"n": n}),
            received_at: n as i64,
        }
    }

    #[test]
    fn decode_full_envelope() {
        let text = r#"{"id":"evt-9","type":"status_change","data":{"id":"wo-1","type":"work_order","status":"Paused"},"timestamp":1700000000123}"#;
        let decoded = Update::decode(text, 5).unwrap();
        assert_eq!(
            decoded,
            Update {
                id: "evt-9".into(),
                kind: UpdateKind::StatusChange,
                payload: json!({"id": "wo-1", "type": "work_order", "status": "Paused"}),
                received_at: 1_700_000_000_123,
            }
        );
    }

    #[test]
    fn decode_falls_back_to_receive_time() {
        let decoded = Update::decode(r#"{"type":"work_order_update"}"#, 42).unwrap();
        assert_eq!(decoded.id, "42");
        assert_eq!(decoded.received_at, 42);
        assert_eq!(decoded.payload, Value::Null);
    }

    #[test]
    fn decode_accepts_numeric_ids_and_rfc3339_timestamps() {
        let decoded = Update::decode(
            r#"{"id":17,"type":"foo","data":{},"timestamp":"2024-01-01T00:00:00Z"}"#,
            0,
        )
        .unwrap();
        assert_eq!(decoded.id, "17");
        assert_eq!(decoded.kind, UpdateKind::Other("foo".into()));
        assert_eq!(decoded.received_at, 1_704_067_200_000);
    }

    #[test]
    fn decode_rejects_frames_without_type() {
        assert!(matches!(Update::decode("{not json", 0), Err(DecodeError::NotJson(_))));
        assert_eq!(Update::decode("[1,2]", 0), Err(DecodeError::NotAnObject));
        assert_eq!(Update::decode(r#"{"data":{}}"#, 0), Err(DecodeError::MissingType));
        assert_eq!(Update::decode(r#"{"type":7}"#, 0), Err(DecodeError::MissingType));
    }

    #[test]
    fn log_is_most_recent_first() {
        let mut log = UpdateLog::new();
        log.push(update(1));
        log.push(update(2));
        log.push(update(3));
        let ids: Vec<_> = log.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u-3", "u-2", "u-1"]);
        assert_eq!(log.latest().map(|u| u.id.as_str()), Some("u-3"));
    }

    #[test]
    fn log_evicts_oldest_past_capacity() {
        let mut log = UpdateLog::new();
        for n in 1..=101 {
            log.push(update(n));
            assert!(log.len() <= UPDATE_LOG_CAPACITY);
        }
        assert_eq!(log.len(), 100);
        assert_eq!(log.latest().unwrap().id, "u-101");
        assert_eq!(log.iter().last().unwrap().id, "u-2");
        assert!(log.iter().all(|u| u.id != "u-1"));
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let mut log = UpdateLog::with_capacity(0);
        log.push(update(1));
        log.push(update(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot(), vec![update(2)]);
        log.clear();
        assert!(log.is_empty());
    }
}

//! Position in the remote event log.

use chrono::{DateTime, Utc};
use devsync_proto::SyncEvent;
use std::collections::HashSet;

/// Tracks the newest `created_at` handled and the ids seen at that instant.
///
/// The server's `since` filter is inclusive, so events sharing the newest
/// timestamp come back on the next poll and are recognised by id.
#[derive(Debug, Clone, Default)]
pub struct EventCursor {
    since: Option<DateTime<Utc>>,
    seen_at_since: HashSet<String>,
}

impl EventCursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for the `since` query parameter.
    #[must_use]
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Drop events already handled and move the cursor past the rest.
    ///
    /// Returned events are ordered by `created_at`.
    pub fn advance(&mut self, mut events: Vec<SyncEvent>) -> Vec<SyncEvent> {
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut fresh = Vec::with_capacity(events.len());
        for event in events {
            match self.since {
                Some(since) if event.created_at < since => continue,
                Some(since) if event.created_at == since => {
                    if !self.seen_at_since.insert(event.event_id.clone()) {
                        continue;
                    }
                }
                _ => {
                    self.since = Some(event.created_at);
                    self.seen_at_since.clear();
                    self.seen_at_since.insert(event.event_id.clone());
                }
            }
            fresh.push(event);
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Map;

    fn event(id: &str, second: u32) -> SyncEvent {
        SyncEvent {
            event_id: id.to_string(),
            event_type: "FILE_UPDATED".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, second).unwrap(),
            payload: Map::new(),
        }
    }

    fn ids(events: &[SyncEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_id.as_str()).collect()
    }

    #[test]
    fn test_first_poll_returns_everything_in_order() {
        let mut cursor = EventCursor::new();
        let fresh = cursor.advance(vec![event("2", 5), event("1", 1)]);
        assert_eq!(ids(&fresh), vec!["1", "2"]);
        assert_eq!(cursor.since(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 5).unwrap()));
    }

    #[test]
    fn test_inclusive_since_does_not_replay() {
        let mut cursor = EventCursor::new();
        cursor.advance(vec![event("1", 1), event("2", 5)]);

        // The server returns events at or after `since`.
        let fresh = cursor.advance(vec![event("2", 5), event("3", 5), event("4", 7)]);
        assert_eq!(ids(&fresh), vec!["3", "4"]);

        let fresh = cursor.advance(vec![event("4", 7)]);
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_older_events_are_ignored() {
        let mut cursor = EventCursor::new();
        cursor.advance(vec![event("5", 9)]);
        assert!(cursor.advance(vec![event("1", 1)]).is_empty());
    }
}

//! Append-only public event log, stored as sequence-keyed documents.

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{Event, EventType, Timestamp, SCHEMA_VERSION_V1};
use serde_json::Value;

use crate::paths;
use crate::store::{server_timestamp, DocumentStore, StoreError};

/// Allocates sequence numbers and writes event documents. Events are plain
/// writes: they are emitted after their transaction commits, and nothing
/// ever contends on a fresh sequence-keyed path.
#[derive(Debug)]
pub struct EventLog {
    next_seq: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
        }
    }

    /// Resume numbering after the highest event already in the store.
    pub fn recover(store: &DocumentStore) -> Result<Self, StoreError> {
        let mut max_seq = 0;
        for (_, doc) in store.list_prefix(paths::EVENTS_PREFIX)? {
            let event: Event = doc.decode()?;
            max_seq = max_seq.max(event.seq);
        }
        Ok(Self {
            next_seq: AtomicU64::new(max_seq + 1),
        })
    }

    pub fn append(
        &self,
        store: &DocumentStore,
        event_type: EventType,
        subject_id: &str,
        object_id: Option<&str>,
        details: Option<Value>,
    ) -> Result<Event, StoreError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            event_id: format!("evt_{seq:010}"),
            seq,
            event_type,
            at: Timestamp::default(),
            subject_id: subject_id.to_string(),
            object_id: object_id.map(str::to_string),
            details,
        };

        let path = paths::event(seq);
        let mut value = serde_json::to_value(&event)?;
        value["at"] = server_timestamp();
        store.set_value(&path, value)?;

        // Read back so the caller sees the resolved timestamp.
        let written: Event = store
            .get_as(&path)?
            .unwrap_or(event);
        tracing::debug!(seq, event_type = ?written.event_type, "event appended");
        Ok(written)
    }

    /// Every event with a sequence number strictly greater than `after`,
    /// in order. Zero-padded paths make store order sequence order.
    pub fn events_since(store: &DocumentStore, after: u64) -> Result<Vec<Event>, StoreError> {
        let mut out = Vec::new();
        for (_, doc) in store.list_prefix(paths::EVENTS_PREFIX)? {
            let event: Event = doc.decode()?;
            if event.seq > after {
                out.push(event);
            }
        }
        Ok(out)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

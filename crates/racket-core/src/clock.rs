//! Clock synchronization against the store's authoritative timestamps.
//!
//! Local wall clocks drift and players adjust them; every timed decision in
//! the kernel therefore goes through a [`SyncedClock`] that carries the last
//! measured offset to the store's server clock. Until the first successful
//! sync the offset is zero and `is_ready` reports false so callers can tell
//! "not yet synced" from "synced, offset happens to be zero."

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use contracts::Timestamp;
use serde_json::json;

use crate::store::{server_timestamp, DocumentStore, StoreError};

const PROBE_PATH: &str = "meta/clock_probe";

/// Source of local wall-clock time, injectable so tests can skew it.
pub trait LocalClock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Hand-advanced clock for deterministic tests. Doubles as the store's
/// server clock and as a skewed client clock.
#[derive(Debug)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl LocalClock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// Local clock plus a measured offset to the store's server clock.
pub struct SyncedClock {
    local: Arc<dyn LocalClock>,
    offset_ms: AtomicI64,
    ready: AtomicBool,
}

impl std::fmt::Debug for SyncedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedClock")
            .field("offset_ms", &self.offset_ms.load(Ordering::SeqCst))
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

impl SyncedClock {
    pub fn new(local: Arc<dyn LocalClock>) -> Self {
        Self {
            local,
            offset_ms: AtomicI64::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Write a probe record stamped by the server, read it back, and derive
    /// `offset = server_time - local_time_at_read`. Safe to call repeatedly;
    /// the engine re-runs it on a fixed cadence.
    ///
    /// On failure the previous offset is retained and the clock is marked
    /// ready anyway: a stale offset degrades accuracy, a blocked clock
    /// would stall every timed operation.
    pub fn synchronize(&self, store: &DocumentStore) -> Result<i64, StoreError> {
        let probed = store
            .set_value(PROBE_PATH, json!({ "at": server_timestamp() }))
            .and_then(|()| store.get(PROBE_PATH));

        match probed {
            Ok(Some(doc)) => {
                let local_at_read = self.local.now_ms();
                let offset = doc.updated_at.millis() - local_at_read;
                self.offset_ms.store(offset, Ordering::SeqCst);
                self.ready.store(true, Ordering::SeqCst);
                tracing::debug!(offset_ms = offset, "clock synchronized");
                Ok(offset)
            }
            Ok(None) => {
                self.ready.store(true, Ordering::SeqCst);
                tracing::warn!("clock probe vanished, keeping previous offset");
                Ok(self.offset_ms.load(Ordering::SeqCst))
            }
            Err(err) => {
                self.ready.store(true, Ordering::SeqCst);
                tracing::warn!(error = %err, "clock sync failed, keeping previous offset");
                Err(err)
            }
        }
    }

    /// Skew-corrected "now". Monotonic only to the extent the local clock
    /// is; periodic resynchronization is the mitigation for clock jumps.
    pub fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.local.now_ms() + self.offset_ms.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsynced_clock_reports_local_time_and_not_ready() {
        let local = Arc::new(ManualClock::new(5_000));
        let clock = SyncedClock::new(local);
        assert!(!clock.is_ready());
        assert_eq!(clock.now(), Timestamp::from_millis(5_000));
        assert_eq!(clock.offset_ms(), 0);
    }

    #[test]
    fn synchronize_measures_skew_against_server_clock() {
        // Server is 90 seconds ahead of the client's wall clock.
        let server = Arc::new(ManualClock::new(1_000_000));
        let local = Arc::new(ManualClock::new(910_000));
        let store = DocumentStore::new(server);
        let clock = SyncedClock::new(local.clone());

        let offset = clock.synchronize(&store).expect("sync succeeds");
        assert_eq!(offset, 90_000);
        assert!(clock.is_ready());
        assert_eq!(clock.now(), Timestamp::from_millis(1_000_000));

        // Skew-corrected time tracks the local clock between syncs.
        local.advance(2_000);
        assert_eq!(clock.now(), Timestamp::from_millis(1_002_000));
    }

    #[test]
    fn resync_updates_offset_after_local_clock_jump() {
        let server = Arc::new(ManualClock::new(1_000_000));
        let local = Arc::new(ManualClock::new(1_000_000));
        let store = DocumentStore::new(server);
        let clock = SyncedClock::new(local.clone());

        clock.synchronize(&store).expect("first sync");
        assert_eq!(clock.offset_ms(), 0);

        // Player moves their clock an hour ahead.
        local.advance(3_600_000);
        clock.synchronize(&store).expect("resync");
        assert_eq!(clock.offset_ms(), -3_600_000);
        assert_eq!(clock.now(), Timestamp::from_millis(1_000_000));
    }
}

//! Versioned document store with optimistic, retryable transactions.
//!
//! Documents are JSON values keyed by slash-separated paths. Plain reads and
//! writes are last-write-wins; contended paths go through
//! [`DocumentStore::run_transaction`], which captures a read set of
//! `(path, version)` pairs, stages writes, validates the read set under the
//! write lock at commit time, and re-runs the body on conflict up to a
//! bounded number of attempts. Within one transaction all reads must precede
//! the first staged write.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use contracts::Timestamp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::clock::LocalClock;

pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

const SERVER_TIMESTAMP_KEY: &str = "__server_timestamp__";

/// Sentinel value resolved to the store's authoritative clock at commit
/// time. The written timestamp is therefore skew-free regardless of the
/// issuing client's local clock.
pub fn server_timestamp() -> Value {
    json!({ SERVER_TIMESTAMP_KEY: true })
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub version: u64,
    /// Server-issued time of the last write to this document.
    pub updated_at: Timestamp,
    pub data: Value,
}

impl StoredDoc {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.data.clone()).map_err(StoreError::Serde)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Written,
    Deleted,
}

/// Append-only change feed entry; live subscribers poll `changes_since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub seq: u64,
    pub path: String,
    pub kind: ChangeKind,
    pub at: Timestamp,
}

#[derive(Debug)]
pub enum StoreError {
    Serde(serde_json::Error),
    /// A lock was poisoned by a panicking writer; the store is unusable.
    Poisoned,
    /// The transaction body issued a read after staging a write.
    ReadAfterWrite { path: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serde(err) => write!(f, "document serde error: {err}"),
            Self::Poisoned => write!(f, "store lock poisoned"),
            Self::ReadAfterWrite { path } => {
                write!(f, "transaction read of {path} after first staged write")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// How a transaction body bails out: a domain-level abort (no writes are
/// applied, never retried) or a store-level failure.
#[derive(Debug)]
pub enum TxnAbort<E> {
    Game(E),
    Store(StoreError),
}

impl<E> From<StoreError> for TxnAbort<E> {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Abort the surrounding transaction with a domain reason.
pub fn abort<T, E>(reason: E) -> Result<T, TxnAbort<E>> {
    Err(TxnAbort::Game(reason))
}

#[derive(Debug)]
pub enum TxnError<E> {
    /// The body aborted with a domain reason; nothing was written.
    Aborted(E),
    /// Read-set validation failed on every attempt.
    Contention { attempts: u32 },
    Store(StoreError),
}

impl<E: fmt::Display> fmt::Display for TxnError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted(reason) => write!(f, "transaction aborted: {reason}"),
            Self::Contention { attempts } => {
                write!(f, "transaction contention after {attempts} attempts")
            }
            Self::Store(err) => write!(f, "transaction store error: {err}"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for TxnError<E> {}

#[derive(Debug, Clone)]
enum StagedWrite {
    Set(Value),
    Delete,
}

struct Inner {
    docs: BTreeMap<String, StoredDoc>,
    changes: Vec<ChangeRecord>,
    change_seq: u64,
}

/// In-process document store. Clones share the same underlying documents.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<RwLock<Inner>>,
    server_clock: Arc<dyn LocalClock>,
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

impl DocumentStore {
    pub fn new(server_clock: Arc<dyn LocalClock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                docs: BTreeMap::new(),
                changes: Vec::new(),
                change_seq: 0,
            })),
            server_clock,
        }
    }

    /// The authoritative server-side time. Clients never use this directly;
    /// they derive an offset from it via clock synchronization.
    pub fn server_now(&self) -> Timestamp {
        Timestamp::from_millis(self.server_clock.now_ms())
    }

    pub fn get(&self, path: &str) -> Result<Option<StoredDoc>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.docs.get(path).cloned())
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        match self.get(path)? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Plain last-write-wins write. Reserved for uncontended per-owner
    /// fields; contended paths must use a transaction.
    pub fn set<T: Serialize>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        self.set_value(path, serde_json::to_value(value)?)
    }

    pub fn set_value(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let now = Timestamp::from_millis(self.server_clock.now_ms());
        apply_write(&mut inner, path, StagedWrite::Set(value), now);
        Ok(())
    }

    /// Returns whether the document existed.
    pub fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let existed = inner.docs.contains_key(path);
        if existed {
            let now = Timestamp::from_millis(self.server_clock.now_ms());
            apply_write(&mut inner, path, StagedWrite::Delete, now);
        }
        Ok(existed)
    }

    pub fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, StoredDoc)>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .docs
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    pub fn changes_since(&self, seq: u64) -> Result<Vec<ChangeRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .changes
            .iter()
            .filter(|change| change.seq > seq)
            .cloned()
            .collect())
    }

    pub fn latest_change_seq(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.change_seq)
    }

    /// Run `body` as an optimistic transaction. The body may be re-run on
    /// conflict, so it must confine its effects to the transaction handle.
    pub fn run_transaction<T, E, F>(&self, mut body: F) -> Result<T, TxnError<E>>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, TxnAbort<E>>,
    {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut txn = Transaction {
                store: self,
                reads: BTreeMap::new(),
                writes: Vec::new(),
            };

            let outcome = match body(&mut txn) {
                Ok(outcome) => outcome,
                Err(TxnAbort::Game(reason)) => return Err(TxnError::Aborted(reason)),
                Err(TxnAbort::Store(err)) => return Err(TxnError::Store(err)),
            };

            match self.try_commit(&txn) {
                Ok(()) => {
                    tracing::debug!(attempt, writes = txn.writes.len(), "transaction committed");
                    return Ok(outcome);
                }
                Err(CommitFailure::Conflict { path }) => {
                    tracing::debug!(attempt, %path, "transaction conflict, retrying body");
                }
                Err(CommitFailure::Store(err)) => return Err(TxnError::Store(err)),
            }
        }

        Err(TxnError::Contention {
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }

    fn try_commit(&self, txn: &Transaction<'_>) -> Result<(), CommitFailure> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CommitFailure::Store(StoreError::Poisoned))?;

        for (path, observed_version) in &txn.reads {
            let current = inner.docs.get(path).map(|doc| doc.version).unwrap_or(0);
            if current != *observed_version {
                return Err(CommitFailure::Conflict { path: path.clone() });
            }
        }

        let now = Timestamp::from_millis(self.server_clock.now_ms());
        for (path, write) in &txn.writes {
            apply_write(&mut inner, path, write.clone(), now);
        }

        Ok(())
    }
}

enum CommitFailure {
    Conflict { path: String },
    Store(StoreError),
}

fn apply_write(inner: &mut Inner, path: &str, write: StagedWrite, now: Timestamp) {
    inner.change_seq += 1;
    let seq = inner.change_seq;
    match write {
        StagedWrite::Set(mut value) => {
            resolve_server_timestamps(&mut value, now);
            let version = inner.docs.get(path).map(|doc| doc.version).unwrap_or(0) + 1;
            inner.docs.insert(
                path.to_string(),
                StoredDoc {
                    version,
                    updated_at: now,
                    data: value,
                },
            );
            inner.changes.push(ChangeRecord {
                seq,
                path: path.to_string(),
                kind: ChangeKind::Written,
                at: now,
            });
        }
        StagedWrite::Delete => {
            inner.docs.remove(path);
            inner.changes.push(ChangeRecord {
                seq,
                path: path.to_string(),
                kind: ChangeKind::Deleted,
                at: now,
            });
        }
    }
}

fn resolve_server_timestamps(value: &mut Value, now: Timestamp) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 && map.get(SERVER_TIMESTAMP_KEY).is_some() {
                *value = json!(now.millis());
                return;
            }
            for entry in map.values_mut() {
                resolve_server_timestamps(entry, now);
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                resolve_server_timestamps(entry, now);
            }
        }
        _ => {}
    }
}

/// Handle passed to a transaction body. Reads record the observed document
/// version (0 for absent) for commit-time validation; writes are staged and
/// applied atomically only if every read is still current.
pub struct Transaction<'a> {
    store: &'a DocumentStore,
    reads: BTreeMap<String, u64>,
    writes: Vec<(String, StagedWrite)>,
}

impl Transaction<'_> {
    pub fn read(&mut self, path: &str) -> Result<Option<StoredDoc>, StoreError> {
        if !self.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite {
                path: path.to_string(),
            });
        }
        let doc = self.store.get(path)?;
        let version = doc.as_ref().map(|doc| doc.version).unwrap_or(0);
        self.reads.insert(path.to_string(), version);
        Ok(doc)
    }

    pub fn read_as<T: DeserializeOwned>(&mut self, path: &str) -> Result<Option<T>, StoreError> {
        match self.read(path)? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&mut self, path: &str, value: &T) -> Result<(), StoreError> {
        self.set_value(path, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn set_value(&mut self, path: &str, value: Value) {
        self.writes.push((path.to_string(), StagedWrite::Set(value)));
    }

    pub fn delete(&mut self, path: &str) {
        self.writes.push((path.to_string(), StagedWrite::Delete));
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manual_store(start_ms: i64) -> (DocumentStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        (DocumentStore::new(clock.clone()), clock)
    }

    #[test]
    fn set_then_get_round_trips_and_bumps_version() {
        let (store, _) = manual_store(1_000);
        store.set("actors/a", &json!({"cash": 5})).unwrap();
        store.set("actors/a", &json!({"cash": 7})).unwrap();

        let doc = store.get("actors/a").unwrap().expect("doc present");
        assert_eq!(doc.version, 2);
        assert_eq!(doc.data["cash"], 7);
        assert_eq!(doc.updated_at, Timestamp::from_millis(1_000));
    }

    #[test]
    fn server_timestamp_sentinel_resolves_at_commit_time() {
        let (store, clock) = manual_store(50_000);
        clock.advance(2_500);
        store
            .set_value("meta/probe", json!({"at": server_timestamp()}))
            .unwrap();

        let doc = store.get("meta/probe").unwrap().expect("doc present");
        assert_eq!(doc.data["at"], 52_500);
    }

    #[test]
    fn transaction_applies_staged_writes_atomically() {
        let (store, _) = manual_store(0);
        store.set("actors/a", &json!({"cash": 100})).unwrap();
        store.set("actors/b", &json!({"cash": 0})).unwrap();

        let result: Result<(), TxnError<String>> = store.run_transaction(|txn| {
            let a = txn.read("actors/a")?.expect("a present");
            let b = txn.read("actors/b")?.expect("b present");
            let moved = 40;
            txn.set_value(
                "actors/a",
                json!({"cash": a.data["cash"].as_i64().unwrap() - moved}),
            );
            txn.set_value(
                "actors/b",
                json!({"cash": b.data["cash"].as_i64().unwrap() + moved}),
            );
            Ok(())
        });

        result.unwrap();
        assert_eq!(store.get("actors/a").unwrap().unwrap().data["cash"], 60);
        assert_eq!(store.get("actors/b").unwrap().unwrap().data["cash"], 40);
    }

    #[test]
    fn aborted_transaction_writes_nothing() {
        let (store, _) = manual_store(0);
        store.set("actors/a", &json!({"cash": 100})).unwrap();

        let result: Result<(), TxnError<&str>> = store.run_transaction(|txn| {
            let _ = txn.read("actors/a")?;
            txn.set_value("actors/a", json!({"cash": 0}));
            abort("insufficient")
        });

        assert!(matches!(result, Err(TxnError::Aborted("insufficient"))));
        assert_eq!(store.get("actors/a").unwrap().unwrap().data["cash"], 100);
    }

    #[test]
    fn conflicting_write_between_read_and_commit_retries_body() {
        let (store, _) = manual_store(0);
        store.set("counters/hits", &json!({"n": 0})).unwrap();

        let mut attempts = 0;
        let result: Result<i64, TxnError<String>> = store.run_transaction(|txn| {
            attempts += 1;
            let doc = txn.read("counters/hits")?.expect("counter present");
            let n = doc.data["n"].as_i64().unwrap();
            if attempts == 1 {
                // Simulate a concurrent writer racing this body.
                store.set("counters/hits", &json!({"n": n + 10})).unwrap();
            }
            txn.set_value("counters/hits", json!({"n": n + 1}));
            Ok(n + 1)
        });

        assert_eq!(result.unwrap(), 11);
        assert_eq!(attempts, 2);
        assert_eq!(store.get("counters/hits").unwrap().unwrap().data["n"], 11);
    }

    #[test]
    fn contention_surfaces_after_bounded_attempts() {
        let (store, _) = manual_store(0);
        store.set("counters/hits", &json!({"n": 0})).unwrap();

        let mut attempts = 0_u32;
        let result: Result<(), TxnError<String>> = store.run_transaction(|txn| {
            attempts += 1;
            let doc = txn.read("counters/hits")?.expect("counter present");
            let n = doc.data["n"].as_i64().unwrap();
            // A writer that always wins the race.
            store.set("counters/hits", &json!({"n": n + 10})).unwrap();
            txn.set_value("counters/hits", json!({"n": n + 1}));
            Ok(())
        });

        assert!(matches!(
            result,
            Err(TxnError::Contention {
                attempts: MAX_TRANSACTION_ATTEMPTS
            })
        ));
        assert_eq!(attempts, MAX_TRANSACTION_ATTEMPTS);
    }

    #[test]
    fn read_of_absent_doc_conflicts_when_doc_appears() {
        let (store, _) = manual_store(0);

        let mut attempts = 0;
        let result: Result<(), TxnError<String>> = store.run_transaction(|txn| {
            attempts += 1;
            let existing = txn.read("bounties/b1")?;
            if attempts == 1 {
                assert!(existing.is_none());
                store.set("bounties/b1", &json!({"reward": 50})).unwrap();
            }
            txn.set_value("meta/marker", json!({"seen": existing.is_some()}));
            Ok(())
        });

        result.unwrap();
        assert_eq!(attempts, 2);
        assert_eq!(
            store.get("meta/marker").unwrap().unwrap().data["seen"],
            true
        );
    }

    #[test]
    fn read_after_staged_write_is_rejected() {
        let (store, _) = manual_store(0);
        let result: Result<(), TxnError<String>> = store.run_transaction(|txn| {
            txn.set_value("actors/a", json!({"cash": 1}));
            let _ = txn.read("actors/b")?;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(TxnError::Store(StoreError::ReadAfterWrite { .. }))
        ));
    }

    #[test]
    fn delete_in_transaction_removes_doc() {
        let (store, _) = manual_store(0);
        store.set("bounties/b1", &json!({"reward": 100})).unwrap();

        let result: Result<(), TxnError<String>> = store.run_transaction(|txn| {
            let _ = txn.read("bounties/b1")?;
            txn.delete("bounties/b1");
            Ok(())
        });

        result.unwrap();
        assert!(store.get("bounties/b1").unwrap().is_none());
    }

    #[test]
    fn list_prefix_returns_only_matching_paths() {
        let (store, _) = manual_store(0);
        store.set("actors/a", &json!({})).unwrap();
        store.set("actors/b", &json!({})).unwrap();
        store.set("bounties/b1", &json!({})).unwrap();

        let listed = store.list_prefix("actors/").unwrap();
        let paths: Vec<&str> = listed.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, vec!["actors/a", "actors/b"]);
    }

    #[test]
    fn change_feed_records_writes_and_deletes_in_order() {
        let (store, _) = manual_store(0);
        store.set("actors/a", &json!({})).unwrap();
        store.delete("actors/a").unwrap();

        let changes = store.changes_since(0).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Written);
        assert_eq!(changes[1].kind, ChangeKind::Deleted);
        assert!(changes[0].seq < changes[1].seq);
        assert_eq!(store.latest_change_seq().unwrap(), changes[1].seq);

        let tail = store.changes_since(changes[0].seq).unwrap();
        assert_eq!(tail.len(), 1);
    }
}

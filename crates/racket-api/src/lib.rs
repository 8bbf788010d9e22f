//! In-process API facade over the game engine with sqlite persistence and
//! an axum HTTP surface.

mod persistence;
mod server;

use std::path::Path;

use contracts::{Actor, Event, GameConfig};
use racket_core::engine::{EngineError, GameEngine};

use persistence::SqliteGameStore;
pub use persistence::PersistenceError;
pub use server::{serve, ServerError};

#[derive(Debug)]
struct PersistenceState {
    store: SqliteGameStore,
    persisted_event_seq: u64,
}

/// The engine plus optional write-behind persistence. Flushes are deltas:
/// only events past the last persisted sequence number are written, with a
/// fresh actor snapshot upsert each time.
#[derive(Debug)]
pub struct EngineApi {
    engine: GameEngine,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
}

impl EngineApi {
    pub fn from_config(config: GameConfig) -> Self {
        let engine = GameEngine::new(config);
        Self::from_engine(engine)
    }

    pub fn from_engine(engine: GameEngine) -> Self {
        Self {
            engine,
            persistence: None,
            last_persistence_error: None,
        }
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteGameStore::open(path)?;
        let persisted_event_seq = store.max_persisted_seq()?;
        self.persistence = Some(PersistenceState {
            store,
            persisted_event_seq,
        });
        self.last_persistence_error = None;
        Ok(())
    }

    pub fn flush_persistence_checked(&mut self) -> Result<(), PersistenceError> {
        let new_events = {
            let Some(state) = self.persistence.as_ref() else {
                return Err(PersistenceError::NotAttached);
            };
            self.engine
                .events_since(state.persisted_event_seq)
                .map_err(engine_to_persistence)?
        };
        let actors = self.engine.actors().map_err(engine_to_persistence)?;

        let state = match self.persistence.as_mut() {
            Some(state) => state,
            None => return Err(PersistenceError::NotAttached),
        };
        state
            .store
            .persist_delta(self.engine.config(), &new_events, &actors)?;
        if let Some(last) = new_events.last() {
            state.persisted_event_seq = last.seq;
        }
        self.last_persistence_error = None;
        Ok(())
    }

    /// Best-effort flush used after every mutating request; failures are
    /// remembered and surfaced on the stream instead of failing the
    /// request that triggered them.
    pub fn flush_persistence_if_enabled(&mut self) {
        if self.persistence.is_none() {
            return;
        }
        if let Err(err) = self.flush_persistence_checked() {
            tracing::warn!(error = %err, "persistence flush failed");
            self.last_persistence_error = Some(err.to_string());
        }
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn load_events_range(
        &self,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<Event>, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_events_range(from_seq, to_seq)
    }

    pub fn load_actor_snapshots(&self) -> Result<Vec<Actor>, PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };
        state.store.load_actor_snapshots()
    }
}

fn engine_to_persistence(err: EngineError) -> PersistenceError {
    PersistenceError::Engine(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use racket_core::chance::ForcedChance;
    use racket_core::clock::ManualClock;
    use std::sync::Arc;

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("racket_api_{name}_{nanos}.sqlite"))
    }

    fn deterministic_api() -> EngineApi {
        let engine = GameEngine::with_parts(
            GameConfig::default(),
            Arc::new(ManualClock::new(1_000_000)),
            Box::new(ForcedChance::always_succeed()),
        );
        EngineApi::from_engine(engine)
    }

    #[test]
    fn flush_persists_only_new_events() {
        let mut api = deterministic_api();
        let path = temp_db_path("delta");
        api.attach_sqlite_store(&path).expect("attach");

        api.engine().create_actor("Ana", "downtown").expect("create");
        api.flush_persistence_checked().expect("first flush");

        api.engine().create_actor("Bruno", "harbor").expect("create");
        api.flush_persistence_checked().expect("second flush");

        let events = api.load_events_range(0, u64::MAX).expect("load");
        assert_eq!(events.len(), 2);

        let snapshots = api.load_actor_snapshots().expect("snapshots");
        assert_eq!(snapshots.len(), 2);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    #[test]
    fn flush_without_attached_store_reports_not_attached() {
        let mut api = deterministic_api();
        assert!(matches!(
            api.flush_persistence_checked(),
            Err(PersistenceError::NotAttached)
        ));
    }
}

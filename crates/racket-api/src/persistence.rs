use std::fmt;
use std::path::Path;

use contracts::{Actor, Event, GameConfig};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    /// Reading the live game state for a flush failed.
    Engine(String),
    NotAttached,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::Engine(message) => write!(f, "engine read failed: {message}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Sqlite spool for the public event log and periodic actor snapshots.
/// Events are append-only and idempotent on their sequence number, so a
/// re-flush after a crash never duplicates rows.
#[derive(Debug)]
pub struct SqliteGameStore {
    conn: Connection,
}

impl SqliteGameStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn persist_delta(
        &mut self,
        config: &GameConfig,
        events: &[Event],
        actors: &[Actor],
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        let config_json = serde_json::to_string(config)?;
        tx.execute(
            "INSERT INTO game (id, schema_version, config_json, updated_at_ms)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                schema_version = excluded.schema_version,
                config_json = excluded.config_json,
                updated_at_ms = excluded.updated_at_ms",
            params![
                config.schema_version.as_str(),
                config_json,
                events.last().map(|event| event.at.millis()).unwrap_or(0),
            ],
        )?;

        for event in events {
            let payload_json = serde_json::to_string(event)?;
            tx.execute(
                "INSERT OR IGNORE INTO events (
                    seq,
                    event_id,
                    event_type,
                    at_ms,
                    subject_id,
                    object_id,
                    payload_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    i64::try_from(event.seq).unwrap_or(i64::MAX),
                    event.event_id.as_str(),
                    format!("{:?}", event.event_type),
                    event.at.millis(),
                    event.subject_id.as_str(),
                    event.object_id.as_deref(),
                    payload_json,
                ],
            )?;
        }

        for actor in actors {
            let payload_json = serde_json::to_string(actor)?;
            tx.execute(
                "INSERT INTO actor_snapshots (actor_id, name, payload_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(actor_id) DO UPDATE SET
                    name = excluded.name,
                    payload_json = excluded.payload_json",
                params![actor.actor_id.as_str(), actor.name.as_str(), payload_json],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_events_range(
        &self,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<Event>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM events
             WHERE seq >= ?1 AND seq <= ?2
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(
            params![
                i64::try_from(from_seq).unwrap_or(i64::MAX),
                i64::try_from(to_seq).unwrap_or(i64::MAX)
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<Event>(&payload)?);
        }

        Ok(events)
    }

    pub fn max_persisted_seq(&self) -> Result<u64, PersistenceError> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(max.map(|value| value.max(0) as u64).unwrap_or(0))
    }

    pub fn load_actor_snapshots(&self) -> Result<Vec<Actor>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json FROM actor_snapshots ORDER BY actor_id ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut actors = Vec::new();
        for row in rows {
            let payload = row?;
            actors.push(serde_json::from_str::<Actor>(&payload)?);
        }

        Ok(actors)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS game (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                schema_version TEXT NOT NULL,
                config_json TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                event_id TEXT NOT NULL UNIQUE,
                event_type TEXT NOT NULL,
                at_ms INTEGER NOT NULL,
                subject_id TEXT NOT NULL,
                object_id TEXT,
                payload_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS actor_snapshots (
                actor_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_type_seq ON events(event_type, seq);
            CREATE INDEX IF NOT EXISTS idx_events_subject_seq ON events(subject_id, seq);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'seq-0000000000')",
            [],
        )?;

        Ok(())
    }
}

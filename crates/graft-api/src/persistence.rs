use std::fmt;
use std::path::Path;

use contracts::{Command, CommandResult, Event, GraftConfig, GraftStatus};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCommandEntry {
    pub command: Command,
    pub result: CommandResult,
    pub effective_tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRunSummary {
    pub run_id: String,
    pub current_tick: u64,
    pub max_ticks: u64,
    pub migration_done: bool,
    pub event_count: u64,
    pub command_count: u64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
    RunAlreadyExists(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::RunAlreadyExists(run_id) => write!(f, "run already exists: {run_id}"),
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

/// Append-only audit store. Records what the kernel did for inspection and
/// debugging; migration progress is never restored from here.
#[derive(Debug)]
pub struct SqliteAuditStore {
    conn: Connection,
}

impl SqliteAuditStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "busy_timeout", 5_000)?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                config_json TEXT NOT NULL,
                status_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS commands (
                run_id TEXT NOT NULL,
                command_id TEXT NOT NULL,
                issued_at_tick INTEGER NOT NULL,
                effective_tick INTEGER NOT NULL,
                accepted INTEGER NOT NULL,
                command_json TEXT NOT NULL,
                result_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (run_id, command_id)
             );
             CREATE TABLE IF NOT EXISTS events (
                run_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                sequence_in_tick INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                event_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (run_id, event_id)
             );
             CREATE INDEX IF NOT EXISTS idx_events_run_tick
                ON events (run_id, tick);",
        )?;
        Ok(())
    }

    pub fn run_exists(&self, run_id: &str) -> Result<bool, PersistenceError> {
        let found = self
            .conn
            .query_row(
                "SELECT run_id FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_run(&mut self, run_id: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM events WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM commands WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn persist_delta(
        &mut self,
        config: &GraftConfig,
        status: &GraftStatus,
        commands: &[PersistedCommandEntry],
        events: &[Event],
    ) -> Result<(), PersistenceError> {
        let now = now_nanos();
        let config_json = serde_json::to_string(config)?;
        let status_json = serde_json::to_string(status)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO runs (run_id, schema_version, config_json, status_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(run_id) DO UPDATE SET
                status_json = excluded.status_json,
                updated_at = excluded.updated_at",
            params![
                config.run_id.as_str(),
                config.schema_version.as_str(),
                config_json,
                status_json,
                now
            ],
        )?;

        for entry in commands {
            let command_json = serde_json::to_string(&entry.command)?;
            let result_json = serde_json::to_string(&entry.result)?;
            tx.execute(
                "INSERT OR IGNORE INTO commands (
                    run_id,
                    command_id,
                    issued_at_tick,
                    effective_tick,
                    accepted,
                    command_json,
                    result_json,
                    created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.command.run_id.as_str(),
                    entry.command.command_id.as_str(),
                    i64::try_from(entry.command.issued_at_tick).unwrap_or(i64::MAX),
                    i64::try_from(entry.effective_tick).unwrap_or(i64::MAX),
                    if entry.result.accepted { 1_i64 } else { 0_i64 },
                    command_json,
                    result_json,
                    now
                ],
            )?;
        }

        for event in events {
            let event_json = serde_json::to_string(event)?;
            let event_type_json = serde_json::to_string(&event.event_type)?;
            tx.execute(
                "INSERT OR IGNORE INTO events (
                    run_id,
                    event_id,
                    tick,
                    sequence_in_tick,
                    event_type,
                    event_json,
                    created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.run_id.as_str(),
                    event.event_id.as_str(),
                    i64::try_from(event.tick).unwrap_or(i64::MAX),
                    i64::try_from(event.sequence_in_tick).unwrap_or(i64::MAX),
                    event_type_json.trim_matches('"'),
                    event_json,
                    now
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn list_runs(&self, limit: usize) -> Result<Vec<PersistedRunSummary>, PersistenceError> {
        let mut statement = self.conn.prepare(
            "SELECT
                runs.run_id,
                runs.status_json,
                runs.updated_at,
                (SELECT COUNT(*) FROM events WHERE events.run_id = runs.run_id),
                (SELECT COUNT(*) FROM commands WHERE commands.run_id = runs.run_id)
             FROM runs
             ORDER BY runs.updated_at DESC
             LIMIT ?1",
        )?;

        let rows = statement.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (run_id, status_json, updated_at, event_count, command_count) = row?;
            let status: GraftStatus = serde_json::from_str(&status_json)?;
            summaries.push(PersistedRunSummary {
                run_id,
                current_tick: status.current_tick,
                max_ticks: status.max_ticks,
                migration_done: status.migration_done,
                event_count: event_count.max(0) as u64,
                command_count: command_count.max(0) as u64,
                updated_at,
            });
        }
        Ok(summaries)
    }

    pub fn event_count(&self, run_id: &str) -> Result<u64, PersistenceError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE run_id = ?1",
            params![run_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

use std::path::Path;

use contracts::{LogRecord, RunConfig};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("sqlite store is not attached")]
    NotAttached,
    #[error("run {0} already has stored records")]
    RunAlreadyExists(String),
}

/// Progress written alongside every batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub rounds_completed: u64,
    pub terminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRunSummary {
    pub run_id: String,
    pub seed: String,
    pub strategy: String,
    pub num_agents: u64,
    pub rounds_completed: u64,
    pub terminated: bool,
    pub record_count: u64,
}

#[derive(Debug)]
pub struct SqliteRunStore {
    conn: Connection,
}

impl SqliteRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Upsert the run row and append `records`, numbered from `first_sequence`,
    /// in a single transaction.
    pub fn persist_delta(
        &mut self,
        config: &RunConfig,
        progress: RunProgress,
        first_sequence: usize,
        records: &[LogRecord],
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        upsert_run(&tx, config, progress)?;

        for (offset, record) in records.iter().enumerate() {
            let payload_json = serde_json::to_string(record)?;
            let sequence = first_sequence + offset;
            tx.execute(
                "INSERT OR IGNORE INTO log_records (
                    run_id,
                    sequence,
                    round,
                    record_type,
                    agent_id,
                    payload_json,
                    created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    config.run_id.as_str(),
                    i64::try_from(sequence).unwrap_or(i64::MAX),
                    i64::try_from(record.round()).unwrap_or(i64::MAX),
                    record.label(),
                    record.agent_id(),
                    payload_json,
                    round_stamp(record.round()),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn load_records(&self, run_id: &str) -> Result<Vec<LogRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM log_records
             WHERE run_id = ?1
             ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let payload = row?;
            records.push(serde_json::from_str::<LogRecord>(&payload)?);
        }
        Ok(records)
    }

    pub fn load_round_records(
        &self,
        run_id: &str,
        round: u64,
    ) -> Result<Vec<LogRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM log_records
             WHERE run_id = ?1 AND round = ?2
             ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(
            params![run_id, i64::try_from(round).unwrap_or(i64::MAX)],
            |row| row.get::<_, String>(0),
        )?;

        let mut records = Vec::new();
        for row in rows {
            let payload = row?;
            records.push(serde_json::from_str::<LogRecord>(&payload)?);
        }
        Ok(records)
    }

    pub fn load_run_summary(
        &self,
        run_id: &str,
    ) -> Result<Option<PersistedRunSummary>, PersistenceError> {
        let summary = self
            .conn
            .query_row(
                "SELECT
                    runs.run_id,
                    runs.seed,
                    runs.strategy,
                    runs.num_agents,
                    runs.rounds_completed,
                    runs.terminated,
                    (SELECT COUNT(*) FROM log_records WHERE log_records.run_id = runs.run_id)
                 FROM runs
                 WHERE runs.run_id = ?1",
                params![run_id],
                |row| {
                    Ok(PersistedRunSummary {
                        run_id: row.get(0)?,
                        seed: row.get(1)?,
                        strategy: row.get(2)?,
                        num_agents: u64::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                        rounds_completed: u64::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
                        terminated: row.get::<_, i64>(5)? != 0,
                        record_count: u64::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    pub fn run_exists(&self, run_id: &str) -> Result<bool, PersistenceError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM runs WHERE run_id = ?1 LIMIT 1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_run(&mut self, run_id: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM log_records WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        tx.commit()?;
        Ok(())
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

            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                config_json TEXT NOT NULL,
                seed TEXT NOT NULL,
                strategy TEXT NOT NULL,
                num_agents INTEGER NOT NULL,
                rounds_completed INTEGER NOT NULL,
                terminated INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS log_records (
                run_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                round INTEGER NOT NULL,
                record_type TEXT NOT NULL,
                agent_id TEXT,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run_id, sequence)
            );

            CREATE INDEX IF NOT EXISTS idx_log_records_run_round ON log_records(run_id, round);
            CREATE INDEX IF NOT EXISTS idx_log_records_run_type ON log_records(run_id, record_type);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'round-000000')",
            [],
        )?;

        Ok(())
    }
}

fn upsert_run(
    tx: &rusqlite::Transaction<'_>,
    config: &RunConfig,
    progress: RunProgress,
) -> Result<(), PersistenceError> {
    let config_json = serde_json::to_string(config)?;

    tx.execute(
        "INSERT INTO runs (
            run_id,
            schema_version,
            config_json,
            seed,
            strategy,
            num_agents,
            rounds_completed,
            terminated,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(run_id) DO UPDATE SET
            schema_version = excluded.schema_version,
            config_json = excluded.config_json,
            seed = excluded.seed,
            strategy = excluded.strategy,
            num_agents = excluded.num_agents,
            rounds_completed = excluded.rounds_completed,
            terminated = excluded.terminated,
            updated_at = excluded.updated_at",
        params![
            config.run_id.as_str(),
            config.schema_version.as_str(),
            config_json,
            config.seed.to_string(),
            config.assign_resource_strategy.as_str(),
            i64::try_from(config.num_agents).unwrap_or(i64::MAX),
            i64::try_from(progress.rounds_completed).unwrap_or(i64::MAX),
            if progress.terminated { 1_i64 } else { 0_i64 },
            round_stamp(0),
            round_stamp(progress.rounds_completed),
        ],
    )?;

    Ok(())
}

fn round_stamp(round: u64) -> String {
    format!("round-{round:06}")
}

//! SQLite-backed run store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use labrun_core::{CoreError, Run, RunId, RunParams, RunStatus, RunUpdate};

use super::{RunStore, StoreError};

const RUN_COLUMNS: &str = "id, status, created_at, updated_at, started_at, finished_at, \
     model_name, experiment_name, num_ideas, template_slug, output_directory, \
     error_message, exit_code, pid, revision";

/// Run store persisted in a single SQLite table.
///
/// The connection sits behind a mutex and every call runs on the blocking
/// thread pool.
#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened run database");
        Self::bootstrap(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                model_name TEXT NOT NULL,
                experiment_name TEXT NOT NULL,
                num_ideas INTEGER NOT NULL,
                template_slug TEXT NOT NULL,
                output_directory TEXT,
                error_message TEXT,
                exit_code INTEGER,
                pid INTEGER,
                revision INTEGER NOT NULL DEFAULT 0
            );
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, params: RunParams) -> Result<Run, StoreError> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let stamp = format_ts(&now);
            conn.execute(
                "INSERT INTO runs (status, created_at, updated_at, model_name, experiment_name,
                                   num_ideas, template_slug, revision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                params![
                    RunStatus::Pending.as_str(),
                    stamp,
                    stamp,
                    params.model_name,
                    params.experiment_name,
                    params.num_ideas,
                    params.template_slug,
                ],
            )?;
            let id = RunId::new(conn.last_insert_rowid());
            Ok(Run::new(id, params, now))
        })
        .await
    }

    async fn get(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        self.with_conn(move |conn| select_run(conn, id)).await
    }

    async fn update(&self, id: RunId, update: RunUpdate) -> Result<Run, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut run = select_run(&tx, id)?.ok_or(CoreError::RunNotFound(id))?;
            let previous = run.revision;
            run.apply(&update, Utc::now())?;

            let changed = tx.execute(
                "UPDATE runs
                 SET status = ?1, updated_at = ?2, started_at = ?3, finished_at = ?4,
                     output_directory = ?5, error_message = ?6, exit_code = ?7, pid = ?8,
                     revision = ?9
                 WHERE id = ?10 AND revision = ?11",
                params![
                    run.status.as_str(),
                    format_ts(&run.updated_at),
                    run.started_at.as_ref().map(format_ts),
                    run.finished_at.as_ref().map(format_ts),
                    run.output_directory,
                    run.error_message,
                    run.exit_code,
                    run.pid,
                    to_sql_revision(run.revision)?,
                    id.get(),
                    to_sql_revision(previous)?,
                ],
            )?;
            if changed != 1 {
                return Err(CoreError::RevisionConflict {
                    expected: previous,
                    actual: previous + 1,
                }
                .into());
            }

            tx.commit()?;
            Ok(run)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Run>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM runs ORDER BY id DESC", RUN_COLUMNS))?;
            let rows = stmt.query_map([], RawRun::from_row)?;
            let runs = rows
                .map(|row| row.map_err(StoreError::from).and_then(RawRun::into_run))
                .collect::<Result<Vec<_>, _>>();
            runs
        })
        .await
    }
}

fn select_run(conn: &Connection, id: RunId) -> Result<Option<Run>, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
        params![id.get()],
        RawRun::from_row,
    )
    .optional()?
    .map(RawRun::into_run)
    .transpose()
}

/// Row as stored, before decoding timestamps and enums.
struct RawRun {
    id: i64,
    status: String,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    model_name: String,
    experiment_name: String,
    num_ideas: i64,
    template_slug: String,
    output_directory: Option<String>,
    error_message: Option<String>,
    exit_code: Option<i32>,
    pid: Option<i64>,
    revision: i64,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            started_at: row.get(4)?,
            finished_at: row.get(5)?,
            model_name: row.get(6)?,
            experiment_name: row.get(7)?,
            num_ideas: row.get(8)?,
            template_slug: row.get(9)?,
            output_directory: row.get(10)?,
            error_message: row.get(11)?,
            exit_code: row.get(12)?,
            pid: row.get(13)?,
            revision: row.get(14)?,
        })
    }

    fn into_run(self) -> Result<Run, StoreError> {
        let status: RunStatus = self
            .status
            .parse()
            .map_err(|e: CoreError| StoreError::Corrupt(format!("run {}: {}", self.id, e)))?;
        let num_ideas = u32::try_from(self.num_ideas).map_err(|_| {
            StoreError::Corrupt(format!("run {}: num_ideas {}", self.id, self.num_ideas))
        })?;
        let pid = self
            .pid
            .map(u32::try_from)
            .transpose()
            .map_err(|_| StoreError::Corrupt(format!("run {}: invalid pid", self.id)))?;
        let revision = u64::try_from(self.revision).map_err(|_| {
            StoreError::Corrupt(format!("run {}: revision {}", self.id, self.revision))
        })?;

        Ok(Run {
            id: RunId::new(self.id),
            status,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            started_at: self.started_at.as_deref().map(parse_ts).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_ts).transpose()?,
            model_name: self.model_name,
            experiment_name: self.experiment_name,
            num_ideas,
            template_slug: self.template_slug,
            output_directory: self.output_directory,
            error_message: self.error_message,
            exit_code: self.exit_code,
            pid,
            revision,
        })
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

fn to_sql_revision(revision: u64) -> Result<i64, StoreError> {
    i64::try_from(revision)
        .map_err(|_| StoreError::Corrupt(format!("revision {} overflows", revision)))
}

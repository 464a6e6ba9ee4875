//! Durable store for committed session operations.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::resonance::core::config::{StorageConfig, is_sql_identifier};
use crate::resonance::core::errors::{ResonanceError, ResonanceResult};
use crate::resonance::core::ids::{SessionId, UserId};
use crate::resonance::integrity::session::Operation;

/// Boxed future type for durable store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence hook invoked on commit.
pub trait DurableStore: Send + Sync {
    /// Persist all operations of a session atomically.
    ///
    /// # Errors
    /// Returns an error if nothing could be persisted. Implementations must not
    /// leave a partial write behind.
    fn persist<'a>(
        &'a self,
        session_id: SessionId,
        user_id: &'a UserId,
        operations: &'a [Operation],
    ) -> StoreFuture<'a, ResonanceResult<()>>;

    /// Store name (for logs).
    fn name(&self) -> &'static str;
}

/// Store that accepts every commit without writing anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStore;

impl DurableStore for NoopStore {
    fn persist<'a>(
        &'a self,
        _session_id: SessionId,
        _user_id: &'a UserId,
        _operations: &'a [Operation],
    ) -> StoreFuture<'a, ResonanceResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// `SQLite` store: one row per committed operation.
pub struct SqliteOperationStore {
    conn: Connection,
    table: String,
}

impl SqliteOperationStore {
    /// Open the store described by `config`.
    ///
    /// # Errors
    /// Returns an error if no path is configured or the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> ResonanceResult<Self> {
        let path = config.sqlite_path.as_deref().ok_or_else(|| {
            ResonanceError::Config("storage.sqlite_path is not set".to_string())
        })?;
        Self::open(path, &config.operations_table).await
    }

    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Returns an error if the table name is invalid or the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>, table: &str) -> ResonanceResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::init(conn, table).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the table name is invalid or the schema cannot be created.
    pub async fn in_memory(table: &str) -> ResonanceResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, table).await
    }

    async fn init(conn: Connection, table: &str) -> ResonanceResult<Self> {
        if !is_sql_identifier(table) {
            return Err(ResonanceError::Config(format!(
                "invalid operations table name: {table:?}"
            )));
        }
        let table = table.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    committed_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_session ON {table_name}(session_id);"
            ))?;
            Ok(())
        })
        .await?;

        info!(table = %table, "Operation store ready");
        Ok(Self { conn, table })
    }

    /// Load the operations committed by a session, in commit order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored payload cannot be decoded.
    pub async fn load_session(&self, session_id: SessionId) -> ResonanceResult<Vec<Operation>> {
        let table = self.table.clone();
        let session = session_id.to_string();
        let payloads = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT payload FROM {table} WHERE session_id = ?1 ORDER BY id ASC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![session], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(ResonanceError::from))
            .collect()
    }

    /// Total number of stored operations.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count(&self) -> ResonanceResult<usize> {
        let table = self.table.clone();
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        usize::try_from(count).map_err(|_| ResonanceError::Store("negative row count".to_string()))
    }
}

impl DurableStore for SqliteOperationStore {
    fn persist<'a>(
        &'a self,
        session_id: SessionId,
        user_id: &'a UserId,
        operations: &'a [Operation],
    ) -> StoreFuture<'a, ResonanceResult<()>> {
        Box::pin(async move {
            if operations.is_empty() {
                return Ok(());
            }

            let rows = operations
                .iter()
                .map(|op| Ok((op.kind(), serde_json::to_string(op)?)))
                .collect::<ResonanceResult<Vec<_>>>()?;
            let table = self.table.clone();
            let session = session_id.to_string();
            let user = user_id.to_string();
            let committed_at = chrono::Utc::now().timestamp_millis();
            let written = rows.len();

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    {
                        let mut stmt = tx.prepare(&format!(
                            "INSERT INTO {table} (session_id, user_id, kind, payload, committed_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)"
                        ))?;
                        for (kind, payload) in &rows {
                            stmt.execute(rusqlite::params![
                                session,
                                user,
                                kind,
                                payload,
                                committed_at
                            ])?;
                        }
                    }
                    tx.commit()?;
                    Ok(())
                })
                .await?;

            debug!(%session_id, written, "Persisted session operations");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// Build the store selected by the storage configuration.
///
/// # Errors
/// Returns an error if the `SQLite` store cannot be opened.
pub async fn build_store(config: &StorageConfig) -> ResonanceResult<Arc<dyn DurableStore>> {
    match config.sqlite_path {
        Some(_) => Ok(Arc::new(SqliteOperationStore::new(config).await?)),
        None => Ok(Arc::new(NoopStore)),
    }
}

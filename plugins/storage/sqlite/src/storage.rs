use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};

use pipe_api::{
    EventKind, LogRecord, LogStats, LogStore, RecordSummary, SizeEntry, StoreError, StoreFuture,
    format_iso, parse_iso,
};

use super::config::SqliteStorageConfig;

// ════════════════════════════════════════════════════════════════
//  SqliteLogStore
// ════════════════════════════════════════════════════════════════

/// Лог в SQLite. WAL режим: генератор пишет, poll'ы читают параллельно
/// и видят только закоммиченные батчи.
#[derive(Clone)]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub async fn open(config: &SqliteStorageConfig) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::io(format!("mkdir {}: {e}", parent.display())))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| StoreError::config(format!("sqlite path '{}': {e}", config.path)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::io(format!("open {}: {e}", config.path)))?;

        tracing::info!(path = %config.path, max_connections = config.max_connections, "sqlite store opened");
        Ok(Self { pool })
    }

    /// In-memory БД (для тестов). Одно соединение без ротации, иначе
    /// каждое новое соединение видело бы пустую базу.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::config(format!("sqlite memory: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::io(format!("open memory: {e}")))?;
        Ok(Self { pool })
    }

    async fn do_append(&self, records: Vec<LogRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("begin", e))?;

        for r in &records {
            sqlx::query(
                r#"
                INSERT INTO event
                    (msg_offset, msg_key, topic, event_type, data, size_bytes, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.offset)
            .bind(&r.key)
            .bind(&r.topic)
            .bind(r.kind.as_str())
            .bind(r.payload.as_deref())
            .bind(to_db_size(r.size_bytes))
            .bind(format_iso(&r.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(format!("insert offset {}", r.offset), e))?;
        }

        // Drop без commit → rollback: частичный батч не виден никому.
        tx.commit()
            .await
            .map_err(|e| db_err("commit", e))
    }

    async fn do_scan_sizes(&self, after_offset: i64, limit: usize) -> Result<Vec<SizeEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT msg_offset, size_bytes
            FROM event
            WHERE msg_offset > ?
            ORDER BY msg_offset ASC
            LIMIT ?
            "#,
        )
        .bind(after_offset)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("scan sizes", e))?;

        rows.iter()
            .map(|row| {
                Ok(SizeEntry {
                    offset: get(row, "msg_offset")?,
                    size_bytes: from_db_size(get(row, "size_bytes")?)?,
                })
            })
            .collect()
    }

    async fn do_fetch_range(
        &self,
        after_offset: i64,
        through_offset: i64,
        max_size: u64,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT msg_offset, msg_key, topic, event_type, data, size_bytes, created_at
            FROM event
            WHERE msg_offset > ? AND msg_offset <= ? AND size_bytes <= ?
            ORDER BY msg_offset ASC
            "#,
        )
        .bind(after_offset)
        .bind(through_offset)
        .bind(to_db_size(max_size))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("fetch range", e))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn do_stats(&self) -> Result<LogStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(size_bytes), 0) AS bytes, MAX(msg_offset) AS max_offset FROM event",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("stats", e))?;

        Ok(LogStats {
            total_records: from_db_size(get(&row, "total")?)?,
            total_bytes: from_db_size(get(&row, "bytes")?)?,
            max_offset: get(&row, "max_offset")?,
        })
    }

    async fn do_count_size_range(&self, min_bytes: u64, max_bytes: Option<u64>) -> Result<u64, StoreError> {
        let query = match max_bytes {
            Some(max) => sqlx::query(
                "SELECT COUNT(*) AS n FROM event WHERE size_bytes >= ? AND size_bytes < ?",
            )
            .bind(to_db_size(min_bytes))
            .bind(to_db_size(max)),
            None => sqlx::query("SELECT COUNT(*) AS n FROM event WHERE size_bytes >= ?")
                .bind(to_db_size(min_bytes)),
        };
        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("count", e))?;
        from_db_size(get(&row, "n")?)
    }

    async fn do_recent(&self, count: usize) -> Result<Vec<RecordSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT msg_offset, msg_key, topic, size_bytes
            FROM event
            ORDER BY msg_offset DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(count).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("recent", e))?;

        let mut result = rows
            .iter()
            .map(|row| {
                Ok(RecordSummary {
                    offset: get(row, "msg_offset")?,
                    key: get(row, "msg_key")?,
                    topic: get(row, "topic")?,
                    size_bytes: from_db_size(get(row, "size_bytes")?)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        result.reverse();
        Ok(result)
    }
}

// ════════════════════════════════════════════════════════════════
//  LogStore impl
// ════════════════════════════════════════════════════════════════

impl LogStore for SqliteLogStore {
    fn init(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| StoreError::io(format!("migrate: {e}")))?;
            tracing::info!("sqlite schema ready");
            Ok(())
        })
    }

    fn append_batch(&self, records: Vec<LogRecord>) -> StoreFuture<'_, ()> {
        Box::pin(self.do_append(records))
    }

    fn scan_sizes(&self, after_offset: i64, limit: usize) -> StoreFuture<'_, Vec<SizeEntry>> {
        Box::pin(self.do_scan_sizes(after_offset, limit))
    }

    fn fetch_range(
        &self,
        after_offset: i64,
        through_offset: i64,
        max_size: u64,
    ) -> StoreFuture<'_, Vec<LogRecord>> {
        Box::pin(self.do_fetch_range(after_offset, through_offset, max_size))
    }

    fn stats(&self) -> StoreFuture<'_, LogStats> {
        Box::pin(self.do_stats())
    }

    fn count_size_range(&self, min_bytes: u64, max_bytes: Option<u64>) -> StoreFuture<'_, u64> {
        Box::pin(self.do_count_size_range(min_bytes, max_bytes))
    }

    fn recent(&self, count: usize) -> StoreFuture<'_, Vec<RecordSummary>> {
        Box::pin(self.do_recent(count))
    }

    fn flush(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("checkpoint", e))?;
            Ok(())
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn record_from_row(row: &SqliteRow) -> Result<LogRecord, StoreError> {
    let offset: i64 = get(row, "msg_offset")?;
    let event_type: String = get(row, "event_type")?;
    let kind = event_type
        .parse::<EventKind>()
        .map_err(|e| StoreError::format_err(format!("offset {offset}: {e}")))?;
    let created_at: String = get(row, "created_at")?;

    Ok(LogRecord {
        offset,
        topic: get(row, "topic")?,
        key: get(row, "msg_key")?,
        kind,
        payload: get(row, "data")?,
        size_bytes: from_db_size(get(row, "size_bytes")?)?,
        created_at: parse_iso(&created_at)?,
    })
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::format_err(format!("column {column}: {e}")))
}

/// SQLITE_BUSY / SQLITE_LOCKED после `busy_timeout` и исчерпанный пул
/// соединений: `Timeout`. Остальные ошибки движка: `Io`.
fn db_err(context: impl std::fmt::Display, e: sqlx::Error) -> StoreError {
    let timed_out = match &e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_busy_code(&code)),
        _ => false,
    };
    if timed_out {
        StoreError::timeout(format!("{context}: {e}"))
    } else {
        StoreError::io(format!("{context}: {e}"))
    }
}

/// Первичный код в младшем байте расширенного кода SQLite.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn to_db_size(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_db_size(n: i64) -> Result<u64, StoreError> {
    u64::try_from(n).map_err(|_| StoreError::format_err(format!("negative size/count: {n}")))
}

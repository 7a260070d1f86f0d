//! SQLite connection implementation

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use connwatch_core::{
    ColumnMeta, Connection, ConnwatchError, QueryResult, Result, Row, StatementResult,
    Transaction, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};

/// `None` once the connection has been closed
type Shared = Arc<Mutex<Option<RusqliteConnection>>>;

/// SQLite connection wrapper
pub struct SqliteConnection {
    conn: Shared,
    url: String,
}

impl SqliteConnection {
    /// Open a SQLite database
    ///
    /// Accepts `:memory:`, `file:` URIs (for example
    /// `file:testdb?mode=memory&cache=shared`, which lets every connection
    /// opened with the same URI see the same in-memory database) and paths.
    pub fn open(url: &str) -> Result<Self> {
        tracing::debug!(url = %url, "opening SQLite database");

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if url == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                ConnwatchError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !url.starts_with("file:") {
                let path = std::path::Path::new(url);
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    return Err(ConnwatchError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }
            RusqliteConnection::open_with_flags(url, flags).map_err(|e| {
                ConnwatchError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    url, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            ConnwatchError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;

        if !is_in_memory(url) {
            conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| {
                ConnwatchError::Connection(format!("Failed to set journal mode: {}", e))
            })?;
        }

        tracing::debug!(url = %url, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute several `;`-separated statements without parameters
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        with_conn(&self.conn, |conn| {
            conn.execute_batch(sql)
                .map_err(|e| ConnwatchError::Query(format!("Failed to execute batch: {}", e)))
        })
    }
}

fn is_in_memory(url: &str) -> bool {
    url == ":memory:" || url.contains("mode=memory")
}

fn with_conn<T>(
    shared: &Shared,
    f: impl FnOnce(&RusqliteConnection) -> Result<T>,
) -> Result<T> {
    let guard = shared.lock();
    match guard.as_ref() {
        Some(conn) => f(conn),
        None => Err(ConnwatchError::Connection("Connection is closed".into())),
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        with_conn(&self.conn, |conn| run_execute(conn, sql, params))
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        with_conn(&self.conn, |conn| run_query(conn, sql, params))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning SQLite transaction");
        with_conn(&self.conn, |conn| {
            // DEFERRED takes the write lock at the first write
            conn.execute_batch("BEGIN DEFERRED").map_err(|e| {
                ConnwatchError::Query(format!("Failed to begin transaction: {}", e))
            })
        })?;
        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        tracing::debug!(url = %self.url, "closing SQLite connection");
        conn.close().map_err(|(_, e)| {
            ConnwatchError::Connection(format!("Failed to close SQLite connection: {}", e))
        })
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

/// SQLite transaction
///
/// Rolled back on drop unless committed or rolled back explicitly.
pub struct SqliteTransaction {
    conn: Shared,
    finished: bool,
}

impl SqliteTransaction {
    /// Leaves `finished` unset on failure so drop still rolls back
    fn finish(&mut self, statement: &str) -> Result<()> {
        with_conn(&self.conn, |conn| {
            conn.execute_batch(statement).map_err(|e| {
                ConnwatchError::Query(format!("Failed to {} transaction: {}", statement, e))
            })
        })?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("SQLite transaction dropped without commit or rollback, rolling back");
        if let Some(conn) = self.conn.lock().as_ref()
            && let Err(e) = conn.execute_batch("ROLLBACK")
        {
            tracing::error!(error = %e, "automatic rollback on drop failed");
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing SQLite transaction");
        self.finish("COMMIT")
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");
        self.finish("ROLLBACK")
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query in SQLite transaction");
        with_conn(&self.conn, |conn| run_query(conn, sql, params))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing statement in SQLite transaction");
        with_conn(&self.conn, |conn| run_execute(conn, sql, params))
    }
}

fn run_execute(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let rusqlite_params = values_to_rusqlite(params);
    let rows_affected = conn
        .execute(sql, params_from_iter(rusqlite_params.iter()))
        .map_err(|e| ConnwatchError::Query(format!("Failed to execute statement: {}", e)))?;

    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(StatementResult::command(rows_affected as u64))
}

fn run_query(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = Instant::now();
    let rusqlite_params = values_to_rusqlite(params);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| ConnwatchError::Query(format!("Failed to prepare query: {}", e)))?;

    let columns: Vec<ColumnMeta> = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(ordinal, col)| ColumnMeta {
            name: col.name().to_string(),
            // sqlite3_column_decltype, i.e. the type from CREATE TABLE
            data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
            nullable: true,
            ordinal,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| ConnwatchError::Query(format!("Failed to execute query: {}", e)))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| ConnwatchError::Query(format!("Failed to fetch row: {}", e)))?
    {
        let values = (0..columns.len())
            .map(|i| rusqlite_to_value(row, i))
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row::new(column_names.clone(), values));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult {
        columns,
        rows,
        affected_rows: 0,
        execution_time_ms,
    })
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int64(i) => Sql::Integer(*i),
        Value::Float64(f) => Sql::Real(*f),
        Value::String(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
        Value::Json(j) => Sql::Text(j.to_string()),
    }
}

fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| ConnwatchError::Query(e.to_string()))?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}

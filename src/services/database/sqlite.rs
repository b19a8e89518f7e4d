// SQLite backend: blocking embedded driver behind a bounded worker pool
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::error::FrameError;
use crate::models::{
    CanonicalRecord, ConnectorDescriptor, DriverKind, ExecutionMode, LogicalQuery, ParamValue,
};
use crate::services::normalizer::normalize_sqlite_row;
use crate::sql::QueryType;

use super::backend::{ConnectorBackend, DriverConnection, PoolStatus, QueryOutcome};

/// Where this pool's connections come from
#[derive(Debug, Clone)]
enum SqliteSource {
    File(String),
    /// Shared-cache URI so every pooled connection sees the same database
    Memory(String),
}

impl SqliteSource {
    fn open(&self) -> Result<Connection, rusqlite::Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            SqliteSource::File(path) => Connection::open_with_flags(path, flags),
            SqliteSource::Memory(uri) => Connection::open_with_flags(uri, flags),
        }
    }
}

/// Scoped handle to a pooled SQLite connection. Returned to the pool on drop;
/// discarded instead when the execution was interrupted or panicked.
#[derive(Debug)]
pub struct SqliteHandle {
    conn: Option<Connection>,
    idle: Arc<Mutex<Vec<Connection>>>,
    created: Arc<AtomicUsize>,
    discard: Arc<AtomicBool>,
    _permit: OwnedSemaphorePermit,
}

impl SqliteHandle {
    pub fn connection(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection present until handle drops")
    }

    /// Mark the connection for discard; it will not return to the pool.
    pub fn discard_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.discard)
    }
}

impl Drop for SqliteHandle {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.discard.load(Ordering::SeqCst) || std::thread::panicking() {
            // Driver state may be inconsistent, do not reuse
            self.created.fetch_sub(1, Ordering::SeqCst);
            drop(conn);
        } else if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        } else {
            self.created.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Blocking connector backend over an embedded SQLite database
pub struct SqliteBackend {
    descriptor: ConnectorDescriptor,
    source: SqliteSource,
    semaphore: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Connection>>>,
    created: Arc<AtomicUsize>,
    // Keeps a shared in-memory database alive while the pool exists
    _anchor: Option<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn new(descriptor: ConnectorDescriptor) -> Result<Self, FrameError> {
        let source = match descriptor.sqlite_path() {
            Some(path) => SqliteSource::File(path),
            None => SqliteSource::Memory(format!(
                "file:krystal-{}?mode=memory&cache=shared",
                Uuid::new_v4()
            )),
        };

        let anchor = match &source {
            SqliteSource::Memory(_) => {
                let conn = source.open().map_err(|e| {
                    FrameError::Connection(format!(
                        "failed to open in-memory database for '{}': {}",
                        descriptor.name, e
                    ))
                })?;
                Some(Mutex::new(conn))
            }
            SqliteSource::File(_) => None,
        };

        tracing::info!(
            "Creating SQLite pool for '{}' (max_size: {})",
            descriptor.name,
            descriptor.pool.max_size
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(descriptor.pool.max_size)),
            idle: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(AtomicUsize::new(0)),
            source,
            descriptor,
            _anchor: anchor,
        })
    }

    async fn acquire_handle(&self) -> Result<SqliteHandle, FrameError> {
        let timeout = self.descriptor.pool.acquire_timeout();
        let permit = match tokio::time::timeout(
            timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(FrameError::Connection(format!(
                    "pool for '{}' is shut down",
                    self.descriptor.name
                )))
            }
            Err(_) => {
                return Err(FrameError::PoolTimeout {
                    connector: self.descriptor.name.clone(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        };

        let pooled = self
            .idle
            .lock()
            .map_err(|_| FrameError::Internal("sqlite idle list poisoned".to_string()))?
            .pop();

        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let source = self.source.clone();
                let opened = tokio::task::spawn_blocking(move || source.open())
                    .await
                    .map_err(|e| {
                        FrameError::Internal(format!("connection open task failed: {}", e))
                    })?
                    .map_err(|e| {
                        FrameError::Connection(format!(
                            "failed to open SQLite connection for '{}': {}",
                            self.descriptor.name, e
                        ))
                    })?;
                self.created.fetch_add(1, Ordering::SeqCst);
                opened
            }
        };

        Ok(SqliteHandle {
            conn: Some(conn),
            idle: Arc::clone(&self.idle),
            created: Arc::clone(&self.created),
            discard: Arc::new(AtomicBool::new(false)),
            _permit: permit,
        })
    }
}

fn sqlite_params(params: &[ParamValue]) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value;

    params
        .iter()
        .map(|p| match p {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(v) => Value::Integer(*v as i64),
            ParamValue::Int(v) => Value::Integer(*v),
            ParamValue::Float(v) => Value::Real(*v),
            ParamValue::Text(v) => Value::Text(v.clone()),
            ParamValue::Bytes(v) => Value::Blob(v.clone()),
            ParamValue::Timestamp(v) => Value::Text(v.to_rfc3339()),
        })
        .collect()
}

fn run_blocking(
    handle: &SqliteHandle,
    connector: &str,
    query: &LogicalQuery,
    query_type: QueryType,
) -> Result<QueryOutcome, FrameError> {
    let driver_err = |e: rusqlite::Error| FrameError::execution(connector, &query.statement, e);

    let conn = handle.connection();
    let params = rusqlite::params_from_iter(sqlite_params(&query.params));

    if query_type.is_read() {
        let mut stmt = conn.prepare(&query.statement).map_err(driver_err)?;
        let columns: Arc<Vec<String>> = Arc::new(
            stmt.column_names()
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
        );
        let mut rows = stmt.query(params).map_err(driver_err)?;
        let mut out: Vec<CanonicalRecord> = Vec::new();
        while let Some(row) = rows.next().map_err(driver_err)? {
            out.push(normalize_sqlite_row(&columns, row)?);
        }
        Ok(QueryOutcome::Rows(out))
    } else {
        let affected = conn
            .execute(&query.statement, params)
            .map_err(driver_err)?;
        Ok(QueryOutcome::Affected(affected as u64))
    }
}

#[async_trait]
impl ConnectorBackend for SqliteBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Blocking
    }

    fn driver(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    async fn acquire(&self) -> Result<DriverConnection, FrameError> {
        Ok(DriverConnection::Sqlite(self.acquire_handle().await?))
    }

    async fn execute(
        &self,
        query: &LogicalQuery,
        query_type: QueryType,
        timeout_secs: u64,
    ) -> Result<QueryOutcome, FrameError> {
        let handle = self.acquire_handle().await?;
        let discard = handle.discard_flag();
        let connector = self.descriptor.name.clone();
        let worker_connector = connector.clone();
        let owned_query = query.clone();

        let worker = tokio::task::spawn_blocking(move || {
            // Handle moves into the worker so release happens on every path
            run_blocking(&handle, &worker_connector, &owned_query, query_type)
        });

        match tokio::time::timeout(Duration::from_secs(timeout_secs), worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(FrameError::Internal(format!(
                "blocking worker failed: {}",
                join_err
            ))),
            Err(_) => {
                // Interrupted mid-statement: the connection is discarded when
                // the worker's handle drops, never returned to the pool
                discard.store(true, Ordering::SeqCst);
                Err(FrameError::execution(
                    &connector,
                    &query.statement,
                    format!("query timeout after {} seconds", timeout_secs),
                ))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), FrameError> {
        let handle = self.acquire_handle().await?;
        tokio::task::spawn_blocking(move || {
            handle
                .connection()
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map_err(|e| FrameError::Internal(format!("blocking worker failed: {}", e)))?
        .map_err(|e| FrameError::Connection(format!("connection test failed: {}", e)))?;
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.created.load(Ordering::SeqCst),
            available: self.semaphore.available_permits(),
            max_size: self.descriptor.pool.max_size,
        }
    }

    async fn shutdown(&self) {
        self.semaphore.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_backend(max_size: usize) -> SqliteBackend {
        let descriptor = ConnectorDescriptor::new("embedded", "sqlite::memory:")
            .unwrap()
            .with_max_size(max_size)
            .with_acquire_timeout_ms(200);
        SqliteBackend::new(descriptor).unwrap()
    }

    #[tokio::test]
    async fn test_read_and_write_roundtrip() {
        let backend = memory_backend(2);

        let create = LogicalQuery::new("CREATE TABLE users (id INTEGER, name TEXT)");
        backend
            .execute(&create, QueryType::Other, 5)
            .await
            .unwrap();

        let insert = LogicalQuery::new("INSERT INTO users (id, name) VALUES (?, ?), (?, ?)")
            .bind(1)
            .bind("alice")
            .bind(2)
            .bind("bob");
        let outcome = backend.execute(&insert, QueryType::Insert, 5).await.unwrap();
        assert_eq!(outcome.affected(), Some(2));

        let select = LogicalQuery::new("SELECT id, name FROM users ORDER BY id");
        let rows = backend
            .execute(&select, QueryType::Select, 5)
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name").and_then(|v| v.as_str()), Some("alice"));
        assert_eq!(rows[1].get("id").and_then(|v| v.as_i64()), Some(2));
    }

    #[tokio::test]
    async fn test_row_order_preserved() {
        let backend = memory_backend(1);
        backend
            .execute(
                &LogicalQuery::new("CREATE TABLE seq (n INTEGER)"),
                QueryType::Other,
                5,
            )
            .await
            .unwrap();
        for n in [5i64, 3, 9, 1, 7] {
            backend
                .execute(
                    &LogicalQuery::new("INSERT INTO seq (n) VALUES (?)").bind(n),
                    QueryType::Insert,
                    5,
                )
                .await
                .unwrap();
        }

        let rows = backend
            .execute(
                &LogicalQuery::new("SELECT n FROM seq ORDER BY n DESC"),
                QueryType::Select,
                5,
            )
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();

        let ns: Vec<i64> = rows
            .iter()
            .map(|r| r.get("n").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(ns, vec![9, 7, 5, 3, 1]);
    }

    #[tokio::test]
    async fn test_handle_release_on_drop() {
        let backend = memory_backend(1);
        assert_eq!(backend.status().available, 1);

        let handle = backend.acquire_handle().await.unwrap();
        assert_eq!(backend.status().available, 0);

        drop(handle);
        assert_eq!(backend.status().available, 1);
        // Released exactly once: the connection is back in the idle list
        assert_eq!(backend.status().size, 1);
    }

    #[tokio::test]
    async fn test_pool_timeout_when_exhausted() {
        let backend = memory_backend(1);
        let _held = backend.acquire_handle().await.unwrap();

        let err = backend.acquire_handle().await.unwrap_err();
        match err {
            FrameError::PoolTimeout { connector, .. } => assert_eq!(connector, "embedded"),
            other => panic!("expected PoolTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_size_one_pool_serializes_concurrent_queries() {
        let backend = Arc::new(memory_backend(1));
        backend
            .execute(
                &LogicalQuery::new("CREATE TABLE t (n INTEGER)"),
                QueryType::Other,
                5,
            )
            .await
            .unwrap();

        let a = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                backend
                    .execute(
                        &LogicalQuery::new("INSERT INTO t (n) VALUES (?)").bind(1),
                        QueryType::Insert,
                        5,
                    )
                    .await
            })
        };
        let b = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                backend
                    .execute(
                        &LogicalQuery::new("INSERT INTO t (n) VALUES (?)").bind(2),
                        QueryType::Insert,
                        5,
                    )
                    .await
            })
        };

        let (a, b) = tokio::join!(a, b);
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let rows = backend
            .execute(
                &LogicalQuery::new("SELECT COUNT(*) AS c FROM t"),
                QueryType::Select,
                5,
            )
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(rows[0].get("c").and_then(|v| v.as_i64()), Some(2));
    }

    #[tokio::test]
    async fn test_file_backed_database_shared_across_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let descriptor =
            ConnectorDescriptor::new("ondisk", &format!("sqlite://{}", path.display()))
                .unwrap()
                .with_max_size(2)
                .with_acquire_timeout_ms(500);
        let backend = SqliteBackend::new(descriptor).unwrap();

        backend
            .execute(
                &LogicalQuery::new("CREATE TABLE kv (k TEXT, v TEXT)"),
                QueryType::Other,
                5,
            )
            .await
            .unwrap();
        backend
            .execute(
                &LogicalQuery::new("INSERT INTO kv (k, v) VALUES (?, ?)")
                    .bind("answer")
                    .bind("42"),
                QueryType::Insert,
                5,
            )
            .await
            .unwrap();

        // Hold the writer's connection so the read opens a second one
        let _held = backend.acquire_handle().await.unwrap();
        let rows = backend
            .execute(
                &LogicalQuery::new("SELECT v FROM kv WHERE k = ?").bind("answer"),
                QueryType::Select,
                5,
            )
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(rows[0].get("v").and_then(|v| v.as_str()), Some("42"));
        assert_eq!(backend.status().size, 2);
    }

    #[tokio::test]
    async fn test_execution_error_carries_statement() {
        let backend = memory_backend(1);
        let err = backend
            .execute(
                &LogicalQuery::new("SELECT * FROM missing_table"),
                QueryType::Select,
                5,
            )
            .await
            .unwrap_err();

        match err {
            FrameError::Execution {
                connector,
                statement,
                ..
            } => {
                assert_eq!(connector, "embedded");
                assert!(statement.contains("missing_table"));
            }
            other => panic!("expected Execution, got {:?}", other),
        }
        // The failed execution still returned its connection
        assert_eq!(backend.status().available, 1);
    }
}

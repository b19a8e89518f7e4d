// Backend seam: one trait per driver family, dispatched by execution mode
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::FrameError;
use crate::models::{CanonicalRecord, DriverKind, ExecutionMode, LogicalQuery};
use crate::sql::QueryType;

use super::sqlite::SqliteHandle;

/// Lazy, cancellable sequence of normalized records. Dropping the stream
/// before exhaustion releases the underlying connection.
pub type RecordStream = BoxStream<'static, Result<CanonicalRecord, FrameError>>;

/// Result of one logical query execution. Blocking reads complete eagerly,
/// reactive reads stream, writes report the affected row count.
pub enum QueryOutcome {
    Rows(Vec<CanonicalRecord>),
    Stream(RecordStream),
    Affected(u64),
}

impl QueryOutcome {
    /// Drain the outcome into a completed row set. Affected-count outcomes
    /// collect to an empty set.
    pub async fn collect(self) -> Result<Vec<CanonicalRecord>, FrameError> {
        match self {
            QueryOutcome::Rows(rows) => Ok(rows),
            QueryOutcome::Stream(mut stream) => {
                let mut rows = Vec::new();
                while let Some(record) = stream.next().await {
                    rows.push(record?);
                }
                Ok(rows)
            }
            QueryOutcome::Affected(_) => Ok(Vec::new()),
        }
    }

    /// Affected row count for write outcomes.
    pub fn affected(&self) -> Option<u64> {
        match self {
            QueryOutcome::Affected(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, QueryOutcome::Stream(_))
    }
}

impl std::fmt::Debug for QueryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryOutcome::Rows(rows) => f.debug_tuple("Rows").field(&rows.len()).finish(),
            QueryOutcome::Stream(_) => f.write_str("Stream(..)"),
            QueryOutcome::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
        }
    }
}

/// A scoped pooled connection. Every variant returns to its pool when the
/// handle is dropped, on success, error and cancellation alike.
#[derive(Debug)]
pub enum DriverConnection {
    Sqlite(SqliteHandle),
    Postgres(deadpool_postgres::Object),
    MySql(mysql_async::Conn),
}

impl DriverConnection {
    pub fn driver(&self) -> DriverKind {
        match self {
            DriverConnection::Sqlite(_) => DriverKind::Sqlite,
            DriverConnection::Postgres(_) => DriverKind::Postgres,
            DriverConnection::MySql(_) => DriverKind::MySql,
        }
    }
}

/// Connection pool status information
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub max_size: usize,
}

/// Connector backend trait - abstraction layer for the driver families.
/// Backends own their pool; callers never touch driver state directly.
#[async_trait]
pub trait ConnectorBackend: Send + Sync {
    /// Execution mode declared at registration
    fn mode(&self) -> ExecutionMode;

    /// Driver family behind this backend
    fn driver(&self) -> DriverKind;

    /// Take a scoped connection from the pool, waiting up to the configured
    /// acquire timeout before failing with `PoolTimeout`.
    async fn acquire(&self) -> Result<DriverConnection, FrameError>;

    /// Execute a validated logical query. `query_type` decides the read or
    /// write path; reads produce rows or a stream per the execution mode.
    async fn execute(
        &self,
        query: &LogicalQuery,
        query_type: QueryType,
        timeout_secs: u64,
    ) -> Result<QueryOutcome, FrameError>;

    /// Test connection
    async fn test_connection(&self) -> Result<(), FrameError>;

    /// Pool observability
    fn status(&self) -> PoolStatus;

    /// Tear the pool down; outstanding handles drain on drop.
    async fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalValue;
    use std::sync::Arc;

    fn record(n: i64) -> CanonicalRecord {
        CanonicalRecord::new(
            Arc::new(vec!["n".to_string()]),
            vec![CanonicalValue::Int(n)],
        )
        .unwrap()
    }

    #[test]
    fn test_collect_drains_stream_in_order() {
        let stream: RecordStream = Box::pin(futures::stream::iter(vec![
            Ok(record(1)),
            Ok(record(2)),
            Ok(record(3)),
        ]));
        let rows = tokio_test::block_on(QueryOutcome::Stream(stream).collect()).unwrap();
        let ns: Vec<i64> = rows
            .iter()
            .map(|r| r.get("n").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[test]
    fn test_collect_surfaces_stream_errors() {
        let stream: RecordStream = Box::pin(futures::stream::iter(vec![
            Ok(record(1)),
            Err(FrameError::Internal("wire dropped".to_string())),
        ]));
        assert!(tokio_test::block_on(QueryOutcome::Stream(stream).collect()).is_err());
    }

    #[test]
    fn test_affected_accessor() {
        assert_eq!(QueryOutcome::Affected(7).affected(), Some(7));
        assert_eq!(QueryOutcome::Rows(Vec::new()).affected(), None);
    }
}

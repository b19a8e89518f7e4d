// PostgreSQL backend: reactive wire driver behind a deadpool connection pool
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, PoolError, RecyclingMethod};
use futures::Stream;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{NoTls, RowStream};

use crate::error::FrameError;
use crate::models::{
    CanonicalRecord, ConnectorDescriptor, DriverKind, ExecutionMode, LogicalQuery, ParamValue,
};
use crate::services::normalizer::{normalize_pg_row, pg_header};
use crate::sql::QueryType;

use super::backend::{ConnectorBackend, DriverConnection, PoolStatus, QueryOutcome};

/// Rewrite `?` placeholders into the `$1..$n` form the wire protocol expects,
/// skipping string literals, quoted identifiers and comments.
pub(crate) fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut ordinal = 0usize;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push(c);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == quote {
                        if chars.peek() == Some(&quote) {
                            out.push(quote);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                out.push(chars.next().unwrap_or('-'));
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '?' => {
                ordinal += 1;
                out.push('$');
                out.push_str(&ordinal.to_string());
            }
            _ => out.push(c),
        }
    }

    out
}

/// Bind a ParamValue against whatever type the server inferred for the
/// placeholder. Integers narrow with a range check instead of wrapping.
impl ToSql for ParamValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            ParamValue::Null => Ok(IsNull::Yes),
            ParamValue::Bool(v) => v.to_sql(ty, out),
            ParamValue::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            ParamValue::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            ParamValue::Text(v) => v.to_sql(ty, out),
            ParamValue::Bytes(v) => v.to_sql(ty, out),
            ParamValue::Timestamp(v) => match *ty {
                Type::TIMESTAMP => v.naive_utc().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Lazy record stream over a pooled PostgreSQL connection. The pooled object
/// rides along and returns to the pool exactly once, when the stream drops.
struct PgRecordStream {
    _conn: deadpool_postgres::Object,
    inner: Pin<Box<RowStream>>,
    columns: Option<Arc<Vec<String>>>,
    connector: String,
    statement: String,
}

impl Stream for PgRecordStream {
    type Item = Result<CanonicalRecord, FrameError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => {
                let columns = this.columns.get_or_insert_with(|| pg_header(&row)).clone();
                Poll::Ready(Some(normalize_pg_row(&columns, &row)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(FrameError::execution(
                &this.connector,
                &this.statement,
                e,
            )))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Reactive connector backend over the PostgreSQL wire driver
pub struct PostgresBackend {
    descriptor: ConnectorDescriptor,
    pool: Pool,
}

impl PostgresBackend {
    pub fn new(descriptor: ConnectorDescriptor) -> Result<Self, FrameError> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(descriptor.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(descriptor.pool.max_size);
        pool_cfg.timeouts.wait = Some(descriptor.pool.acquire_timeout());
        cfg.pool = Some(pool_cfg);

        tracing::info!(
            "Creating PostgreSQL pool for '{}' at {} (max_size: {})",
            descriptor.name,
            descriptor.masked_url(),
            descriptor.pool.max_size
        );

        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                FrameError::Connection(format!(
                    "failed to create pool for '{}': {}",
                    descriptor.name, e
                ))
            })?;

        Ok(Self { descriptor, pool })
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, FrameError> {
        self.pool.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => FrameError::PoolTimeout {
                connector: self.descriptor.name.clone(),
                waited_ms: self.descriptor.pool.acquire_timeout_ms,
            },
            other => FrameError::Connection(format!(
                "failed to get connection from pool for '{}': {}",
                self.descriptor.name, other
            )),
        })
    }

    fn timeout_error(&self, statement: &str, what: &str, timeout_secs: u64) -> FrameError {
        FrameError::execution(
            &self.descriptor.name,
            statement,
            format!("{} timeout after {} seconds", what, timeout_secs),
        )
    }
}

#[async_trait]
impl ConnectorBackend for PostgresBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Reactive
    }

    fn driver(&self) -> DriverKind {
        DriverKind::Postgres
    }

    async fn acquire(&self) -> Result<DriverConnection, FrameError> {
        Ok(DriverConnection::Postgres(self.get_conn().await?))
    }

    async fn execute(
        &self,
        query: &LogicalQuery,
        query_type: QueryType,
        timeout_secs: u64,
    ) -> Result<QueryOutcome, FrameError> {
        let connector = self.descriptor.name.clone();
        let sql = rewrite_placeholders(&query.statement);
        let conn = self.get_conn().await?;
        let timeout = Duration::from_secs(timeout_secs);

        let stmt = tokio::time::timeout(timeout, conn.prepare_cached(&sql))
            .await
            .map_err(|_| self.timeout_error(&query.statement, "prepare", timeout_secs))?
            .map_err(|e| FrameError::execution(&connector, &query.statement, e))?;

        if query_type.is_read() {
            let params = query.params.iter().map(|p| p as &(dyn ToSql + Sync));
            let row_stream = tokio::time::timeout(timeout, conn.query_raw(&stmt, params))
                .await
                .map_err(|_| self.timeout_error(&query.statement, "query", timeout_secs))?
                .map_err(|e| FrameError::execution(&connector, &query.statement, e))?;

            Ok(QueryOutcome::Stream(Box::pin(PgRecordStream {
                _conn: conn,
                inner: Box::pin(row_stream),
                columns: None,
                connector,
                statement: query.statement.clone(),
            })))
        } else {
            let refs: Vec<&(dyn ToSql + Sync)> = query
                .params
                .iter()
                .map(|p| p as &(dyn ToSql + Sync))
                .collect();
            let affected = tokio::time::timeout(timeout, conn.execute(&stmt, &refs))
                .await
                .map_err(|_| self.timeout_error(&query.statement, "query", timeout_secs))?
                .map_err(|e| FrameError::execution(&connector, &query.statement, e))?;
            Ok(QueryOutcome::Affected(affected))
        }
    }

    async fn test_connection(&self) -> Result<(), FrameError> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| FrameError::Connection(format!("connection test failed: {}", e)))?;
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available,
            max_size: status.max_size,
        }
    }

    async fn shutdown(&self) {
        self.pool.close();
    }
}

// MySQL backend: reactive wire driver using the driver's built-in pool
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts};

use crate::error::FrameError;
use crate::models::{
    CanonicalRecord, ConnectorDescriptor, DriverKind, ExecutionMode, LogicalQuery, ParamValue,
};
use crate::services::normalizer::{mysql_header, normalize_mysql_row};
use crate::sql::QueryType;

use super::backend::{ConnectorBackend, DriverConnection, PoolStatus, QueryOutcome, RecordStream};

/// Buffered records between the driver task and the consumer; keeps the
/// stream lazy while allowing the wire read to run ahead a little
const STREAM_BUFFER: usize = 32;

fn mysql_params(params: &[ParamValue]) -> Params {
    use mysql_async::Value;

    if params.is_empty() {
        return Params::Empty;
    }

    Params::Positional(
        params
            .iter()
            .map(|p| match p {
                ParamValue::Null => Value::NULL,
                ParamValue::Bool(v) => Value::Int(*v as i64),
                ParamValue::Int(v) => Value::Int(*v),
                ParamValue::Float(v) => Value::Double(*v),
                ParamValue::Text(v) => Value::Bytes(v.clone().into_bytes()),
                ParamValue::Bytes(v) => Value::Bytes(v.clone()),
                ParamValue::Timestamp(v) => {
                    use chrono::{Datelike, Timelike};
                    let naive = v.naive_utc();
                    Value::Date(
                        naive.year() as u16,
                        naive.month() as u8,
                        naive.day() as u8,
                        naive.hour() as u8,
                        naive.minute() as u8,
                        naive.second() as u8,
                        naive.and_utc().timestamp_subsec_micros(),
                    )
                }
            })
            .collect(),
    )
}

/// Reactive connector backend over the MySQL wire driver
pub struct MySqlBackend {
    descriptor: ConnectorDescriptor,
    pool: Pool,
}

impl MySqlBackend {
    pub fn new(descriptor: ConnectorDescriptor) -> Result<Self, FrameError> {
        let opts = Opts::from_url(&descriptor.url).map_err(|e| {
            FrameError::Config(format!(
                "invalid MySQL URL for '{}': {}",
                descriptor.name, e
            ))
        })?;

        let min = descriptor.pool.min_idle.unwrap_or(0);
        let constraints = PoolConstraints::new(min, descriptor.pool.max_size)
            .unwrap_or_else(PoolConstraints::default);
        let opts = OptsBuilder::from_opts(opts)
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        tracing::info!(
            "Creating MySQL pool for '{}' at {} (max_size: {})",
            descriptor.name,
            descriptor.masked_url(),
            descriptor.pool.max_size
        );

        Ok(Self {
            pool: Pool::new(opts),
            descriptor,
        })
    }

    async fn get_conn(&self) -> Result<Conn, FrameError> {
        let timeout = self.descriptor.pool.acquire_timeout();
        match tokio::time::timeout(timeout, self.pool.get_conn()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(FrameError::Connection(format!(
                "failed to get MySQL connection from pool for '{}': {}",
                self.descriptor.name, e
            ))),
            Err(_) => Err(FrameError::PoolTimeout {
                connector: self.descriptor.name.clone(),
                waited_ms: self.descriptor.pool.acquire_timeout_ms,
            }),
        }
    }

    /// Spawn the driver-side reader. The task owns the pooled connection; it
    /// ends when the result set is drained or the consumer hangs up, and the
    /// connection returns to the pool exactly once, when the task drops it.
    fn spawn_reader(
        mut conn: Conn,
        connector: String,
        statement: String,
        params: Params,
    ) -> RecordStream {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<CanonicalRecord, FrameError>>(
            STREAM_BUFFER,
        );

        tokio::spawn(async move {
            let outcome = async {
                let mut result = conn
                    .exec_iter(statement.as_str(), params)
                    .await
                    .map_err(|e| FrameError::execution(&connector, &statement, e))?;

                let mut columns: Option<Arc<Vec<String>>> = None;
                while let Some(row) = result
                    .next()
                    .await
                    .map_err(|e| FrameError::execution(&connector, &statement, e))?
                {
                    let header = columns.get_or_insert_with(|| mysql_header(&row)).clone();
                    if tx.send(normalize_mysql_row(&header, row)).await.is_err() {
                        // Consumer cancelled before exhaustion
                        tracing::debug!("record stream for '{}' cancelled", connector);
                        break;
                    }
                }
                Ok::<(), FrameError>(())
            }
            .await;

            if let Err(e) = outcome {
                let _ = tx.send(Err(e)).await;
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }
}

#[async_trait]
impl ConnectorBackend for MySqlBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Reactive
    }

    fn driver(&self) -> DriverKind {
        DriverKind::MySql
    }

    async fn acquire(&self) -> Result<DriverConnection, FrameError> {
        Ok(DriverConnection::MySql(self.get_conn().await?))
    }

    async fn execute(
        &self,
        query: &LogicalQuery,
        query_type: QueryType,
        timeout_secs: u64,
    ) -> Result<QueryOutcome, FrameError> {
        let connector = self.descriptor.name.clone();
        let conn = self.get_conn().await?;
        let params = mysql_params(&query.params);

        if query_type.is_read() {
            Ok(QueryOutcome::Stream(Self::spawn_reader(
                conn,
                connector,
                query.statement.clone(),
                params,
            )))
        } else {
            let mut conn = conn;
            let work = async {
                let result = conn
                    .exec_iter(query.statement.as_str(), params)
                    .await
                    .map_err(|e| FrameError::execution(&connector, &query.statement, e))?;
                let affected = result.affected_rows();
                result
                    .drop_result()
                    .await
                    .map_err(|e| FrameError::execution(&connector, &query.statement, e))?;
                Ok::<u64, FrameError>(affected)
            };

            let affected = tokio::time::timeout(Duration::from_secs(timeout_secs), work)
                .await
                .map_err(|_| {
                    FrameError::execution(
                        &connector,
                        &query.statement,
                        format!("query timeout after {} seconds", timeout_secs),
                    )
                })??;
            Ok(QueryOutcome::Affected(affected))
        }
    }

    async fn test_connection(&self) -> Result<(), FrameError> {
        let mut conn = self.get_conn().await?;
        conn.ping()
            .await
            .map_err(|e| FrameError::Connection(format!("connection test failed: {}", e)))?;
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        // The driver pool does not expose live counters; report the limits
        PoolStatus {
            size: self.descriptor.pool.max_size,
            available: self.descriptor.pool.max_size,
            max_size: self.descriptor.pool.max_size,
        }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            tracing::error!(
                "Failed to disconnect MySQL pool for '{}': {}",
                self.descriptor.name,
                e
            );
        }
    }
}

use std::sync::Arc;
use std::time::Instant;

use crate::config::FrameConfig;
use crate::error::FrameError;
use crate::models::{CanonicalRecord, LogicalQuery};
use crate::services::database::QueryOutcome;
use crate::services::pipeline::ProcessingPipeline;
use crate::services::registry::ConnectorRegistry;
use crate::validation::SqlValidator;

/// Query facade: validates a logical query, resolves its connector and
/// dispatches execution through the connector's native driver.
pub struct QueryFacade {
    registry: Arc<ConnectorRegistry>,
    pipeline: Arc<ProcessingPipeline>,
    default_connector: Option<String>,
    query_timeout_secs: u64,
    apply_limit: bool,
    limit_value: u64,
}

impl QueryFacade {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            registry,
            pipeline: Arc::new(ProcessingPipeline::new()),
            default_connector: None,
            query_timeout_secs: 30,
            apply_limit: true,
            limit_value: 1000,
        }
    }

    /// Build a facade with the configured defaults applied.
    pub fn from_config(registry: Arc<ConnectorRegistry>, config: &FrameConfig) -> Self {
        Self::new(registry)
            .with_query_timeout(config.query.timeout_secs)
            .with_limit(config.query.apply_limit, config.query.limit_value)
            .with_default_connector_opt(config.default_connector.clone())
    }

    /// Install the processing hook pipeline applied to every read result.
    pub fn with_pipeline(mut self, pipeline: ProcessingPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Connector used when a query does not name one.
    pub fn with_default_connector(mut self, name: impl Into<String>) -> Self {
        self.default_connector = Some(name.into());
        self
    }

    fn with_default_connector_opt(mut self, name: Option<String>) -> Self {
        self.default_connector = name;
        self
    }

    pub fn with_query_timeout(mut self, timeout_secs: u64) -> Self {
        self.query_timeout_secs = timeout_secs;
        self
    }

    pub fn with_limit(mut self, apply_limit: bool, limit_value: u64) -> Self {
        self.apply_limit = apply_limit;
        self.limit_value = limit_value;
        self
    }

    /// Execute one logical query.
    ///
    /// Validation (statement classification and placeholder/parameter count)
    /// happens before any connection is acquired. Blocking connectors return
    /// a completed row set, reactive connectors a lazy record stream, writes
    /// the affected row count. Registered processing hooks are applied to
    /// every read result.
    pub async fn execute(&self, query: LogicalQuery) -> Result<QueryOutcome, FrameError> {
        let start_time = Instant::now();

        // Fail fast, before touching any pool
        let query_type = SqlValidator::classify(&query.statement)?;
        SqlValidator::validate_params(&query.statement, query.params.len())?;

        let name = query
            .connector
            .clone()
            .or_else(|| self.default_connector.clone())
            .ok_or_else(|| {
                FrameError::Config(
                    "query names no connector and no default connector is configured".to_string(),
                )
            })?;
        let connector = self.registry.resolve(&name).await?;

        let query = if query_type.is_read() && self.apply_limit {
            let (statement, applied) =
                SqlValidator::ensure_limit(&query.statement, self.limit_value)?;
            if applied {
                tracing::debug!("Applied LIMIT {} to query {}", self.limit_value, query.id);
            }
            LogicalQuery { statement, ..query }
        } else {
            query
        };

        tracing::debug!(
            "Executing query {} on '{}' ({}, {})",
            query.id,
            name,
            connector.descriptor().mode.as_str(),
            query_type.as_str()
        );

        let outcome = connector
            .backend()
            .execute(&query, query_type, self.query_timeout_secs)
            .await
            .map_err(|e| {
                tracing::error!("Query {} failed: {}", query.id, e);
                e
            })?;

        let outcome = match outcome {
            QueryOutcome::Rows(rows) => QueryOutcome::Rows(self.pipeline.apply_rows(rows)?),
            QueryOutcome::Stream(stream) => {
                QueryOutcome::Stream(Arc::clone(&self.pipeline).apply_stream(stream))
            }
            affected @ QueryOutcome::Affected(_) => affected,
        };

        tracing::info!(
            "Query {} dispatched in {} ms",
            query.id,
            start_time.elapsed().as_millis()
        );

        Ok(outcome)
    }

    /// Execute a sequence of queries in order, stopping at the first failure,
    /// the way the original batched its write statements.
    pub async fn execute_all(
        &self,
        queries: Vec<LogicalQuery>,
    ) -> Result<Vec<QueryOutcome>, FrameError> {
        let mut outcomes = Vec::with_capacity(queries.len());
        for query in queries {
            outcomes.push(self.execute(query).await?);
        }
        Ok(outcomes)
    }

    /// Execute and drain the result into a completed row set regardless of
    /// the connector's execution mode.
    pub async fn fetch_all(&self, query: LogicalQuery) -> Result<Vec<CanonicalRecord>, FrameError> {
        self.execute(query).await?.collect().await
    }
}

// Processing hook pipeline: ordered record transforms applied after
// normalization, before records reach application code
use std::sync::Arc;

use futures::stream::StreamExt;

use crate::error::{BoxError, FrameError};
use crate::models::CanonicalRecord;
use crate::services::database::RecordStream;

/// record -> record transform
pub type MapFn = dyn Fn(CanonicalRecord) -> Result<CanonicalRecord, BoxError> + Send + Sync;
/// record -> zero-or-more records transform (filtering / fan-out)
pub type FlatMapFn = dyn Fn(CanonicalRecord) -> Result<Vec<CanonicalRecord>, BoxError> + Send + Sync;

enum HookFn {
    Map(Arc<MapFn>),
    FlatMap(Arc<FlatMapFn>),
}

struct ProcessingHook {
    name: String,
    func: HookFn,
}

impl ProcessingHook {
    fn apply(&self, record: CanonicalRecord) -> Result<Vec<CanonicalRecord>, FrameError> {
        match &self.func {
            HookFn::Map(f) => f(record)
                .map(|r| vec![r])
                .map_err(|e| FrameError::transform(&self.name, e)),
            HookFn::FlatMap(f) => {
                f(record).map_err(|e| FrameError::transform(&self.name, e))
            }
        }
    }
}

/// Ordered list of named transforms. Hooks run in registration order; a hook
/// that fails aborts the pipeline for that record only.
#[derive(Default)]
pub struct ProcessingPipeline {
    hooks: Vec<ProcessingHook>,
}

impl ProcessingPipeline {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Register a record -> record transform.
    pub fn map<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CanonicalRecord) -> Result<CanonicalRecord, BoxError> + Send + Sync + 'static,
    {
        self.hooks.push(ProcessingHook {
            name: name.into(),
            func: HookFn::Map(Arc::new(f)),
        });
        self
    }

    /// Register a record -> zero-or-more records transform.
    pub fn flat_map<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CanonicalRecord) -> Result<Vec<CanonicalRecord>, BoxError> + Send + Sync + 'static,
    {
        self.hooks.push(ProcessingHook {
            name: name.into(),
            func: HookFn::FlatMap(Arc::new(f)),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run one record through every hook in registration order.
    pub fn apply_record(
        &self,
        record: CanonicalRecord,
    ) -> Result<Vec<CanonicalRecord>, FrameError> {
        let mut current = vec![record];
        for hook in &self.hooks {
            let mut next = Vec::with_capacity(current.len());
            for record in current {
                next.extend(hook.apply(record)?);
            }
            current = next;
        }
        Ok(current)
    }

    /// Run a completed row set through the pipeline. The first failing record
    /// aborts the batch, reporting the transform and the record position.
    pub fn apply_rows(
        &self,
        rows: Vec<CanonicalRecord>,
    ) -> Result<Vec<CanonicalRecord>, FrameError> {
        if self.hooks.is_empty() {
            return Ok(rows);
        }

        let mut out = Vec::with_capacity(rows.len());
        for (idx, record) in rows.into_iter().enumerate() {
            match self.apply_record(record) {
                Ok(records) => out.extend(records),
                Err(FrameError::Transform { transform, source }) => {
                    return Err(FrameError::transform(
                        transform,
                        format!("record {}: {}", idx, source),
                    ))
                }
                Err(other) => return Err(other),
            }
        }
        Ok(out)
    }

    /// Lift the pipeline over a record stream. Records already emitted stay
    /// emitted; a failing record surfaces as an error item and other records
    /// keep flowing.
    pub fn apply_stream(self: Arc<Self>, stream: RecordStream) -> RecordStream {
        if self.hooks.is_empty() {
            return stream;
        }

        stream
            .flat_map(move |item| {
                let items: Vec<Result<CanonicalRecord, FrameError>> = match item {
                    Ok(record) => match self.apply_record(record) {
                        Ok(records) => records.into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    },
                    Err(e) => vec![Err(e)],
                };
                futures::stream::iter(items)
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalValue;

    fn record(n: i64) -> CanonicalRecord {
        CanonicalRecord::new(
            Arc::new(vec!["n".to_string()]),
            vec![CanonicalValue::Int(n)],
        )
        .unwrap()
    }

    fn n_of(record: &CanonicalRecord) -> i64 {
        record.get("n").and_then(|v| v.as_i64()).unwrap()
    }

    fn double_then_increment() -> ProcessingPipeline {
        ProcessingPipeline::new()
            .map("double", |r| {
                let n = r.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                r.with_value_at(0, CanonicalValue::Int(n * 2)).map_err(Into::into)
            })
            .map("increment", |r| {
                let n = r.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                r.with_value_at(0, CanonicalValue::Int(n + 1)).map_err(Into::into)
            })
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let pipeline = double_then_increment();
        let out = pipeline.apply_record(record(10)).unwrap();
        // (10 * 2) + 1, not (10 + 1) * 2
        assert_eq!(out.len(), 1);
        assert_eq!(n_of(&out[0]), 21);
    }

    #[test]
    fn test_flat_map_filters_and_fans_out() {
        let pipeline = ProcessingPipeline::new().flat_map("drop_odd_duplicate_even", |r| {
            let n = r.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            if n % 2 == 0 {
                Ok(vec![r.clone(), r])
            } else {
                Ok(Vec::new())
            }
        });

        assert_eq!(pipeline.apply_record(record(3)).unwrap().len(), 0);
        assert_eq!(pipeline.apply_record(record(4)).unwrap().len(), 2);
    }

    #[test]
    fn test_failing_hook_names_transform_and_record() {
        let pipeline = ProcessingPipeline::new().map("reject_negative", |r| {
            let n = r.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            if n < 0 {
                Err(format!("negative value {}", n).into())
            } else {
                Ok(r)
            }
        });

        let err = pipeline
            .apply_rows(vec![record(1), record(-5), record(3)])
            .unwrap_err();
        match err {
            FrameError::Transform { transform, source } => {
                assert_eq!(transform, "reject_negative");
                assert!(source.to_string().contains("record 1"));
                assert!(source.to_string().contains("negative value -5"));
            }
            other => panic!("expected Transform, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_failure_leaves_earlier_records_emitted() {
        let pipeline = Arc::new(ProcessingPipeline::new().map("reject_negative", |r| {
            let n = r.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            if n < 0 {
                Err(format!("negative value {}", n).into())
            } else {
                Ok(r)
            }
        }));

        let input: RecordStream = Box::pin(futures::stream::iter(
            vec![Ok(record(1)), Ok(record(-2)), Ok(record(3))],
        ));
        let items: Vec<Result<CanonicalRecord, FrameError>> =
            pipeline.apply_stream(input).collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(n_of(items[0].as_ref().unwrap()), 1);
        assert!(items[1].is_err());
        // The failure does not affect the record that follows
        assert_eq!(n_of(items[2].as_ref().unwrap()), 3);
    }

    #[test]
    fn test_empty_pipeline_passes_rows_through() {
        let pipeline = ProcessingPipeline::new();
        let rows = pipeline.apply_rows(vec![record(1), record(2)]).unwrap();
        assert_eq!(rows.len(), 2);
    }
}

use std::time::Duration;

use crate::telemetry::{self, tags};

/// Hooks invoked by lane workers around each query.
///
/// The pool calls these from worker threads, so implementations must be cheap
/// and thread-safe.
pub trait WorkerTelemetry: Send + Sync {
    fn on_lane_depth(&self, worker_id: usize, depth: usize);
    fn on_query_started(&self, worker_id: usize);
    fn on_query_finished(&self, worker_id: usize, elapsed: Duration);
    fn on_query_failed(&self, worker_id: usize, elapsed: Duration);
}

/// Feeds the metric registry and emits `qbench.worker` trace events.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_lane_depth(&self, _worker_id: usize, depth: usize) {
        telemetry::record_histogram(tags::METRIC_WORKER_LANE_DEPTH, depth as u64);
    }

    fn on_query_started(&self, worker_id: usize) {
        telemetry::increment_counter(tags::METRIC_WORKER_QUERY_START_COUNT, 1);
        tracing::trace!(target: tags::TARGET_WORKER, worker_id, "query started");
    }

    fn on_query_finished(&self, worker_id: usize, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        telemetry::increment_counter(tags::METRIC_WORKER_QUERY_OK_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_QUERY_LATENCY_US, elapsed_us);
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            elapsed_us,
            result = "ok",
            "query finished"
        );
    }

    fn on_query_failed(&self, worker_id: usize, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        telemetry::increment_counter(tags::METRIC_WORKER_QUERY_FAIL_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_QUERY_LATENCY_US, elapsed_us);
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            elapsed_us,
            result = "error",
            "query failed"
        );
    }
}

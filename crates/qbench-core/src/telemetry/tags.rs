/// Tracing target for worker lifecycle and per-query events.
pub const TARGET_WORKER: &str = "qbench.worker";
/// Tracing target for ingestion events.
pub const TARGET_INGEST: &str = "qbench.ingest";
/// Tracing target for the outcome collector.
pub const TARGET_COLLECTOR: &str = "qbench.collector";

pub const METRIC_INGEST_ROUTED_COUNT: &str = "qbench.ingest.routed.count";
pub const METRIC_INGEST_SKIPPED_COUNT: &str = "qbench.ingest.skipped.count";

pub const METRIC_WORKER_QUERY_START_COUNT: &str = "qbench.worker.query.start.count";
pub const METRIC_WORKER_QUERY_OK_COUNT: &str = "qbench.worker.query.ok.count";
pub const METRIC_WORKER_QUERY_FAIL_COUNT: &str = "qbench.worker.query.fail.count";
pub const METRIC_WORKER_QUERY_LATENCY_US: &str = "qbench.worker.query.latency_us";
pub const METRIC_WORKER_LANE_DEPTH: &str = "qbench.worker.lane.depth";

pub const METRIC_DB_CONNECTION_OPEN_COUNT: &str = "qbench.db.connection.open.count";
pub const METRIC_DB_CONNECTION_REUSE_COUNT: &str = "qbench.db.connection.reuse.count";
pub const METRIC_DB_CONNECTION_DISCARD_COUNT: &str = "qbench.db.connection.discard.count";

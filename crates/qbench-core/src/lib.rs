pub mod cancel;
pub mod core;
pub mod db;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod report;
pub mod runner;
pub mod stats;
pub mod telemetry;
pub mod types;

pub use cancel::CancelToken;
pub use crate::core::{LanePool, LanePoolHandle, Lanes, PoolRuntimeSnapshot, WorkerRuntimeSnapshot, route};
pub use db::{ConnectionPool, PoolConfig};
#[cfg(feature = "postgres")]
pub use db::PostgresExecutor;
pub use error::{BenchError, ErrorKind};
pub use executor::QueryExecutor;
pub use ingest::{CsvRecordSource, IngestSummary};
pub use report::{
    BenchmarkReport, JsonReporter, ReportBuildOptions, ReportValue, Reporter, TextReporter,
};
pub use runner::{RunSummary, Runner, RunnerConfig};
pub use stats::{Statistics, StatsCollector};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{Outcome, RawRecord, Result, WorkItem};

//! Benchmark orchestration.
//!
//! A run wires the stages together on plain threads:
//!
//! ```text
//! records -> distribute (caller thread) -> lanes -> lane workers -> results -> collector
//! ```
//!
//! Ingestion runs on the calling thread. When it ends, for whatever reason,
//! the lanes are dropped so workers drain what is queued and exit; the result
//! channel then disconnects and the collector stops. Only after every thread
//! has been joined does the run decide what to return, so no thread outlives
//! [`Runner::run`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, bounded, select};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::core::{LANE_CAPACITY, LanePool, Lanes, PoolRuntimeSnapshot};
use crate::error::BenchError;
use crate::executor::QueryExecutor;
use crate::ingest::{self, IngestSummary};
use crate::stats::{Statistics, StatsCollector};
use crate::telemetry::WorkerTelemetry;
use crate::telemetry::tags;
use crate::types::{Outcome, RawRecord, Result};

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 5;
/// Default capacity of the shared result channel.
pub const RESULT_CAPACITY: usize = 10;

/// Run-wide settings, fixed for the lifetime of a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of lanes, and therefore of worker threads.
    pub workers: usize,
    /// Abort on the first malformed or unreadable record instead of skipping it.
    pub strict: bool,
    pub lane_capacity: usize,
    pub result_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            strict: false,
            lane_capacity: LANE_CAPACITY,
            result_capacity: RESULT_CAPACITY,
        }
    }
}

impl RunnerConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(BenchError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.lane_capacity == 0 {
            return Err(BenchError::Config(
                "lane capacity must be at least 1".to_string(),
            ));
        }
        if self.result_capacity == 0 {
            return Err(BenchError::Config(
                "result capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub statistics: Statistics,
    pub ingest: IngestSummary,
    pub workers: PoolRuntimeSnapshot,
}

/// Runs benchmarks against one query executor.
pub struct Runner {
    config: RunnerConfig,
    pool: LanePool,
}

impl Runner {
    /// Creates a runner after validating `config`.
    pub fn new(config: RunnerConfig, executor: Arc<dyn QueryExecutor>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool: LanePool::new(executor),
        })
    }

    pub fn with_telemetry(
        config: RunnerConfig,
        executor: Arc<dyn QueryExecutor>,
        telemetry: Arc<dyn WorkerTelemetry>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool: LanePool::with_telemetry(executor, telemetry),
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Executes one query per record and returns the frozen statistics.
    ///
    /// Returns [`BenchError::Cancelled`] if `cancel` fired at any point, or the
    /// first input error in strict mode. Statistics are only returned for a
    /// run that completed.
    pub fn run<I>(&self, cancel: &CancelToken, records: I) -> Result<Statistics>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        self.run_detailed(cancel, records)
            .map(|summary| summary.statistics)
    }

    /// Like [`Runner::run`], also returning ingest counters and per-worker
    /// runtime metrics.
    pub fn run_detailed<I>(&self, cancel: &CancelToken, records: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let started_at = Instant::now();
        tracing::info!(
            workers = self.config.workers,
            strict = self.config.strict,
            "benchmark started"
        );

        let stats = Arc::new(StatsCollector::new());
        let (lanes, lane_receivers) = Lanes::bounded(self.config.workers, self.config.lane_capacity);
        let (results_tx, results_rx) = bounded(self.config.result_capacity);

        let pool = self.pool.spawn(lane_receivers, results_tx, cancel)?;
        let collector = match spawn_collector(results_rx, Arc::clone(&stats), cancel.clone()) {
            Ok(handle) => handle,
            Err(error) => {
                pool.stop();
                drop(lanes);
                let _ = pool.join();
                return Err(error);
            }
        };

        let ingested = ingest::distribute(cancel, records, &lanes, self.config.strict);
        drop(lanes);

        let workers = pool.join();
        let collected = collector
            .join()
            .map_err(|_| BenchError::WorkerPanicked("outcome collector panicked".to_string()));
        let processing_time = started_at.elapsed();

        if cancel.is_cancelled() {
            tracing::info!(elapsed = ?processing_time, "benchmark cancelled");
            return Err(BenchError::Cancelled);
        }

        let ingest = ingested.map_err(|error| {
            if error.is_input_error() {
                error.with_context("CSV parsing error")
            } else {
                error
            }
        })?;
        let workers = workers?;
        collected?;

        let statistics = stats.freeze(processing_time);
        log_finished(&statistics, processing_time);

        Ok(RunSummary {
            statistics,
            ingest,
            workers,
        })
    }
}

fn log_finished(statistics: &Statistics, processing_time: Duration) {
    tracing::info!(
        total = statistics.total_queries,
        succeeded = statistics.success_count(),
        failed = statistics.error_count(),
        elapsed = ?processing_time,
        "benchmark finished"
    );
}

fn spawn_collector(
    results: Receiver<Outcome>,
    stats: Arc<StatsCollector>,
    cancel: CancelToken,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("qbench-collector".to_string())
        .spawn(move || collect(&results, &stats, &cancel))
        .map_err(|error| BenchError::Io(error).with_context("failed to spawn outcome collector"))
}

fn collect(results: &Receiver<Outcome>, stats: &StatsCollector, cancel: &CancelToken) {
    loop {
        let outcome = select! {
            recv(cancel.watch()) -> _ => break,
            recv(results) -> message => match message {
                Ok(outcome) => outcome,
                Err(_) => break,
            },
        };

        match outcome.error {
            None => stats.record(outcome.elapsed),
            Some(error) => {
                tracing::warn!(
                    target: tags::TARGET_COLLECTOR,
                    lane = outcome.lane,
                    %error,
                    "query failed"
                );
                stats.record_error();
            }
        }
    }

    tracing::debug!(
        target: tags::TARGET_COLLECTOR,
        recorded = stats.total_count(),
        "collector stopped"
    );
}

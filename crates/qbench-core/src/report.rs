use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::WorkerRuntimeSnapshot;
use crate::ingest::IngestSummary;
use crate::runner::RunSummary;
use crate::stats::Statistics;
use crate::telemetry::{self, TelemetrySnapshot};
use crate::types::Result;

const RULE_WIDTH: usize = 60;

/// Options controlling how reports are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBuildOptions {
    /// Attaches a point-in-time telemetry snapshot to the report.
    pub include_telemetry_snapshot: bool,
}

/// Scalar value used by flat report exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportValue {
    U64(u64),
    F64(f64),
    Duration(Duration),
    Bool(bool),
    Text(String),
}

/// Worker-level metrics used in exported reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub outcomes_dropped: usize,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

impl WorkerReport {
    pub fn from_runtime(runtime: &WorkerRuntimeSnapshot) -> Self {
        Self {
            worker_id: runtime.worker_id,
            tasks_completed: runtime.tasks_completed,
            tasks_failed: runtime.tasks_failed,
            outcomes_dropped: runtime.outcomes_dropped,
            busy: runtime.busy,
            idle: runtime.idle,
            utilization: runtime.utilization,
        }
    }
}

/// Export-oriented view of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub statistics: Statistics,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub ingest: IngestSummary,
    pub workers: Vec<WorkerReport>,
    pub telemetry: Option<TelemetrySnapshot>,
}

impl BenchmarkReport {
    pub fn from_summary(summary: &RunSummary, options: ReportBuildOptions) -> Self {
        let telemetry = if options.include_telemetry_snapshot {
            Some(telemetry::snapshot())
        } else {
            None
        };

        Self {
            successful_queries: summary.statistics.success_count(),
            failed_queries: summary.statistics.error_count(),
            statistics: summary.statistics.clone(),
            ingest: summary.ingest,
            workers: summary
                .workers
                .workers
                .iter()
                .map(WorkerReport::from_runtime)
                .collect(),
            telemetry,
        }
    }

    /// Report carrying only statistics, for runs without pool metrics.
    pub fn from_statistics(statistics: &Statistics) -> Self {
        Self {
            successful_queries: statistics.success_count(),
            failed_queries: statistics.error_count(),
            statistics: statistics.clone(),
            ingest: IngestSummary::default(),
            workers: Vec::new(),
            telemetry: None,
        }
    }

    /// Flattens the report into dotted keys such as `stats.p99` or
    /// `worker.0.tasks_completed`.
    pub fn to_flat_map(&self) -> BTreeMap<String, ReportValue> {
        let stats = &self.statistics;
        let mut out = BTreeMap::new();

        out.insert(
            "stats.total_queries".to_string(),
            ReportValue::U64(stats.total_queries),
        );
        out.insert(
            "stats.successful_queries".to_string(),
            ReportValue::U64(self.successful_queries),
        );
        out.insert(
            "stats.failed_queries".to_string(),
            ReportValue::U64(self.failed_queries),
        );
        out.insert(
            "stats.success_ratio".to_string(),
            ReportValue::F64(stats.success_ratio()),
        );
        for (key, value) in [
            ("processing_time", stats.processing_time),
            ("min", stats.min_time),
            ("max", stats.max_time),
            ("mean", stats.mean_time),
            ("median", stats.median_time),
            ("p90", stats.p90),
            ("p95", stats.p95),
            ("p99", stats.p99),
        ] {
            out.insert(format!("stats.{key}"), ReportValue::Duration(value));
        }

        out.insert(
            "ingest.routed".to_string(),
            ReportValue::U64(self.ingest.routed),
        );
        out.insert(
            "ingest.skipped".to_string(),
            ReportValue::U64(self.ingest.skipped),
        );
        out.insert(
            "run.worker_count".to_string(),
            ReportValue::U64(self.workers.len() as u64),
        );

        flatten_workers(&self.workers, &mut out);
        if let Some(snapshot) = &self.telemetry {
            flatten_telemetry(snapshot, &mut out);
        }

        out
    }
}

fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

fn flatten_workers(workers: &[WorkerReport], out: &mut BTreeMap<String, ReportValue>) {
    for worker in workers {
        let prefix = format!("worker.{}", worker.worker_id);
        out.insert(
            format!("{prefix}.tasks_completed"),
            ReportValue::U64(worker.tasks_completed as u64),
        );
        out.insert(
            format!("{prefix}.tasks_failed"),
            ReportValue::U64(worker.tasks_failed as u64),
        );
        out.insert(
            format!("{prefix}.outcomes_dropped"),
            ReportValue::U64(worker.outcomes_dropped as u64),
        );
        out.insert(
            format!("{prefix}.busy_us"),
            ReportValue::U64(duration_to_us(worker.busy)),
        );
        out.insert(
            format!("{prefix}.idle_us"),
            ReportValue::U64(duration_to_us(worker.idle)),
        );
        out.insert(
            format!("{prefix}.utilization"),
            ReportValue::F64(worker.utilization),
        );
    }
}

fn flatten_telemetry(snapshot: &TelemetrySnapshot, out: &mut BTreeMap<String, ReportValue>) {
    for (name, value) in &snapshot.counters {
        out.insert(
            format!("telemetry.counter.{name}"),
            ReportValue::U64(*value),
        );
    }

    for (name, histogram) in &snapshot.histograms {
        out.insert(
            format!("telemetry.histogram.{name}.count"),
            ReportValue::U64(histogram.count),
        );
        out.insert(
            format!("telemetry.histogram.{name}.min"),
            ReportValue::U64(histogram.min),
        );
        out.insert(
            format!("telemetry.histogram.{name}.max"),
            ReportValue::U64(histogram.max),
        );
        out.insert(
            format!("telemetry.histogram.{name}.mean"),
            ReportValue::F64(histogram.mean),
        );
    }
}

/// Renders a finished benchmark for the user.
pub trait Reporter {
    fn report(&self, report: &BenchmarkReport, out: &mut dyn Write) -> Result<()>;
}

/// Human-readable summary table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReporter;

impl Reporter for TextReporter {
    fn report(&self, report: &BenchmarkReport, out: &mut dyn Write) -> Result<()> {
        let stats = &report.statistics;
        let rule = "=".repeat(RULE_WIDTH);

        writeln!(out)?;
        writeln!(out, "{rule}")?;
        writeln!(out, "BENCHMARK RESULTS")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "Number of queries processed: {}", stats.total_queries)?;
        writeln!(
            out,
            "Total processing time:       {}",
            format_duration(stats.processing_time)
        )?;

        if report.successful_queries > 0 {
            writeln!(
                out,
                "Successful queries:          {}/{} ({:.1}%)",
                report.successful_queries,
                stats.total_queries,
                stats.success_ratio() * 100.0
            )?;
            writeln!(out)?;

            writeln!(out, "Query Time Statistics:")?;
            writeln!(out, "  Minimum:     {}", format_duration(stats.min_time))?;
            writeln!(out, "  Average:     {}", format_duration(stats.mean_time))?;
            writeln!(out, "  Median:      {}", format_duration(stats.median_time))?;
            writeln!(out, "  Maximum:     {}", format_duration(stats.max_time))?;
            writeln!(out)?;

            writeln!(out, "Percentiles:")?;
            writeln!(out, "  P90:          {}", format_duration(stats.p90))?;
            writeln!(out, "  P95:          {}", format_duration(stats.p95))?;
            writeln!(out, "  P99:          {}", format_duration(stats.p99))?;
        } else {
            writeln!(out, "No successful queries to report timing statistics")?;
        }

        writeln!(out, "{rule}")?;
        Ok(())
    }
}

/// Machine-readable JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReporter {
    pub pretty: bool,
}

impl JsonReporter {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Reporter for JsonReporter {
    fn report(&self, report: &BenchmarkReport, out: &mut dyn Write) -> Result<()> {
        let written = if self.pretty {
            serde_json::to_writer_pretty(&mut *out, report)
        } else {
            serde_json::to_writer(&mut *out, report)
        };
        written.map_err(io::Error::from)?;
        writeln!(out)?;
        Ok(())
    }
}

/// Formats a duration with the largest unit that keeps it above one.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        "0s".to_string()
    } else if nanos < 1_000 {
        format!("{nanos}ns")
    } else if nanos < 1_000_000 {
        format!("{:.3}µs", nanos as f64 / 1e3)
    } else if nanos < 1_000_000_000 {
        format!("{:.3}ms", nanos as f64 / 1e6)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

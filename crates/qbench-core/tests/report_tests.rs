use std::sync::Arc;
use std::time::Duration;

use qbench_core::report::format_duration;
use qbench_core::{
    BenchmarkReport, CancelToken, JsonReporter, QueryExecutor, RawRecord, ReportBuildOptions,
    ReportValue, Reporter, Runner, RunnerConfig, StatsCollector, TextReporter, WorkItem,
};

fn render(reporter: &dyn Reporter, report: &BenchmarkReport) -> Result<String, Box<dyn std::error::Error>> {
    let mut out = Vec::new();
    reporter.report(report, &mut out)?;
    Ok(String::from_utf8(out)?)
}

fn sample_report() -> BenchmarkReport {
    let collector = StatsCollector::new();
    for value in [100, 200, 150, 300, 250] {
        collector.record(Duration::from_millis(value));
    }
    collector.record_error();
    BenchmarkReport::from_statistics(&collector.freeze(Duration::from_secs(2)))
}

#[test]
fn text_report_lists_timings() -> Result<(), Box<dyn std::error::Error>> {
    let text = render(&TextReporter, &sample_report())?;

    assert!(text.contains(&"=".repeat(60)));
    assert!(text.contains("BENCHMARK RESULTS"));
    assert!(text.contains("Number of queries processed: 6"));
    assert!(text.contains("Total processing time:       2.000s"));
    assert!(text.contains("Successful queries:          5/6 (83.3%)"));
    assert!(text.contains("  Minimum:     100.000ms"));
    assert!(text.contains("  Average:     200.000ms"));
    assert!(text.contains("  Median:      200.000ms"));
    assert!(text.contains("  Maximum:     300.000ms"));
    assert!(text.contains("Percentiles:"));
    assert!(text.contains("  P99:"));
    Ok(())
}

#[test]
fn text_report_without_successes() -> Result<(), Box<dyn std::error::Error>> {
    let collector = StatsCollector::new();
    collector.record_error();
    let report = BenchmarkReport::from_statistics(&collector.freeze(Duration::from_millis(3)));

    let text = render(&TextReporter, &report)?;
    assert!(text.contains("No successful queries to report timing statistics"));
    assert!(!text.contains("Percentiles:"));
    Ok(())
}

#[test]
fn json_report_is_valid_json() -> Result<(), Box<dyn std::error::Error>> {
    let json = render(&JsonReporter::default(), &sample_report())?;
    let value: serde_json::Value = serde_json::from_str(&json)?;

    assert_eq!(value["statistics"]["total_queries"], 6);
    assert_eq!(value["statistics"]["successful_queries"], 5);
    assert_eq!(value["successful_queries"], 5);
    assert_eq!(value["failed_queries"], 1);
    Ok(())
}

#[test]
fn run_summary_exports_flat_map() -> Result<(), Box<dyn std::error::Error>> {
    let executor: Arc<dyn QueryExecutor> =
        Arc::new(|_: &WorkItem| -> qbench_core::Result<()> { Ok(()) });
    let runner = Runner::new(RunnerConfig::new(2), executor)?;
    let records: Vec<qbench_core::Result<RawRecord>> = (0..8)
        .map(|index| {
            Ok(vec![
                format!("host_{index:06}"),
                "2017-01-01 08:59:22".to_string(),
                "2017-01-01 09:59:22".to_string(),
            ])
        })
        .collect();
    let summary = runner.run_detailed(&CancelToken::new(), records)?;

    let report = BenchmarkReport::from_summary(&summary, ReportBuildOptions::default());
    assert_eq!(report.workers.len(), 2);
    assert!(report.telemetry.is_none());

    let map = report.to_flat_map();
    assert_eq!(map.get("stats.total_queries"), Some(&ReportValue::U64(8)));
    assert_eq!(map.get("ingest.routed"), Some(&ReportValue::U64(8)));
    assert_eq!(map.get("run.worker_count"), Some(&ReportValue::U64(2)));
    assert!(matches!(map.get("stats.p99"), Some(ReportValue::Duration(_))));
    assert!(matches!(
        map.get("worker.0.tasks_completed"),
        Some(ReportValue::U64(_))
    ));
    assert!(matches!(
        map.get("worker.1.utilization"),
        Some(ReportValue::F64(_))
    ));
    Ok(())
}

#[test]
fn durations_are_formatted_with_a_readable_unit() {
    assert_eq!(format_duration(Duration::from_millis(1)), "1.000ms");
    assert_eq!(format_duration(Duration::from_micros(12)), "12.000µs");
    assert_eq!(format_duration(Duration::from_secs(90)), "90.000s");
}

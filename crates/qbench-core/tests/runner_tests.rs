use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use qbench_core::{
    BenchError, CancelToken, CsvRecordSource, ErrorKind, QueryExecutor, RawRecord, Runner,
    RunnerConfig, WorkItem,
};

type QueryResult = qbench_core::Result<()>;

fn rows(count: usize) -> Vec<qbench_core::Result<RawRecord>> {
    (0..count)
        .map(|index| {
            Ok(vec![
                format!("host_{:06}", index % 7),
                "2017-01-01 08:59:22".to_string(),
                "2017-01-01 09:59:22".to_string(),
            ])
        })
        .collect()
}

fn with_malformed_row(count: usize) -> Vec<qbench_core::Result<RawRecord>> {
    let mut records = rows(count);
    records.insert(
        count / 2,
        Ok(vec![
            "host_000001".to_string(),
            "2017-01-01 08:59:22".to_string(),
        ]),
    );
    records
}

fn counting_executor(calls: Arc<AtomicUsize>) -> Arc<dyn QueryExecutor> {
    Arc::new(move |_: &WorkItem| -> QueryResult {
        calls.fetch_add(1, Ordering::AcqRel);
        thread::sleep(Duration::from_micros(200));
        Ok(())
    })
}

#[test]
fn lenient_run_skips_the_malformed_row() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Runner::new(
        RunnerConfig::new(4),
        counting_executor(Arc::clone(&calls)),
    )?;

    let stats = runner.run(&CancelToken::new(), with_malformed_row(50))?;

    assert_eq!(stats.total_queries, 50);
    assert_eq!(stats.success_count(), 50);
    assert_eq!(calls.load(Ordering::Acquire), 50);
    assert!(stats.min_time <= stats.median_time && stats.median_time <= stats.max_time);
    assert!(stats.processing_time >= stats.max_time);
    Ok(())
}

#[test]
fn strict_run_fails_on_the_malformed_row() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Runner::new(
        RunnerConfig::new(4).with_strict(true),
        counting_executor(Arc::clone(&calls)),
    )?;

    let error = runner
        .run(&CancelToken::new(), with_malformed_row(50))
        .expect_err("strict mode must abort");

    assert_eq!(error.kind(), ErrorKind::InvalidRecord);
    assert!(error.to_string().starts_with("CSV parsing error"), "{error}");
    assert!(calls.load(Ordering::Acquire) <= 25);
    Ok(())
}

const LOOSE_TIMESTAMP_CSV: &str = "hostname,start_time,end_time\n\
    host_000001,2017-01-01 08:59:22,2017-01-01 09:59:22\n\
    host_000002,2017-1-1 8:59:22,2017-01-01 09:59:22\n\
    host_000003,2017-01-01 08:59:22,2017-01-01 09:59:22\n";

#[test]
fn strict_run_rejects_loosely_formatted_timestamps() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Runner::new(
        RunnerConfig::new(2).with_strict(true),
        counting_executor(Arc::clone(&calls)),
    )?;

    let source = CsvRecordSource::new(LOOSE_TIMESTAMP_CSV.as_bytes());
    let error = runner
        .run(&CancelToken::new(), source)
        .expect_err("unpadded timestamp must abort a strict run");

    assert_eq!(error.kind(), ErrorKind::InvalidRecord);
    assert!(error.to_string().starts_with("CSV parsing error"), "{error}");
    assert!(calls.load(Ordering::Acquire) <= 1);
    Ok(())
}

#[test]
fn lenient_run_skips_loosely_formatted_timestamps() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Runner::new(
        RunnerConfig::new(2),
        counting_executor(Arc::clone(&calls)),
    )?;

    let source = CsvRecordSource::new(LOOSE_TIMESTAMP_CSV.as_bytes());
    let summary = runner.run_detailed(&CancelToken::new(), source)?;

    assert_eq!(summary.statistics.total_queries, 2);
    assert_eq!(summary.ingest.routed, 2);
    assert_eq!(summary.ingest.skipped, 1);
    assert_eq!(calls.load(Ordering::Acquire), 2);
    Ok(())
}

#[test]
fn immediate_cancellation_returns_promptly() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Runner::new(
        RunnerConfig::default(),
        counting_executor(Arc::clone(&calls)),
    )?;
    let cancel = CancelToken::new();
    cancel.cancel();

    let started_at = Instant::now();
    let error = runner.run(&cancel, rows(1_000)).expect_err("cancelled");

    assert!(matches!(error, BenchError::Cancelled));
    assert!(started_at.elapsed() < Duration::from_secs(5));
    assert_eq!(calls.load(Ordering::Acquire), 0);
    Ok(())
}

#[test]
fn cancellation_mid_run_does_not_hang() -> Result<(), Box<dyn std::error::Error>> {
    let executor: Arc<dyn QueryExecutor> = Arc::new(|_: &WorkItem| -> QueryResult {
        thread::sleep(Duration::from_millis(5));
        Ok(())
    });
    let runner = Runner::new(RunnerConfig::new(2), executor)?;
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        trigger.cancel();
    });

    let started_at = Instant::now();
    let error = runner.run(&cancel, rows(10_000)).expect_err("cancelled");
    canceller.join().map_err(|_| "canceller thread panicked")?;

    assert!(error.is_cancelled());
    assert!(started_at.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[test]
fn failed_queries_are_counted_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let executor: Arc<dyn QueryExecutor> = Arc::new(|item: &WorkItem| -> QueryResult {
        if item.hostname == "host_000003" {
            return Err(BenchError::ExecutionFailed("statement timeout".to_string()));
        }
        Ok(())
    });
    let runner = Runner::new(RunnerConfig::new(3), executor)?;

    let summary = runner.run_detailed(&CancelToken::new(), rows(70))?;

    assert_eq!(summary.statistics.total_queries, 70);
    assert_eq!(summary.statistics.error_count(), 10);
    assert_eq!(summary.statistics.success_count(), 60);
    assert_eq!(summary.ingest.routed, 70);
    assert_eq!(summary.workers.workers.len(), 3);
    assert_eq!(summary.workers.failed, 10);
    Ok(())
}

#[test]
fn zero_workers_is_a_configuration_error() {
    let executor: Arc<dyn QueryExecutor> = Arc::new(|_: &WorkItem| -> QueryResult { Ok(()) });
    let result = Runner::new(RunnerConfig::new(0), executor);
    assert!(matches!(result, Err(BenchError::Config(_))));
}

#[test]
fn empty_input_yields_empty_statistics() -> Result<(), Box<dyn std::error::Error>> {
    let executor: Arc<dyn QueryExecutor> = Arc::new(|_: &WorkItem| -> QueryResult { Ok(()) });
    let runner = Runner::new(RunnerConfig::default(), executor)?;

    let source = CsvRecordSource::new("hostname,start_time,end_time\n".as_bytes());
    let stats = runner.run(&CancelToken::new(), source)?;

    assert_eq!(stats.total_queries, 0);
    assert_eq!(stats.min_time, Duration::ZERO);
    Ok(())
}

#[test]
fn runner_can_be_reused_across_runs() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = Runner::new(
        RunnerConfig::new(2),
        counting_executor(Arc::clone(&calls)),
    )?;

    let first = runner.run(&CancelToken::new(), rows(10))?;
    let second = runner.run(&CancelToken::new(), rows(15))?;

    assert_eq!(first.total_queries, 10);
    assert_eq!(second.total_queries, 15);
    assert_eq!(calls.load(Ordering::Acquire), 25);
    Ok(())
}

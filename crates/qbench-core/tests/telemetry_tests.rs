#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use qbench_core::telemetry::{self, tags};
    use qbench_core::{
        CancelToken, DefaultWorkerTelemetry, QueryExecutor, RawRecord, Runner, RunnerConfig,
        WorkItem, WorkerTelemetry,
    };

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn run_records_ingest_and_worker_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let executor: Arc<dyn QueryExecutor> =
            Arc::new(|item: &WorkItem| -> qbench_core::Result<()> {
                if item.hostname == "host_000000" {
                    return Err(qbench_core::BenchError::ExecutionFailed("boom".to_string()));
                }
                Ok(())
            });
        let runner = Runner::new(RunnerConfig::new(2), executor)?;
        let mut records: Vec<qbench_core::Result<RawRecord>> = (0..6)
            .map(|index| {
                Ok(vec![
                    format!("host_{index:06}"),
                    "2017-01-01 08:59:22".to_string(),
                    "2017-01-01 09:59:22".to_string(),
                ])
            })
            .collect();
        records.push(Ok(vec!["host_000001".to_string()]));
        runner.run(&CancelToken::new(), records)?;

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_INGEST_ROUTED_COUNT), Some(6));
        assert_eq!(snapshot.counter(tags::METRIC_INGEST_SKIPPED_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_QUERY_START_COUNT), Some(6));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_QUERY_OK_COUNT), Some(5));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_QUERY_FAIL_COUNT), Some(1));
        let latency = snapshot
            .histogram(tags::METRIC_WORKER_QUERY_LATENCY_US)
            .ok_or("latency histogram missing")?;
        assert_eq!(latency.count, 6);
        Ok(())
    }

    #[test]
    fn default_worker_telemetry_feeds_the_registry() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let hooks = DefaultWorkerTelemetry;
        hooks.on_lane_depth(0, 3);
        hooks.on_query_started(0);
        hooks.on_query_finished(0, Duration::from_micros(250));

        let snapshot = telemetry::snapshot();
        let depth = snapshot
            .histogram(tags::METRIC_WORKER_LANE_DEPTH)
            .expect("lane depth histogram");
        assert_eq!(depth.max, 3);
        let latency = snapshot
            .histogram(tags::METRIC_WORKER_QUERY_LATENCY_US)
            .expect("latency histogram");
        assert_eq!(latency.min, 250);
    }
}

#[cfg(not(feature = "telemetry"))]
#[test]
fn snapshot_is_empty_without_the_feature() {
    qbench_core::telemetry::increment_counter(qbench_core::telemetry::tags::METRIC_INGEST_ROUTED_COUNT, 1);
    qbench_core::telemetry::record_histogram(
        qbench_core::telemetry::tags::METRIC_WORKER_QUERY_LATENCY_US,
        250,
    );
    assert!(qbench_core::telemetry::snapshot().is_empty());
}

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{BenchError, ErrorKind};
use crate::executor::QueryExecutor;
use crate::telemetry::tags;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{Outcome, Result, WorkItem};

/// Fixed-size pool of lane workers sharing one query executor.
///
/// Every worker owns exactly one lane receiver for its whole life, so all
/// items routed to a lane are executed serially, in FIFO order, by the same
/// thread.
pub struct LanePool {
    executor: Arc<dyn QueryExecutor>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl LanePool {
    /// Creates a pool using the default worker telemetry implementation.
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_telemetry(executor, Arc::new(DefaultWorkerTelemetry))
    }

    pub fn with_telemetry(
        executor: Arc<dyn QueryExecutor>,
        telemetry: Arc<dyn WorkerTelemetry>,
    ) -> Self {
        Self {
            executor,
            telemetry,
        }
    }

    /// Spawns one worker thread per lane receiver.
    ///
    /// Workers publish an [`Outcome`] per executed item on `results` and exit
    /// when their lane is closed and drained, when `results` is disconnected,
    /// or as soon as `cancel` fires or [`LanePoolHandle::stop`] is called.
    /// The pool only observes `cancel` and never triggers it.
    pub fn spawn(
        &self,
        lanes: Vec<Receiver<WorkItem>>,
        results: Sender<Outcome>,
        cancel: &CancelToken,
    ) -> Result<LanePoolHandle> {
        let num_workers = lanes.len();
        let state = Arc::new(PoolState::new(num_workers));
        let stop = CancelToken::new();

        let mut worker_handles = Vec::with_capacity(num_workers);
        for (worker_id, lane) in lanes.into_iter().enumerate() {
            let worker = LaneWorker {
                id: worker_id,
                lane,
                results: results.clone(),
                cancel: cancel.clone(),
                stop: stop.clone(),
                executor: Arc::clone(&self.executor),
                telemetry: Arc::clone(&self.telemetry),
                state: Arc::clone(&state),
            };

            let spawned = thread::Builder::new()
                .name(format!("qbench-lane-{worker_id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => worker_handles.push(handle),
                Err(error) => {
                    // Workers already running still hold their lanes; stop them
                    // before bailing out so no thread outlives the error.
                    let partial = LanePoolHandle {
                        state,
                        stop,
                        worker_handles,
                    };
                    partial.stop();
                    let _ = partial.join();
                    return Err(BenchError::Io(error).with_context("failed to spawn lane worker"));
                }
            }
        }

        tracing::debug!(target: tags::TARGET_WORKER, workers = num_workers, "lane workers started");
        Ok(LanePoolHandle {
            state,
            stop,
            worker_handles,
        })
    }
}

struct PoolState {
    started_at: Instant,
    completed: Vec<AtomicUsize>,
    failed: Vec<AtomicUsize>,
    dropped: Vec<AtomicUsize>,
    busy_us: Vec<AtomicU64>,
    started_offsets_us: Vec<AtomicU64>,
    stopped_offsets_us: Vec<AtomicU64>,
}

impl PoolState {
    fn new(num_workers: usize) -> Self {
        Self {
            started_at: Instant::now(),
            completed: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            failed: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            dropped: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            busy_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            started_offsets_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            stopped_offsets_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    // Offsets are stored +1 so zero means "not yet".
    fn mark(&self, offsets: &[AtomicU64], worker_id: usize) {
        let now_us = micros(self.started_at.elapsed());
        offsets[worker_id].store(now_us.saturating_add(1), Ordering::Release);
    }
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

/// Why a lane worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    LaneClosed,
    Cancelled,
    Stopped,
    ResultsClosed,
}

struct LaneWorker {
    id: usize,
    lane: Receiver<WorkItem>,
    results: Sender<Outcome>,
    cancel: CancelToken,
    // Pool-local shutdown, separate from the caller's token.
    stop: CancelToken,
    executor: Arc<dyn QueryExecutor>,
    telemetry: Arc<dyn WorkerTelemetry>,
    state: Arc<PoolState>,
}

impl LaneWorker {
    fn run(self) {
        self.state.mark(&self.state.started_offsets_us, self.id);
        let exit = self.work();
        self.state.mark(&self.state.stopped_offsets_us, self.id);
        tracing::debug!(
            target: tags::TARGET_WORKER,
            worker_id = self.id,
            reason = ?exit,
            completed = self.state.completed[self.id].load(Ordering::Acquire),
            "lane worker stopped"
        );
    }

    fn work(&self) -> WorkerExit {
        loop {
            if self.cancel.is_cancelled() {
                return WorkerExit::Cancelled;
            }
            if self.stop.is_cancelled() {
                return WorkerExit::Stopped;
            }

            let item = select! {
                recv(self.cancel.watch()) -> _ => return WorkerExit::Cancelled,
                recv(self.stop.watch()) -> _ => return WorkerExit::Stopped,
                recv(self.lane) -> message => match message {
                    Ok(item) => item,
                    Err(_) => return WorkerExit::LaneClosed,
                },
            };

            let outcome = self.execute(&item);

            select! {
                recv(self.cancel.watch()) -> _ => {
                    self.state.dropped[self.id].fetch_add(1, Ordering::AcqRel);
                    return WorkerExit::Cancelled;
                }
                recv(self.stop.watch()) -> _ => {
                    self.state.dropped[self.id].fetch_add(1, Ordering::AcqRel);
                    return WorkerExit::Stopped;
                }
                send(self.results, outcome) -> sent => {
                    if sent.is_err() {
                        self.state.dropped[self.id].fetch_add(1, Ordering::AcqRel);
                        return WorkerExit::ResultsClosed;
                    }
                }
            }
        }
    }

    fn execute(&self, item: &WorkItem) -> Outcome {
        self.telemetry.on_lane_depth(self.id, self.lane.len());
        self.telemetry.on_query_started(self.id);

        let started_at = Instant::now();
        let result = match catch_unwind(AssertUnwindSafe(|| self.executor.execute(item))) {
            Ok(result) => result,
            Err(_) => Err(BenchError::ExecutionFailed(
                "query executor panicked".to_string(),
            )),
        };
        let elapsed = started_at.elapsed();

        self.state.busy_us[self.id].fetch_add(micros(elapsed), Ordering::AcqRel);
        self.state.completed[self.id].fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(()) => {
                self.telemetry.on_query_finished(self.id, elapsed);
                Outcome::success(self.id, elapsed)
            }
            Err(error) => {
                self.state.failed[self.id].fetch_add(1, Ordering::AcqRel);
                self.telemetry.on_query_failed(self.id, elapsed);
                let error = if error.kind() == ErrorKind::ExecutionFailed {
                    error
                } else {
                    BenchError::ExecutionFailed(error.to_string())
                };
                Outcome::failure(self.id, elapsed, error)
            }
        }
    }
}

/// Per-worker runtime metrics captured by the lane pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    /// Items executed, successful or not.
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    /// Outcomes executed but never published because of shutdown.
    pub outcomes_dropped: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

/// Runtime metrics snapshot for the whole pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub completed: usize,
    pub failed: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// Handle to the running lane workers.
pub struct LanePoolHandle {
    state: Arc<PoolState>,
    stop: CancelToken,
    worker_handles: Vec<JoinHandle<()>>,
}

impl LanePoolHandle {
    /// Tells every worker to exit at its next blocking point without
    /// cancelling the caller's token. Items still queued are abandoned.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn num_workers(&self) -> usize {
        self.state.completed.len()
    }

    pub fn completed_count(&self) -> usize {
        self.state
            .completed
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .sum()
    }

    /// Per-worker executed item counts.
    pub fn worker_task_counts(&self) -> Vec<usize> {
        self.state
            .completed
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .collect()
    }

    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let elapsed = self.state.started_at.elapsed();
        let elapsed_us = micros(elapsed);

        let workers = (0..self.num_workers())
            .map(|worker_id| {
                let started_raw = self.state.started_offsets_us[worker_id].load(Ordering::Acquire);
                let stopped_raw = self.state.stopped_offsets_us[worker_id].load(Ordering::Acquire);
                let busy_raw = self.state.busy_us[worker_id].load(Ordering::Acquire);

                let uptime_us = if started_raw == 0 {
                    0
                } else {
                    let stop_us = if stopped_raw == 0 {
                        elapsed_us
                    } else {
                        stopped_raw - 1
                    };
                    stop_us.saturating_sub(started_raw - 1)
                };
                let busy_us = busy_raw.min(uptime_us);
                let utilization = if uptime_us == 0 {
                    0.0
                } else {
                    busy_us as f64 / uptime_us as f64
                };

                WorkerRuntimeSnapshot {
                    worker_id,
                    tasks_completed: self.state.completed[worker_id].load(Ordering::Acquire),
                    tasks_failed: self.state.failed[worker_id].load(Ordering::Acquire),
                    outcomes_dropped: self.state.dropped[worker_id].load(Ordering::Acquire),
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us - busy_us),
                    utilization,
                }
            })
            .collect::<Vec<_>>();

        PoolRuntimeSnapshot {
            elapsed,
            completed: workers.iter().map(|worker| worker.tasks_completed).sum(),
            failed: workers.iter().map(|worker| worker.tasks_failed).sum(),
            workers,
        }
    }

    /// Waits for every worker to exit and returns the final runtime metrics.
    ///
    /// Lanes must be closed, the run cancelled or the pool stopped first,
    /// otherwise this blocks until one of those happens.
    pub fn join(mut self) -> Result<PoolRuntimeSnapshot> {
        let mut first_panic = None;
        for handle in self.worker_handles.drain(..) {
            if let Err(payload) = handle.join() {
                let details = if let Some(message) = payload.downcast_ref::<&str>() {
                    (*message).to_string()
                } else if let Some(message) = payload.downcast_ref::<String>() {
                    message.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                first_panic.get_or_insert(details);
            }
        }

        match first_panic {
            Some(details) => Err(BenchError::WorkerPanicked(details)),
            None => Ok(self.runtime_snapshot()),
        }
    }
}

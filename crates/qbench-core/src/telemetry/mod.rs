//! Process-wide benchmark metrics.
//!
//! Counters and sample summaries are keyed by the names in [`tags`]. Recording
//! compiles to nothing unless the `telemetry` feature is enabled, in which case
//! [`snapshot`] returns everything recorded since the last [`reset`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod tags;
pub mod worker;

pub use worker::{DefaultWorkerTelemetry, WorkerTelemetry};

/// Summary of the samples recorded under one histogram name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

#[cfg(feature = "telemetry")]
impl HistogramSnapshot {
    fn observe(&mut self, sample: u64) {
        let first = self.count == 0;
        self.count = self.count.saturating_add(1);
        self.total = self.total.saturating_add(sample);
        self.min = if first { sample } else { self.min.min(sample) };
        self.max = self.max.max(sample);
        self.mean = self.total as f64 / self.count as f64;
    }
}

/// Copy of the metric registry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.histograms.is_empty()
    }
}

/// Adds `delta` to the counter `name`.
#[inline]
pub fn increment_counter(name: &'static str, delta: u64) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        let counter = metrics.counters.entry(name).or_default();
        *counter = counter.saturating_add(delta);
    });

    #[cfg(not(feature = "telemetry"))]
    let _ = (name, delta);
}

/// Adds one sample to the histogram `name`.
#[inline]
pub fn record_histogram(name: &'static str, sample: u64) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| metrics.histograms.entry(name).or_default().observe(sample));

    #[cfg(not(feature = "telemetry"))]
    let _ = (name, sample);
}

/// Everything recorded so far; empty when the `telemetry` feature is off.
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    let snapshot = registry::with(|metrics| TelemetrySnapshot {
        counters: metrics
            .counters
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
        histograms: metrics
            .histograms
            .iter()
            .map(|(name, summary)| (name.to_string(), *summary))
            .collect(),
    });

    #[cfg(not(feature = "telemetry"))]
    let snapshot = TelemetrySnapshot::default();

    snapshot
}

/// Forgets every recorded value.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        metrics.counters.clear();
        metrics.histograms.clear();
    });
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    use super::HistogramSnapshot;

    #[derive(Default)]
    pub(super) struct Metrics {
        pub(super) counters: HashMap<&'static str, u64>,
        pub(super) histograms: HashMap<&'static str, HistogramSnapshot>,
    }

    static METRICS: OnceLock<Mutex<Metrics>> = OnceLock::new();

    pub(super) fn with<T>(f: impl FnOnce(&mut Metrics) -> T) -> T {
        let mut metrics = METRICS
            .get_or_init(Mutex::default)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut metrics)
    }
}

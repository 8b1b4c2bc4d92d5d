use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Latency summary of one benchmark run.
///
/// Produced by [`StatsCollector::freeze`]; every derived field is consistent
/// with the ascending `durations` sequence it was computed from. The samples
/// themselves are not serialized, so a deserialized value keeps its counts
/// and summary but has an empty `durations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Queries executed, successful or not.
    pub total_queries: u64,
    pub successful_queries: u64,
    /// Wall-clock time of the whole run.
    pub processing_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
    pub mean_time: Duration,
    pub median_time: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    #[serde(skip)]
    durations: Vec<Duration>,
}

impl Statistics {
    pub fn success_count(&self) -> u64 {
        self.successful_queries
    }

    pub fn error_count(&self) -> u64 {
        self.total_queries.saturating_sub(self.successful_queries)
    }

    /// Fraction of successful queries in `[0, 1]`, zero when nothing ran.
    pub fn success_ratio(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.success_count() as f64 / self.total_queries as f64
        }
    }

    /// Successful query durations; ascending once computed.
    pub fn durations(&self) -> &[Duration] {
        &self.durations
    }

    /// Sorts the recorded durations and fills in every derived field.
    ///
    /// With no successful samples the derived fields stay zero.
    pub fn compute(&mut self) {
        if self.durations.is_empty() {
            return;
        }

        self.durations.sort_unstable();
        let sorted = &self.durations;
        let n = sorted.len();

        self.min_time = sorted[0];
        self.max_time = sorted[n - 1];

        let mid = n / 2;
        self.median_time = if n % 2 == 0 {
            let low = sorted[mid - 1].as_nanos();
            let high = sorted[mid].as_nanos();
            nanos_to_duration((low + high) / 2)
        } else {
            sorted[mid]
        };

        let total: u128 = sorted.iter().map(Duration::as_nanos).sum();
        self.mean_time = nanos_to_duration(total / n as u128);

        self.p90 = percentile(sorted, 90.0);
        self.p95 = percentile(sorted, 95.0);
        self.p99 = percentile(sorted, 99.0);
    }
}

/// Linear-interpolation percentile over an ascending slice.
///
/// `rank = (p / 100) * (n - 1)`; the result lies between the samples at
/// `floor(rank)` and `floor(rank) + 1`, or is the last sample when that upper
/// index is out of range. Returns zero for an empty slice.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let Some(last) = sorted.last() else {
        return Duration::ZERO;
    };

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank as usize;
    let upper = lower + 1;
    if upper >= sorted.len() {
        return *last;
    }

    let fraction = rank - lower as f64;
    let low = sorted[lower].as_nanos() as f64;
    let high = sorted[upper].as_nanos() as f64;
    Duration::from_nanos((low + fraction * (high - low)) as u64)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Thread-safe accumulator of query outcomes.
///
/// Any number of threads may record concurrently; a single mutex guards the
/// counters and the duration list.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<Statistics>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful query.
    pub fn record(&self, elapsed: Duration) {
        let mut stats = self.lock();
        stats.total_queries += 1;
        stats.successful_queries += 1;
        stats.durations.push(elapsed);
    }

    /// Records a failed query.
    pub fn record_error(&self) {
        self.lock().total_queries += 1;
    }

    pub fn total_count(&self) -> u64 {
        self.lock().total_queries
    }

    pub fn success_count(&self) -> u64 {
        self.lock().success_count()
    }

    /// Stamps the processing time, computes the summary and returns a copy of it.
    pub fn freeze(&self, processing_time: Duration) -> Statistics {
        let mut stats = self.lock();
        stats.processing_time = processing_time;
        stats.compute();
        stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Statistics> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn percentile_interpolates_between_neighbours() {
        let sorted = ms(&[10, 20]);
        assert_eq!(percentile(&sorted, 50.0), Duration::from_millis(15));
        assert_eq!(percentile(&sorted, 0.0), Duration::from_millis(10));
        assert_eq!(percentile(&sorted, 100.0), Duration::from_millis(20));
    }

    #[test]
    fn percentile_of_single_sample_is_that_sample() {
        let sorted = ms(&[42]);
        assert_eq!(percentile(&sorted, 99.0), Duration::from_millis(42));
    }

    #[test]
    fn percentile_of_nothing_is_zero() {
        assert_eq!(percentile(&[], 90.0), Duration::ZERO);
    }

    #[test]
    fn compute_without_samples_leaves_zeroes() {
        let mut stats = Statistics {
            total_queries: 3,
            ..Statistics::default()
        };
        stats.compute();
        assert_eq!(stats.min_time, Duration::ZERO);
        assert_eq!(stats.mean_time, Duration::ZERO);
        assert_eq!(stats.p99, Duration::ZERO);
        assert_eq!(stats.error_count(), 3);
    }
}

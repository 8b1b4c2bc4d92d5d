use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

pub type Result<T> = std::result::Result<T, BenchError>;

/// Layout of the start/end timestamps in input records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One raw input row, as produced by a record source.
pub type RawRecord = Vec<String>;

/// A single query request: which host to query and over which time range.
///
/// Work items are routed by `hostname` so every request for the same host
/// is executed by the same worker, in the order it was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub hostname: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(
        hostname: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            start_time,
            end_time,
        }
    }

    /// The key used for lane routing.
    pub fn partition_key(&self) -> &str {
        &self.hostname
    }
}

/// Timed result of executing one [`WorkItem`].
#[derive(Debug)]
pub struct Outcome {
    /// Lane (and therefore worker) that executed the item.
    pub lane: usize,
    /// Wall-clock time spent in the executor call.
    pub elapsed: Duration,
    /// Set when the executor returned an error.
    pub error: Option<BenchError>,
}

impl Outcome {
    pub fn success(lane: usize, elapsed: Duration) -> Self {
        Self {
            lane,
            elapsed,
            error: None,
        }
    }

    pub fn failure(lane: usize, elapsed: Duration, error: BenchError) -> Self {
        Self {
            lane,
            elapsed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

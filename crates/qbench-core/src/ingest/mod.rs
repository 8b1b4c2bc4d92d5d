//! Input ingestion: turns raw rows into [`WorkItem`]s and routes them onto
//! lanes.
//!
//! Malformed rows and read failures are handled by a single run-wide policy:
//! in strict mode the first one aborts ingestion with that error, in lenient
//! mode it is logged, counted and skipped. Cancellation is checked before
//! every row and while waiting for room on a full lane.

mod source;

pub use source::CsvRecordSource;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::core::Lanes;
use crate::error::BenchError;
use crate::telemetry::{self, tags};
use crate::types::{RawRecord, Result, TIMESTAMP_FORMAT, WorkItem};

/// Number of fields in an input row: hostname, start time, end time.
pub const RECORD_FIELDS: usize = 3;

/// Counters describing what ingestion did with its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Rows parsed and enqueued on a lane.
    pub routed: u64,
    /// Rows skipped in lenient mode.
    pub skipped: u64,
}

/// Parses one raw row into a work item.
///
/// An empty hostname is accepted; it routes like any other key.
pub fn parse_record<S: AsRef<str>>(record: &[S]) -> Result<WorkItem> {
    if record.len() != RECORD_FIELDS {
        return Err(BenchError::InvalidRecord(format!(
            "expected {RECORD_FIELDS} fields, got {}",
            record.len()
        )));
    }

    let start_time = parse_timestamp(record[1].as_ref())
        .map_err(|error| BenchError::InvalidRecord(format!("invalid start time: {error}")))?;
    let end_time = parse_timestamp(record[2].as_ref())
        .map_err(|error| BenchError::InvalidRecord(format!("invalid end time: {error}")))?;

    Ok(WorkItem::new(record[0].as_ref(), start_time, end_time))
}

// chrono accepts unpadded fields, a leading sign and loose whitespace, so a
// parse only counts if it formats back to the exact input.
fn parse_timestamp(value: &str) -> std::result::Result<chrono::DateTime<chrono::Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|error| format!("{value:?}: {error}"))?;
    if naive.format(TIMESTAMP_FORMAT).to_string() != value {
        return Err(format!("{value:?}: does not match {TIMESTAMP_FORMAT:?}"));
    }
    Ok(naive.and_utc())
}

/// Reads `records` to exhaustion and routes every valid row onto `lanes`.
///
/// Returns the ingest counters on normal exhaustion. Returns the first input
/// error in strict mode, or [`BenchError::Cancelled`] once `cancel` fires.
/// Lanes are never closed here; the caller owns them.
pub fn distribute<I>(
    cancel: &CancelToken,
    records: I,
    lanes: &Lanes,
    strict: bool,
) -> Result<IngestSummary>
where
    I: IntoIterator<Item = Result<RawRecord>>,
{
    let mut summary = IngestSummary::default();

    for record in records {
        if cancel.is_cancelled() {
            return Err(BenchError::Cancelled);
        }

        let item = match record.and_then(|raw| parse_record(raw.as_slice())) {
            Ok(item) => item,
            Err(error) if error.is_input_error() && !strict => {
                summary.skipped += 1;
                telemetry::increment_counter(tags::METRIC_INGEST_SKIPPED_COUNT, 1);
                tracing::warn!(target: tags::TARGET_INGEST, %error, "skipping record");
                continue;
            }
            Err(error) => return Err(error),
        };

        let lane = lanes.dispatch(item, cancel)?;
        summary.routed += 1;
        telemetry::increment_counter(tags::METRIC_INGEST_ROUTED_COUNT, 1);
        tracing::trace!(target: tags::TARGET_INGEST, lane, "record routed");
    }

    tracing::debug!(
        target: tags::TARGET_INGEST,
        routed = summary.routed,
        skipped = summary.skipped,
        "input exhausted"
    );
    Ok(summary)
}

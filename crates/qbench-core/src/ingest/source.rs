use std::io::Read;

use crate::error::BenchError;
use crate::types::{RawRecord, Result};

/// Streams rows from CSV input with a header line.
///
/// Rows are read one at a time, so arbitrarily large inputs are never held in
/// memory. The header is consumed on the first call to `next`; an input with
/// no header at all yields a single read failure. Rows whose field count
/// differs from the header are reported as read failures and the stream
/// continues with the next row. An I/O error from the underlying reader ends
/// the stream after being reported once.
pub struct CsvRecordSource<R: Read> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
    header_checked: bool,
    finished: bool,
}

impl<R: Read> CsvRecordSource<R> {
    pub fn new(input: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(input);
        Self {
            reader,
            record: csv::StringRecord::new(),
            header_checked: false,
            finished: false,
        }
    }

    /// 1-based line of the most recently read row.
    pub fn line(&self) -> u64 {
        self.reader.position().line()
    }

    fn check_header(&mut self) -> Result<()> {
        self.header_checked = true;
        let header = self.reader.headers().map_err(read_failure)?;
        if header.is_empty() {
            return Err(BenchError::ReadFailure(
                "failed to read header: input is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl<R: Read> Iterator for CsvRecordSource<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if !self.header_checked {
            if let Err(error) = self.check_header() {
                self.finished = true;
                return Some(Err(error));
            }
        }

        match self.reader.read_record(&mut self.record) {
            Ok(true) => Some(Ok(self.record.iter().map(str::to_owned).collect())),
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(error) => {
                if error.is_io_error() {
                    self.finished = true;
                }
                Some(Err(read_failure(error)))
            }
        }
    }
}

fn read_failure(error: csv::Error) -> BenchError {
    let message = match error.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => {
            let line = pos.as_ref().map_or(0, csv::Position::line);
            format!("line {line}: wrong number of fields (expected {expected_len}, got {len})")
        }
        _ => error.to_string(),
    };
    BenchError::ReadFailure(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_rows_after_the_header() {
        let input = "hostname,start_time,end_time\nhost_1,a,b\nhost_2,c,d\n";
        let rows = CsvRecordSource::new(input.as_bytes())
            .collect::<Result<Vec<_>>>()
            .expect("valid csv");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["host_1", "a", "b"]);
        assert_eq!(rows[1], vec!["host_2", "c", "d"]);
    }

    #[test]
    fn header_only_input_is_empty() {
        let mut source = CsvRecordSource::new("hostname,start_time,end_time".as_bytes());
        assert!(source.next().is_none());
    }

    #[test]
    fn missing_header_is_a_read_failure() {
        let mut source = CsvRecordSource::new("".as_bytes());
        match source.next() {
            Some(Err(BenchError::ReadFailure(message))) => {
                assert!(message.contains("header"), "{message}")
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(source.next().is_none());
    }

    #[test]
    fn short_row_is_reported_and_stream_continues() {
        let input = "h,s,e\nhost_1,a\nhost_2,c,d\n";
        let items = CsvRecordSource::new(input.as_bytes()).collect::<Vec<_>>();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(BenchError::ReadFailure(_))));
        assert!(matches!(&items[1], Ok(row) if row[0] == "host_2"));
    }
}

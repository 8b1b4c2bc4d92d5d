use thiserror::Error;

/// Coarse classification of a [`BenchError`], used for the strict/lenient policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, short or unparseable input row.
    InvalidRecord,
    /// I/O or framing error from the record source.
    ReadFailure,
    /// The query executor returned an error for one work item.
    ExecutionFailed,
    /// Cooperative shutdown was requested.
    Cancelled,
    /// Configuration or infrastructure failure outside the per-record policy.
    Fatal,
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("error reading record: {0}")]
    ReadFailure(String),
    #[error("query execution failed: {0}")]
    ExecutionFailed(String),
    #[error("benchmark cancelled")]
    Cancelled,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("lane {0} is closed; its worker is no longer running")]
    LaneClosed(usize),
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<BenchError>,
    },
}

impl BenchError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classifies this error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRecord(_) => ErrorKind::InvalidRecord,
            Self::ReadFailure(_) | Self::Csv(_) | Self::Io(_) => ErrorKind::ReadFailure,
            Self::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            #[cfg(feature = "postgres")]
            Self::Database(_) => ErrorKind::ExecutionFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Context { source, .. } => source.kind(),
            Self::Config(_) | Self::LaneClosed(_) | Self::WorkerPanicked(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true for failures the strict/lenient input policy decides on.
    pub fn is_input_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidRecord | ErrorKind::ReadFailure)
    }
}

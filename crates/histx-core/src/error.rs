use thiserror::Error;

/// Validation and configuration errors exposed by `histx-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("'{field}' must be at least 1")]
    ZeroLimit { field: &'static str },
    #[error("history_years must be between 1 and {max}, got {value}")]
    InvalidHistoryYears { value: u16, max: u16 },
    #[error("'{field}' must be a positive duration")]
    ZeroDuration { field: &'static str },
}

/// Per-symbol failure cause. Never escapes a worker task; it is carried
/// inside a [`crate::FetchFailure`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream error: {message}")]
    Upstream { message: String, retryable: bool },

    #[error("provider returned no data points for the requested range")]
    EmptySeries,

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("run deadline reached before the symbol settled")]
    RunTimeout,

    #[error("worker task aborted before producing an outcome")]
    Aborted,
}

impl FetchError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedData(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "fetch.upstream",
            Self::EmptySeries => "fetch.empty_series",
            Self::MalformedData(_) => "fetch.malformed_data",
            Self::RunTimeout => "fetch.run_timeout",
            Self::Aborted => "fetch.aborted",
        }
    }

    pub const fn retryable(&self) -> bool {
        match self {
            Self::Upstream { retryable, .. } => *retryable,
            Self::RunTimeout | Self::Aborted => true,
            Self::EmptySeries | Self::MalformedData(_) => false,
        }
    }
}

/// Run-level errors. Any of these terminates the run without a write.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("symbol source unavailable: {0}")]
    SymbolSource(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    InvalidConfig(#[from] ValidationError),
}

impl IngestError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SymbolSource(_) => "ingest.symbol_source",
            Self::Persistence(_) => "ingest.persistence",
            Self::InvalidConfig(_) => "ingest.invalid_config",
        }
    }
}

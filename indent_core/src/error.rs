use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndentError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("write error: {0}")]
    Write(String),
    #[error("read error: {0}")]
    Read(String),
    #[error("timeout waiting for device")]
    ReadTimeout,
    #[error("segment aborted: {0}")]
    SegmentAborted(String),
    #[error("stabilization timeout after {elapsed_ms} ms ({samples} samples collected)")]
    StabilizationTimeout { elapsed_ms: u64, samples: usize },
    #[error("cancelled by shutdown request")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing transport")]
    MissingTransport,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

impl From<BuildError> for IndentError {
    fn from(e: BuildError) -> Self {
        IndentError::Config(e.to_string())
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

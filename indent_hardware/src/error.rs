use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial open failed: {0}")]
    Open(String),
    #[error("serial error: {0}")]
    Serial(String),
    #[error("link closed")]
    Closed,
    #[error("serial read timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "hardware")]
impl From<serialport::Error> for HwError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => HwError::Open(e.to_string()),
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => HwError::Timeout,
            _ => HwError::Serial(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type used at every hardware trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Receiving half of a newline-terminated device link.
///
/// Only the background reader owns one of these; it is the sole caller of `read_line`.
pub trait LineReader {
    /// Read one line with the terminator stripped.
    ///
    /// Returns `Ok(None)` when the configured read timeout expires without a
    /// complete line; never blocks longer than that timeout.
    fn read_line(&mut self) -> Result<Option<String>, BoxError>;

    /// Drop bytes framed or half-framed by earlier reads but not yet returned.
    ///
    /// Called by the reader thread when the controller flushes input; links
    /// that keep no buffer of their own can rely on the default.
    fn discard_buffered(&mut self) {}
}

/// Command half of a device link (port, baud and timeout are fixed at open).
pub trait Transport {
    /// Write `line` followed by a newline terminator.
    fn send_line(&mut self, line: &str) -> Result<(), BoxError>;

    /// Discard any bytes received but not yet read.
    fn clear_input(&mut self) -> Result<(), BoxError>;

    /// Split off the receiving half for the background reader.
    fn reader(&mut self) -> Result<Box<dyn LineReader + Send>, BoxError>;

    /// Close the link. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), BoxError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        (**self).send_line(line)
    }
    fn clear_input(&mut self) -> Result<(), BoxError> {
        (**self).clear_input()
    }
    fn reader(&mut self) -> Result<Box<dyn LineReader + Send>, BoxError> {
        (**self).reader()
    }
    fn close(&mut self) -> Result<(), BoxError> {
        (**self).close()
    }
}

impl<R: LineReader + ?Sized> LineReader for Box<R> {
    fn read_line(&mut self) -> Result<Option<String>, BoxError> {
        (**self).read_line()
    }
    fn discard_buffered(&mut self) {
        (**self).discard_buffered()
    }
}

//! Maps `Box<dyn Error>` from trait boundaries to typed `IndentError`.
//!
//! The traits in `indent_traits` use `Box<dyn Error + Send + Sync>` so any link
//! can plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `indent_hardware::HwError` downcasting.

use crate::error::IndentError;

/// Which link operation produced the error; picks the fallback variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    Open,
    Write,
    Read,
    Close,
}

/// Map a trait-boundary error to a typed `IndentError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static), op: LinkOp) -> IndentError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use indent_hardware::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => IndentError::ReadTimeout,
                HwError::Open(msg) => IndentError::Connection(msg.clone()),
                HwError::Closed => IndentError::Connection(hw.to_string()),
                other => fallback(other.to_string(), op),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        IndentError::ReadTimeout
    } else {
        fallback(s, op)
    }
}

fn fallback(msg: String, op: LinkOp) -> IndentError {
    match op {
        LinkOp::Open | LinkOp::Close => IndentError::Connection(msg),
        LinkOp::Write => IndentError::Write(msg),
        LinkOp::Read => IndentError::Read(msg),
    }
}

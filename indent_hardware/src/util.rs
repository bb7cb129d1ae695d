//! Byte-stream to line framing shared by the serial and simulated links.

/// Longest partial line kept before the buffer is discarded as garbage.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Accumulates raw bytes and yields complete, trimmed, non-empty lines.
///
/// Partial lines survive across reads, so a read timeout in the middle of a
/// line never loses the bytes already received.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            tracing::warn!(
                dropped = self.pending.len(),
                "no line terminator within limit; discarding buffered bytes"
            );
            self.pending.clear();
        }
    }

    /// Pop the next complete line, skipping blank ones.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    /// Drop everything buffered, including a partial line.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

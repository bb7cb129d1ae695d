//! `serialport`-backed link to the rig controller.

use std::io::{Read, Write};
use std::time::Duration;

use indent_traits::{BoxError, LineReader, Transport};
use serialport::{ClearBuffer, SerialPort};

use crate::error::{HwError, Result};
use crate::util::LineAssembler;

/// Command half of an open serial connection.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    baud: u32,
    timeout: Duration,
}

impl core::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.name)
            .field("baud", &self.baud)
            .field("timeout", &self.timeout)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialTransport {
    /// Open `port` at `baud`; every read blocks at most `timeout`.
    pub fn open(port: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let handle = serialport::new(port, baud)
            .timeout(timeout)
            .open()
            .map_err(|e| HwError::Open(format!("{port}: {e}")))?;
        tracing::info!(port, baud, timeout_ms = timeout.as_millis() as u64, "serial open");
        Ok(Self {
            port: Some(handle),
            name: port.to_string(),
            baud,
            timeout,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn handle(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(HwError::Closed)
    }
}

impl Transport for SerialTransport {
    fn send_line(&mut self, line: &str) -> std::result::Result<(), BoxError> {
        let port = self.handle()?;
        port.write_all(line.as_bytes()).map_err(HwError::from)?;
        port.write_all(b"\n").map_err(HwError::from)?;
        port.flush().map_err(HwError::from)?;
        tracing::trace!(line, "serial tx");
        Ok(())
    }

    fn clear_input(&mut self) -> std::result::Result<(), BoxError> {
        self.handle()?
            .clear(ClearBuffer::Input)
            .map_err(HwError::from)?;
        Ok(())
    }

    fn reader(&mut self) -> std::result::Result<Box<dyn LineReader + Send>, BoxError> {
        let clone = self.handle()?.try_clone().map_err(HwError::from)?;
        Ok(Box::new(SerialLineReader {
            port: clone,
            assembler: LineAssembler::new(),
        }))
    }

    fn close(&mut self) -> std::result::Result<(), BoxError> {
        if self.port.take().is_some() {
            tracing::info!(port = %self.name, "serial closed");
        }
        Ok(())
    }
}

/// Receiving half: a cloned port handle plus line framing state.
pub struct SerialLineReader {
    port: Box<dyn SerialPort>,
    assembler: LineAssembler,
}

impl LineReader for SerialLineReader {
    fn read_line(&mut self) -> std::result::Result<Option<String>, BoxError> {
        if let Some(line) = self.assembler.next_line() {
            return Ok(Some(line));
        }
        // One blocking read per call keeps the call bounded by the port timeout.
        let mut buf = [0u8; 256];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.assembler.push(&buf[..n]);
                Ok(self.assembler.next_line())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn discard_buffered(&mut self) {
        let dropped = self.assembler.pending_len();
        self.assembler.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded framed input");
        }
    }
}

//! Device links for the indentation rig.
//!
//! - `SimulatedRig`: in-process rig speaking the firmware protocol (always available)
//! - `SerialTransport`: real serial port via `serialport` (feature `hardware`)
pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;
pub mod util;

pub use error::HwError;
#[cfg(feature = "hardware")]
pub use serial::{SerialLineReader, SerialTransport};
pub use sim::{SimConfig, SimMarker, SimulatedRig};

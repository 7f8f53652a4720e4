//! Line-claim facility consumed by the bit link.
//!
//! A facility hands out one output line (the HX711 `PD_SCK` clock) and one input
//! line (`DOUT`). Levels are driven and sampled through the `embedded-hal` 1.0
//! digital traits; a line is released when its handle is dropped.

use embedded_hal::digital::{self, ErrorKind, InputPin, OutputPin, PinState};
use serde::{Deserialize, Serialize};

use crate::error::{LoadCellError, Result};

/// Line offsets of the two HX711 wires on the GPIO chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePins {
    /// `DOUT`, read by the host
    pub data: u32,
    /// `PD_SCK`, driven by the host
    pub clock: u32,
}

impl Default for LinePins {
    fn default() -> Self {
        Self { data: 5, clock: 6 }
    }
}

/// Source of claimed digital lines
pub trait LineFacility: Send {
    type Clock: OutputPin + Send;
    type Data: InputPin + Send;

    /// Claim `line` as an output driven to `initial` immediately.
    fn claim_output(&mut self, line: u32, initial: PinState) -> Result<Self::Clock>;

    /// Claim `line` as an input.
    fn claim_input(&mut self, line: u32) -> Result<Self::Data>;
}

/// Error reported by a claimed line handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError(pub String);

impl digital::Error for LineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<std::io::Error> for LineError {
    fn from(err: std::io::Error) -> Self {
        LineError(err.to_string())
    }
}

pub(crate) fn line_io<E: digital::Error>(err: E) -> LoadCellError {
    LoadCellError::LineIo(format!("{err:?}"))
}

//! Linux GPIO character-device backend.
//!
//! Lines are requested through `gpiod`, one request per line so the clock and data
//! handles can be owned separately by the bit link.

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};
use gpiod::{Chip, Input, Lines, Options, Output};

use crate::error::{LoadCellError, Result};
use crate::line::{LineError, LineFacility};

const CONSUMER: &str = "massa-hx711";

pub struct GpiodFacility {
    chip_name: String,
}

impl GpiodFacility {
    pub fn new(chip_name: impl Into<String>) -> Self {
        Self {
            chip_name: chip_name.into(),
        }
    }

    fn open_chip(&self) -> Result<Chip> {
        Chip::new(&self.chip_name).map_err(|e| {
            LoadCellError::DeviceInit(format!("failed to open GPIO chip '{}': {e}", self.chip_name))
        })
    }
}

impl LineFacility for GpiodFacility {
    type Clock = GpiodOutput;
    type Data = GpiodInput;

    fn claim_output(&mut self, line: u32, initial: PinState) -> Result<GpiodOutput> {
        let options = Options::output([line])
            .values([initial == PinState::High])
            .consumer(CONSUMER);

        let lines = self.open_chip()?.request_lines(options).map_err(|e| {
            LoadCellError::DeviceInit(format!("failed to claim line {line} as output: {e}"))
        })?;

        Ok(GpiodOutput { lines })
    }

    fn claim_input(&mut self, line: u32) -> Result<GpiodInput> {
        let options = Options::input([line]).consumer(CONSUMER);

        let lines = self.open_chip()?.request_lines(options).map_err(|e| {
            LoadCellError::DeviceInit(format!("failed to claim line {line} as input: {e}"))
        })?;

        Ok(GpiodInput { lines })
    }
}

pub struct GpiodOutput {
    lines: Lines<Output>,
}

impl ErrorType for GpiodOutput {
    type Error = LineError;
}

impl OutputPin for GpiodOutput {
    fn set_low(&mut self) -> std::result::Result<(), LineError> {
        self.lines.set_values([false]).map_err(LineError::from)
    }

    fn set_high(&mut self) -> std::result::Result<(), LineError> {
        self.lines.set_values([true]).map_err(LineError::from)
    }
}

pub struct GpiodInput {
    lines: Lines<Input>,
}

impl ErrorType for GpiodInput {
    type Error = LineError;
}

impl InputPin for GpiodInput {
    fn is_high(&mut self) -> std::result::Result<bool, LineError> {
        let [level] = self.lines.get_values([false; 1]).map_err(LineError::from)?;
        Ok(level)
    }

    fn is_low(&mut self) -> std::result::Result<bool, LineError> {
        self.is_high().map(|level| !level)
    }
}

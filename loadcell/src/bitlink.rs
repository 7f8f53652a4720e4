//! Two-wire clocked link to the HX711.
//!
//! The chip's shift register advances exactly once per rising edge on `PD_SCK`,
//! so every pulse issued here must complete before the next one starts. The
//! link has no session boundary of its own; callers serialize access.

use std::thread;
use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use tracing::{debug, trace};

use crate::error::{LoadCellError, Result};
use crate::line::{line_io, LineFacility, LinePins};

/// Clock held high for longer than 60us puts the chip to sleep
const POWER_DOWN_HOLD: Duration = Duration::from_micros(100);
const POWER_UP_SETTLE: Duration = Duration::from_millis(10);

pub struct BitLink<C, D> {
    lines: Option<(C, D)>,
}

impl<C, D> BitLink<C, D>
where
    C: OutputPin,
    D: InputPin,
{
    /// Claim the clock line as an output driven low and the data line as an input.
    pub fn open<F>(facility: &mut F, pins: LinePins) -> Result<Self>
    where
        F: LineFacility<Clock = C, Data = D>,
    {
        let clock = facility.claim_output(pins.clock, PinState::Low)?;
        let data = facility.claim_input(pins.data)?;
        debug!(clock = pins.clock, data = pins.data, "HX711 lines claimed");

        Ok(Self {
            lines: Some((clock, data)),
        })
    }

    pub fn is_open(&self) -> bool {
        self.lines.is_some()
    }

    fn lines(&mut self) -> Result<&mut (C, D)> {
        self.lines.as_mut().ok_or(LoadCellError::LinkClosed)
    }

    /// `DOUT` low means a conversion is waiting to be shifted out.
    pub fn is_ready(&mut self) -> Result<bool> {
        let (_, data) = self.lines()?;
        data.is_low().map_err(line_io)
    }

    /// One clock pulse, sampling `DOUT` while the clock is high.
    pub fn transfer_bit(&mut self) -> Result<bool> {
        let (clock, data) = self.lines()?;
        clock.set_high().map_err(line_io)?;
        let bit = data.is_high().map_err(line_io);
        clock.set_low().map_err(line_io)?;
        bit
    }

    /// `count` clock pulses with `DOUT` ignored.
    pub fn pulse(&mut self, count: u32) -> Result<()> {
        let (clock, _) = self.lines()?;
        for _ in 0..count {
            clock.set_high().map_err(line_io)?;
            clock.set_low().map_err(line_io)?;
        }
        Ok(())
    }

    pub fn power_down(&mut self) -> Result<()> {
        let (clock, _) = self.lines()?;
        clock.set_low().map_err(line_io)?;
        clock.set_high().map_err(line_io)?;
        thread::sleep(POWER_DOWN_HOLD);
        trace!("HX711 powered down");
        Ok(())
    }

    /// Wakes the chip. The first conversion after wake-up uses the default gain.
    pub fn power_up(&mut self) -> Result<()> {
        let (clock, _) = self.lines()?;
        clock.set_low().map_err(line_io)?;
        thread::sleep(POWER_UP_SETTLE);
        trace!("HX711 powered up");
        Ok(())
    }

    /// Release both lines. Safe to call on an already closed link.
    pub fn close(&mut self) {
        if self.lines.take().is_some() {
            debug!("HX711 lines released");
        }
    }
}

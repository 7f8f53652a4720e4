//! In-process HX711 model for running without hardware.
//!
//! The model follows the chip's serial behaviour: `DOUT` sits low while a
//! conversion is waiting, every rising clock edge shifts out the next bit MSB
//! first, and pulses beyond the 24th are counted as the gain trailer of the
//! frame. Clones share one chip, so a test can keep a handle for fault
//! injection and inspection while the scale owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

use crate::error::{LoadCellError, Result};
use crate::line::{LineError, LineFacility};
use crate::sampler::{encode, RawSample, ADC_BITS};

#[derive(Debug)]
struct SimChip {
    pending: VecDeque<RawSample>,
    idle_raw: RawSample,
    current: u32,
    /// `current` came from `idle_raw`, not the queue
    current_is_idle: bool,
    clock_high: bool,
    frame_pulses: u32,
    trailers: Vec<u32>,
    total_pulses: u64,
    claimed: Vec<u32>,
    claims: u32,
    fail_claims: bool,
    never_ready: bool,
    fail_io: bool,
}

impl SimChip {
    fn next_conversion(&mut self) {
        let queued = self.pending.pop_front();
        self.current_is_idle = queued.is_none();
        self.current = encode(queued.unwrap_or(self.idle_raw));
    }

    /// An idle conversion nobody has started clocking out yet is replaced by
    /// whatever the test queued or configured since.
    fn refresh_unread_idle(&mut self) {
        if self.frame_pulses == 0 && self.current_is_idle {
            self.next_conversion();
        }
    }

    fn data_level(&mut self) -> bool {
        if self.frame_pulses > ADC_BITS {
            self.trailers.push(self.frame_pulses - ADC_BITS);
            self.frame_pulses = 0;
            self.next_conversion();
        }

        match self.frame_pulses {
            0 => self.never_ready,
            n if n <= ADC_BITS => (self.current >> (ADC_BITS - n)) & 1 == 1,
            _ => true,
        }
    }

    /// A reclaimed clock line starts a fresh frame
    fn resync(&mut self) {
        if self.frame_pulses > ADC_BITS {
            self.trailers.push(self.frame_pulses - ADC_BITS);
        }
        if self.frame_pulses != 0 {
            self.frame_pulses = 0;
            self.next_conversion();
        }
    }

    fn set_clock(&mut self, high: bool) {
        if high && !self.clock_high {
            self.frame_pulses += 1;
            self.total_pulses += 1;
        }
        self.clock_high = high;
    }
}

/// Shared handle to a simulated HX711
#[derive(Debug, Clone)]
pub struct SimulatedHx711 {
    chip: Arc<Mutex<SimChip>>,
}

impl SimulatedHx711 {
    /// New chip that converts `idle_raw` whenever no queued reading is pending
    pub fn new(idle_raw: RawSample) -> Self {
        let mut chip = SimChip {
            pending: VecDeque::new(),
            idle_raw,
            current: 0,
            current_is_idle: true,
            clock_high: false,
            frame_pulses: 0,
            trailers: Vec::new(),
            total_pulses: 0,
            claimed: Vec::new(),
            claims: 0,
            fail_claims: false,
            never_ready: false,
            fail_io: false,
        };
        chip.next_conversion();
        Self {
            chip: Arc::new(Mutex::new(chip)),
        }
    }

    fn chip(&self) -> MutexGuard<'_, SimChip> {
        self.chip.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue conversions served before falling back to the idle value
    pub fn push_readings(&self, readings: impl IntoIterator<Item = RawSample>) {
        let mut chip = self.chip();
        chip.pending.extend(readings);
        chip.refresh_unread_idle();
    }

    /// Change the value served when the queue is empty
    pub fn set_idle_raw(&self, raw: RawSample) {
        let mut chip = self.chip();
        chip.idle_raw = raw;
        chip.refresh_unread_idle();
    }

    /// Keep `DOUT` high so every readiness wait times out
    pub fn set_never_ready(&self, never_ready: bool) {
        self.chip().never_ready = never_ready;
    }

    /// Make line claims fail as if the chip were missing or busy
    pub fn set_fail_claims(&self, fail: bool) {
        self.chip().fail_claims = fail;
    }

    /// Make every level access on claimed lines fail
    pub fn set_fail_io(&self, fail: bool) {
        self.chip().fail_io = fail;
    }

    /// Clock pulses seen since the chip was created
    pub fn total_pulses(&self) -> u64 {
        self.chip().total_pulses
    }

    /// Trailer pulse count of every completed frame, oldest first
    pub fn trailers(&self) -> Vec<u32> {
        self.chip().trailers.clone()
    }

    /// Successful line claims since the chip was created
    pub fn claims(&self) -> u32 {
        self.chip().claims
    }

    /// Lines currently held by a handle
    pub fn claimed_lines(&self) -> Vec<u32> {
        self.chip().claimed.clone()
    }

    fn claim(&self, line: u32) -> Result<()> {
        let mut chip = self.chip();
        if chip.fail_claims {
            return Err(LoadCellError::DeviceInit(
                "simulated GPIO chip unavailable".into(),
            ));
        }
        if chip.claimed.contains(&line) {
            return Err(LoadCellError::DeviceInit(format!("line {line} is busy")));
        }
        chip.claimed.push(line);
        chip.claims += 1;
        Ok(())
    }
}

impl LineFacility for SimulatedHx711 {
    type Clock = SimClock;
    type Data = SimData;

    fn claim_output(&mut self, line: u32, initial: PinState) -> Result<SimClock> {
        self.claim(line)?;
        let mut chip = self.chip();
        chip.resync();
        chip.set_clock(initial == PinState::High);
        drop(chip);
        Ok(SimClock {
            sim: self.clone(),
            line,
        })
    }

    fn claim_input(&mut self, line: u32) -> Result<SimData> {
        self.claim(line)?;
        Ok(SimData {
            sim: self.clone(),
            line,
        })
    }
}

fn release(sim: &SimulatedHx711, line: u32) {
    sim.chip().claimed.retain(|claimed| *claimed != line);
}

pub struct SimClock {
    sim: SimulatedHx711,
    line: u32,
}

impl ErrorType for SimClock {
    type Error = LineError;
}

impl OutputPin for SimClock {
    fn set_low(&mut self) -> std::result::Result<(), LineError> {
        self.set_state(PinState::Low)
    }

    fn set_high(&mut self) -> std::result::Result<(), LineError> {
        self.set_state(PinState::High)
    }

    fn set_state(&mut self, state: PinState) -> std::result::Result<(), LineError> {
        let mut chip = self.sim.chip();
        if chip.fail_io {
            return Err(LineError("simulated write failure".into()));
        }
        chip.set_clock(state == PinState::High);
        Ok(())
    }
}

impl Drop for SimClock {
    fn drop(&mut self) {
        release(&self.sim, self.line);
    }
}

pub struct SimData {
    sim: SimulatedHx711,
    line: u32,
}

impl ErrorType for SimData {
    type Error = LineError;
}

impl InputPin for SimData {
    fn is_high(&mut self) -> std::result::Result<bool, LineError> {
        let mut chip = self.sim.chip();
        if chip.fail_io {
            return Err(LineError("simulated read failure".into()));
        }
        Ok(chip.data_level())
    }

    fn is_low(&mut self) -> std::result::Result<bool, LineError> {
        self.is_high().map(|level| !level)
    }
}

impl Drop for SimData {
    fn drop(&mut self) {
        release(&self.sim, self.line);
    }
}

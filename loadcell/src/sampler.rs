//! One 24-bit conversion at a time from the HX711.

use std::thread;
use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bitlink::BitLink;
use crate::error::{LoadCellError, Result};

/// Signed 24-bit conversion result
pub type RawSample = i32;

pub const ADC_BITS: u32 = 24;
pub const RAW_MIN: RawSample = -(1 << 23);
pub const RAW_MAX: RawSample = (1 << 23) - 1;

const CODE_MASK: u32 = (1 << ADC_BITS) - 1;
const SIGN_BIT: u32 = 1 << (ADC_BITS - 1);

/// Two's-complement decode of a 24-bit code. Bits above 23 are ignored.
pub fn decode(code: u32) -> RawSample {
    let code = code & CODE_MASK;
    if code & SIGN_BIT != 0 {
        code as i32 - (1 << ADC_BITS)
    } else {
        code as i32
    }
}

/// 24-bit two's-complement code for `value`, which must lie in `RAW_MIN..=RAW_MAX`.
pub fn encode(value: RawSample) -> u32 {
    (value as u32) & CODE_MASK
}

/// Channel and gain of the conversion following a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gain {
    /// Channel A, gain 128
    #[default]
    Gain128,
    /// Channel A, gain 64
    Gain64,
    /// Channel B, gain 32
    Gain32,
}

impl Gain {
    /// Clock pulses appended after the 24 data bits to select this gain
    pub fn trailer_pulses(self) -> u32 {
        match self {
            Gain::Gain128 => 1,
            Gain::Gain64 => 3,
            Gain::Gain32 => 2,
        }
    }

    pub fn factor(self) -> u32 {
        match self {
            Gain::Gain128 => 128,
            Gain::Gain64 => 64,
            Gain::Gain32 => 32,
        }
    }
}

impl TryFrom<u32> for Gain {
    type Error = LoadCellError;

    fn try_from(factor: u32) -> Result<Self> {
        match factor {
            128 => Ok(Gain::Gain128),
            64 => Ok(Gain::Gain64),
            32 => Ok(Gain::Gain32),
            other => Err(LoadCellError::UnsupportedGain(other)),
        }
    }
}

/// Bound on the wait for `DOUT` to signal a finished conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyWait {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ReadyWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            max_polls: 1000,
        }
    }
}

/// Anything that produces raw conversions one at a time
pub trait StrainGauge {
    fn read_raw(&mut self) -> Result<RawSample>;
}

pub struct AdcSampler<C, D> {
    link: BitLink<C, D>,
    gain: Gain,
    ready: ReadyWait,
}

impl<C, D> AdcSampler<C, D>
where
    C: OutputPin,
    D: InputPin,
{
    pub fn new(link: BitLink<C, D>, gain: Gain, ready: ReadyWait) -> Self {
        Self { link, gain, ready }
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Select the gain for later conversions. The trailer of the next read
    /// carries the new setting, so the conversion after that one uses it.
    pub fn set_gain(&mut self, gain: Gain) {
        if gain != self.gain {
            debug!(gain = gain.factor(), "HX711 gain changed");
        }
        self.gain = gain;
    }

    fn wait_ready(&mut self) -> Result<()> {
        let polls = self.ready.max_polls.max(1);
        for _ in 0..polls {
            if self.link.is_ready()? {
                return Ok(());
            }
            thread::sleep(self.ready.poll_interval);
        }
        Err(LoadCellError::DeviceTimeout { polls })
    }

    pub fn power_down(&mut self) -> Result<()> {
        self.link.power_down()
    }

    pub fn power_up(&mut self) -> Result<()> {
        self.link.power_up()
    }

    pub fn close(&mut self) {
        self.link.close();
    }
}

impl<C, D> StrainGauge for AdcSampler<C, D>
where
    C: OutputPin,
    D: InputPin,
{
    fn read_raw(&mut self) -> Result<RawSample> {
        self.wait_ready()?;

        let mut code: u32 = 0;
        for _ in 0..ADC_BITS {
            code = (code << 1) | u32::from(self.link.transfer_bit()?);
        }
        self.link.pulse(self.gain.trailer_pulses())?;

        let raw = decode(code);
        trace!(code, raw, "HX711 conversion");
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LinePins;
    use crate::sim::{SimClock, SimData, SimulatedHx711};
    use proptest::prelude::*;

    fn sampler(sim: &SimulatedHx711) -> AdcSampler<SimClock, SimData> {
        let mut facility = sim.clone();
        let link = BitLink::open(&mut facility, LinePins::default()).unwrap();
        let ready = ReadyWait {
            poll_interval: Duration::ZERO,
            max_polls: 5,
        };
        AdcSampler::new(link, Gain::default(), ready)
    }

    #[test]
    fn test_decode_boundaries() {
        assert_eq!(decode(0x000000), 0);
        assert_eq!(decode(0x000001), 1);
        assert_eq!(decode(0x7F_FFFF), RAW_MAX);
        assert_eq!(decode(0x80_0000), RAW_MIN);
        assert_eq!(decode(0xFF_FFFF), -1);
        assert_eq!(decode(0xFF_FFF3), -13);
    }

    #[test]
    fn test_decode_ignores_high_bits() {
        assert_eq!(decode(0xFF00_0005), 5);
    }

    proptest! {
        #[test]
        fn test_decode_matches_definition(code in 0u32..(1 << 24)) {
            let expected = if code < (1 << 23) {
                code as i64
            } else {
                code as i64 - (1 << 24)
            };
            prop_assert_eq!(decode(code) as i64, expected);
        }

        #[test]
        fn test_encode_then_decode_is_identity(value in RAW_MIN..=RAW_MAX) {
            prop_assert_eq!(decode(encode(value)), value);
        }
    }

    #[test]
    fn test_gain_from_factor() {
        assert_eq!(Gain::try_from(128), Ok(Gain::Gain128));
        assert_eq!(Gain::try_from(64), Ok(Gain::Gain64));
        assert_eq!(Gain::try_from(32), Ok(Gain::Gain32));
        assert_eq!(Gain::try_from(16), Err(LoadCellError::UnsupportedGain(16)));
    }

    #[test]
    fn test_read_raw_decodes_negative_values() {
        let sim = SimulatedHx711::new(0);
        sim.push_readings([-12_345, 4_321]);
        let mut sampler = sampler(&sim);
        assert_eq!(sampler.read_raw().unwrap(), -12_345);
        assert_eq!(sampler.read_raw().unwrap(), 4_321);
        assert_eq!(sampler.read_raw().unwrap(), 0);
    }

    #[test]
    fn test_read_raw_issues_25_pulses_at_default_gain() {
        let sim = SimulatedHx711::new(77);
        let mut sampler = sampler(&sim);
        sampler.read_raw().unwrap();
        assert_eq!(sim.total_pulses(), 25);
    }

    #[test]
    fn test_gain_change_applies_from_next_read() {
        let sim = SimulatedHx711::new(1);
        let mut sampler = sampler(&sim);
        sampler.read_raw().unwrap();
        sampler.set_gain(Gain::Gain64);
        sampler.read_raw().unwrap();
        sampler.set_gain(Gain::Gain32);
        sampler.read_raw().unwrap();
        // the last frame completes when the next readiness poll happens
        sampler.read_raw().unwrap();
        assert_eq!(sim.trailers(), vec![1, 3, 2]);
    }

    #[test]
    fn test_read_raw_times_out_when_never_ready() {
        let sim = SimulatedHx711::new(0);
        sim.set_never_ready(true);
        let mut sampler = sampler(&sim);
        assert_eq!(
            sampler.read_raw(),
            Err(LoadCellError::DeviceTimeout { polls: 5 })
        );
        assert_eq!(sim.total_pulses(), 0);
    }
}

//! Device health around the sampler.
//!
//! Hardware failures never leave this module as errors. A failed claim,
//! readiness timeout or line fault releases the lines and flips the monitor to
//! `Unavailable`; from then on every acquisition first retries the claim and,
//! if that fails too, answers with the sentinel reading without touching the
//! hardware.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bitlink::BitLink;
use crate::error::{LoadCellError, Result};
use crate::line::{LineFacility, LinePins};
use crate::sampler::{AdcSampler, Gain, RawSample, ReadyWait, StrainGauge};
use crate::stabilize::{acquire_stable, check_sample_count, OutlierFilter};

/// Raw value reported while the load cell is unavailable
pub const SENTINEL_RAW: RawSample = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Available,
    Unavailable,
}

/// A raw count, stabilized count or weight, flagged with whether it came from
/// the chip. Unavailable values are the sentinel or a demo weight derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Acquisition {
    pub value: f64,
    pub device_available: bool,
}

impl Acquisition {
    pub fn available(value: f64) -> Self {
        Self {
            value,
            device_available: true,
        }
    }

    pub fn unavailable(value: f64) -> Self {
        Self {
            value,
            device_available: false,
        }
    }
}

pub struct HealthMonitor<F: LineFacility> {
    facility: F,
    pins: LinePins,
    gain: Gain,
    ready: ReadyWait,
    sentinel: RawSample,
    sampler: Option<AdcSampler<F::Clock, F::Data>>,
    last_error: Option<LoadCellError>,
}

impl<F: LineFacility> HealthMonitor<F> {
    /// The monitor starts `Unavailable`; call [`HealthMonitor::reinitialize`] to claim the lines.
    pub fn new(facility: F, pins: LinePins, gain: Gain, ready: ReadyWait, sentinel: RawSample) -> Self {
        Self {
            facility,
            pins,
            gain,
            ready,
            sentinel,
            sampler: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        if self.sampler.is_some() {
            DeviceStatus::Available
        } else {
            DeviceStatus::Unavailable
        }
    }

    /// Most recent hardware failure, cleared by a successful re-initialization
    pub fn last_error(&self) -> Option<&LoadCellError> {
        self.last_error.as_ref()
    }

    pub fn sentinel(&self) -> Acquisition {
        Acquisition::unavailable(f64::from(self.sentinel))
    }

    /// Release any held lines and claim them again.
    pub fn reinitialize(&mut self) -> Result<()> {
        self.release();

        // a chip left asleep by a previous owner wakes once the clock is low
        let opened = BitLink::open(&mut self.facility, self.pins).and_then(|link| {
            let mut sampler = AdcSampler::new(link, self.gain, self.ready);
            sampler.power_up()?;
            Ok(sampler)
        });

        match opened {
            Ok(sampler) => {
                self.sampler = Some(sampler);
                self.last_error = None;
                info!(clock = self.pins.clock, data = self.pins.data, "HX711 initialized");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "HX711 initialization failed");
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn ensure_available(&mut self) -> bool {
        self.sampler.is_some() || self.reinitialize().is_ok()
    }

    /// Drop the lines so the next acquisition claims them afresh.
    pub(crate) fn release(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.close();
        }
    }

    fn mark_unavailable(&mut self, err: LoadCellError) {
        warn!(error = %err, sentinel = self.sentinel, "HX711 read failed, falling back to sentinel");
        self.release();
        self.last_error = Some(err);
    }

    pub fn set_gain(&mut self, gain: Gain) {
        self.gain = gain;
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.set_gain(gain);
        }
    }

    /// A single conversion, or the sentinel.
    pub fn read_raw(&mut self) -> Acquisition {
        if !self.ensure_available() {
            return self.sentinel();
        }
        let Some(sampler) = self.sampler.as_mut() else {
            return self.sentinel();
        };

        match sampler.read_raw() {
            Ok(raw) => Acquisition::available(f64::from(raw)),
            Err(err) => {
                self.mark_unavailable(err);
                self.sentinel()
            }
        }
    }

    /// A stabilized batch, or the sentinel. Only caller errors such as a zero
    /// sample count are returned as `Err`.
    pub fn acquire_stable(
        &mut self,
        sample_count: usize,
        filter: &OutlierFilter,
        delay: Duration,
    ) -> Result<Acquisition> {
        check_sample_count(sample_count)?;
        if !self.ensure_available() {
            return Ok(self.sentinel());
        }
        let Some(sampler) = self.sampler.as_mut() else {
            return Ok(self.sentinel());
        };

        match acquire_stable(sampler, sample_count, filter, delay) {
            Ok(value) => Ok(Acquisition::available(value)),
            Err(err) if err.is_transient_hardware() => {
                self.mark_unavailable(err);
                Ok(self.sentinel())
            }
            Err(err) => Err(err),
        }
    }

    /// Put the chip to sleep and release the lines. Errors are logged only.
    pub fn shutdown(&mut self) {
        if let Some(sampler) = self.sampler.as_mut() {
            if let Err(err) = sampler.power_down() {
                warn!(error = %err, "HX711 power down failed");
            }
        }
        self.release();
    }
}

impl<F: LineFacility> Drop for HealthMonitor<F> {
    fn drop(&mut self) {
        self.release();
    }
}

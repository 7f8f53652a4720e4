//! The shared weighing context.
//!
//! One mutex guards the hardware link, the calibration profile and the
//! weight history together, so a tare can never interleave with a weight read
//! at the bit level. Every method blocks for as long as its conversions take
//! and must be called from a blocking worker, not an async executor.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::calibration::{validate_known_mass, CalibrationProfile};
use crate::config::{Backend, ScaleConfig};
use crate::error::{LoadCellError, Result};
use crate::gpio::GpiodFacility;
use crate::health::{Acquisition, DeviceStatus, HealthMonitor};
use crate::line::LineFacility;
use crate::sampler::Gain;
use crate::sim::SimulatedHx711;
use crate::stabilize::{OutlierFilter, WeightHistory};

/// Batch sizes, pacing and filters used by the weighing operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionSettings {
    pub weight_samples: usize,
    pub tare_samples: usize,
    pub calibration_samples: usize,
    pub sample_delay: Duration,
    pub raw_filter: OutlierFilter,
    pub history_filter: OutlierFilter,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            weight_samples: 10,
            tare_samples: 20,
            calibration_samples: 20,
            sample_delay: Duration::from_millis(100),
            raw_filter: OutlierFilter::RAW,
            history_filter: OutlierFilter::HISTORY,
        }
    }
}

/// Operations the HTTP layer and the calibration utility rely on
pub trait WeighingSystem: Send + Sync {
    /// Smoothed weight for continuous display. Tares implicitly on the first
    /// call if the profile still holds the placeholder offset.
    fn get_weight(&self) -> Result<Acquisition>;

    /// Weight of one fresh stabilized batch, bypassing the history window.
    fn read_units(&self) -> Result<Acquisition>;

    fn read_raw(&self) -> Result<Acquisition>;

    /// Store a fresh stabilized reading as the zero offset and return it.
    fn tare(&self, sample_count: usize) -> Result<f64>;

    /// Derive the scale factor from `known_mass` resting on the scale.
    fn calibrate(&self, known_mass: f64, sample_count: usize) -> Result<CalibrationProfile>;

    fn set_reference_from_known_mass(&self, known_mass: f64) -> Result<CalibrationProfile> {
        self.calibrate(known_mass, self.settings().calibration_samples)
    }

    fn get_calibration(&self) -> Result<CalibrationProfile>;

    fn set_gain(&self, gain: Gain) -> Result<()>;

    fn status(&self) -> Result<DeviceStatus>;

    /// Most recent hardware failure, cleared once the lines are claimed again.
    fn last_error(&self) -> Result<Option<LoadCellError>>;

    fn reinitialize(&self) -> Result<DeviceStatus>;

    fn shutdown(&self) -> Result<()>;

    fn settings(&self) -> &AcquisitionSettings;
}

struct ScaleState<F: LineFacility> {
    monitor: HealthMonitor<F>,
    profile: CalibrationProfile,
    history: WeightHistory,
}

pub struct Scale<F: LineFacility> {
    state: Mutex<ScaleState<F>>,
    settings: AcquisitionSettings,
}

impl<F: LineFacility> Scale<F> {
    /// Wrap `facility` and attempt the first line claim. A failed claim leaves
    /// the scale unavailable; it is retried on every acquisition.
    pub fn new(facility: F, config: &ScaleConfig) -> Self {
        let mut monitor = HealthMonitor::new(
            facility,
            config.pins,
            config.gain,
            config.ready,
            config.sentinel,
        );
        // failure already logged and recorded by the monitor
        let _ = monitor.reinitialize();

        Self {
            state: Mutex::new(ScaleState {
                monitor,
                profile: config.profile,
                history: WeightHistory::new(config.acquisition.history_filter),
            }),
            settings: config.acquisition,
        }
    }

    /// A panic under the lock may have left the link mid-frame, so a poisoned
    /// state drops its lines and the next acquisition claims them afresh.
    fn lock(&self) -> MutexGuard<'_, ScaleState<F>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("scale lock poisoned, releasing load cell lines");
                let mut guard = poisoned.into_inner();
                guard.monitor.release();
                self.state.clear_poison();
                guard
            }
        }
    }

    fn acquire(
        state: &mut ScaleState<F>,
        samples: usize,
        settings: &AcquisitionSettings,
    ) -> Result<Acquisition> {
        state
            .monitor
            .acquire_stable(samples, &settings.raw_filter, settings.sample_delay)
    }

    fn tare_locked(&self, state: &mut ScaleState<F>, sample_count: usize) -> Result<f64> {
        let acquisition = Self::acquire(state, sample_count, &self.settings)?;
        if !acquisition.device_available {
            return Err(LoadCellError::DeviceUnavailable);
        }
        state.profile.set_zero_offset(acquisition.value);
        state.history.clear();
        Ok(acquisition.value)
    }
}

impl<F: LineFacility + 'static> WeighingSystem for Scale<F> {
    fn get_weight(&self) -> Result<Acquisition> {
        let mut state = self.lock();

        if state.profile.is_placeholder() {
            match self.tare_locked(&mut state, self.settings.tare_samples) {
                Ok(zero_offset) => info!(zero_offset, "implicit tare on first weight query"),
                Err(LoadCellError::DeviceUnavailable) => {
                    debug!("implicit tare deferred, load cell unavailable")
                }
                Err(err) => return Err(err),
            }
        }

        let acquisition = Self::acquire(&mut state, self.settings.weight_samples, &self.settings)?;
        let weight = state.profile.to_weight(acquisition.value);
        if !acquisition.device_available {
            return Ok(Acquisition::unavailable(weight));
        }

        let smoothed = state.history.push(weight);
        debug!(raw = acquisition.value, weight, smoothed, "weight reading");
        Ok(Acquisition::available(smoothed))
    }

    fn read_units(&self) -> Result<Acquisition> {
        let mut state = self.lock();
        let acquisition = Self::acquire(&mut state, self.settings.weight_samples, &self.settings)?;
        Ok(Acquisition {
            value: state.profile.to_weight(acquisition.value),
            ..acquisition
        })
    }

    fn read_raw(&self) -> Result<Acquisition> {
        Ok(self.lock().monitor.read_raw())
    }

    fn tare(&self, sample_count: usize) -> Result<f64> {
        let mut state = self.lock();
        let zero_offset = self.tare_locked(&mut state, sample_count)?;
        info!(zero_offset, samples = sample_count, "scale tared");
        Ok(zero_offset)
    }

    fn calibrate(&self, known_mass: f64, sample_count: usize) -> Result<CalibrationProfile> {
        validate_known_mass(known_mass)?;

        let mut state = self.lock();
        let acquisition = Self::acquire(&mut state, sample_count, &self.settings)?;
        if !acquisition.device_available {
            return Err(LoadCellError::DeviceUnavailable);
        }

        let scale_factor = state.profile.scale_factor_for(acquisition.value, known_mass)?;
        state.profile.scale_factor = scale_factor;
        state.history.clear();
        info!(known_mass, raw = acquisition.value, scale_factor, "scale calibrated");
        Ok(state.profile)
    }

    fn get_calibration(&self) -> Result<CalibrationProfile> {
        Ok(self.lock().profile)
    }

    fn set_gain(&self, gain: Gain) -> Result<()> {
        self.lock().monitor.set_gain(gain);
        Ok(())
    }

    fn status(&self) -> Result<DeviceStatus> {
        Ok(self.lock().monitor.status())
    }

    fn last_error(&self) -> Result<Option<LoadCellError>> {
        Ok(self.lock().monitor.last_error().cloned())
    }

    fn reinitialize(&self) -> Result<DeviceStatus> {
        let mut state = self.lock();
        state.monitor.reinitialize()?;
        Ok(state.monitor.status())
    }

    fn shutdown(&self) -> Result<()> {
        self.lock().monitor.shutdown();
        Ok(())
    }

    fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }
}

/// Build the scale for the configured backend.
pub fn open_scale(config: &ScaleConfig) -> Arc<dyn WeighingSystem> {
    match config.backend {
        Backend::Gpiod => {
            info!(chip = %config.chip, "using GPIO character device backend");
            Arc::new(Scale::new(GpiodFacility::new(config.chip.clone()), config))
        }
        Backend::Simulated => {
            info!(raw = config.simulated_raw, "using simulated HX711");
            Arc::new(Scale::new(SimulatedHx711::new(config.simulated_raw), config))
        }
    }
}

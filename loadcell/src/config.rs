//! Hardware and acquisition settings, read from `MASSA_*` environment variables.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::calibration::{CalibrationProfile, PLACEHOLDER_OFFSET, PLACEHOLDER_SCALE_FACTOR};
use crate::error::{LoadCellError, Result};
use crate::health::SENTINEL_RAW;
use crate::line::LinePins;
use crate::sampler::{Gain, RawSample, ReadyWait};
use crate::scale::AcquisitionSettings;
use crate::stabilize::{check_sample_count, OutlierFilter, ZeroMedian, MAX_SAMPLES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Linux GPIO character device
    #[default]
    Gpiod,
    /// In-process HX711 model
    Simulated,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gpiod" | "gpio" => Ok(Backend::Gpiod),
            "sim" | "simulated" => Ok(Backend::Simulated),
            other => Err(format!("unknown backend {other:?}, expected gpiod or sim")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleConfig {
    pub backend: Backend,
    pub chip: String,
    pub pins: LinePins,
    pub gain: Gain,
    pub ready: ReadyWait,
    pub acquisition: AcquisitionSettings,
    /// Profile loaded at startup, the placeholder unless overridden
    pub profile: CalibrationProfile,
    pub sentinel: RawSample,
    /// Value converted by the simulated chip when nothing is queued
    pub simulated_raw: RawSample,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            chip: "gpiochip0".to_string(),
            pins: LinePins::default(),
            gain: Gain::default(),
            ready: ReadyWait::default(),
            acquisition: AcquisitionSettings::default(),
            profile: CalibrationProfile::default(),
            sentinel: SENTINEL_RAW,
            simulated_raw: 0,
        }
    }
}

impl ScaleConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let gain_factor: u32 = parse(&get, "MASSA_GAIN", defaults.gain.factor())?;
        let gain = Gain::try_from(gain_factor)
            .map_err(|_| LoadCellError::Config(format!("MASSA_GAIN: unsupported gain {gain_factor}")))?;

        let acquisition = AcquisitionSettings {
            weight_samples: parse(&get, "MASSA_WEIGHT_SAMPLES", defaults.acquisition.weight_samples)?,
            tare_samples: parse(&get, "MASSA_TARE_SAMPLES", defaults.acquisition.tare_samples)?,
            calibration_samples: parse(
                &get,
                "MASSA_CALIBRATION_SAMPLES",
                defaults.acquisition.calibration_samples,
            )?,
            sample_delay: Duration::from_millis(parse(
                &get,
                "MASSA_SAMPLE_DELAY_MS",
                defaults.acquisition.sample_delay.as_millis() as u64,
            )?),
            raw_filter: OutlierFilter::new(
                parse(&get, "MASSA_RAW_THRESHOLD", OutlierFilter::RAW.relative_threshold)?,
                ZeroMedian::Strict,
            ),
            history_filter: OutlierFilter::new(
                parse(&get, "MASSA_HISTORY_THRESHOLD", OutlierFilter::HISTORY.relative_threshold)?,
                ZeroMedian::KeepAll,
            ),
        };

        let config = Self {
            backend: parse(&get, "MASSA_SCALE_BACKEND", defaults.backend)?,
            chip: get("MASSA_GPIO_CHIP").unwrap_or(defaults.chip),
            pins: LinePins {
                data: parse(&get, "MASSA_DT_PIN", defaults.pins.data)?,
                clock: parse(&get, "MASSA_SCK_PIN", defaults.pins.clock)?,
            },
            gain,
            ready: ReadyWait {
                poll_interval: Duration::from_millis(parse(
                    &get,
                    "MASSA_READY_POLL_MS",
                    defaults.ready.poll_interval.as_millis() as u64,
                )?),
                max_polls: parse(&get, "MASSA_READY_MAX_POLLS", defaults.ready.max_polls)?,
            },
            acquisition,
            profile: CalibrationProfile {
                zero_offset: parse(&get, "MASSA_ZERO_OFFSET", PLACEHOLDER_OFFSET)?,
                scale_factor: parse(&get, "MASSA_SCALE_FACTOR", PLACEHOLDER_SCALE_FACTOR)?,
            },
            sentinel: parse(&get, "MASSA_SENTINEL_RAW", defaults.sentinel)?,
            simulated_raw: parse(&get, "MASSA_SIM_RAW", defaults.simulated_raw)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pins.data == self.pins.clock {
            return Err(LoadCellError::Config(format!(
                "data and clock cannot share line {}",
                self.pins.data
            )));
        }
        if self.ready.max_polls == 0 {
            return Err(LoadCellError::Config("MASSA_READY_MAX_POLLS must be at least 1".into()));
        }

        let counts = [
            ("MASSA_WEIGHT_SAMPLES", self.acquisition.weight_samples),
            ("MASSA_TARE_SAMPLES", self.acquisition.tare_samples),
            ("MASSA_CALIBRATION_SAMPLES", self.acquisition.calibration_samples),
        ];
        for (key, count) in counts {
            if check_sample_count(count).is_err() {
                return Err(LoadCellError::Config(format!(
                    "{key} must be between 1 and {MAX_SAMPLES}"
                )));
            }
        }

        for (key, filter) in [
            ("MASSA_RAW_THRESHOLD", self.acquisition.raw_filter),
            ("MASSA_HISTORY_THRESHOLD", self.acquisition.history_filter),
        ] {
            if !filter.relative_threshold.is_finite() || filter.relative_threshold < 0.0 {
                return Err(LoadCellError::Config(format!(
                    "{key} must be a non-negative number"
                )));
            }
        }

        let factor = self.profile.scale_factor;
        if !factor.is_finite() || factor == 0.0 {
            return Err(LoadCellError::Config(format!(
                "MASSA_SCALE_FACTOR must be finite and non-zero, got {factor}"
            )));
        }
        if !self.profile.zero_offset.is_finite() {
            return Err(LoadCellError::Config("MASSA_ZERO_OFFSET must be finite".into()));
        }
        Ok(())
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err| LoadCellError::Config(format!("{key}={value:?}: {err}"))),
        None => Ok(default),
    }
}

//! HX711 load-cell acquisition.
//!
//! Layers, bottom up: [`bitlink`] drives the two-wire serial link, [`sampler`]
//! turns it into signed 24-bit conversions, [`stabilize`] filters batches of
//! them, [`calibration`] maps raw counts to weight and [`health`] absorbs
//! hardware faults. [`scale::Scale`] ties them together behind one lock.

pub mod bitlink;
pub mod calibration;
pub mod config;
pub mod error;
pub mod gpio;
pub mod health;
pub mod line;
pub mod sampler;
pub mod scale;
pub mod sim;
pub mod stabilize;

pub use calibration::CalibrationProfile;
pub use config::{Backend, ScaleConfig};
pub use error::{LoadCellError, Result};
pub use health::{Acquisition, DeviceStatus, SENTINEL_RAW};
pub use sampler::{Gain, RawSample};
pub use scale::{open_scale, AcquisitionSettings, Scale, WeighingSystem};
pub use sim::SimulatedHx711;
pub use stabilize::MAX_SAMPLES;

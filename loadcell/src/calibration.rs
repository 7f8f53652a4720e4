//! Zero offset and scale factor: raw counts to physical weight.

use serde::{Deserialize, Serialize};

use crate::error::{LoadCellError, Result};

/// Zero offset of a scale that was never tared
pub const PLACEHOLDER_OFFSET: f64 = -864.2;

/// Counts per gram measured on the reference rig, used until a calibration runs
pub const PLACEHOLDER_SCALE_FACTOR: f64 = 103.273_386_266_725_62;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Stabilized raw reading of the empty scale
    pub zero_offset: f64,
    /// Raw counts per unit of mass
    pub scale_factor: f64,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self::PLACEHOLDER
    }
}

impl CalibrationProfile {
    pub const PLACEHOLDER: CalibrationProfile = CalibrationProfile {
        zero_offset: PLACEHOLDER_OFFSET,
        scale_factor: PLACEHOLDER_SCALE_FACTOR,
    };

    /// A profile still carrying the placeholder offset has never been tared.
    pub fn is_placeholder(&self) -> bool {
        self.zero_offset == PLACEHOLDER_OFFSET
    }

    /// Weight of a stabilized raw reading, clamped at zero so noise around an
    /// empty scale never reads negative.
    pub fn to_weight(&self, stabilized_raw: f64) -> f64 {
        ((stabilized_raw - self.zero_offset) / self.scale_factor).max(0.0)
    }

    pub fn set_zero_offset(&mut self, stabilized_raw: f64) {
        self.zero_offset = stabilized_raw;
    }

    /// Scale factor that maps `stabilized_raw` to `known_mass` under the
    /// current zero offset. Nothing is stored.
    pub fn scale_factor_for(&self, stabilized_raw: f64, known_mass: f64) -> Result<f64> {
        validate_known_mass(known_mass)?;

        let delta = stabilized_raw - self.zero_offset;
        if delta == 0.0 {
            return Err(LoadCellError::InvalidCalibrationInput(
                "reading equals the zero offset, is the reference mass on the scale?".into(),
            ));
        }

        let scale_factor = delta / known_mass;
        if !scale_factor.is_finite() {
            return Err(LoadCellError::InvalidCalibrationInput(format!(
                "scale factor {scale_factor} is not finite"
            )));
        }
        Ok(scale_factor)
    }
}

/// Reference masses must be finite and strictly positive.
pub fn validate_known_mass(known_mass: f64) -> Result<()> {
    if !known_mass.is_finite() || known_mass <= 0.0 {
        return Err(LoadCellError::InvalidCalibrationInput(format!(
            "known mass must be positive, got {known_mass}"
        )));
    }
    Ok(())
}

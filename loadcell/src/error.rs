use thiserror::Error;

/// Errors raised by the load-cell subsystem
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadCellError {
    /// GPIO chip could not be opened or the lines could not be claimed
    #[error("device initialization failed: {0}")]
    DeviceInit(String),

    /// The ADC never pulled its data line low within the polling bound
    #[error("HX711 not responding after {polls} readiness polls")]
    DeviceTimeout { polls: u32 },

    /// A claimed line failed to read or drive
    #[error("GPIO line access failed: {0}")]
    LineIo(String),

    /// Transfer attempted on a link whose lines were already released
    #[error("bit link is closed")]
    LinkClosed,

    #[error("invalid calibration input: {0}")]
    InvalidCalibrationInput(String),

    #[error("unsupported gain {0}, expected 128, 64 or 32")]
    UnsupportedGain(u32),

    #[error("sample count must be between 1 and {}", crate::stabilize::MAX_SAMPLES)]
    InvalidSampleCount,

    /// Operation needs real hardware but only the sentinel is available
    #[error("load cell is unavailable")]
    DeviceUnavailable,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LoadCellError {
    /// Short machine-readable tag used by API consumers
    pub fn kind(&self) -> &'static str {
        match self {
            LoadCellError::DeviceInit(_) => "device_init",
            LoadCellError::DeviceTimeout { .. } => "device_timeout",
            LoadCellError::LineIo(_) => "line_io",
            LoadCellError::LinkClosed => "link_closed",
            LoadCellError::InvalidCalibrationInput(_) => "invalid_calibration_input",
            LoadCellError::UnsupportedGain(_) => "unsupported_gain",
            LoadCellError::InvalidSampleCount => "invalid_sample_count",
            LoadCellError::DeviceUnavailable => "device_unavailable",
            LoadCellError::Config(_) => "config",
        }
    }

    /// True for failures caused by the caller rather than the hardware
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LoadCellError::InvalidCalibrationInput(_)
                | LoadCellError::UnsupportedGain(_)
                | LoadCellError::InvalidSampleCount
        )
    }

    /// True for failures the health monitor absorbs into the unavailable state
    pub fn is_transient_hardware(&self) -> bool {
        matches!(
            self,
            LoadCellError::DeviceInit(_)
                | LoadCellError::DeviceTimeout { .. }
                | LoadCellError::LineIo(_)
                | LoadCellError::LinkClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, LoadCellError>;

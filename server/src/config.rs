use std::time::Duration;

use massa_loadcell::{LoadCellError, Result, ScaleConfig};

/// Server configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Directory of the web frontend, served for any path the API doesn't match
    pub static_dir: String,
    /// Tare once at startup so the first weight query doesn't have to
    pub tare_on_start: bool,
    /// Interval between pushes on the live weight socket
    pub weight_push_interval: Duration,
    pub scale: ScaleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            static_dir: "static".to_string(),
            tare_on_start: true,
            weight_push_interval: Duration::from_millis(500),
            scale: ScaleConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tare_on_start = match lookup("MASSA_TARE_ON_START") {
            Some(value) => parse_bool("MASSA_TARE_ON_START", &value)?,
            None => defaults.tare_on_start,
        };

        let weight_push_interval = match lookup("MASSA_WS_INTERVAL_MS") {
            Some(value) => {
                let millis: u64 = value.trim().parse().map_err(|e| {
                    LoadCellError::Config(format!("MASSA_WS_INTERVAL_MS={value:?}: {e}"))
                })?;
                if millis == 0 {
                    return Err(LoadCellError::Config(
                        "MASSA_WS_INTERVAL_MS must be at least 1".into(),
                    ));
                }
                Duration::from_millis(millis)
            }
            None => defaults.weight_push_interval,
        };

        Ok(Self {
            bind_address: lookup("MASSA_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            static_dir: lookup("MASSA_STATIC_DIR").unwrap_or(defaults.static_dir),
            tare_on_start,
            weight_push_interval,
            scale: ScaleConfig::from_lookup(&lookup)?,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(LoadCellError::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

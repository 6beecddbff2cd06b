//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Game sensitivity bounds accepted from the environment
const SENSITIVITY_RANGE: (f64, f64) = (0.1, 10.0);

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Telemetry listener binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Weapon parameter document (JSON)
    pub weapons_file: PathBuf,
    /// Directory of per-weapon pattern files
    pub patterns_dir: PathBuf,
    /// Hotkey map document (JSON)
    pub keymap_file: PathBuf,

    /// In-game mouse sensitivity the patterns are rescaled against
    pub game_sensitivity: f64,
    /// Dwell a newly reported weapon must hold before it becomes active (ms)
    pub dwell_ms: u64,
    /// Fire considered stopped after this long without fresh evidence (ms)
    pub fire_decay_ms: u64,
    /// Clip size at or below which the low-ammo event fires
    pub low_ammo_threshold: u16,

    /// Compensation enabled at startup
    pub recoil_enabled: bool,
    /// Automatic weapon detection enabled at startup
    pub detection_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr =
            env::var("TELEMETRY_ADDR").unwrap_or_else(|_| "127.0.0.1:59873".to_string());

        let game_sensitivity = parse_var("GAME_SENSITIVITY", 1.0_f64)?;
        if !(SENSITIVITY_RANGE.0..=SENSITIVITY_RANGE.1).contains(&game_sensitivity) {
            return Err(ConfigError::SensitivityOutOfRange(game_sensitivity));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            weapons_file: env::var("WEAPONS_FILE")
                .unwrap_or_else(|_| "weapons.json".to_string())
                .into(),
            patterns_dir: env::var("PATTERNS_DIR")
                .unwrap_or_else(|_| "patterns".to_string())
                .into(),
            keymap_file: env::var("KEYMAP_FILE")
                .unwrap_or_else(|_| "keymap.json".to_string())
                .into(),

            game_sensitivity,
            dwell_ms: parse_var("DETECTION_DWELL_MS", 150)?,
            fire_decay_ms: parse_var("FIRE_DECAY_MS", 500)?,
            low_ammo_threshold: parse_var("LOW_AMMO_THRESHOLD", 5)?,

            recoil_enabled: parse_var("RECOIL_ENABLED", true)?,
            detection_enabled: parse_var("DETECTION_ENABLED", true)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid telemetry address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("GAME_SENSITIVITY {0} outside the accepted 0.1..=10.0 range")]
    SensitivityOutOfRange(f64),
}

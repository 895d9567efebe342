//! Minimal runtime configuration helpers.
//! Defaults suit a single-board controller with an on-disk SQLite file.

use std::time::Duration;

pub const DEFAULT_DATABASE_PATH: &str = "controller.db";
pub const DEFAULT_POLL_SECS: u64 = 60;
pub const DEFAULT_ADC_VREF: f64 = 3.3;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    /// Sensor scan cadence.
    pub poll_interval: Duration,
    /// ADC reference voltage, used to convert raw counts to volts.
    pub adc_vref: f64,
    /// Insert the demo hardware/sensor configuration on startup.
    pub seed_demo: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());

        let poll_secs = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_SECS);

        let adc_vref = match std::env::var("ADC_VREF") {
            Ok(s) if !s.trim().is_empty() => s
                .trim()
                .parse::<f64>()
                .map_err(|_| "ADC_VREF must be a number (volts)".to_string())?,
            _ => DEFAULT_ADC_VREF,
        };

        let seed_demo = std::env::var("SEED_DEMO")
            .ok()
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        Ok(Config {
            database_path,
            poll_interval: Duration::from_secs(poll_secs),
            adc_vref,
            seed_demo,
        })
    }
}

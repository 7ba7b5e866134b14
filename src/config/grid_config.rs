//! Pressure grid configuration using Figment
//!
//! Every pin, bus address, grid dimension, ADC field and delay is a named
//! value here. Configuration is loaded from:
//! 1. `config/pressure_grid.toml` (base configuration)
//! 2. Environment variables prefixed with `PRESSURE_GRID_`
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! PRESSURE_GRID_LOG_LEVEL=debug
//! PRESSURE_GRID_GRID__ROWS=8
//! PRESSURE_GRID_TIMING__ROW_SETTLE_US=4000
//! ```
//!
//! Missing sections and fields fall back to the board defaults, so an absent
//! file yields [`GridConfig::default`].

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::adc::{AdcSettings, DataRate, Gain, CHANNELS, SAMPLE_MAX};
use crate::grid::column::MAX_COLUMNS;
use crate::grid::row::MAX_ROWS;
use crate::grid::Sample;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/pressure_grid.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PRESSURE_GRID_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or deserialized
    #[error("Configuration load error: {0}")]
    Load(#[from] figment::Error),
    /// Values loaded but rejected by [`GridConfig::validate`]
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Shift register GPIO lines
    pub pins: PinConfig,
    /// I²C bus and device addresses
    pub bus: BusConfig,
    /// Rows and columns actually wired
    pub grid: GridDimensions,
    /// ADS1015 conversion and polling
    pub adc: AdcConfig,
    /// Pulse and settle times
    pub timing: TimingConfig,
    /// Timeout policy and worker cadence
    pub scan: ScanConfig,
}

/// BCM pin numbers of the shift register lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Serial data input
    pub data: u8,
    /// Shift register clock
    pub shift_clock: u8,
    /// Storage register (latch) clock
    pub latch_clock: u8,
}

/// I²C bus number and device addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus number, `1` for `/dev/i2c-1`
    pub bus: u8,
    /// MCP23017 7-bit address
    pub expander_address: u16,
    /// ADS1015 7-bit address
    pub adc_address: u16,
}

/// Scanned grid size, at most 16 x 16
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDimensions {
    /// Rows driven by the shift register
    pub rows: usize,
    /// Columns switched through the mux
    pub cols: usize,
}

impl GridDimensions {
    /// Samples per frame
    #[must_use]
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

/// ADS1015 conversion settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    /// Single-ended input AIN0..AIN3
    pub channel: u8,
    /// PGA full-scale range
    pub gain: Gain,
    /// Conversion rate
    pub data_rate: DataRate,
    /// Status polls before a conversion is declared timed out
    pub poll_attempts: u32,
    /// Wait before each status poll
    pub poll_interval_us: u64,
}

impl AdcConfig {
    /// Sampler settings with the interval as a `Duration`
    #[must_use]
    pub fn settings(&self) -> AdcSettings {
        AdcSettings {
            channel: self.channel,
            gain: self.gain,
            data_rate: self.data_rate,
            poll_attempts: self.poll_attempts,
            poll_interval: Duration::from_micros(self.poll_interval_us),
        }
    }
}

/// Settle and pulse times, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// High and low hold time of each clock and latch pulse
    pub clock_pulse_us: u64,
    /// Wait after latching a row
    pub row_settle_us: u64,
    /// Wait after switching a column
    pub column_settle_us: u64,
}

impl TimingConfig {
    /// Pulse hold time as a `Duration`
    #[must_use]
    pub fn clock_pulse(&self) -> Duration {
        Duration::from_micros(self.clock_pulse_us)
    }

    /// Row settle time as a `Duration`
    #[must_use]
    pub fn row_settle(&self) -> Duration {
        Duration::from_micros(self.row_settle_us)
    }

    /// Column settle time as a `Duration`
    #[must_use]
    pub fn column_settle(&self) -> Duration {
        Duration::from_micros(self.column_settle_us)
    }
}

/// What a scan does when a conversion never completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Abort the scan with a partial frame error
    #[default]
    Abort,
    /// Store `sentinel` for the cell and keep scanning
    Substitute {
        /// Value written in place of the missing sample
        sentinel: Sample,
    },
}

/// Scan behaviour and acquisition worker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Reaction to a conversion timeout
    pub timeout_policy: TimeoutPolicy,
    /// Pause between frames in the acquisition worker
    pub scan_interval_ms: u64,
    /// Frames buffered between the worker and its consumer
    pub channel_capacity: usize,
    /// Worker gives up after this many failed scans in a row
    pub max_consecutive_failures: u32,
}

impl ScanConfig {
    /// Pause between frames as a `Duration`
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

// ============================================================================
// Defaults
// ============================================================================

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pins: PinConfig::default(),
            bus: BusConfig::default(),
            grid: GridDimensions::default(),
            adc: AdcConfig::default(),
            timing: TimingConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            data: 5,
            shift_clock: 13,
            latch_clock: 6,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            expander_address: 0x21,
            adc_address: 0x48,
        }
    }
}

impl Default for GridDimensions {
    fn default() -> Self {
        Self { rows: 16, cols: 12 }
    }
}

impl Default for AdcConfig {
    fn default() -> Self {
        let settings = AdcSettings::default();
        Self {
            channel: settings.channel,
            gain: settings.gain,
            data_rate: settings.data_rate,
            poll_attempts: settings.poll_attempts,
            poll_interval_us: settings.poll_interval.as_micros() as u64,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            clock_pulse_us: 10,
            row_settle_us: 8000,
            column_settle_us: 1000,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_policy: TimeoutPolicy::default(),
            scan_interval_ms: 50,
            channel_capacity: 5,
            max_consecutive_failures: 10,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl GridConfig {
    /// Load configuration from `config/pressure_grid.toml` and environment
    /// variables (highest precedence).
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides and validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        let pins = [self.pins.data, self.pins.shift_clock, self.pins.latch_clock];
        if pins[0] == pins[1] || pins[0] == pins[2] || pins[1] == pins[2] {
            return Err(ConfigError::Validation(format!(
                "Shift register pins must be distinct, got data={} shift_clock={} latch_clock={}",
                pins[0], pins[1], pins[2]
            )));
        }

        for (name, address) in [
            ("expander_address", self.bus.expander_address),
            ("adc_address", self.bus.adc_address),
        ] {
            if address > 0x7F {
                return Err(ConfigError::Validation(format!(
                    "Invalid {name} {address:#04x}. Must be a 7-bit address"
                )));
            }
        }
        if self.bus.expander_address == self.bus.adc_address {
            return Err(ConfigError::Validation(format!(
                "Expander and ADC share address {:#04x}",
                self.bus.adc_address
            )));
        }

        if !(1..=MAX_ROWS).contains(&self.grid.rows) {
            return Err(ConfigError::Validation(format!(
                "Invalid grid rows {}. Must be 1-{MAX_ROWS}",
                self.grid.rows
            )));
        }
        if !(1..=MAX_COLUMNS).contains(&self.grid.cols) {
            return Err(ConfigError::Validation(format!(
                "Invalid grid cols {}. Must be 1-{MAX_COLUMNS}",
                self.grid.cols
            )));
        }

        if self.adc.channel >= CHANNELS {
            return Err(ConfigError::Validation(format!(
                "Invalid adc channel {}. Must be 0-{}",
                self.adc.channel,
                CHANNELS - 1
            )));
        }
        if self.adc.poll_attempts == 0 {
            return Err(ConfigError::Validation(
                "adc poll_attempts must be at least 1".to_string(),
            ));
        }

        if let TimeoutPolicy::Substitute { sentinel } = self.scan.timeout_policy {
            if sentinel > SAMPLE_MAX {
                return Err(ConfigError::Validation(format!(
                    "Timeout sentinel {sentinel} exceeds the 12-bit sample range (max {SAMPLE_MAX})"
                )));
            }
        }
        if self.scan.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "scan channel_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

//! Configuration
//!
//! Configuration is loaded with Figment from (in order of precedence):
//! 1. Environment variables prefixed with `PRESSURE_GRID_`
//! 2. TOML configuration file (default: `config/pressure_grid.toml`)
//! 3. Built-in board defaults
//!
//! # Example
//!
//! ```no_run
//! use pressure_grid::config::GridConfig;
//!
//! let config = GridConfig::load_from("config/pressure_grid.toml")?;
//! println!("Grid: {}x{}", config.grid.rows, config.grid.cols);
//! # Ok::<(), pressure_grid::config::ConfigError>(())
//! ```

pub mod grid_config;

pub use grid_config::{
    AdcConfig, BusConfig, ConfigError, GridConfig, GridDimensions, PinConfig, ScanConfig,
    TimeoutPolicy, TimingConfig, DEFAULT_CONFIG_PATH, ENV_PREFIX,
};

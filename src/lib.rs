//! Scan engine for a resistive pressure-sensor grid.
//!
//! The grid is read one cell at a time: a shift register drives a single
//! row, an MCP23017 I/O expander switches an analog multiplexer to a single
//! column, and an ADS1015 on the same I²C bus digitizes the result. A full
//! sweep produces a [`Frame`] of raw 12-bit counts in row-major order.
//!
//! The hardware sits behind the [`hardware::Platform`] traits so the same
//! engine runs on a Raspberry Pi (feature `rpi`) or against
//! [`hardware::MockPlatform`] in tests.
//!
//! ```
//! use pressure_grid::config::GridConfig;
//! use pressure_grid::hardware::MockPlatform;
//! use pressure_grid::ScanEngine;
//!
//! let platform = MockPlatform::new();
//! platform.set_sample(0, 0, 512);
//!
//! let mut engine = ScanEngine::new(platform, GridConfig::default())?;
//! engine.init()?;
//! let frame = engine.scan()?;
//! assert_eq!(frame.get(0, 0), Some(512));
//! engine.cleanup()?;
//! # Ok::<(), pressure_grid::GridError>(())
//! ```

pub mod acquisition;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod hardware;
pub mod logging;

pub use acquisition::{Acquisition, AcquisitionConfig, AcquisitionReport, SharedScanEngine};
pub use config::{ConfigError, GridConfig, TimeoutPolicy};
pub use engine::{EngineState, ScanEngine};
pub use error::{GridError, GridResult};
pub use grid::{Frame, Sample, ScanSummary};

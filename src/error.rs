//! Error types for the pressure grid.
//!
//! `GridError` is the single error type returned by the scan engine and its
//! components. It is built with `thiserror` and separates failures by where
//! they happen:
//!
//! - **`HardwareInit`**: a line or bus handle could not be acquired, or the
//!   expander could not be configured. Fatal; the engine stays uninitialized.
//! - **`Bus`** / **`Line`**: a register transaction or a digital line write
//!   failed mid-scan. The scan aborts, the engine stays usable.
//! - **`ConversionTimeout`**: the ADC never reported conversion-complete within
//!   the configured poll cap.
//! - **`PartialFrame`**: a scan stopped early. Carries the number of cells
//!   written, the last written index and the underlying cause.
//!
//! Lower layers report [`HardwareError`](crate::hardware::HardwareError); the
//! components attach device and register context when mapping it here.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineState;

/// Convenience alias for results using the grid error type.
pub type GridResult<T> = std::result::Result<T, GridError>;

/// Errors returned by the scan engine and its components
#[derive(Error, Debug)]
pub enum GridError {
    /// A line or bus handle could not be acquired or set up
    #[error("Hardware initialization failed for {resource}: {reason}")]
    HardwareInit {
        /// Resource being acquired, e.g. `"i2c bus 1"`
        resource: String,
        /// Platform error text
        reason: String,
    },

    /// A register transaction failed
    #[error("Bus transaction with {device} ({address:#04x}) failed: {reason}")]
    Bus {
        /// Device name, `"MCP23017"` or `"ADS1015"`
        device: &'static str,
        /// 7-bit slave address
        address: u16,
        /// Operation and platform error text
        reason: String,
    },

    /// A digital output write failed
    #[error("Digital line '{line}' failed: {reason}")]
    Line {
        /// Line name, `"data"`, `"shift clock"` or `"latch clock"`
        line: &'static str,
        /// Platform error text
        reason: String,
    },

    /// The ADC never reported conversion-complete
    #[error("ADC conversion not complete after {attempts} polls")]
    ConversionTimeout {
        /// Status polls issued before giving up
        attempts: u32,
    },

    /// A scan stopped before every cell was written
    #[error("Scan aborted after {completed} cells (last cell: {last_cell:?}): {source}")]
    PartialFrame {
        /// Cells written before the failure
        completed: usize,
        /// Row-major index of the last written cell
        last_cell: Option<usize>,
        /// What stopped the scan
        #[source]
        source: Box<GridError>,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// State the engine was in
        state: EngineState,
    },

    /// Caller buffer does not match the grid size
    #[error("Frame buffer holds {actual} samples, scan needs {expected}")]
    BufferSize {
        /// `rows * cols`
        expected: usize,
        /// Length of the buffer passed in
        actual: usize,
    },

    /// Row or column index past the hardware limit
    #[error("{what} {value} out of range (max {max})")]
    OutOfRange {
        /// `"row"` or `"column"`
        what: &'static str,
        /// Requested index
        value: usize,
        /// Largest valid index
        max: usize,
    },

    /// Invalid or unreadable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Subscriber installation failed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Acquisition worker could not start or panicked
    #[error("Acquisition worker failed: {0}")]
    Worker(String),
}

impl GridError {
    /// Whether a fresh `scan()` on the same engine may succeed.
    ///
    /// Mid-scan bus, line and conversion failures leave the hardware handles
    /// intact; initialization and configuration failures do not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            GridError::Bus { .. } | GridError::Line { .. } | GridError::ConversionTimeout { .. } => {
                true
            }
            GridError::PartialFrame { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// The innermost cause, unwrapping any `PartialFrame` layers.
    #[must_use]
    pub fn root_cause(&self) -> &GridError {
        match self {
            GridError::PartialFrame { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GridError::Bus {
            device: "ADS1015",
            address: 0x48,
            reason: "write register 0x01: NACK".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Bus transaction with ADS1015 (0x48) failed: write register 0x01: NACK"
        );
    }

    #[test]
    fn test_partial_frame_recoverability() {
        let err = GridError::PartialFrame {
            completed: 5,
            last_cell: Some(4),
            source: Box::new(GridError::ConversionTimeout { attempts: 10 }),
        };
        assert!(err.is_recoverable());
        assert!(matches!(
            err.root_cause(),
            GridError::ConversionTimeout { attempts: 10 }
        ));
        assert!(err.to_string().contains("after 5 cells"));
    }

    #[test]
    fn test_init_error_not_recoverable() {
        let err = GridError::HardwareInit {
            resource: "i2c bus 1".into(),
            reason: "no such device".into(),
        };
        assert!(!err.is_recoverable());
    }
}

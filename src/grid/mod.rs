//! Grid components
//!
//! The three leaf drivers composed by the scan engine, plus the frame type
//! they fill:
//!
//! - [`row::RowDriver`] - 16-bit shift register selecting one row
//! - [`column::ColumnSelector`] - MCP23017 driving the column multiplexer
//! - [`adc::AdcSampler`] - ADS1015 single-shot conversions
//! - [`frame::Frame`] - one complete row-major grid of samples

pub mod adc;
pub mod column;
pub mod frame;
pub mod row;

pub use adc::{AdcSampler, AdcSettings, DataRate, Gain};
pub use column::{ColumnAddress, ColumnSelector};
pub use frame::{Frame, ScanSummary};
pub use row::{RowDriver, RowPattern, ROW_PATTERNS};

/// Raw ADC count for one cell, at most 12 significant bits
pub type Sample = u16;

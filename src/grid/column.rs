//! Column selector on the MCP23017 I/O expander
//!
//! Wiring: port A drives a 16-channel analog multiplexer.
//!
//! ```text
//!  GPA0..GPA3  mux address S0..S3
//!  GPA4        mux enable, active high
//!  GPA5..GPA7  unused (inputs)
//!  GPB0..GPB7  unused (inputs)
//! ```
//!
//! A column is selected with one full write of the port A output latch,
//! `0x10 | column`, which also releases whichever column was selected before.
//! Writing `0x00` drops the enable and disconnects every column.

use tracing::trace;

use crate::error::{GridError, GridResult};
use crate::hardware::{BusDevice, I2cBus, SharedBus};

/// Port A direction register, `1` = input
pub const IODIRA: u8 = 0x00;
/// Port B direction register
pub const IODIRB: u8 = 0x01;
/// Port A output latch
pub const OLATA: u8 = 0x14;
/// Registers 0x00..=0x15 in the default (BANK = 0) layout
pub const REGISTER_COUNT: usize = 0x16;

/// Mux enable on GPA4
pub const ENABLE_BIT: u8 = 1 << 4;
const PORT_A_DIRECTION: u8 = 0xE0;
const PORT_B_DIRECTION: u8 = 0xFF;
const COLUMNS_RELEASED: u8 = 0x00;

/// Number of channels addressable through the 4-bit mux address
pub const MAX_COLUMNS: usize = 16;

/// Column index on the multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnAddress(u8);

impl ColumnAddress {
    /// Address for `column`, rejecting anything past the mux
    pub fn new(column: usize) -> GridResult<Self> {
        if column >= MAX_COLUMNS {
            return Err(GridError::OutOfRange {
                what: "column",
                value: column,
                max: MAX_COLUMNS - 1,
            });
        }
        Ok(Self(column as u8))
    }

    /// Zero-based column index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Output latch value: mux address in bits 0..3, enable in bit 4
    #[must_use]
    pub const fn enable_code(self) -> u8 {
        ENABLE_BIT | self.0
    }
}

/// Drives the column mux through the expander's port A
#[derive(Debug, Clone, Copy)]
pub struct ColumnSelector {
    device: BusDevice,
}

impl ColumnSelector {
    /// Selector for the expander at `address`
    #[must_use]
    pub fn new(address: u16) -> Self {
        Self {
            device: BusDevice::new("MCP23017", address),
        }
    }

    /// Bus identity used in error reports
    #[must_use]
    pub fn device(&self) -> BusDevice {
        self.device
    }

    /// Direction setup, done once per init: A0..A4 outputs, everything else inputs
    pub fn configure<B: I2cBus>(&self, bus: &mut SharedBus<B>) -> GridResult<()> {
        bus.write_u8(self.device, IODIRA, PORT_A_DIRECTION)?;
        bus.write_u8(self.device, IODIRB, PORT_B_DIRECTION)?;
        self.deassert(bus)
    }

    /// Connect `column` to the ADC input
    pub fn select_column<B: I2cBus>(
        &self,
        bus: &mut SharedBus<B>,
        column: ColumnAddress,
    ) -> GridResult<()> {
        trace!(column = column.index(), "selecting column");
        bus.write_u8(self.device, OLATA, column.enable_code())
    }

    /// Disable the mux so no column is connected
    pub fn deassert<B: I2cBus>(&self, bus: &mut SharedBus<B>) -> GridResult<()> {
        bus.write_u8(self.device, OLATA, COLUMNS_RELEASED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{MockPlatform, Platform};

    #[test]
    fn test_enable_codes() {
        assert_eq!(ColumnAddress::new(0).unwrap().enable_code(), 0b0001_0000);
        assert_eq!(ColumnAddress::new(11).unwrap().enable_code(), 0b0001_1011);
        assert_eq!(ColumnAddress::new(15).unwrap().enable_code(), 0b0001_1111);
        assert!(ColumnAddress::new(16).is_err());
    }

    #[test]
    fn test_configure_sets_directions_and_releases() {
        let mut platform = MockPlatform::new();
        let mut bus = SharedBus::new(platform.open_bus(1).unwrap());
        let selector = ColumnSelector::new(0x21);

        selector.configure(&mut bus).unwrap();
        assert_eq!(platform.expander_register(IODIRA), Some(0xE0));
        assert_eq!(platform.expander_register(IODIRB), Some(0xFF));
        assert_eq!(platform.expander_register(OLATA), Some(0x00));
    }

    #[test]
    fn test_select_is_full_register_replace() {
        let mut platform = MockPlatform::new();
        let mut bus = SharedBus::new(platform.open_bus(1).unwrap());
        let selector = ColumnSelector::new(0x21);
        selector.configure(&mut bus).unwrap();

        selector
            .select_column(&mut bus, ColumnAddress::new(5).unwrap())
            .unwrap();
        assert_eq!(platform.expander_register(OLATA), Some(0x15));

        selector
            .select_column(&mut bus, ColumnAddress::new(2).unwrap())
            .unwrap();
        assert_eq!(platform.expander_register(OLATA), Some(0x12));

        selector.deassert(&mut bus).unwrap();
        assert_eq!(platform.expander_register(OLATA), Some(0x00));
    }

    #[test]
    fn test_select_reasserts_address_after_other_device() {
        let mut platform = MockPlatform::new();
        let mut bus = SharedBus::new(platform.open_bus(1).unwrap());
        let selector = ColumnSelector::new(0x21);
        selector.configure(&mut bus).unwrap();
        let before = platform.address_selects();

        bus.read_u16_be(BusDevice::new("ADS1015", 0x48), 0x00).unwrap();
        selector
            .select_column(&mut bus, ColumnAddress::new(1).unwrap())
            .unwrap();

        assert_eq!(platform.address_selects(), before + 2);
        assert_eq!(platform.expander_register(OLATA), Some(0x11));
    }
}

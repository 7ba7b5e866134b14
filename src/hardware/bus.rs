//! Shared I²C bus with explicit address tracking
//!
//! The I/O expander and the ADC sit on the same bus. Selecting a slave
//! address is sticky at the bus layer, so every register access first makes
//! sure the right device is addressed. The last selected address is kept in
//! `selected` and the select is skipped when it already matches.

use tracing::trace;

use super::I2cBus;
use crate::error::{GridError, GridResult};

/// A named device on the shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusDevice {
    /// Part name used in errors and traces
    pub name: &'static str,
    /// 7-bit slave address
    pub address: u16,
}

impl BusDevice {
    /// Name a device at `address`
    #[must_use]
    pub const fn new(name: &'static str, address: u16) -> Self {
        Self { name, address }
    }
}

/// Bus handle plus the address it currently points at
#[derive(Debug)]
pub struct SharedBus<B> {
    bus: B,
    selected: Option<u16>,
}

impl<B: I2cBus> SharedBus<B> {
    /// Wrap `bus` with no address known to be selected
    #[must_use]
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            selected: None,
        }
    }

    /// Address currently selected on the bus, if known
    #[must_use]
    pub fn selected(&self) -> Option<u16> {
        self.selected
    }

    /// Forget the selected address so the next access re-asserts it
    pub fn invalidate(&mut self) {
        self.selected = None;
    }

    /// Point the bus at `device`, skipping the select if already there
    pub fn select(&mut self, device: BusDevice) -> GridResult<()> {
        if self.selected == Some(device.address) {
            return Ok(());
        }

        trace!(device = device.name, address = device.address, "selecting bus address");
        match self.bus.set_slave_address(device.address) {
            Ok(()) => {
                self.selected = Some(device.address);
                Ok(())
            }
            Err(e) => {
                self.selected = None;
                Err(bus_error(device, format!("select address: {e}")))
            }
        }
    }

    /// Write one byte to an 8-bit register
    pub fn write_u8(&mut self, device: BusDevice, register: u8, value: u8) -> GridResult<()> {
        self.select(device)?;
        self.bus
            .write(&[register, value])
            .map_err(|e| bus_error(device, format!("write register {register:#04x}: {e}")))
    }

    /// Write a 16-bit register, most significant byte first on the wire
    pub fn write_u16_be(&mut self, device: BusDevice, register: u8, value: u16) -> GridResult<()> {
        self.select(device)?;
        let [msb, lsb] = value.to_be_bytes();
        self.bus
            .write(&[register, msb, lsb])
            .map_err(|e| bus_error(device, format!("write register {register:#04x}: {e}")))
    }

    /// Read a 16-bit register and return its two bytes in wire order
    pub fn read_word_bytes(&mut self, device: BusDevice, register: u8) -> GridResult<[u8; 2]> {
        self.select(device)?;
        let mut buffer = [0u8; 2];
        self.bus
            .write_read(&[register], &mut buffer)
            .map_err(|e| bus_error(device, format!("read register {register:#04x}: {e}")))?;
        Ok(buffer)
    }

    /// Read a 16-bit big-endian register as a host integer
    pub fn read_u16_be(&mut self, device: BusDevice, register: u8) -> GridResult<u16> {
        self.read_word_bytes(device, register).map(u16::from_be_bytes)
    }

    /// Underlying bus handle
    #[must_use]
    pub fn inner(&self) -> &B {
        &self.bus
    }
}

fn bus_error(device: BusDevice, reason: String) -> GridError {
    GridError::Bus {
        device: device.name,
        address: device.address,
        reason,
    }
}

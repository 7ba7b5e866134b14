//! Hardware boundary
//!
//! The scan engine never touches a device file directly. It goes through four
//! small traits:
//!
//! - [`OutputLine`] - one digital output (shift register data, clock, latch)
//! - [`I2cBus`] - an I²C bus handle with a sticky slave address
//! - [`Delay`] - blocking waits for settle and poll intervals
//! - [`Platform`] - opens the above by pin and bus number
//!
//! Two platforms are provided: [`MockPlatform`] which simulates the complete
//! board for tests, and `RppalPlatform` (feature `rpi`) for a Raspberry Pi.

pub mod bus;
pub mod mock;
#[cfg(feature = "rpi")]
pub mod rpi;

use std::time::Duration;
use thiserror::Error;

pub use bus::{BusDevice, SharedBus};
pub use mock::{MockBus, MockDelay, MockLine, MockPlatform};
#[cfg(feature = "rpi")]
pub use rpi::RppalPlatform;

/// Failure reported by a platform primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// Pin or device file could not be claimed
    #[error("resource unavailable: {0}")]
    Unavailable(String),
    /// Transfer or line write failed
    #[error("I/O failure: {0}")]
    Io(String),
    /// Failure requested through [`MockPlatform`]
    #[error("injected failure: {0}")]
    Injected(String),
}

/// A single digital output line
pub trait OutputLine {
    /// Drive the line high or low
    fn set_level(&mut self, high: bool) -> Result<(), HardwareError>;

    /// Drive the line high
    fn set_high(&mut self) -> Result<(), HardwareError> {
        self.set_level(true)
    }

    /// Drive the line low
    fn set_low(&mut self) -> Result<(), HardwareError> {
        self.set_level(false)
    }
}

/// Raw I²C bus access.
///
/// The slave address set by `set_slave_address` stays in effect for every
/// following transfer until changed, the same way the Linux `I2C_SLAVE` ioctl
/// behaves.
pub trait I2cBus {
    /// Point following transfers at the 7-bit `address`
    fn set_slave_address(&mut self, address: u16) -> Result<(), HardwareError>;

    /// Write `bytes` in one transfer, first byte is the register pointer.
    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError>;

    /// Write `bytes`, then read `buffer.len()` bytes in wire order.
    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), HardwareError>;
}

/// Blocking delay provider
pub trait Delay {
    /// Block for at least `duration`
    fn delay(&mut self, duration: Duration);
}

/// Delay backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Factory for the handles a scan engine owns.
///
/// Opening the same pin twice is a platform decision; the engine only ever
/// opens each configured pin once per `init`.
pub trait Platform {
    /// Digital output handle
    type Line: OutputLine;
    /// I²C bus handle
    type Bus: I2cBus;
    /// Delay provider
    type Delay: Delay;

    /// Claim `pin` as an output driven low.
    fn open_line(&mut self, pin: u8) -> Result<Self::Line, HardwareError>;

    /// Open I²C bus number `bus` (e.g. `1` for `/dev/i2c-1`).
    fn open_bus(&mut self, bus: u8) -> Result<Self::Bus, HardwareError>;

    /// Delay provider used for pulses, settle times and polling
    fn delay(&mut self) -> Self::Delay;
}

//! Raspberry Pi platform backed by `rppal`
//!
//! GPIO lines are claimed through `/dev/gpiomem` and the I²C bus through
//! `/dev/i2c-N`. Delays use `std::thread::sleep`.

use rppal::gpio::{Gpio, OutputPin};
use rppal::i2c::I2c;

use super::{HardwareError, I2cBus, OutputLine, Platform, StdDelay};

/// Platform for a Raspberry Pi running Linux
#[derive(Default)]
pub struct RppalPlatform {
    gpio: Option<Gpio>,
}

impl RppalPlatform {
    /// Platform that opens `/dev/gpiomem` on first line request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn gpio(&mut self) -> Result<&Gpio, HardwareError> {
        if self.gpio.is_none() {
            let gpio = Gpio::new().map_err(|e| HardwareError::Unavailable(format!("gpio: {e}")))?;
            self.gpio = Some(gpio);
        }
        self.gpio
            .as_ref()
            .ok_or_else(|| HardwareError::Unavailable("gpio".into()))
    }
}

impl Platform for RppalPlatform {
    type Line = RppalLine;
    type Bus = RppalBus;
    type Delay = StdDelay;

    fn open_line(&mut self, pin: u8) -> Result<RppalLine, HardwareError> {
        let pin = self
            .gpio()?
            .get(pin)
            .map_err(|e| HardwareError::Unavailable(format!("gpio {pin}: {e}")))?;
        Ok(RppalLine(pin.into_output_low()))
    }

    fn open_bus(&mut self, bus: u8) -> Result<RppalBus, HardwareError> {
        I2c::with_bus(bus)
            .map(RppalBus)
            .map_err(|e| HardwareError::Unavailable(format!("/dev/i2c-{bus}: {e}")))
    }

    fn delay(&mut self) -> StdDelay {
        StdDelay
    }
}

/// Output pin, released to its previous mode on drop
#[derive(Debug)]
pub struct RppalLine(OutputPin);

impl OutputLine for RppalLine {
    fn set_level(&mut self, high: bool) -> Result<(), HardwareError> {
        if high {
            self.0.set_high();
        } else {
            self.0.set_low();
        }
        Ok(())
    }
}

/// `/dev/i2c-N` handle
#[derive(Debug)]
pub struct RppalBus(I2c);

impl I2cBus for RppalBus {
    fn set_slave_address(&mut self, address: u16) -> Result<(), HardwareError> {
        self.0
            .set_slave_address(address)
            .map_err(|e| HardwareError::Io(e.to_string()))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        let written = self
            .0
            .write(bytes)
            .map_err(|e| HardwareError::Io(e.to_string()))?;
        if written != bytes.len() {
            return Err(HardwareError::Io(format!(
                "short write: {written} of {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), HardwareError> {
        self.0
            .write_read(bytes, buffer)
            .map_err(|e| HardwareError::Io(e.to_string()))
    }
}

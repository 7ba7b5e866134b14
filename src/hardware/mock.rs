//! Mock Pressure Grid Board
//!
//! Simulates the complete board behind the [`Platform`] traits so the scan
//! engine can be exercised without hardware:
//!
//! - a 16-bit shift register clocked by the data/clock/latch lines
//! - an MCP23017 register file (direction and output latch registers)
//! - an ADS1015 with single-shot conversions and a configurable number of
//!   status polls before the conversion reports complete
//!
//! The ADC answers with the sample assigned to the cell that is currently
//! selected by the latched row pattern and the expander's column code, so the
//! sample order in a frame proves which row/column pair was driven.
//!
//! Failure injection and a call log follow the usual mock adapter pattern:
//! failures are one-shot and consumed when triggered.
//!
//! # Example
//!
//! ```
//! use pressure_grid::hardware::MockPlatform;
//!
//! let platform = MockPlatform::new();
//! platform.set_sample(0, 0, 1234);
//! platform.fail_bus_after(3);
//! assert_eq!(platform.address_selects(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Delay, HardwareError, I2cBus, OutputLine, Platform};
use crate::config::GridConfig;
use crate::grid::adc::{REG_CONFIG, REG_CONVERSION, SAMPLE_BITS, SAMPLE_MAX};
use crate::grid::column::{ENABLE_BIT, IODIRA, IODIRB, OLATA, REGISTER_COUNT};
use crate::grid::Sample;

const OS_BIT: u16 = 1 << 15;

#[derive(Debug)]
struct MockBoard {
    data_pin: u8,
    clock_pin: u8,
    latch_pin: u8,
    expander_address: u16,
    adc_address: u16,

    levels: HashMap<u8, bool>,
    unavailable_lines: HashSet<u8>,
    bus_available: bool,

    shift_register: u16,
    latched_rows: u16,
    expander: [u8; REGISTER_COUNT],

    adc_config: u16,
    adc_conversion: u16,
    converting: bool,
    polls_since_start: u32,
    ready_after: u32,
    never_ready: bool,

    samples: HashMap<(usize, usize), Sample>,
    default_sample: Sample,

    bus_fail_after: Option<usize>,
    line_fail_next: bool,

    selects: usize,
    conversions: usize,
    simulated: Duration,
    log: Vec<String>,
}

impl MockBoard {
    fn new(config: &GridConfig) -> Self {
        let mut expander = [0u8; REGISTER_COUNT];
        // Power-on state: both ports are inputs
        expander[IODIRA as usize] = 0xFF;
        expander[IODIRB as usize] = 0xFF;

        Self {
            data_pin: config.pins.data,
            clock_pin: config.pins.shift_clock,
            latch_pin: config.pins.latch_clock,
            expander_address: config.bus.expander_address,
            adc_address: config.bus.adc_address,
            levels: HashMap::new(),
            unavailable_lines: HashSet::new(),
            bus_available: true,
            shift_register: 0,
            latched_rows: 0,
            expander,
            adc_config: 0x8583,
            adc_conversion: 0,
            converting: false,
            polls_since_start: 0,
            ready_after: 1,
            never_ready: false,
            samples: HashMap::new(),
            default_sample: 0,
            bus_fail_after: None,
            line_fail_next: false,
            selects: 0,
            conversions: 0,
            simulated: Duration::ZERO,
            log: Vec::new(),
        }
    }

    fn check_bus_failure(&mut self, operation: &str) -> Result<(), HardwareError> {
        match self.bus_fail_after {
            Some(0) => {
                self.bus_fail_after = None;
                self.log.push(format!("fail {operation}"));
                Err(HardwareError::Injected(format!("bus {operation}")))
            }
            Some(n) => {
                self.bus_fail_after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn set_line(&mut self, pin: u8, high: bool) -> Result<(), HardwareError> {
        if std::mem::take(&mut self.line_fail_next) {
            self.log.push(format!("fail line {pin}"));
            return Err(HardwareError::Injected(format!("line {pin}")));
        }

        let was_high = self.levels.insert(pin, high).unwrap_or(false);
        let rising = high && !was_high;
        if rising && pin == self.clock_pin {
            let bit = u16::from(self.levels.get(&self.data_pin).copied().unwrap_or(false));
            self.shift_register = (self.shift_register << 1) | bit;
        } else if rising && pin == self.latch_pin {
            self.latched_rows = self.shift_register;
            self.log.push(format!("latch {:016b}", self.latched_rows));
        }
        Ok(())
    }

    fn selected_row(&self) -> Option<usize> {
        (self.latched_rows.count_ones() == 1).then(|| self.latched_rows.leading_zeros() as usize)
    }

    fn selected_column(&self) -> Option<usize> {
        let direction = self.expander[IODIRA as usize];
        let latch = self.expander[OLATA as usize];
        // A0..A4 must be outputs for the mux address and enable to reach the pins
        let outputs_enabled = direction & 0x1F == 0;
        (outputs_enabled && latch & ENABLE_BIT != 0).then_some(usize::from(latch & 0x0F))
    }

    fn start_conversion(&mut self) {
        let sample = match (self.selected_row(), self.selected_column()) {
            (Some(row), Some(col)) => self
                .samples
                .get(&(row, col))
                .copied()
                .unwrap_or(self.default_sample),
            _ => 0,
        };
        self.adc_conversion = (sample & SAMPLE_MAX) << (16 - SAMPLE_BITS);
        self.converting = true;
        self.polls_since_start = 0;
        self.conversions += 1;
    }

    fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), HardwareError> {
        self.check_bus_failure("write")?;
        self.log.push(format!("write {address:#04x} {bytes:02x?}"));

        let Some((&register, payload)) = bytes.split_first() else {
            return Err(HardwareError::Io("empty write".into()));
        };

        if address == self.expander_address {
            for (offset, value) in payload.iter().enumerate() {
                let index = usize::from(register) + offset;
                let slot = self
                    .expander
                    .get_mut(index)
                    .ok_or_else(|| HardwareError::Io(format!("no expander register {index:#04x}")))?;
                *slot = *value;
            }
            Ok(())
        } else if address == self.adc_address {
            match (register, payload) {
                (_, []) => Ok(()),
                (REG_CONFIG, [msb, lsb]) => {
                    let value = u16::from_be_bytes([*msb, *lsb]);
                    self.adc_config = value & !OS_BIT;
                    if value & OS_BIT != 0 {
                        self.start_conversion();
                    }
                    Ok(())
                }
                _ => Err(HardwareError::Io(format!(
                    "unsupported ADC write to register {register:#04x}"
                ))),
            }
        } else {
            Err(HardwareError::Io(format!("NACK from {address:#04x}")))
        }
    }

    fn read(&mut self, address: u16, register: u8, buffer: &mut [u8]) -> Result<(), HardwareError> {
        self.check_bus_failure("read")?;
        self.log.push(format!("read {address:#04x} {register:#04x}"));

        if address == self.expander_address {
            for (offset, slot) in buffer.iter_mut().enumerate() {
                let index = usize::from(register) + offset;
                *slot = *self
                    .expander
                    .get(index)
                    .ok_or_else(|| HardwareError::Io(format!("no expander register {index:#04x}")))?;
            }
            return Ok(());
        }
        if address != self.adc_address {
            return Err(HardwareError::Io(format!("NACK from {address:#04x}")));
        }

        let word = match register {
            REG_CONVERSION => self.adc_conversion,
            REG_CONFIG => {
                if self.converting {
                    self.polls_since_start += 1;
                    if !self.never_ready && self.polls_since_start >= self.ready_after {
                        self.converting = false;
                    }
                }
                if self.converting {
                    self.adc_config
                } else {
                    self.adc_config | OS_BIT
                }
            }
            other => {
                return Err(HardwareError::Io(format!(
                    "unsupported ADC register {other:#04x}"
                )))
            }
        };
        for (slot, byte) in buffer.iter_mut().zip(word.to_be_bytes()) {
            *slot = byte;
        }
        Ok(())
    }
}

/// Simulated platform; clones share the same board
#[derive(Debug, Clone)]
pub struct MockPlatform {
    board: Arc<Mutex<MockBoard>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// Board wired with the default pin and address assignments
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&GridConfig::default())
    }

    /// Board wired with the pins and addresses of `config`
    #[must_use]
    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            board: Arc::new(Mutex::new(MockBoard::new(config))),
        }
    }

    fn board(&self) -> MutexGuard<'_, MockBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sample returned for cell (`row`, `col`)
    pub fn set_sample(&self, row: usize, col: usize, value: Sample) {
        self.board().samples.insert((row, col), value);
    }

    /// Sample returned for cells without an explicit value
    pub fn set_default_sample(&self, value: Sample) {
        self.board().default_sample = value;
    }

    /// Number of status polls before a conversion reports complete
    pub fn set_adc_ready_after(&self, polls: u32) {
        self.board().ready_after = polls.max(1);
    }

    /// Make the ADC never report conversion-complete
    pub fn set_adc_never_ready(&self, never_ready: bool) {
        self.board().never_ready = never_ready;
    }

    /// Fail the bus operation that follows the next `ops` successful ones
    pub fn fail_bus_after(&self, ops: usize) {
        self.board().bus_fail_after = Some(ops);
    }

    /// Fail the next digital line write
    pub fn inject_line_failure(&self) {
        self.board().line_fail_next = true;
    }

    /// Make `open_bus` fail until re-enabled
    pub fn set_bus_available(&self, available: bool) {
        self.board().bus_available = available;
    }

    /// Make `open_line(pin)` fail until re-enabled
    pub fn set_line_available(&self, pin: u8, available: bool) {
        let mut board = self.board();
        if available {
            board.unavailable_lines.remove(&pin);
        } else {
            board.unavailable_lines.insert(pin);
        }
    }

    /// Row pattern currently on the shift register outputs
    #[must_use]
    pub fn latched_rows(&self) -> u16 {
        self.board().latched_rows
    }

    /// Value of an expander register, `None` past the register file
    #[must_use]
    pub fn expander_register(&self, register: u8) -> Option<u8> {
        self.board().expander.get(usize::from(register)).copied()
    }

    /// Number of slave-address selects issued on the bus
    #[must_use]
    pub fn address_selects(&self) -> usize {
        self.board().selects
    }

    /// Number of ADC conversions started
    #[must_use]
    pub fn conversions(&self) -> usize {
        self.board().conversions
    }

    /// Total time requested from [`MockDelay`]
    #[must_use]
    pub fn simulated_time(&self) -> Duration {
        self.board().simulated
    }

    /// Bus transfers, line latches and injected failures in order
    #[must_use]
    pub fn call_log(&self) -> Vec<String> {
        self.board().log.clone()
    }

    /// Forget everything logged so far
    pub fn clear_log(&self) {
        self.board().log.clear();
    }
}

impl Platform for MockPlatform {
    type Line = MockLine;
    type Bus = MockBus;
    type Delay = MockDelay;

    fn open_line(&mut self, pin: u8) -> Result<MockLine, HardwareError> {
        let mut board = self.board();
        if board.unavailable_lines.contains(&pin) {
            return Err(HardwareError::Unavailable(format!("gpio {pin}")));
        }
        board.levels.insert(pin, false);
        board.log.push(format!("open line {pin}"));
        Ok(MockLine {
            pin,
            board: self.board.clone(),
        })
    }

    fn open_bus(&mut self, bus: u8) -> Result<MockBus, HardwareError> {
        let mut board = self.board();
        if !board.bus_available {
            return Err(HardwareError::Unavailable(format!("/dev/i2c-{bus}")));
        }
        board.log.push(format!("open bus {bus}"));
        Ok(MockBus {
            address: None,
            board: self.board.clone(),
        })
    }

    fn delay(&mut self) -> MockDelay {
        MockDelay {
            board: self.board.clone(),
        }
    }
}

/// Simulated output line
#[derive(Debug)]
pub struct MockLine {
    pin: u8,
    board: Arc<Mutex<MockBoard>>,
}

impl OutputLine for MockLine {
    fn set_level(&mut self, high: bool) -> Result<(), HardwareError> {
        self.board
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_line(self.pin, high)
    }
}

/// Simulated I²C bus handle
#[derive(Debug)]
pub struct MockBus {
    address: Option<u16>,
    board: Arc<Mutex<MockBoard>>,
}

impl MockBus {
    fn board(&self) -> MutexGuard<'_, MockBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target(&self) -> Result<u16, HardwareError> {
        self.address
            .ok_or_else(|| HardwareError::Io("no slave address selected".into()))
    }
}

impl I2cBus for MockBus {
    fn set_slave_address(&mut self, address: u16) -> Result<(), HardwareError> {
        {
            let mut board = self.board();
            board.check_bus_failure("select")?;
            board.selects += 1;
            board.log.push(format!("select {address:#04x}"));
        }
        self.address = Some(address);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        let address = self.target()?;
        self.board().write(address, bytes)
    }

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), HardwareError> {
        let address = self.target()?;
        let register = *bytes
            .first()
            .ok_or_else(|| HardwareError::Io("missing register pointer".into()))?;
        self.board().read(address, register, buffer)
    }
}

/// Delay that only accumulates simulated time
#[derive(Debug, Clone)]
pub struct MockDelay {
    board: Arc<Mutex<MockBoard>>,
}

impl Delay for MockDelay {
    fn delay(&mut self, duration: Duration) {
        self.board
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .simulated += duration;
    }
}

//! ADS1015 single-shot sampler
//!
//! Each sample is one single-shot conversion on a fixed single-ended input:
//! write the config register with OS set, poll the config register until OS
//! reads back as 1 (conversion complete), then read the conversion register.
//!
//! The ADS1015 puts the most significant byte on the wire first and left
//! aligns its 12-bit result in the 16-bit conversion register, so a sample is
//! `u16::from_be_bytes(raw) >> 4`. [`sample_from_be_bytes`] is the only place
//! that conversion happens.
//!
//! Config register layout:
//!
//! ```text
//!  15    14..12   11..9   8      7..5   4..0
//!  OS    MUX      PGA     MODE   DR     COMP_*
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::Sample;
use crate::error::{GridError, GridResult};
use crate::hardware::{BusDevice, Delay, I2cBus, SharedBus};

/// Conversion result register
pub const REG_CONVERSION: u8 = 0x00;
/// Config and status register
pub const REG_CONFIG: u8 = 0x01;

/// Significant bits in a conversion result
pub const SAMPLE_BITS: u32 = 12;
/// Largest value a sample can take
pub const SAMPLE_MAX: Sample = (1 << SAMPLE_BITS) - 1;

/// Number of single-ended inputs (AIN0..AIN3)
pub const CHANNELS: u8 = 4;

const OS_START: u16 = 1 << 15;
const MUX_SINGLE_ENDED: u16 = 0b100;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const COMPARATOR_DISABLED: u16 = 0b0_0011;

/// Programmable gain amplifier full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gain {
    /// ±6.144 V
    Fsr6v144,
    /// ±4.096 V
    #[default]
    Fsr4v096,
    /// ±2.048 V
    Fsr2v048,
    /// ±1.024 V
    Fsr1v024,
    /// ±0.512 V
    Fsr0v512,
    /// ±0.256 V
    Fsr0v256,
}

impl Gain {
    const fn bits(self) -> u16 {
        match self {
            Gain::Fsr6v144 => 0b000,
            Gain::Fsr4v096 => 0b001,
            Gain::Fsr2v048 => 0b010,
            Gain::Fsr1v024 => 0b011,
            Gain::Fsr0v512 => 0b100,
            Gain::Fsr0v256 => 0b101,
        }
    }
}

/// Conversion rate in samples per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRate {
    /// 128 SPS
    Sps128,
    /// 250 SPS
    Sps250,
    /// 490 SPS
    Sps490,
    /// 920 SPS
    Sps920,
    /// 1600 SPS
    #[default]
    Sps1600,
    /// 2400 SPS
    Sps2400,
    /// 3300 SPS
    Sps3300,
}

impl DataRate {
    const fn bits(self) -> u16 {
        match self {
            DataRate::Sps128 => 0b000,
            DataRate::Sps250 => 0b001,
            DataRate::Sps490 => 0b010,
            DataRate::Sps920 => 0b011,
            DataRate::Sps1600 => 0b100,
            DataRate::Sps2400 => 0b101,
            DataRate::Sps3300 => 0b110,
        }
    }

    /// Nominal rate as a number
    #[must_use]
    pub const fn samples_per_second(self) -> u32 {
        match self {
            DataRate::Sps128 => 128,
            DataRate::Sps250 => 250,
            DataRate::Sps490 => 490,
            DataRate::Sps920 => 920,
            DataRate::Sps1600 => 1600,
            DataRate::Sps2400 => 2400,
            DataRate::Sps3300 => 3300,
        }
    }
}

/// Conversion and polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcSettings {
    /// Single-ended input, 0..=3
    pub channel: u8,
    /// PGA full-scale range
    pub gain: Gain,
    /// Conversion rate
    pub data_rate: DataRate,
    /// Upper bound on status polls
    pub poll_attempts: u32,
    /// Wait before each status poll
    pub poll_interval: Duration,
}

impl Default for AdcSettings {
    fn default() -> Self {
        Self {
            channel: 0,
            gain: Gain::default(),
            data_rate: DataRate::default(),
            poll_attempts: 1000,
            poll_interval: Duration::from_micros(100),
        }
    }
}

/// Config word requesting one single-ended conversion on `channel`
#[must_use]
pub const fn config_word(channel: u8, gain: Gain, data_rate: DataRate) -> u16 {
    let mux = MUX_SINGLE_ENDED | (channel as u16 & 0b11);
    OS_START | (mux << 12) | (gain.bits() << 9) | MODE_SINGLE_SHOT | (data_rate.bits() << 5)
        | COMPARATOR_DISABLED
}

/// Conversion register bytes, in wire order, to a 12-bit sample
#[must_use]
pub const fn sample_from_be_bytes(raw: [u8; 2]) -> Sample {
    u16::from_be_bytes(raw) >> (16 - SAMPLE_BITS)
}

/// Single-shot sampler for one ADS1015 on the shared bus
#[derive(Debug, Clone, Copy)]
pub struct AdcSampler {
    device: BusDevice,
    config_word: u16,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl AdcSampler {
    /// Sampler for the device at `address`; the config word is fixed here
    #[must_use]
    pub fn new(address: u16, settings: &AdcSettings) -> Self {
        Self {
            device: BusDevice::new("ADS1015", address),
            config_word: config_word(settings.channel, settings.gain, settings.data_rate),
            poll_attempts: settings.poll_attempts.max(1),
            poll_interval: settings.poll_interval,
        }
    }

    /// Bus identity used in error reports
    #[must_use]
    pub fn device(&self) -> BusDevice {
        self.device
    }

    /// Word written to the config register to start each conversion
    #[must_use]
    pub fn config_word(&self) -> u16 {
        self.config_word
    }

    /// Run one conversion and return the 12-bit result.
    ///
    /// Polling stops after `poll_attempts` status reads or once
    /// `poll_attempts * poll_interval` of wall time has passed, whichever
    /// comes first. Returns [`GridError::ConversionTimeout`] if the ADC never
    /// reports completion in that window.
    pub fn read_sample<B: I2cBus, D: Delay>(
        &self,
        bus: &mut SharedBus<B>,
        delay: &mut D,
    ) -> GridResult<Sample> {
        bus.write_u16_be(self.device, REG_CONFIG, self.config_word)?;
        self.wait_for_conversion(bus, delay)?;
        let raw = bus.read_word_bytes(self.device, REG_CONVERSION)?;
        Ok(sample_from_be_bytes(raw))
    }

    fn wait_for_conversion<B: I2cBus, D: Delay>(
        &self,
        bus: &mut SharedBus<B>,
        delay: &mut D,
    ) -> GridResult<()> {
        // Wall-clock cap on top of the attempt cap
        let budget = self.poll_interval.saturating_mul(self.poll_attempts);
        let deadline = (!budget.is_zero()).then(|| Instant::now() + budget);

        let mut attempts = 0;
        while attempts < self.poll_attempts {
            attempts += 1;
            delay.delay(self.poll_interval);
            let status = bus.read_u16_be(self.device, REG_CONFIG)?;
            if status & OS_START != 0 {
                trace!(attempts, "conversion complete");
                return Ok(());
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
        }
        Err(GridError::ConversionTimeout { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{ColumnAddress, ColumnSelector, RowDriver, ROW_PATTERNS};
    use crate::hardware::{MockPlatform, Platform, StdDelay};

    fn bus(platform: &mut MockPlatform) -> SharedBus<crate::hardware::MockBus> {
        SharedBus::new(platform.open_bus(1).unwrap())
    }

    #[test]
    fn test_default_config_word() {
        assert_eq!(config_word(0, Gain::Fsr4v096, DataRate::Sps1600), 0xC383);
        assert_eq!(AdcSampler::new(0x48, &AdcSettings::default()).config_word(), 0xC383);
    }

    #[test]
    fn test_config_word_fields() {
        // AIN3, ±2.048 V, 3300 SPS
        assert_eq!(config_word(3, Gain::Fsr2v048, DataRate::Sps3300), 0xF5C3);
        // channel is masked to the two low bits
        assert_eq!(
            config_word(4, Gain::Fsr4v096, DataRate::Sps1600),
            config_word(0, Gain::Fsr4v096, DataRate::Sps1600)
        );
    }

    #[test]
    fn test_big_endian_normalization() {
        assert_eq!(sample_from_be_bytes(0x0F00u16.to_be_bytes()), 0x0F0);
        assert_eq!(sample_from_be_bytes([0x0F, 0x00]), 0x0F0);
        assert_eq!(sample_from_be_bytes([0xFF, 0xF0]), SAMPLE_MAX);
        // a little-endian misread of the same register would give 0x000
        assert_ne!(sample_from_be_bytes(0x0F00u16.to_le_bytes()), 0x0F0);
    }

    #[test]
    fn test_read_sample_from_selected_cell() {
        let mut platform = MockPlatform::new();
        let mut bus = bus(&mut platform);
        let mut delay = platform.delay();
        platform.set_default_sample(0x0F0);

        // Drive row 0 and column 0 directly through the mock
        let mut rows = RowDriver::new(
            platform.open_line(5).unwrap(),
            platform.open_line(13).unwrap(),
            platform.open_line(6).unwrap(),
            Duration::ZERO,
        );
        rows.select_row(ROW_PATTERNS[0], &mut delay).unwrap();
        let selector = ColumnSelector::new(0x21);
        selector.configure(&mut bus).unwrap();
        selector
            .select_column(&mut bus, ColumnAddress::new(0).unwrap())
            .unwrap();

        let sampler = AdcSampler::new(0x48, &AdcSettings::default());
        assert_eq!(sampler.read_sample(&mut bus, &mut delay).unwrap(), 0x0F0);
        assert_eq!(platform.conversions(), 1);
    }

    #[test]
    fn test_polls_until_ready() {
        let mut platform = MockPlatform::new();
        let mut bus = bus(&mut platform);
        let mut delay = platform.delay();
        platform.set_adc_ready_after(5);

        let settings = AdcSettings {
            poll_interval: Duration::from_micros(100),
            ..AdcSettings::default()
        };
        AdcSampler::new(0x48, &settings)
            .read_sample(&mut bus, &mut delay)
            .unwrap();
        assert_eq!(platform.simulated_time(), Duration::from_micros(500));
    }

    #[test]
    fn test_timeout_is_bounded() {
        let mut platform = MockPlatform::new();
        let mut bus = bus(&mut platform);
        let mut delay = platform.delay();
        platform.set_adc_never_ready(true);

        let sampler = AdcSampler::new(0x48, &AdcSettings::default());
        let err = sampler.read_sample(&mut bus, &mut delay).unwrap_err();
        assert!(matches!(err, GridError::ConversionTimeout { attempts: 1000 }));
        // 1000 polls x 100 µs
        assert_eq!(platform.simulated_time(), Duration::from_millis(100));
        assert!(platform.simulated_time() <= Duration::from_millis(150));
    }

    #[test]
    fn test_timeout_wall_clock_with_default_cap() {
        let mut platform = MockPlatform::new();
        let mut bus = bus(&mut platform);
        platform.set_adc_never_ready(true);

        // 1000 polls x 100 µs on real sleeps
        let started = Instant::now();
        let result =
            AdcSampler::new(0x48, &AdcSettings::default()).read_sample(&mut bus, &mut StdDelay);
        let elapsed = started.elapsed();

        match result {
            Err(GridError::ConversionTimeout { attempts }) => assert!(attempts <= 1000),
            other => panic!("expected conversion timeout, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(150), "{elapsed:?}");
    }

    #[test]
    fn test_zero_interval_uses_attempt_cap() {
        let mut platform = MockPlatform::new();
        let mut bus = bus(&mut platform);
        platform.set_adc_never_ready(true);

        let settings = AdcSettings {
            poll_attempts: 7,
            poll_interval: Duration::ZERO,
            ..AdcSettings::default()
        };
        let err = AdcSampler::new(0x48, &settings)
            .read_sample(&mut bus, &mut StdDelay)
            .unwrap_err();
        assert!(matches!(err, GridError::ConversionTimeout { attempts: 7 }));
    }

    #[test]
    fn test_bus_error_propagates() {
        let mut platform = MockPlatform::new();
        let mut bus = bus(&mut platform);
        let mut delay = platform.delay();
        platform.fail_bus_after(1);

        let err = AdcSampler::new(0x48, &AdcSettings::default())
            .read_sample(&mut bus, &mut delay)
            .unwrap_err();
        assert!(matches!(err, GridError::Bus { device: "ADS1015", .. }));
    }

    #[test]
    fn test_settings_serde_names() {
        let gain: Gain = serde_json::from_str("\"fsr2v048\"").unwrap();
        assert_eq!(gain, Gain::Fsr2v048);
        let rate: DataRate = serde_json::from_str("\"sps3300\"").unwrap();
        assert_eq!(rate.samples_per_second(), 3300);
    }
}

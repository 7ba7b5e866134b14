//! Configuration loading tests
//!
//! Tests that set `PRESSURE_GRID_*` variables are `#[serial]` so they do not
//! leak overrides into each other.

use std::io::Write;

use pressure_grid::config::{ConfigError, GridConfig, TimeoutPolicy};
use pressure_grid::grid::{DataRate, Gain};
use serial_test::serial;
use tempfile::{Builder, NamedTempFile};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let config = GridConfig::load_from("does/not/exist.toml").unwrap();
    assert_eq!(config, GridConfig::default());
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
        log_level = "debug"

        [grid]
        rows = 4

        [adc]
        gain = "fsr2v048"
        data_rate = "sps3300"
        "#,
    );

    let config = GridConfig::load_from(file.path()).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.grid.rows, 4);
    assert_eq!(config.grid.cols, 12);
    assert_eq!(config.adc.gain, Gain::Fsr2v048);
    assert_eq!(config.adc.data_rate, DataRate::Sps3300);
    assert_eq!(config.adc.poll_attempts, 1000);
    assert_eq!(config.bus.adc_address, 0x48);
}

#[test]
#[serial]
fn test_substitute_policy_from_file() {
    let file = write_config(
        r#"
        [scan.timeout_policy]
        mode = "substitute"
        sentinel = 4095
        "#,
    );

    let config = GridConfig::load_from(file.path()).unwrap();
    assert_eq!(
        config.scan.timeout_policy,
        TimeoutPolicy::Substitute { sentinel: 4095 }
    );
}

#[test]
#[serial]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/pressure_grid.toml");
    let config = GridConfig::load_from(path).unwrap();
    assert_eq!(config, GridConfig::default());
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    let file = write_config(
        r#"
        [grid]
        cols = 17
        "#,
    );

    let err = GridConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("cols")));
}

#[test]
#[serial]
fn test_malformed_file_is_load_error() {
    let file = write_config("[grid\nrows = ");
    let err = GridConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = write_config(
        r#"
        [grid]
        rows = 4

        [timing]
        row_settle_us = 2000
        "#,
    );

    std::env::set_var("PRESSURE_GRID_GRID__ROWS", "8");
    std::env::set_var("PRESSURE_GRID_LOG_LEVEL", "trace");
    let result = GridConfig::load_from(file.path());
    std::env::remove_var("PRESSURE_GRID_GRID__ROWS");
    std::env::remove_var("PRESSURE_GRID_LOG_LEVEL");

    let config = result.unwrap();
    assert_eq!(config.grid.rows, 8);
    assert_eq!(config.log_level, "trace");
    assert_eq!(config.timing.row_settle_us, 2000);
}

#[test]
#[serial]
fn test_env_override_is_validated() {
    std::env::set_var("PRESSURE_GRID_ADC__CHANNEL", "7");
    let result = GridConfig::load_from("does/not/exist.toml");
    std::env::remove_var("PRESSURE_GRID_ADC__CHANNEL");

    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

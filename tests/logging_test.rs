//! Global subscriber installation
//!
//! Lives in its own test binary because it installs the process-wide
//! subscriber.

use pressure_grid::{logging, GridError};

#[test]
fn test_init_installs_once() {
    logging::init("pressure_grid=debug,warn").unwrap();
    tracing::info!("subscriber installed");

    let err = logging::init("info").unwrap_err();
    assert!(matches!(err, GridError::Logging(_)));
}

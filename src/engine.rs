//! Scan engine
//!
//! Owns the hardware handles and turns one call to [`ScanEngine::scan`] into
//! a full sweep of the grid: rows outer, columns inner. For every row the
//! pattern is shifted in and latched, then the row settles; for every column
//! the mux is switched, the column settles and one ADC conversion is taken.
//!
//! Lifecycle:
//!
//! ```text
//!  Uninitialized --init--> Ready --scan--> Scanning --> Ready --cleanup--> Closed
//!                            ^                                               |
//!                            +--------------------init-----------------------+
//! ```
//!
//! A failed scan returns the engine to `Ready` with its handles intact, so the
//! next `scan()` works without re-initializing. Cleanup releases columns
//! before rows and never fails.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, trace, warn};

use crate::config::{GridConfig, TimeoutPolicy};
use crate::error::{GridError, GridResult};
use crate::grid::{
    AdcSampler, ColumnAddress, ColumnSelector, Frame, RowDriver, RowPattern, Sample, ScanSummary,
};
use crate::hardware::{Delay, Platform, SharedBus};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, no hardware acquired yet
    Uninitialized,
    /// Handles held, grid at rest, scans allowed
    Ready,
    /// A sweep is in progress
    Scanning,
    /// Handles released by `cleanup`
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready => "ready",
            EngineState::Scanning => "scanning",
            EngineState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Handles acquired by `init` and released by `cleanup`
pub struct HardwareHandles<P: Platform> {
    rows: RowDriver<P::Line>,
    bus: SharedBus<P::Bus>,
    delay: P::Delay,
}

/// Fixed per-engine sweep parameters derived from the configuration
#[derive(Debug, Clone)]
struct ScanPlan {
    rows: Vec<RowPattern>,
    columns: Vec<ColumnAddress>,
    selector: ColumnSelector,
    adc: AdcSampler,
    row_settle: Duration,
    column_settle: Duration,
    timeout_policy: TimeoutPolicy,
}

impl ScanPlan {
    fn from_config(config: &GridConfig) -> GridResult<Self> {
        let rows = (0..config.grid.rows)
            .map(RowPattern::for_row)
            .collect::<GridResult<Vec<_>>>()?;
        let columns = (0..config.grid.cols)
            .map(ColumnAddress::new)
            .collect::<GridResult<Vec<_>>>()?;

        Ok(Self {
            rows,
            columns,
            selector: ColumnSelector::new(config.bus.expander_address),
            adc: AdcSampler::new(config.bus.adc_address, &config.adc.settings()),
            row_settle: config.timing.row_settle(),
            column_settle: config.timing.column_settle(),
            timeout_policy: config.scan.timeout_policy,
        })
    }

    fn cells(&self) -> usize {
        self.rows.len() * self.columns.len()
    }
}

/// Cells written so far by an in-progress sweep
#[derive(Debug, Default)]
struct SweepProgress {
    completed: usize,
    last_cell: Option<usize>,
    substituted: usize,
}

/// Resistive grid scanner over a hardware [`Platform`]
pub struct ScanEngine<P: Platform> {
    platform: P,
    config: GridConfig,
    plan: ScanPlan,
    state: EngineState,
    handles: Option<HardwareHandles<P>>,
    frames_scanned: u64,
}

impl<P: Platform> ScanEngine<P> {
    /// Validate `config` and build an engine; no hardware is touched until
    /// [`init`](Self::init).
    pub fn new(platform: P, config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        let plan = ScanPlan::from_config(&config)?;
        Ok(Self {
            platform,
            config,
            plan,
            state: EngineState::Uninitialized,
            handles: None,
            frames_scanned: 0,
        })
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Validated configuration the engine was built with
    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Complete frames produced since the engine was built
    #[must_use]
    pub fn frames_scanned(&self) -> u64 {
        self.frames_scanned
    }

    /// Whether `scan` may be called
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Acquire lines and bus, configure the expander and put every row and
    /// column at rest.
    ///
    /// On failure nothing stays acquired and the state is unchanged.
    #[instrument(skip(self), fields(rows = self.config.grid.rows, cols = self.config.grid.cols))]
    pub fn init(&mut self) -> GridResult<()> {
        match self.state {
            EngineState::Uninitialized | EngineState::Closed => {}
            state => {
                return Err(GridError::InvalidState {
                    operation: "init",
                    state,
                })
            }
        }

        let mut handles = self.open_handles()?;
        self.plan
            .selector
            .configure(&mut handles.bus)
            .map_err(|e| init_error("MCP23017 configuration", e))?;
        handles
            .rows
            .deassert(&mut handles.delay)
            .map_err(|e| init_error("shift register reset", e))?;

        self.handles = Some(handles);
        self.state = EngineState::Ready;
        info!("Scan engine ready");
        Ok(())
    }

    fn open_handles(&mut self) -> GridResult<HardwareHandles<P>> {
        let pins = self.config.pins;
        let data = open_line(&mut self.platform, "data", pins.data)?;
        let clock = open_line(&mut self.platform, "shift clock", pins.shift_clock)?;
        let latch = open_line(&mut self.platform, "latch clock", pins.latch_clock)?;

        let bus_number = self.config.bus.bus;
        let bus = self
            .platform
            .open_bus(bus_number)
            .map_err(|e| GridError::HardwareInit {
                resource: format!("i2c bus {bus_number}"),
                reason: e.to_string(),
            })?;
        debug!(bus = bus_number, "I2C bus opened");

        Ok(HardwareHandles {
            rows: RowDriver::new(data, clock, latch, self.config.timing.clock_pulse()),
            bus: SharedBus::new(bus),
            delay: self.platform.delay(),
        })
    }

    /// Scan the full grid into a newly allocated frame.
    ///
    /// Cells filled under [`TimeoutPolicy::Substitute`] are reported by
    /// [`Frame::substituted`].
    pub fn scan(&mut self) -> GridResult<Frame> {
        self.ensure_ready("scan")?;
        let mut samples = vec![0; self.plan.cells()];
        let summary = self.scan_into(&mut samples)?;
        Ok(Frame::new(
            self.plan.rows.len(),
            self.plan.columns.len(),
            samples,
            &summary,
        ))
    }

    /// Scan the full grid into `buffer`, row-major.
    ///
    /// `buffer` must hold exactly `rows * cols` samples. If the sweep stops
    /// early the error is [`GridError::PartialFrame`] and `buffer` holds the
    /// cells up to `last_cell`; the rest keep their previous contents.
    #[instrument(skip_all, fields(sequence = self.frames_scanned + 1))]
    pub fn scan_into(&mut self, buffer: &mut [Sample]) -> GridResult<ScanSummary> {
        self.ensure_ready("scan")?;
        let expected = self.plan.cells();
        if buffer.len() != expected {
            return Err(GridError::BufferSize {
                expected,
                actual: buffer.len(),
            });
        }
        let Some(handles) = self.handles.as_mut() else {
            return Err(GridError::InvalidState {
                operation: "scan",
                state: self.state,
            });
        };

        self.state = EngineState::Scanning;
        let started = Instant::now();
        let mut progress = SweepProgress::default();
        let result = sweep(handles, &self.plan, buffer, &mut progress);
        self.state = EngineState::Ready;

        match result {
            Ok(()) => {
                self.frames_scanned += 1;
                let summary = ScanSummary {
                    sequence: self.frames_scanned,
                    cells: progress.completed,
                    substituted: progress.substituted,
                    elapsed: started.elapsed(),
                };
                debug!(
                    sequence = summary.sequence,
                    substituted = summary.substituted,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "Frame complete"
                );
                Ok(summary)
            }
            Err(source) => {
                warn!(
                    completed = progress.completed,
                    error = %source,
                    "Scan aborted, releasing grid"
                );
                release(handles, &self.plan.selector);
                Err(GridError::PartialFrame {
                    completed: progress.completed,
                    last_cell: progress.last_cell,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Release rows and columns and drop every handle.
    ///
    /// Release failures are logged, never returned. Calling this before
    /// `init` or more than once is a no-op.
    #[instrument(skip(self))]
    pub fn cleanup(&mut self) -> GridResult<()> {
        if let Some(mut handles) = self.handles.take() {
            release(&mut handles, &self.plan.selector);
            self.state = EngineState::Closed;
            info!("Scan engine closed");
        }
        Ok(())
    }

    fn ensure_ready(&self, operation: &'static str) -> GridResult<()> {
        if self.state == EngineState::Ready {
            Ok(())
        } else {
            Err(GridError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl<P: Platform> Drop for ScanEngine<P> {
    fn drop(&mut self) {
        if let Some(mut handles) = self.handles.take() {
            release(&mut handles, &self.plan.selector);
        }
    }
}

impl<P: Platform> fmt::Debug for ScanEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEngine")
            .field("state", &self.state)
            .field("rows", &self.plan.rows.len())
            .field("cols", &self.plan.columns.len())
            .field("frames_scanned", &self.frames_scanned)
            .finish_non_exhaustive()
    }
}

fn open_line<P: Platform>(platform: &mut P, name: &str, pin: u8) -> GridResult<P::Line> {
    platform.open_line(pin).map_err(|e| GridError::HardwareInit {
        resource: format!("{name} line (gpio {pin})"),
        reason: e.to_string(),
    })
}

fn init_error(resource: &str, source: GridError) -> GridError {
    GridError::HardwareInit {
        resource: resource.to_string(),
        reason: source.to_string(),
    }
}

/// One pass over every configured cell
fn sweep<P: Platform>(
    handles: &mut HardwareHandles<P>,
    plan: &ScanPlan,
    buffer: &mut [Sample],
    progress: &mut SweepProgress,
) -> GridResult<()> {
    let cols = plan.columns.len();
    for (row, &pattern) in plan.rows.iter().enumerate() {
        handles.rows.select_row(pattern, &mut handles.delay)?;
        handles.delay.delay(plan.row_settle);
        debug!(row, "Row selected");

        for (col, &column) in plan.columns.iter().enumerate() {
            plan.selector.select_column(&mut handles.bus, column)?;
            handles.delay.delay(plan.column_settle);

            let sample = match plan.adc.read_sample(&mut handles.bus, &mut handles.delay) {
                Ok(sample) => sample,
                Err(err @ GridError::ConversionTimeout { .. }) => match plan.timeout_policy {
                    TimeoutPolicy::Abort => return Err(err),
                    TimeoutPolicy::Substitute { sentinel } => {
                        warn!(row, col, sentinel, error = %err, "Substituting timed out sample");
                        progress.substituted += 1;
                        sentinel
                    }
                },
                Err(err) => return Err(err),
            };
            trace!(row, col, sample, "Cell sampled");

            let index = row * cols + col;
            buffer[index] = sample;
            progress.completed += 1;
            progress.last_cell = Some(index);
        }
    }
    Ok(())
}

/// Best-effort: columns first, then rows
fn release<P: Platform>(handles: &mut HardwareHandles<P>, selector: &ColumnSelector) {
    handles.bus.invalidate();
    if let Err(e) = selector.deassert(&mut handles.bus) {
        warn!(error = %e, "Failed to release columns");
    }
    if let Err(e) = handles.rows.deassert(&mut handles.delay) {
        warn!(error = %e, "Failed to release rows");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockPlatform;
    use tracing_test::traced_test;

    fn small_config(rows: usize, cols: usize) -> GridConfig {
        let mut config = GridConfig::default();
        config.grid.rows = rows;
        config.grid.cols = cols;
        config
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EngineState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(EngineState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = ScanEngine::new(MockPlatform::new(), small_config(0, 12));
        assert!(matches!(result, Err(GridError::Config(_))));
    }

    #[test]
    fn test_init_twice_is_invalid() {
        let mut engine = ScanEngine::new(MockPlatform::new(), small_config(2, 2)).unwrap();
        engine.init().unwrap();
        let err = engine.init().unwrap_err();
        assert!(matches!(
            err,
            GridError::InvalidState {
                operation: "init",
                state: EngineState::Ready
            }
        ));
    }

    #[test]
    fn test_reinit_after_cleanup() {
        let mut engine = ScanEngine::new(MockPlatform::new(), small_config(2, 2)).unwrap();
        engine.init().unwrap();
        engine.cleanup().unwrap();
        assert_eq!(engine.state(), EngineState::Closed);
        engine.init().unwrap();
        assert!(engine.is_ready());
        assert_eq!(engine.scan().unwrap().len(), 4);
    }

    #[test]
    fn test_buffer_size_checked() {
        let mut engine = ScanEngine::new(MockPlatform::new(), small_config(2, 3)).unwrap();
        engine.init().unwrap();
        let mut buffer = [0; 5];
        let err = engine.scan_into(&mut buffer).unwrap_err();
        assert!(matches!(
            err,
            GridError::BufferSize {
                expected: 6,
                actual: 5
            }
        ));
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn test_sequence_counts_complete_frames() {
        let platform = MockPlatform::new();
        let mut engine = ScanEngine::new(platform.clone(), small_config(1, 2)).unwrap();
        engine.init().unwrap();
        assert_eq!(engine.scan().unwrap().sequence(), 1);

        platform.fail_bus_after(0);
        assert!(engine.scan().is_err());
        assert_eq!(engine.frames_scanned(), 1);

        assert_eq!(engine.scan().unwrap().sequence(), 2);
    }

    #[test]
    fn test_drop_releases_grid() {
        let platform = MockPlatform::new();
        let mut engine = ScanEngine::new(platform.clone(), small_config(2, 2)).unwrap();
        engine.init().unwrap();
        engine.scan().unwrap();
        assert_ne!(platform.latched_rows(), 0);

        drop(engine);
        assert_eq!(platform.latched_rows(), 0);
        assert_eq!(platform.expander_register(crate::grid::column::OLATA), Some(0x00));
    }

    #[test]
    fn test_settle_delays_applied() {
        let platform = MockPlatform::new();
        let mut config = small_config(2, 3);
        config.timing.clock_pulse_us = 0;
        config.adc.poll_interval_us = 0;
        let mut engine = ScanEngine::new(platform.clone(), config).unwrap();
        engine.init().unwrap();
        let before = platform.simulated_time();

        engine.scan().unwrap();
        // 2 row settles of 8 ms + 6 column settles of 1 ms
        assert_eq!(
            platform.simulated_time() - before,
            Duration::from_millis(2 * 8 + 6)
        );
    }

    #[test]
    #[traced_test]
    fn test_substitution_and_abort_are_logged() {
        let platform = MockPlatform::new();
        let mut config = small_config(1, 1);
        config.adc.poll_attempts = 2;
        config.scan.timeout_policy = TimeoutPolicy::Substitute { sentinel: 0 };
        let mut engine = ScanEngine::new(platform.clone(), config).unwrap();
        engine.init().unwrap();

        platform.set_adc_never_ready(true);
        engine.scan().unwrap();
        assert!(logs_contain("Substituting timed out sample"));

        platform.inject_line_failure();
        assert!(engine.scan().is_err());
        assert!(logs_contain("Scan aborted, releasing grid"));
    }

    #[test]
    #[traced_test]
    fn test_cleanup_logs_release_failure_and_continues() {
        let platform = MockPlatform::new();
        let mut engine = ScanEngine::new(platform.clone(), small_config(2, 2)).unwrap();
        engine.init().unwrap();
        engine.scan().unwrap();

        platform.fail_bus_after(0);
        engine.cleanup().unwrap();
        assert!(logs_contain("Failed to release columns"));
        assert!(!logs_contain("Failed to release rows"));
        assert_eq!(platform.latched_rows(), 0);
        assert_eq!(engine.state(), EngineState::Closed);
    }
}

//! Continuous acquisition
//!
//! [`Acquisition`] moves a [`ScanEngine`] onto tokio's blocking thread pool
//! and scans at a fixed cadence, delivering each complete [`Frame`] through a
//! bounded `mpsc` channel. The scan loop never waits on the consumer: when the
//! channel is full the frame is dropped and counted. Failed scans are logged
//! and counted; the worker gives up after a configured number of failures in
//! a row.
//!
//! [`SharedScanEngine`] is the alternative for callers that want to scan on
//! demand from several threads. Its lock is held for a whole `scan()` so two
//! sweeps never interleave on the bus.
//!
//! # Example
//!
//! ```no_run
//! use pressure_grid::acquisition::{Acquisition, AcquisitionConfig};
//! use pressure_grid::config::GridConfig;
//! use pressure_grid::hardware::MockPlatform;
//! use pressure_grid::ScanEngine;
//!
//! # async fn run() -> pressure_grid::GridResult<()> {
//! let config = GridConfig::default();
//! let acquisition_config = AcquisitionConfig::from(&config.scan);
//! let engine = ScanEngine::new(MockPlatform::new(), config)?;
//!
//! let (acquisition, mut frames) = Acquisition::spawn(engine, acquisition_config)?;
//! if let Some(frame) = frames.recv().await {
//!     println!("frame {} peak {}", frame.sequence(), frame.max());
//! }
//! let report = acquisition.stop().await?;
//! println!("{} frames, {} dropped", report.frames, report.dropped);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::engine::{EngineState, ScanEngine};
use crate::error::{GridError, GridResult};
use crate::grid::{Frame, Sample, ScanSummary};
use crate::hardware::Platform;

/// Worker cadence and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Pause after each scan attempt
    pub scan_interval: Duration,
    /// Frames buffered for the consumer
    pub channel_capacity: usize,
    /// Failed scans in a row before the worker stops, `0` never stops
    pub max_consecutive_failures: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for AcquisitionConfig {
    fn from(scan: &ScanConfig) -> Self {
        Self {
            scan_interval: scan.scan_interval(),
            channel_capacity: scan.channel_capacity,
            max_consecutive_failures: scan.max_consecutive_failures,
        }
    }
}

/// Counters and the engine handed back when the worker ends
#[derive(Debug)]
pub struct AcquisitionReport<P: Platform> {
    /// Complete frames scanned
    pub frames: u64,
    /// Frames scanned but not delivered because the channel was full
    pub dropped: u64,
    /// Failed scans
    pub failures: u64,
    /// The engine, already cleaned up
    pub engine: ScanEngine<P>,
}

/// Handle to a running acquisition worker
pub struct Acquisition<P: Platform> {
    stop: Arc<AtomicBool>,
    task: JoinHandle<AcquisitionReport<P>>,
}

impl<P> Acquisition<P>
where
    P: Platform + Send + 'static,
    P::Line: Send + 'static,
    P::Bus: Send + 'static,
    P::Delay: Send + 'static,
{
    /// Start scanning on the blocking pool.
    ///
    /// Initializes the engine first if it is not ready. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        mut engine: ScanEngine<P>,
        config: AcquisitionConfig,
    ) -> GridResult<(Self, mpsc::Receiver<Frame>)> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GridError::Worker(format!("no tokio runtime: {e}")))?;

        if engine.state() != EngineState::Ready {
            engine.init()?;
        }

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        info!(
            interval_ms = config.scan_interval.as_millis() as u64,
            capacity = config.channel_capacity,
            "Starting acquisition"
        );
        let task = runtime.spawn_blocking(move || run(engine, config, tx, &worker_stop));

        Ok((Self { stop, task }, rx))
    }

    /// Whether the worker has already ended on its own
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the worker to stop after the current scan and wait for it.
    pub async fn stop(self) -> GridResult<AcquisitionReport<P>> {
        self.stop.store(true, Ordering::Release);
        self.task
            .await
            .map_err(|e| GridError::Worker(format!("acquisition task failed: {e}")))
    }
}

fn run<P: Platform>(
    mut engine: ScanEngine<P>,
    config: AcquisitionConfig,
    tx: mpsc::Sender<Frame>,
    stop: &AtomicBool,
) -> AcquisitionReport<P> {
    let mut frames = 0;
    let mut dropped = 0;
    let mut failures = 0;
    let mut consecutive = 0;

    while !stop.load(Ordering::Acquire) {
        match engine.scan() {
            Ok(frame) => {
                consecutive = 0;
                frames += 1;
                match tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(frame)) => {
                        dropped += 1;
                        debug!(sequence = frame.sequence(), "Consumer behind, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        info!("Frame receiver closed, stopping acquisition");
                        break;
                    }
                }
            }
            Err(e) => {
                failures += 1;
                consecutive += 1;
                error!(error = %e, consecutive, "Scan failed");
                if tx.is_closed() {
                    info!("Frame receiver closed, stopping acquisition");
                    break;
                }
                if config.max_consecutive_failures != 0
                    && consecutive >= config.max_consecutive_failures
                {
                    error!(consecutive, "Too many consecutive scan failures, stopping acquisition");
                    break;
                }
            }
        }

        if !config.scan_interval.is_zero() {
            std::thread::sleep(config.scan_interval);
        }
    }

    if let Err(e) = engine.cleanup() {
        warn!(error = %e, "Cleanup after acquisition failed");
    }
    info!(frames, dropped, failures, "Acquisition stopped");

    AcquisitionReport {
        frames,
        dropped,
        failures,
        engine,
    }
}

/// Scan engine shared between threads
pub struct SharedScanEngine<P: Platform> {
    inner: Arc<Mutex<ScanEngine<P>>>,
}

impl<P: Platform> Clone for SharedScanEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Platform> SharedScanEngine<P> {
    /// Wrap `engine`; clones share it
    #[must_use]
    pub fn new(engine: ScanEngine<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScanEngine<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// [`ScanEngine::init`] under the lock
    pub fn init(&self) -> GridResult<()> {
        self.lock().init()
    }

    /// Full scan under the lock
    pub fn scan(&self) -> GridResult<Frame> {
        self.lock().scan()
    }

    /// [`ScanEngine::scan_into`] under the lock
    pub fn scan_into(&self, buffer: &mut [Sample]) -> GridResult<ScanSummary> {
        self.lock().scan_into(buffer)
    }

    /// [`ScanEngine::cleanup`] under the lock
    pub fn cleanup(&self) -> GridResult<()> {
        self.lock().cleanup()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.lock().state()
    }

    /// Run `f` with exclusive access to the engine
    pub fn with<R>(&self, f: impl FnOnce(&mut ScanEngine<P>) -> R) -> R {
        f(&mut self.lock())
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::aggregator::BufferingAggregator;
use crate::builder::BuildError;
use crate::convention::{ConventionCell, NamingConvention};
use crate::driver::{ControlMessage, Driver};
use crate::forwarder::{ConnectionManager, ForwarderConfiguration};
use crate::line::{Flavor, LineEncoder};
use crate::meter::{Measurement, MeterId};
use crate::source::MeterSource;
use crate::stats::{DeliverySnapshot, DeliveryStats};

/// State shared between the pipeline handle, producer threads, and the
/// driver thread.
pub(crate) struct PipelineCore {
    pub aggregator: BufferingAggregator,
    pub convention: ConventionCell,
    pub encoders: Mutex<HashMap<MeterId, LineEncoder>>,
    pub source: Arc<dyn MeterSource>,
    pub flavor: Flavor,
    pub stats: Arc<DeliveryStats>,
}

impl PipelineCore {
    /// Encodes one measurement and appends the line to the buffer. Called
    /// concurrently by producers and by the driver's publish pass.
    pub fn record(&self, id: &MeterId, measurement: &Measurement) {
        let convention = self.convention.current();
        let mut encoders = self.encoders.lock();

        if let Some(encoder) = encoders.get_mut(id) {
            let line = encoder.encode(&convention, measurement);
            drop(encoders);
            self.aggregator.next(&line);
            return;
        }

        let mut encoder = LineEncoder::new(self.flavor, id.clone());
        let line = encoder.encode(&convention, measurement);
        encoders.insert(id.clone(), encoder);
        drop(encoders);
        self.aggregator.next(&line);
    }

    /// Pulls a snapshot from the meter source and routes every measurement
    /// through the encoders into the buffer.
    pub fn publish(&self) {
        for snapshot in self.source.snapshot() {
            for measurement in &snapshot.measurements {
                self.record(&snapshot.id, measurement);
            }
        }
    }
}

struct DriverHandle {
    ctrl_tx: Sender<ControlMessage>,
    thread: JoinHandle<()>,
}

struct ActivePipeline {
    core: Arc<PipelineCore>,
    forwarder_config: Option<ForwarderConfiguration>,
    // held so the payload channel stays open while the driver is stopped
    _payload_tx: Sender<String>,
    payload_rx: Receiver<String>,
    step_interval: Duration,
    poll_interval: Duration,
    runtime: Mutex<Option<DriverHandle>>,
}

impl ActivePipeline {
    fn spawn_driver(&self) -> Result<DriverHandle, BuildError> {
        let (ctrl_tx, ctrl_rx) = crossbeam_channel::unbounded();
        let connection = self.forwarder_config.clone().map(ConnectionManager::new);
        let driver = Driver::new(
            Arc::clone(&self.core),
            ctrl_rx,
            self.payload_rx.clone(),
            connection,
            self.step_interval,
            self.poll_interval,
        );
        let thread = std::thread::Builder::new()
            .name("statsline-publisher".to_string())
            .spawn(move || driver.run())
            .map_err(|_| BuildError::Backend)?;
        Ok(DriverHandle { ctrl_tx, thread })
    }
}

/// Handle to an export pipeline.
///
/// The handle is cheap to share behind an `Arc` and never blocks its
/// caller: recording a measurement is an in-memory encode and buffer
/// append, and everything that can touch the network happens on the
/// pipeline's own background thread. Dropping the handle stops the
/// pipeline.
pub struct Pipeline {
    inner: Option<ActivePipeline>,
}

impl Pipeline {
    /// A pipeline built with `enabled(false)`: no thread, no socket, every
    /// operation a no-op.
    pub(crate) fn disabled() -> Self {
        Pipeline { inner: None }
    }

    pub(crate) fn new(
        core: Arc<PipelineCore>,
        forwarder_config: Option<ForwarderConfiguration>,
        payload_tx: Sender<String>,
        payload_rx: Receiver<String>,
        step_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Pipeline {
            inner: Some(ActivePipeline {
                core,
                forwarder_config,
                _payload_tx: payload_tx,
                payload_rx,
                step_interval,
                poll_interval,
                runtime: Mutex::new(None),
            }),
        }
    }

    /// `false` when the pipeline was built disabled and is fully inert.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Encodes one measurement of `id` and hands the line to the buffering
    /// stage.
    ///
    /// Never blocks and never fails: transport trouble downstream shows up
    /// in [`stats`](Pipeline::stats), not here.
    pub fn record(&self, id: &MeterId, measurement: Measurement) {
        if let Some(inner) = &self.inner {
            inner.core.record(id, &measurement);
        }
    }

    /// Pulls a snapshot from the meter source and publishes it immediately,
    /// outside the step schedule.
    pub fn publish_now(&self) {
        if let Some(inner) = &self.inner {
            inner.core.publish();
        }
    }

    /// Swaps the active naming convention. Every encoder re-renders its
    /// cached substrings on its next encode, even if the new convention
    /// formats identically.
    pub fn set_naming_convention(&self, convention: NamingConvention) {
        if let Some(inner) = &self.inner {
            inner.core.convention.swap(convention);
        }
    }

    /// Current delivery counters. All zeros for a disabled pipeline.
    pub fn stats(&self) -> DeliverySnapshot {
        match &self.inner {
            Some(inner) => inner.core.stats.snapshot(),
            None => DeliverySnapshot::default(),
        }
    }

    /// Starts the background publishing driver, connecting to the remote
    /// collector. Idempotent when already running.
    ///
    /// # Errors
    ///
    /// Fails only when the driver thread cannot be spawned.
    pub fn start(&self) -> Result<(), BuildError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let mut runtime = inner.runtime.lock();
        if runtime.is_none() {
            *runtime = Some(inner.spawn_driver()?);
        }
        Ok(())
    }

    /// Stops the driver: the remaining buffer is flushed once, in-flight
    /// payloads are sent, and the connection and timer are released.
    /// Idempotent; [`start`](Pipeline::start) brings the pipeline back.
    pub fn stop(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let handle = inner.runtime.lock().take();
        if let Some(handle) = handle {
            let _ = handle.ctrl_tx.send(ControlMessage::Stop);
            if handle.thread.join().is_err() {
                debug!("publishing driver thread panicked; discarding buffered lines");
                inner.core.aggregator.abort();
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

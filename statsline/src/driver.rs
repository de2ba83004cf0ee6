use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver};
use tracing::{debug, warn};

use crate::forwarder::ConnectionManager;
use crate::pipeline::PipelineCore;

/// Outstanding payload demand granted to the aggregator while a driver is
/// consuming. Bounds how many flushed payloads can sit in the hand-off
/// channel at once.
const PAYLOAD_DEMAND: u64 = 32;

pub(crate) enum ControlMessage {
    /// Pull a snapshot and publish it outside the step schedule.
    PublishNow,
    /// Flush what remains and shut the driver down.
    Stop,
}

/// The background publishing loop.
///
/// One driver thread per running pipeline. It owns the connection manager
/// outright, so sends and reconnects never contend with producer threads;
/// producers only ever touch the encoder cache and the aggregator's buffer.
pub(crate) struct Driver {
    core: Arc<PipelineCore>,
    ctrl_rx: Receiver<ControlMessage>,
    payload_rx: Receiver<String>,
    connection: Option<ConnectionManager>,
    step_interval: Duration,
    poll_interval: Duration,
}

impl Driver {
    pub fn new(
        core: Arc<PipelineCore>,
        ctrl_rx: Receiver<ControlMessage>,
        payload_rx: Receiver<String>,
        connection: Option<ConnectionManager>,
        step_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Driver { core, ctrl_rx, payload_rx, connection, step_interval, poll_interval }
    }

    pub fn run(mut self) {
        if let Some(connection) = self.connection.as_mut() {
            connection.start();
            // grant the network path its demand window; custom sinks were
            // given unbounded demand at build time
            self.core.aggregator.request(PAYLOAD_DEMAND);
        }

        let ctrl_rx = self.ctrl_rx.clone();
        let payload_rx = self.payload_rx.clone();

        let mut next_poll = Instant::now() + self.poll_interval;
        let mut next_step = Instant::now() + self.step_interval;

        loop {
            let timeout =
                next_poll.min(next_step).saturating_duration_since(Instant::now());
            select! {
                recv(ctrl_rx) -> msg => match msg {
                    Ok(ControlMessage::PublishNow) => self.core.publish(),
                    Ok(ControlMessage::Stop) | Err(_) => break,
                },
                recv(payload_rx) -> payload => match payload {
                    Ok(payload) => self.dispatch(payload),
                    Err(_) => break,
                },
                default(timeout) => {
                    let now = Instant::now();
                    if now >= next_poll {
                        self.core.aggregator.tick(now);
                        next_poll = now + self.poll_interval;
                    }
                    if now >= next_step {
                        self.core.publish();
                        next_step = now + self.step_interval;
                    }
                },
            }
        }

        // flush the tail once, and drain what the flush may have queued, so
        // nothing is stranded in the channel on the way out
        self.core.aggregator.complete();
        let remaining: Vec<String> = payload_rx.try_iter().collect();
        for payload in remaining {
            self.dispatch(payload);
        }
        if let Some(connection) = self.connection.as_mut() {
            connection.stop();
        }
        debug!("publishing driver stopped");
    }

    fn dispatch(&mut self, payload: String) {
        if let Some(connection) = self.connection.as_mut() {
            match connection.send(payload.as_bytes()) {
                Ok(_) => self.core.stats.track_payload_send_succeeded(payload.len()),
                Err(e) => {
                    warn!(
                        error = %e,
                        bytes = payload.len(),
                        "failed to send payload, dropping"
                    );
                    self.core.stats.track_payload_send_failed(payload.len());
                }
            }
        }
        // one payload consumed, one more may be produced
        self.core.aggregator.request(1);
    }
}

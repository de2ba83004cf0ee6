use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::aggregator::{BufferingAggregator, UNBOUNDED_DEMAND};
use crate::convention::{ConventionCell, NamingConvention};
use crate::forwarder::{ForwarderConfiguration, RemoteAddr};
use crate::line::Flavor;
use crate::pipeline::{Pipeline, PipelineCore};
use crate::sink::{ChannelSink, PayloadSink};
use crate::source::MeterSource;
use crate::stats::DeliveryStats;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_PAYLOAD_LEN: usize = 1432;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_STEP_INTERVAL: Duration = Duration::from_secs(10);

/// The smallest line any flavor can produce; the payload budget must at
/// least fit this.
const SMALLEST_VALID_LINE: &str = "a:0|c";

/// Errors that could occur while building a pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The remote address could not be parsed or resolved.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The payload budget cannot fit a single metric line.
    #[error("maximum payload length {len} cannot fit any metric line (must be at least {min})")]
    PayloadLengthTooSmall {
        /// The configured budget.
        len: usize,
        /// The smallest workable budget.
        min: usize,
    },

    /// The background publishing thread could not be spawned.
    #[error("failed to spawn background publishing thread")]
    Backend,
}

/// Builder for a StatsD export pipeline.
pub struct StatsdBuilder {
    flavor: Flavor,
    remote_addr: RemoteAddr,
    write_timeout: Duration,
    max_payload_len: usize,
    flush_interval: Duration,
    step_interval: Duration,
    buffered: bool,
    enabled: bool,
    convention: Option<NamingConvention>,
    sink_override: Option<Box<dyn PayloadSink>>,
}

impl StatsdBuilder {
    /// Selects the wire flavor the remote collector expects.
    ///
    /// Defaults to [`Flavor::Datadog`].
    #[must_use]
    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Sets the remote address to forward payloads to.
    ///
    /// A bare `host:port` is sent over UDP. Prefix with `udp://` or
    /// `tcp://` to pick the transport explicitly, or use `unix://<path>`
    /// for a Unix domain datagram socket.
    ///
    /// Defaults to sending to `127.0.0.1:8125` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address cannot be parsed or resolved, an error is
    /// returned with the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Sets the write timeout for transport sends.
    ///
    /// A write that exceeds the timeout fails, which disposes the
    /// connection and drops the payload being sent.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the maximum payload length in bytes.
    ///
    /// No flushed payload ever exceeds this. Lines that cannot fit the
    /// budget by themselves are dropped. Keep it at or below what one
    /// datagram to the collector can carry.
    ///
    /// Defaults to 1432 bytes, safe for a typical 1500-byte MTU.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Sets the maximum time buffered lines may sit before being flushed,
    /// regardless of how full the buffer is.
    ///
    /// Defaults to 3 seconds.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Sets how often the meter source is snapshotted and published.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    /// Enables or disables line coalescing.
    ///
    /// When disabled, every line travels as its own payload. Useful against
    /// collectors that cannot split multi-line payloads.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn with_buffering(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Overrides the naming convention applied to meter names and tags.
    ///
    /// Defaults to [`NamingConvention::camel_case`].
    #[must_use]
    pub fn with_naming_convention(mut self, convention: NamingConvention) -> Self {
        self.convention = Some(convention);
        self
    }

    /// Routes flushed payloads to `sink` instead of the network.
    ///
    /// The sink receives raw payload strings exactly as they would have
    /// been written to the socket. No connection is opened at all. Intended
    /// for tests and embedders that ship payloads themselves.
    #[must_use]
    pub fn with_payload_sink<S>(mut self, sink: S) -> Self
    where
        S: PayloadSink + 'static,
    {
        self.sink_override = Some(Box::new(sink));
        self
    }

    /// Enables or disables the pipeline as a whole.
    ///
    /// A disabled pipeline builds to an inert handle: nothing is encoded,
    /// no thread runs, no connection is attempted.
    ///
    /// Defaults to `true`.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the pipeline and starts its background driver.
    ///
    /// # Errors
    ///
    /// Configuration problems are fatal here and only here: a payload
    /// budget too small for any line, or a driver thread that cannot be
    /// spawned. Transport trouble later is recovered, never surfaced.
    pub fn build<S>(self, source: S) -> Result<Pipeline, BuildError>
    where
        S: MeterSource,
    {
        if !self.enabled {
            return Ok(Pipeline::disabled());
        }

        if self.max_payload_len < SMALLEST_VALID_LINE.len() {
            return Err(BuildError::PayloadLengthTooSmall {
                len: self.max_payload_len,
                min: SMALLEST_VALID_LINE.len(),
            });
        }

        let stats = Arc::new(DeliveryStats::default());
        let (payload_tx, payload_rx) = crossbeam_channel::unbounded();

        // a custom sink consumes synchronously, so it gets unbounded
        // demand; the network path is granted its window by the driver
        let (sink, forwarder_config, initial_demand): (
            Box<dyn PayloadSink>,
            Option<ForwarderConfiguration>,
            u64,
        ) = match self.sink_override {
            Some(sink) => (sink, None, UNBOUNDED_DEMAND),
            None => (
                Box::new(ChannelSink::new(payload_tx.clone())),
                Some(ForwarderConfiguration {
                    remote_addr: self.remote_addr,
                    write_timeout: self.write_timeout,
                }),
                0,
            ),
        };

        let aggregator = BufferingAggregator::new(
            self.max_payload_len,
            self.flush_interval,
            self.buffered,
            sink,
            Arc::clone(&stats),
        );
        if initial_demand > 0 {
            aggregator.request(initial_demand);
        }

        let convention =
            ConventionCell::new(self.convention.unwrap_or_else(NamingConvention::camel_case));

        let core = Arc::new(PipelineCore {
            aggregator,
            convention,
            encoders: Mutex::new(std::collections::HashMap::new()),
            source: Arc::new(source),
            flavor: self.flavor,
            stats,
        });

        let pipeline = Pipeline::new(
            core,
            forwarder_config,
            payload_tx,
            payload_rx,
            self.step_interval,
            self.flush_interval,
        );
        pipeline.start()?;
        Ok(pipeline)
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder {
            flavor: Flavor::Datadog,
            remote_addr: RemoteAddr::Udp(vec![std::net::SocketAddr::from((
                [127, 0, 0, 1],
                8125,
            ))]),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            step_interval: DEFAULT_STEP_INTERVAL,
            buffered: true,
            enabled: true,
            convention: None,
            sink_override: None,
        }
    }
}

use crossbeam_channel::Sender;
use tracing::trace;

/// Receives flushed payloads from the buffering stage.
///
/// The network path routes payloads to the connection manager through a
/// channel; tests and embedders can install their own sink through
/// [`StatsdBuilder::with_payload_sink`](crate::StatsdBuilder::with_payload_sink)
/// to bypass the network entirely.
///
/// Any `FnMut(String)` closure is a sink:
///
/// ```
/// # use statsline::PayloadSink;
/// let mut seen = Vec::new();
/// let mut sink = |payload: String| seen.push(payload);
/// PayloadSink::accept(&mut sink, "a:1|c".to_owned());
/// ```
pub trait PayloadSink: Send {
    /// Accepts one flushed payload. Must not block the caller.
    fn accept(&mut self, payload: String);
}

impl<F> PayloadSink for F
where
    F: FnMut(String) + Send,
{
    fn accept(&mut self, payload: String) {
        (self)(payload);
    }
}

/// Hands payloads over to the publishing driver's thread.
pub(crate) struct ChannelSink {
    tx: Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: Sender<String>) -> Self {
        ChannelSink { tx }
    }
}

impl PayloadSink for ChannelSink {
    fn accept(&mut self, payload: String) {
        if self.tx.send(payload).is_err() {
            trace!("payload channel closed, dropping payload");
        }
    }
}

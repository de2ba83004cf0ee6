use std::sync::atomic::{
    AtomicU64,
    Ordering::{Acquire, Relaxed},
};

/// Internal delivery counters, shared between the aggregator and the driver.
///
/// Cheap enough to keep always-on. Failed or demand-dropped payloads count
/// as dropped; the pipeline never retries them.
#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    lines_dropped: AtomicU64,
    payloads_sent: AtomicU64,
    payloads_dropped: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_dropped: AtomicU64,
    send_failures: AtomicU64,
}

impl DeliveryStats {
    /// A single line exceeded the payload budget by itself.
    pub fn track_line_dropped(&self) {
        self.lines_dropped.fetch_add(1, Relaxed);
    }

    /// A flushed payload was discarded before reaching the transport.
    pub fn track_payload_dropped(&self, bytes: usize) {
        self.payloads_dropped.fetch_add(1, Relaxed);
        self.bytes_dropped.fetch_add(bytes as u64, Relaxed);
    }

    pub fn track_payload_send_succeeded(&self, bytes: usize) {
        self.payloads_sent.fetch_add(1, Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Relaxed);
    }

    pub fn track_payload_send_failed(&self, bytes: usize) {
        self.send_failures.fetch_add(1, Relaxed);
        self.payloads_dropped.fetch_add(1, Relaxed);
        self.bytes_dropped.fetch_add(bytes as u64, Relaxed);
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            lines_dropped: self.lines_dropped.load(Acquire),
            payloads_sent: self.payloads_sent.load(Acquire),
            payloads_dropped: self.payloads_dropped.load(Acquire),
            bytes_sent: self.bytes_sent.load(Acquire),
            bytes_dropped: self.bytes_dropped.load(Acquire),
            send_failures: self.send_failures.load(Acquire),
        }
    }
}

/// A point-in-time copy of the pipeline's delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliverySnapshot {
    /// Lines that could never fit within the payload budget.
    pub lines_dropped: u64,
    /// Payloads handed to the transport successfully.
    pub payloads_sent: u64,
    /// Payloads discarded, whether by exhausted demand or send failure.
    pub payloads_dropped: u64,
    /// Bytes handed to the transport successfully.
    pub bytes_sent: u64,
    /// Bytes discarded.
    pub bytes_dropped: u64,
    /// Transport-level write failures.
    pub send_failures: u64,
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::sink::PayloadSink;
use crate::stats::DeliveryStats;

/// Demand value treated as "downstream accepts everything".
pub(crate) const UNBOUNDED_DEMAND: u64 = u64::MAX;

struct Inner {
    content: String,
    last_flush: Instant,
    demand: u64,
    sink: Box<dyn PayloadSink>,
}

/// Coalesces a high-rate sequence of lines into fewer, larger payloads.
///
/// Payloads are bounded by a byte budget and by a maximum idle interval, the
/// classic trade of latency for fewer syscalls. Downstream demand is tracked
/// explicitly: a flush that finds no outstanding demand discards its
/// payload. Dropping is deliberate; a metrics pipeline must never block or
/// buffer without bound because a collector stalled.
///
/// Line arrival (any producer thread) and the periodic idle check (the
/// driver thread) race on the buffer, so every read-modify-write of the
/// content and its byte length happens under one mutex.
pub(crate) struct BufferingAggregator {
    max_payload_len: usize,
    max_idle: Duration,
    buffered: bool,
    stats: Arc<DeliveryStats>,
    inner: Mutex<Inner>,
}

impl BufferingAggregator {
    pub fn new(
        max_payload_len: usize,
        max_idle: Duration,
        buffered: bool,
        sink: Box<dyn PayloadSink>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        BufferingAggregator {
            max_payload_len,
            max_idle,
            buffered,
            stats,
            inner: Mutex::new(Inner {
                content: String::new(),
                last_flush: Instant::now(),
                demand: 0,
                sink,
            }),
        }
    }

    /// Makes `amount` more flushes deliverable downstream.
    pub fn request(&self, amount: u64) {
        let mut inner = self.inner.lock();
        if inner.demand != UNBOUNDED_DEMAND {
            inner.demand = inner.demand.saturating_add(amount);
        }
    }

    /// Appends one line, flushing first when the byte budget would be
    /// exceeded.
    ///
    /// Byte lengths are measured in the wire encoding, so multi-byte
    /// characters count at their encoded size. A line that cannot fit an
    /// empty buffer is dropped outright.
    pub fn next(&self, line: &str) {
        if line.len() > self.max_payload_len {
            self.stats.track_line_dropped();
            debug!(
                line_len = line.len(),
                max_payload_len = self.max_payload_len,
                "line exceeds the payload budget by itself, dropping"
            );
            return;
        }

        let mut inner = self.inner.lock();
        if !self.buffered {
            self.deliver(&mut inner, line.to_owned());
            return;
        }

        if inner.content.is_empty() {
            inner.content.push_str(line);
        } else if inner.content.len() + 1 + line.len() > self.max_payload_len {
            self.flush(&mut inner, Instant::now());
            inner.content.push_str(line);
        } else {
            inner.content.push('\n');
            inner.content.push_str(line);
        }
    }

    /// Periodic idle check: flushes a non-empty buffer once the configured
    /// interval has elapsed since the last flush.
    pub fn tick(&self, now: Instant) {
        let mut inner = self.inner.lock();
        if !inner.content.is_empty()
            && now.saturating_duration_since(inner.last_flush) >= self.max_idle
        {
            self.flush(&mut inner, now);
        }
    }

    /// Upstream finished cleanly: flush whatever is left, once.
    pub fn complete(&self) {
        let mut inner = self.inner.lock();
        if !inner.content.is_empty() {
            self.flush(&mut inner, Instant::now());
        }
    }

    /// Upstream failed: buffered-but-unflushed content is discarded.
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        let discarded = inner.content.len();
        if discarded > 0 {
            self.stats.track_payload_dropped(discarded);
            inner.content.clear();
        }
        inner.last_flush = Instant::now();
    }

    fn flush(&self, inner: &mut Inner, now: Instant) {
        let payload = std::mem::take(&mut inner.content);
        inner.last_flush = now;
        self.deliver(inner, payload);
    }

    fn deliver(&self, inner: &mut Inner, payload: String) {
        if payload.is_empty() {
            return;
        }
        if inner.demand == 0 {
            self.stats.track_payload_dropped(payload.len());
            debug!(bytes = payload.len(), "downstream demand exhausted, dropping payload");
            return;
        }
        if inner.demand != UNBOUNDED_DEMAND {
            inner.demand -= 1;
        }
        inner.sink.accept(payload);
    }
}

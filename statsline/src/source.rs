use crate::meter::{Measurement, MeterId};

/// A point-in-time view of one meter, produced by the aggregation layer on
/// every sampling pass.
pub struct MeterSnapshot {
    /// Identity of the sampled meter.
    pub id: MeterId,
    /// Current measurements, one per published statistic.
    pub measurements: Vec<Measurement>,
}

impl MeterSnapshot {
    /// Creates a snapshot from an identity and its measurements.
    pub fn new(id: MeterId, measurements: Vec<Measurement>) -> Self {
        MeterSnapshot { id, measurements }
    }
}

/// The seam to the aggregation layer that owns meter registration and
/// step-window math.
///
/// The pipeline pulls a snapshot on every step tick (and on demand) and
/// does not care how raw increments were summed into it. Any
/// `Fn() -> Vec<MeterSnapshot>` closure qualifies.
pub trait MeterSource: Send + Sync + 'static {
    /// Returns the current snapshot of every active meter.
    fn snapshot(&self) -> Vec<MeterSnapshot>;
}

impl<F> MeterSource for F
where
    F: Fn() -> Vec<MeterSnapshot> + Send + Sync + 'static,
{
    fn snapshot(&self) -> Vec<MeterSnapshot> {
        (self)()
    }
}

/// A source with nothing to publish, for pipelines fed exclusively through
/// [`Pipeline::record`](crate::Pipeline::record).
pub struct EmptySource;

impl MeterSource for EmptySource {
    fn snapshot(&self) -> Vec<MeterSnapshot> {
        Vec::new()
    }
}

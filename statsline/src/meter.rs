use std::fmt;

/// The shape of the instrument a meter identity belongs to.
///
/// The kind participates in selecting the wire type token for a line, so a
/// timer statistic renders as a timing sample while a plain counter renders
/// as a count.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MeterKind {
    /// A monotonically increasing count.
    Counter,
    /// A point-in-time value that can move in either direction.
    Gauge,
    /// Short-duration timings.
    Timer,
    /// Arbitrary sample distributions (sizes, amounts).
    DistributionSummary,
    /// Long-running task tracking (active count plus accumulated duration).
    LongTaskTimer,
    /// Anything registered outside the well-known kinds.
    Other,
}

/// The statistic a sampled value represents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Statistic {
    /// Number of occurrences within the step window.
    Count,
    /// Sum of recorded amounts.
    Total,
    /// Sum of recorded times.
    TotalTime,
    /// Maximum recorded amount within the step window.
    Max,
    /// Instantaneous value.
    Value,
    /// Number of currently running tasks.
    ActiveTasks,
    /// Duration of a currently running task.
    Duration,
    /// Anything the aggregation layer could not classify.
    Unknown,
}

impl Statistic {
    /// The value rendered into the `statistic` tag of an encoded line.
    pub fn tag_value(self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Total => "total",
            Statistic::TotalTime => "totalTime",
            Statistic::Max => "max",
            Statistic::Value => "value",
            Statistic::ActiveTasks => "activeTasks",
            Statistic::Duration => "duration",
            Statistic::Unknown => "unknown",
        }
    }
}

/// A single key/value pair describing the context a meter is emitted from.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a [`Tag`] from a key and value.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Tag { key: key.into(), value: value.into() }
    }

    /// Key of this tag.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value of this tag.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl<K, V> From<(K, V)> for Tag
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pair: (K, V)) -> Tag {
        Tag::new(pair.0, pair.1)
    }
}

/// The immutable identity of a meter: name, tags, optional base unit, and
/// kind.
///
/// Tags are stored sorted by key with duplicate keys collapsed (last write
/// wins), so two identities built from the same pairs in a different order
/// compare equal and render identically on the wire.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MeterId {
    name: String,
    tags: Vec<Tag>,
    base_unit: Option<String>,
    kind: MeterKind,
}

impl MeterId {
    /// Creates a tagless identity.
    pub fn new<N>(name: N, kind: MeterKind) -> Self
    where
        N: Into<String>,
    {
        MeterId { name: name.into(), tags: Vec::new(), base_unit: None, kind }
    }

    /// Appends tags to this identity, keeping the tag set sorted and unique.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self.tags.sort_by(|a, b| a.key.cmp(&b.key));
        // stable sort keeps insertion order within a key run; keep the last
        let mut i = 0;
        while i + 1 < self.tags.len() {
            if self.tags[i].key == self.tags[i + 1].key {
                self.tags.remove(i);
            } else {
                i += 1;
            }
        }
        self
    }

    /// Sets the base unit reported to the naming convention.
    #[must_use]
    pub fn with_base_unit<U>(mut self, base_unit: U) -> Self
    where
        U: Into<String>,
    {
        self.base_unit = Some(base_unit.into());
        self
    }

    /// Raw (convention-free) name of this meter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags of this meter, sorted by key.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Base unit, if one was declared at registration.
    pub fn base_unit(&self) -> Option<&str> {
        self.base_unit.as_deref()
    }

    /// Kind of the owning instrument.
    pub fn kind(&self) -> MeterKind {
        self.kind
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for tag in &self.tags {
            write!(f, ",{}={}", tag.key, tag.value)?;
        }
        Ok(())
    }
}

/// One sampled value, produced fresh on every sampling pass.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Measurement {
    /// What the value represents.
    pub statistic: Statistic,
    /// The sampled value itself.
    pub value: f64,
}

impl Measurement {
    /// Creates a [`Measurement`] from a statistic and value.
    pub fn new(statistic: Statistic, value: f64) -> Self {
        Measurement { statistic, value }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::convention::NamingConvention;
use crate::meter::{Measurement, MeterId, MeterKind, Statistic};

/// The wire-text encoding scheme for metric lines, matching what the
/// receiving collector expects.
///
/// Exactly one flavor is selected when the pipeline is built. For a counter
/// named `my.counter` with tag `my.tag=val` at value 2 under the default
/// camel-case convention, the flavors produce:
///
/// ```text
/// Hierarchical: myCounter.myTag.val.statistic.count:2|c
/// Datadog:      myCounter:2|c|#statistic:count,myTag:val
/// Telegraf:     myCounter,statistic=count,myTag=val:2|c
/// Sysdig:       myCounter#statistic=count,myTag=val:2|c
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flavor {
    /// Dot-path lines with tags flattened into the name. Plain StatsD
    /// daemons understand this one.
    Hierarchical,
    /// Dimensional tags appended after the type token, `|#`-prefixed and
    /// comma-joined with `:` between key and value.
    Datadog,
    /// Dimensional tags embedded between name and value, comma-joined with
    /// `=` between key and value.
    Telegraf,
    /// Like [`Flavor::Telegraf`] but with a strict character allow-list and
    /// a `#` separating the name from the tag block.
    Sysdig,
}

/// Convention-dependent substrings, re-rendered whenever the live convention
/// reference changes.
struct ConventionCache {
    convention: Arc<NamingConvention>,
    /// Convention-rendered, flavor-sanitized meter name.
    name: String,
    /// Flavor-joined tag pairs without any statistic, without the block
    /// prefix. Empty when the meter has no tags.
    tag_pairs: String,
    /// Fully decorated tag/statistic block per statistic, ready to splice
    /// into a line.
    stat_blocks: HashMap<Statistic, String>,
}

impl ConventionCache {
    fn render(flavor: Flavor, id: &MeterId, convention: &Arc<NamingConvention>) -> Self {
        let raw_name = convention.name(id.name(), id.kind(), id.base_unit());
        let name = sanitize_name(flavor, &raw_name);

        let mut tag_pairs = String::new();
        for (i, tag) in id.tags().iter().enumerate() {
            let key = convention.tag_key(tag.key());
            let value = convention.tag_value(tag.value());
            match flavor {
                Flavor::Hierarchical => {
                    tag_pairs.push('.');
                    tag_pairs.push_str(&sanitize_segment(&key));
                    tag_pairs.push('.');
                    tag_pairs.push_str(&sanitize_segment(&value));
                }
                Flavor::Datadog => {
                    if i > 0 {
                        tag_pairs.push(',');
                    }
                    tag_pairs.push_str(&sanitize_datadog_key(&key));
                    tag_pairs.push(':');
                    tag_pairs.push_str(&sanitize_datadog_value(&value));
                }
                Flavor::Telegraf => {
                    if i > 0 {
                        tag_pairs.push(',');
                    }
                    tag_pairs.push_str(&sanitize_telegraf_key(&key));
                    tag_pairs.push('=');
                    tag_pairs.push_str(&sanitize_telegraf(&value));
                }
                Flavor::Sysdig => {
                    if i > 0 {
                        tag_pairs.push(',');
                    }
                    tag_pairs.push_str(&sanitize_allowlist(&key));
                    tag_pairs.push('=');
                    tag_pairs.push_str(&sanitize_allowlist(&value));
                }
            }
        }

        ConventionCache {
            convention: Arc::clone(convention),
            name,
            tag_pairs,
            stat_blocks: HashMap::new(),
        }
    }
}

/// Encodes measurements of a single meter into wire lines.
///
/// One encoder exists per registered meter. The convention-rendered name,
/// the joined tag pairs, and each per-statistic block are memoized against
/// the convention reference seen on the previous call, so steady-state
/// encoding only formats the numeric value.
pub(crate) struct LineEncoder {
    flavor: Flavor,
    id: MeterId,
    cache: Option<ConventionCache>,
}

impl LineEncoder {
    pub fn new(flavor: Flavor, id: MeterId) -> Self {
        LineEncoder { flavor, id, cache: None }
    }

    /// Produces exactly one line for the given measurement.
    ///
    /// Encoding is total: reserved protocol characters are replaced, never
    /// rejected, and non-finite values render as ryu prints them.
    pub fn encode(&mut self, convention: &Arc<NamingConvention>, measurement: &Measurement) -> String {
        if let Some(cache) = &self.cache {
            if !Arc::ptr_eq(&cache.convention, convention) {
                self.cache = None;
            }
        }

        let flavor = self.flavor;
        let id = &self.id;
        let cache = self
            .cache
            .get_or_insert_with(|| ConventionCache::render(flavor, id, convention));

        let statistic = measurement.statistic;
        let ConventionCache { name, tag_pairs, stat_blocks, .. } = cache;
        let block = stat_blocks
            .entry(statistic)
            .or_insert_with(|| render_stat_block(flavor, tag_pairs, statistic));

        let mut formatter = ValueFormatter::new();
        let value = formatter.format(measurement.value);
        let token = type_token(id.kind(), statistic);

        let mut line =
            String::with_capacity(name.len() + block.len() + value.len() + token.len() + 2);
        match flavor {
            Flavor::Datadog => {
                line.push_str(name);
                line.push(':');
                line.push_str(value);
                line.push('|');
                line.push_str(token);
                line.push_str(block);
            }
            Flavor::Hierarchical | Flavor::Telegraf | Flavor::Sysdig => {
                line.push_str(name);
                line.push_str(block);
                line.push(':');
                line.push_str(value);
                line.push('|');
                line.push_str(token);
            }
        }
        line
    }
}

fn render_stat_block(flavor: Flavor, tag_pairs: &str, statistic: Statistic) -> String {
    let stat = statistic.tag_value();
    match flavor {
        Flavor::Hierarchical => format!("{tag_pairs}.statistic.{stat}"),
        Flavor::Datadog => {
            if tag_pairs.is_empty() {
                format!("|#statistic:{stat}")
            } else {
                format!("|#statistic:{stat},{tag_pairs}")
            }
        }
        Flavor::Telegraf => {
            if tag_pairs.is_empty() {
                format!(",statistic={stat}")
            } else {
                format!(",statistic={stat},{tag_pairs}")
            }
        }
        Flavor::Sysdig => {
            if tag_pairs.is_empty() {
                format!("#statistic={stat}")
            } else {
                format!("#statistic={stat},{tag_pairs}")
            }
        }
    }
}

/// Wire type token for a measurement, by instrument kind and statistic.
fn type_token(kind: MeterKind, statistic: Statistic) -> &'static str {
    match kind {
        MeterKind::Counter => "c",
        MeterKind::Gauge => "g",
        MeterKind::Timer => match statistic {
            Statistic::Count => "c",
            _ => "ms",
        },
        MeterKind::DistributionSummary => match statistic {
            Statistic::Count => "c",
            _ => "h",
        },
        MeterKind::LongTaskTimer => match statistic {
            Statistic::Duration => "ms",
            _ => "g",
        },
        MeterKind::Other => match statistic {
            Statistic::Count | Statistic::Total => "c",
            _ => "g",
        },
    }
}

struct ValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl ValueFormatter {
    fn new() -> Self {
        ValueFormatter { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    /// Integral values render without a fractional part, everything else
    /// through ryu.
    fn format(&mut self, value: f64) -> &str {
        if value.is_finite() && value == value.trunc() && value.abs() < 9e15 {
            self.int_writer.format(value as i64)
        } else {
            self.float_writer.format(value)
        }
    }
}

fn sanitize_name(flavor: Flavor, name: &str) -> String {
    match flavor {
        Flavor::Hierarchical => sanitize_segment(name),
        Flavor::Datadog => name
            .chars()
            .map(|c| if c == ':' || c == '|' || c == '\n' || c.is_whitespace() { '_' } else { c })
            .collect(),
        Flavor::Telegraf => sanitize_telegraf(name),
        Flavor::Sysdig => sanitize_allowlist(name),
    }
}

/// Hierarchical path segment: the colon would be read as the value
/// separator, the rest would split the line.
fn sanitize_segment(part: &str) -> String {
    part.chars().map(|c| if c == ':' || c == '|' || c == '\n' { '_' } else { c }).collect()
}

fn sanitize_datadog_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c == ':' || c == ',' || c == '|' || c == '\n' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Datadog tag values may contain colons, but a trailing one is ambiguous
/// with the key separator and values must lead with a letter.
fn sanitize_datadog_value(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| if c == ',' || c == '|' || c == '\n' || c.is_whitespace() { '_' } else { c })
        .collect();
    if out.ends_with(':') {
        out.pop();
        out.push('_');
    }
    if !out.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        out.insert_str(0, "m.");
    }
    out
}

fn sanitize_telegraf(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c == ',' || c == ':' || c == '|' || c == '\n' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// The first unescaped `=` splits key from value on the collector side, so
/// keys cannot carry one. Values keep theirs.
fn sanitize_telegraf_key(key: &str) -> String {
    let mut out = sanitize_telegraf(key);
    if out.contains('=') {
        out = out.replace('=', "_");
    }
    out
}

fn sanitize_allowlist(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

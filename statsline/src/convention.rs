use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::meter::MeterKind;

type NameFn = Box<dyn Fn(&str, MeterKind, Option<&str>) -> String + Send + Sync>;
type PartFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// The active policy for turning raw meter and tag strings into
/// backend-legal ones.
///
/// A convention is a bundle of naming closures shared behind an [`Arc`].
/// Line encoders key their caches on the convention's *reference identity*
/// (`Arc::ptr_eq`), never on its content: swapping in a convention that
/// happens to render identically still invalidates every cached substring,
/// so freshly captured closures always take effect.
pub struct NamingConvention {
    name: NameFn,
    tag_key: PartFn,
    tag_value: PartFn,
}

impl NamingConvention {
    /// Creates a convention from custom naming closures.
    pub fn new<N, K, V>(name: N, tag_key: K, tag_value: V) -> Self
    where
        N: Fn(&str, MeterKind, Option<&str>) -> String + Send + Sync + 'static,
        K: Fn(&str) -> String + Send + Sync + 'static,
        V: Fn(&str) -> String + Send + Sync + 'static,
    {
        NamingConvention {
            name: Box::new(name),
            tag_key: Box::new(tag_key),
            tag_value: Box::new(tag_value),
        }
    }

    /// Passes names, tag keys, and tag values through unchanged.
    pub fn identity() -> Self {
        Self::new(|name, _, _| name.to_owned(), str::to_owned, str::to_owned)
    }

    /// Renders dotted names and tag keys as `camelCase`; tag values pass
    /// through unchanged.
    ///
    /// `my.counter` becomes `myCounter`.
    pub fn camel_case() -> Self {
        Self::new(|name, _, _| to_camel_case(name), to_camel_case, str::to_owned)
    }

    /// Renders names and tag keys as `snake_case`; tag values pass through
    /// unchanged.
    pub fn snake_case() -> Self {
        Self::new(|name, _, _| to_snake_case(name), to_snake_case, str::to_owned)
    }

    /// Renders a meter name.
    pub fn name(&self, name: &str, kind: MeterKind, base_unit: Option<&str>) -> String {
        (self.name)(name, kind, base_unit)
    }

    /// Renders a tag key.
    pub fn tag_key(&self, key: &str) -> String {
        (self.tag_key)(key)
    }

    /// Renders a tag value.
    pub fn tag_value(&self, value: &str) -> String {
        (self.tag_value)(value)
    }
}

impl fmt::Debug for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NamingConvention")
    }
}

/// The single mutation point for the active convention.
///
/// Encoders read the current `Arc` on every encode call; configuration swaps
/// it wholesale. Readers always observe either the old or the new
/// convention, never a partially built one.
#[derive(Clone)]
pub(crate) struct ConventionCell {
    inner: Arc<RwLock<Arc<NamingConvention>>>,
}

impl ConventionCell {
    pub fn new(convention: NamingConvention) -> Self {
        ConventionCell { inner: Arc::new(RwLock::new(Arc::new(convention))) }
    }

    pub fn current(&self) -> Arc<NamingConvention> {
        Arc::clone(&self.inner.read())
    }

    pub fn swap(&self, convention: NamingConvention) {
        *self.inner.write() = Arc::new(convention);
    }
}

fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for (i, c) in s.chars().enumerate() {
        if c == '.' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else if i == 0 {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c == '.' || c == '-' || c.is_whitespace() {
            out.push('_');
        } else if c.is_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

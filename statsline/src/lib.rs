//! A resilient StatsD line-protocol transport pipeline.
//!
//! `statsline` takes the measurements an instrumentation layer samples on a
//! fixed cadence and ships them to a StatsD-speaking collector, encoded in
//! one of four wire flavors, over UDP, TCP, or a Unix domain socket.
//!
//! # Usage
//!
//! ```no_run
//! use statsline::{
//!     Flavor, Measurement, MeterId, MeterKind, MeterSnapshot, Statistic, StatsdBuilder, Tag,
//! };
//!
//! // the aggregation layer exposes its meters as a snapshot source; a
//! // closure works fine
//! let source = || {
//!     let id = MeterId::new("http.requests", MeterKind::Counter)
//!         .with_tags([Tag::new("region", "emea")]);
//!     vec![MeterSnapshot::new(id, vec![Measurement::new(Statistic::Count, 42.0)])]
//! };
//!
//! let pipeline = StatsdBuilder::default()
//!     .with_flavor(Flavor::Telegraf)
//!     .with_remote_address("127.0.0.1:8125")
//!     .expect("valid address")
//!     .build(source)
//!     .expect("failed to build pipeline");
//!
//! // hot paths can also feed measurements directly
//! let id = MeterId::new("jobs.enqueued", MeterKind::Counter);
//! pipeline.record(&id, Measurement::new(Statistic::Count, 1.0));
//! ```
//!
//! # Design
//!
//! Measurements flow one way: snapshot or direct record, through a
//! per-meter line encoder, into a Nagle-style buffering stage, and out a
//! single reconnecting transport connection. Producers never block and
//! never observe transport failures; when the collector is down or slow,
//! data is dropped in bounded amounts rather than queued without limit,
//! and delivery resumes from the next flush once connectivity returns.
//!
//! Encoders cache every convention-rendered substring against the identity
//! of the active [`NamingConvention`], so the steady-state cost of a
//! recorded measurement is formatting its numeric value. Swapping the
//! convention at runtime invalidates the caches on the next encode.
//!
//! The background driver thread owns all network I/O. A failed write
//! disposes the connection; the next payload triggers a fresh connect, so
//! reconnection is paced by publish activity instead of a retry loop.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::doc_markdown)]
#![deny(missing_docs)]

mod aggregator;

mod builder;
pub use self::builder::{BuildError, StatsdBuilder};

mod convention;
pub use self::convention::NamingConvention;

mod driver;
mod forwarder;

mod line;
pub use self::line::Flavor;

mod meter;
pub use self::meter::{Measurement, MeterId, MeterKind, Statistic, Tag};

mod pipeline;
pub use self::pipeline::Pipeline;

mod sink;
pub use self::sink::PayloadSink;

mod source;
pub use self::source::{EmptySource, MeterSnapshot, MeterSource};

mod stats;
pub use self::stats::DeliverySnapshot;

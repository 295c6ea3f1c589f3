//! # Marquise - Data Point Transport for Vaultaire
//!
//! Marquise is the client side of a time-series data pipeline. Applications
//! report individual observations, each a value with a nanosecond timestamp
//! and a set of string tags, and Marquise hands them to a batching backend
//! that forwards them to a collector broker.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use marquise::testing::RecordingBackend;
//! use marquise::{report, Marquise, MarquiseConfig, ReportRequest, TagSet};
//! use std::time::Duration;
//!
//! # fn main() -> marquise::Result<()> {
//! let config = MarquiseConfig::new("tcp://collector.example.com:5560")
//!     .with_flush_interval(Duration::from_millis(500));
//! let client = Marquise::new(config, Arc::new(RecordingBackend::new()))?;
//!
//! // Builder style
//! client.report(ReportRequest::value(42).tag("metric", "queue_depth"))?;
//!
//! // Positional style: value, then timestamp, then tags, each optional
//! let tags = TagSet::from([("host", "db1")]);
//! report!(client, "backup finished", tags)?;
//! report!(client)?;
//!
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Value Types
//!
//! | Value | Sent as |
//! |-------|---------|
//! | none | counter |
//! | valid UTF-8 string | text |
//! | invalid UTF-8 or [`Arg::binary`] | binary |
//! | integer within ±(2^63 - 1) | int |
//! | float | real |
//!
//! Integers outside the range fail with [`MarquiseError::ArgumentRange`]
//! before anything reaches the backend.
//!
//! ## Threads
//!
//! A [`Marquise`] can be shared between threads. Each reporting thread gets
//! its own backend connection the first time it reports, and every connection
//! is closed when the client is closed or dropped.
//!
//! ## Backends
//!
//! The client talks to the batching engine only through the [`Backend`]
//! trait. Enable the `libmarquise` feature for the production binding
//! (`ffi::LibMarquise`), or the `testing` feature for
//! `testing::RecordingBackend`, which records every call so reporting code
//! can be tested without a broker.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "libmarquise")]
pub mod ffi;
pub mod logging;
pub mod stats;
pub mod tags;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timestamp;
pub mod value;

pub use backend::{Backend, ConnectionHandle, ConsumerHandle, SendKind};
pub use client::Marquise;
pub use config::MarquiseConfig;
pub use error::{MarquiseError, Result};
pub use logging::LogConfig;
#[cfg(feature = "libmarquise")]
pub use ffi::LibMarquise;
pub use stats::ReportStats;
pub use tags::TagSet;
pub use timestamp::Timestamp;
pub use value::{Arg, Observation, ObservationValue, ReportRequest, Value};

/// Report a data point from positional arguments.
///
/// Takes the client, then an optional value, an optional timestamp and an
/// optional tag set, in that order. Expands to [`Marquise::report_args`].
///
/// ```rust
/// use std::sync::Arc;
/// use chrono::Utc;
/// use marquise::testing::RecordingBackend;
/// use marquise::{report, Marquise, TagSet};
///
/// let client = Marquise::open("tcp://localhost:4567", Arc::new(RecordingBackend::new())).unwrap();
/// report!(client, 3.5, Utc::now(), TagSet::from([("unit", "ms")])).unwrap();
/// report!(client, Utc::now()).unwrap();
/// ```
#[macro_export]
macro_rules! report {
    ($client:expr $(, $arg:expr)* $(,)?) => {
        $client.report_args(::std::vec![$($crate::Arg::from($arg)),*])
    };
}

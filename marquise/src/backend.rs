//! The boundary between the client core and the batching engine.
//!
//! The engine that buffers data points and flushes them to the broker lives
//! outside this crate. [`Backend`] is the only way the client talks to it, so a
//! production binding (`ffi::LibMarquise`) and an in-memory double
//! (`testing::RecordingBackend`) are interchangeable.

use std::fmt;
use std::num::NonZeroUsize;

use crate::tags::TagArrays;

/// Status returned by every send call when the backend failed.
pub const SEND_FAILED: i32 = -1;

/// Opaque handle to a backend consumer (a batching session bound to a broker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerHandle(NonZeroUsize);

impl ConsumerHandle {
    /// Wraps a raw handle value. Returns `None` for the null sentinel.
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Returns the raw handle value.
    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

/// Opaque handle to a backend connection scoped to one calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(NonZeroUsize);

impl ConnectionHandle {
    /// Wraps a raw handle value. Returns `None` for the null sentinel.
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Returns the raw handle value.
    pub fn as_raw(self) -> usize {
        self.0.get()
    }
}

/// The five typed send operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendKind {
    Text,
    Binary,
    Int,
    Real,
    Counter,
}

impl SendKind {
    pub const ALL: [SendKind; 5] = [
        SendKind::Text,
        SendKind::Binary,
        SendKind::Int,
        SendKind::Real,
        SendKind::Counter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SendKind::Text => "text",
            SendKind::Binary => "binary",
            SendKind::Int => "int",
            SendKind::Real => "real",
            SendKind::Counter => "counter",
        }
    }
}

impl fmt::Display for SendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities the client core needs from the batching engine.
///
/// Creation calls return `None` for the backend's failure sentinel. Send calls
/// return the backend's raw status: [`SEND_FAILED`] signals failure, after which
/// the client reads [`Backend::last_error_code`]; any other value is success.
///
/// Implementations must tolerate concurrent calls from different threads, each
/// thread using its own connection.
pub trait Backend: Send + Sync {
    /// Creates a consumer bound to `broker_address`, flushing every `flush_interval_secs`.
    fn consumer_new(&self, broker_address: &str, flush_interval_secs: f64)
        -> Option<ConsumerHandle>;

    /// Shuts a consumer down. Called at most once per consumer.
    fn consumer_shutdown(&self, consumer: ConsumerHandle);

    /// Opens a connection scoped to `consumer`.
    fn connect(&self, consumer: ConsumerHandle) -> Option<ConnectionHandle>;

    /// Closes a connection. Called at most once per connection.
    fn close(&self, connection: ConnectionHandle);

    fn send_text(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        data: &[u8],
        timestamp_ns: u64,
    ) -> i32;

    fn send_binary(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        data: &[u8],
        timestamp_ns: u64,
    ) -> i32;

    fn send_int(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        value: i64,
        timestamp_ns: u64,
    ) -> i32;

    fn send_real(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        value: f64,
        timestamp_ns: u64,
    ) -> i32;

    fn send_counter(&self, connection: ConnectionHandle, tags: &TagArrays, timestamp_ns: u64)
        -> i32;

    /// The OS-style error code describing the most recent failed send on this thread.
    ///
    /// Called right after a send returns [`SEND_FAILED`]. Implementations that
    /// read `errno` should capture it inside the send itself, since the default
    /// reads it only when this method runs.
    fn last_error_code(&self) -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles_are_sentinels() {
        assert!(ConsumerHandle::from_raw(0).is_none());
        assert!(ConnectionHandle::from_raw(0).is_none());
        assert_eq!(ConsumerHandle::from_raw(19).unwrap().as_raw(), 19);
        assert_eq!(ConnectionHandle::from_raw(122).unwrap().as_raw(), 122);
    }

    #[test]
    fn test_send_kind_names() {
        let names: Vec<_> = SendKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, ["text", "binary", "int", "real", "counter"]);
    }
}

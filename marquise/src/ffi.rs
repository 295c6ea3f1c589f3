//! Binding to the `libmarquise` C library.
//!
//! Enabled with the `libmarquise` cargo feature. Links against
//! `libmarquise.so`, which must be installed on the host.

use std::cell::Cell;
use std::ffi::{c_char, c_int, c_void, CString};
use std::io;
use std::sync::Arc;

use libc::size_t;

use crate::backend::{Backend, ConnectionHandle, ConsumerHandle, SEND_FAILED};
use crate::client::Marquise;
use crate::config::MarquiseConfig;
use crate::error::Result;
use crate::tags::TagArrays;

#[link(name = "marquise")]
extern "C" {
    fn marquise_consumer_new(broker: *const c_char, poll_period: f64) -> *mut c_void;
    fn marquise_consumer_shutdown(consumer: *mut c_void);
    fn marquise_connect(consumer: *mut c_void) -> *mut c_void;
    fn marquise_close(connection: *mut c_void);

    fn marquise_send_text(
        connection: *mut c_void,
        source_names: *const *const c_char,
        source_values: *const *const c_char,
        source_count: size_t,
        data: *const c_char,
        length: size_t,
        timestamp: u64,
    ) -> c_int;

    fn marquise_send_int(
        connection: *mut c_void,
        source_names: *const *const c_char,
        source_values: *const *const c_char,
        source_count: size_t,
        data: i64,
        timestamp: u64,
    ) -> c_int;

    fn marquise_send_real(
        connection: *mut c_void,
        source_names: *const *const c_char,
        source_values: *const *const c_char,
        source_count: size_t,
        data: f64,
        timestamp: u64,
    ) -> c_int;

    fn marquise_send_counter(
        connection: *mut c_void,
        source_names: *const *const c_char,
        source_values: *const *const c_char,
        source_count: size_t,
        timestamp: u64,
    ) -> c_int;

    fn marquise_send_binary(
        connection: *mut c_void,
        source_names: *const *const c_char,
        source_values: *const *const c_char,
        source_count: size_t,
        data: *const u8,
        length: size_t,
        timestamp: u64,
    ) -> c_int;
}

fn consumer_ptr(consumer: ConsumerHandle) -> *mut c_void {
    consumer.as_raw() as *mut c_void
}

fn connection_ptr(connection: ConnectionHandle) -> *mut c_void {
    connection.as_raw() as *mut c_void
}

thread_local! {
    static LAST_SEND_ERROR: Cell<i32> = const { Cell::new(0) };
}

/// Records `errno` for a failed send before anything else can clobber it.
fn capture_errno(status: c_int) -> i32 {
    if status == SEND_FAILED {
        let code = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        LAST_SEND_ERROR.with(|last| last.set(code));
    }
    status
}

/// The production [`Backend`], calling straight into `libmarquise`.
///
/// Failures are reported by the library through syslog and `errno`. The
/// `errno` of a failed send is captured on the calling thread as soon as the
/// call returns, and [`Backend::last_error_code`] reports that value.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibMarquise;

impl Backend for LibMarquise {
    fn consumer_new(
        &self,
        broker_address: &str,
        flush_interval_secs: f64,
    ) -> Option<ConsumerHandle> {
        let broker = CString::new(broker_address).ok()?;
        // SAFETY: `broker` is a valid NUL-terminated string for the whole call;
        // the library copies what it keeps.
        let consumer = unsafe { marquise_consumer_new(broker.as_ptr(), flush_interval_secs) };
        ConsumerHandle::from_raw(consumer as usize)
    }

    fn consumer_shutdown(&self, consumer: ConsumerHandle) {
        // SAFETY: the handle came from `marquise_consumer_new` and the client
        // shuts each consumer down once.
        unsafe { marquise_consumer_shutdown(consumer_ptr(consumer)) }
    }

    fn connect(&self, consumer: ConsumerHandle) -> Option<ConnectionHandle> {
        // SAFETY: the handle came from `marquise_consumer_new` and is still live.
        let connection = unsafe { marquise_connect(consumer_ptr(consumer)) };
        ConnectionHandle::from_raw(connection as usize)
    }

    fn close(&self, connection: ConnectionHandle) {
        // SAFETY: the handle came from `marquise_connect` and is closed once.
        unsafe { marquise_close(connection_ptr(connection)) }
    }

    fn send_text(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        data: &[u8],
        timestamp_ns: u64,
    ) -> i32 {
        // The library reads text as a C string, so hand it a terminated copy.
        let mut text = Vec::with_capacity(data.len() + 1);
        text.extend_from_slice(data);
        text.push(0);

        // SAFETY: tag arrays are null or terminated and outlive the call;
        // `text` holds `data.len()` bytes plus a terminator.
        let status = unsafe {
            marquise_send_text(
                connection_ptr(connection),
                tags.names_ptr(),
                tags.values_ptr(),
                tags.len(),
                text.as_ptr().cast(),
                data.len(),
                timestamp_ns,
            )
        };
        capture_errno(status)
    }

    fn send_binary(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        data: &[u8],
        timestamp_ns: u64,
    ) -> i32 {
        // SAFETY: tag arrays are null or terminated and outlive the call;
        // `data` is valid for `data.len()` bytes.
        let status = unsafe {
            marquise_send_binary(
                connection_ptr(connection),
                tags.names_ptr(),
                tags.values_ptr(),
                tags.len(),
                data.as_ptr(),
                data.len(),
                timestamp_ns,
            )
        };
        capture_errno(status)
    }

    fn send_int(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        value: i64,
        timestamp_ns: u64,
    ) -> i32 {
        // SAFETY: tag arrays are null or terminated and outlive the call.
        let status = unsafe {
            marquise_send_int(
                connection_ptr(connection),
                tags.names_ptr(),
                tags.values_ptr(),
                tags.len(),
                value,
                timestamp_ns,
            )
        };
        capture_errno(status)
    }

    fn send_real(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        value: f64,
        timestamp_ns: u64,
    ) -> i32 {
        // SAFETY: tag arrays are null or terminated and outlive the call.
        let status = unsafe {
            marquise_send_real(
                connection_ptr(connection),
                tags.names_ptr(),
                tags.values_ptr(),
                tags.len(),
                value,
                timestamp_ns,
            )
        };
        capture_errno(status)
    }

    fn send_counter(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        timestamp_ns: u64,
    ) -> i32 {
        // SAFETY: tag arrays are null or terminated and outlive the call.
        let status = unsafe {
            marquise_send_counter(
                connection_ptr(connection),
                tags.names_ptr(),
                tags.values_ptr(),
                tags.len(),
                timestamp_ns,
            )
        };
        capture_errno(status)
    }

    fn last_error_code(&self) -> i32 {
        LAST_SEND_ERROR.with(Cell::get)
    }
}

impl Marquise {
    /// Create a client backed by the installed `libmarquise`.
    ///
    /// # Errors
    ///
    /// See [`Marquise::new`].
    pub fn open_libmarquise(config: MarquiseConfig) -> Result<Self> {
        Self::new(config, Arc::new(LibMarquise))
    }
}

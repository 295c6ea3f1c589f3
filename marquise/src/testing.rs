//! An in-memory [`Backend`] for exercising Marquise without a broker.
//!
//! [`RecordingBackend`] hands out sequential handles and records every call it
//! receives, including the exact shape of the tag arrays it was given, so tests
//! can assert on what the client sent.
//!
//! ```rust
//! use std::sync::Arc;
//! use marquise::testing::RecordingBackend;
//! use marquise::{Marquise, ReportRequest};
//!
//! let backend = Arc::new(RecordingBackend::new());
//! let client = Marquise::open("tcp://localhost:4567", backend.clone()).unwrap();
//! client.report(ReportRequest::value(42)).unwrap();
//! assert_eq!(backend.sends().len(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::{Backend, ConnectionHandle, ConsumerHandle, SendKind, SEND_FAILED};
use crate::tags::TagArrays;

/// A payload as the backend received it.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPayload {
    /// Text or binary bytes. `length` is the length argument the backend was given.
    Bytes { data: Vec<u8>, length: usize },
    Int(i64),
    Real(f64),
    Counter,
}

/// One recorded send call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSend {
    pub kind: SendKind,
    pub connection: ConnectionHandle,
    /// The pair count argument.
    pub tag_count: usize,
    /// Tag names, or `None` when the array was absent.
    pub tag_names: Option<Vec<String>>,
    pub tag_values: Option<Vec<String>>,
    /// Pointer slots in the name and value arrays, terminator included.
    pub tag_slots: Option<(usize, usize)>,
    /// Whether both arrays ended in a null slot. Vacuously true when absent.
    pub terminated: bool,
    pub payload: RecordedPayload,
    pub timestamp_ns: u64,
}

impl RecordedSend {
    /// Tags as `(name, value)` pairs.
    pub fn tags(&self) -> Vec<(String, String)> {
        match (&self.tag_names, &self.tag_values) {
            (Some(names), Some(values)) => names.iter().cloned().zip(values.iter().cloned()).collect(),
            _ => Vec::new(),
        }
    }
}

/// One recorded backend call, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    ConsumerNew {
        broker_address: String,
        flush_interval_secs: f64,
    },
    ConsumerShutdown(ConsumerHandle),
    Connect(ConsumerHandle),
    Close(ConnectionHandle),
    Send(RecordedSend),
}

/// A [`Backend`] that records calls and can be told to fail.
#[derive(Debug)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    next_handle: AtomicUsize,
    fail_consumer_new: bool,
    fail_connect: bool,
    send_error: Option<i32>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_handle: AtomicUsize::new(1),
            fail_consumer_new: false,
            fail_connect: false,
            send_error: None,
        }
    }

    /// Make `consumer_new` return the failure sentinel.
    pub fn failing_consumer_new(mut self) -> Self {
        self.fail_consumer_new = true;
        self
    }

    /// Make `connect` return the failure sentinel.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Make every send fail, reporting `code` as the last error.
    pub fn failing_sends(mut self, code: i32) -> Self {
        self.send_error = Some(code);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BackendCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: BackendCall) {
        self.lock().push(call);
    }

    fn next_raw(&self) -> usize {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().clone()
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Send(send) => Some(send.clone()),
                _ => None,
            })
            .collect()
    }

    /// Consumers opened through `consumer_new`, with their argument.
    pub fn consumers(&self) -> Vec<(String, f64)> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::ConsumerNew {
                    broker_address,
                    flush_interval_secs,
                } => Some((broker_address.clone(), *flush_interval_secs)),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::Connect(_)))
    }

    pub fn closes(&self) -> Vec<ConnectionHandle> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Close(conn) => Some(*conn),
                _ => None,
            })
            .collect()
    }

    pub fn shutdowns(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::ConsumerShutdown(_)))
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.lock().iter().filter(|call| pred(*call)).count()
    }

    fn record_send(
        &self,
        kind: SendKind,
        connection: ConnectionHandle,
        tags: &TagArrays,
        payload: RecordedPayload,
        timestamp_ns: u64,
    ) -> i32 {
        let tag_slots = match (tags.names(), tags.values()) {
            (Some(names), Some(values)) => Some((names.slots(), values.slots())),
            _ => None,
        };
        let terminated = tags.names().map_or(true, |l| l.is_terminated())
            && tags.values().map_or(true, |l| l.is_terminated());

        self.record(BackendCall::Send(RecordedSend {
            kind,
            connection,
            tag_count: tags.len(),
            tag_names: tags.names().map(|l| l.to_strings()),
            tag_values: tags.values().map(|l| l.to_strings()),
            tag_slots,
            terminated,
            payload,
            timestamp_ns,
        }));

        match self.send_error {
            Some(_) => SEND_FAILED,
            None => 0,
        }
    }
}

impl Backend for RecordingBackend {
    fn consumer_new(
        &self,
        broker_address: &str,
        flush_interval_secs: f64,
    ) -> Option<ConsumerHandle> {
        self.record(BackendCall::ConsumerNew {
            broker_address: broker_address.to_string(),
            flush_interval_secs,
        });
        if self.fail_consumer_new {
            return None;
        }
        ConsumerHandle::from_raw(self.next_raw())
    }

    fn consumer_shutdown(&self, consumer: ConsumerHandle) {
        self.record(BackendCall::ConsumerShutdown(consumer));
    }

    fn connect(&self, consumer: ConsumerHandle) -> Option<ConnectionHandle> {
        self.record(BackendCall::Connect(consumer));
        if self.fail_connect {
            return None;
        }
        ConnectionHandle::from_raw(self.next_raw())
    }

    fn close(&self, connection: ConnectionHandle) {
        self.record(BackendCall::Close(connection));
    }

    fn send_text(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        data: &[u8],
        timestamp_ns: u64,
    ) -> i32 {
        let payload = RecordedPayload::Bytes {
            data: data.to_vec(),
            length: data.len(),
        };
        self.record_send(SendKind::Text, connection, tags, payload, timestamp_ns)
    }

    fn send_binary(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        data: &[u8],
        timestamp_ns: u64,
    ) -> i32 {
        let payload = RecordedPayload::Bytes {
            data: data.to_vec(),
            length: data.len(),
        };
        self.record_send(SendKind::Binary, connection, tags, payload, timestamp_ns)
    }

    fn send_int(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        value: i64,
        timestamp_ns: u64,
    ) -> i32 {
        self.record_send(
            SendKind::Int,
            connection,
            tags,
            RecordedPayload::Int(value),
            timestamp_ns,
        )
    }

    fn send_real(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        value: f64,
        timestamp_ns: u64,
    ) -> i32 {
        self.record_send(
            SendKind::Real,
            connection,
            tags,
            RecordedPayload::Real(value),
            timestamp_ns,
        )
    }

    fn send_counter(
        &self,
        connection: ConnectionHandle,
        tags: &TagArrays,
        timestamp_ns: u64,
    ) -> i32 {
        self.record_send(
            SendKind::Counter,
            connection,
            tags,
            RecordedPayload::Counter,
            timestamp_ns,
        )
    }

    fn last_error_code(&self) -> i32 {
        self.send_error.unwrap_or(0)
    }
}

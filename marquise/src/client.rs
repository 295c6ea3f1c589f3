//! The reporting client.
//!
//! A [`Marquise`] owns one backend consumer and lazily opens one backend
//! connection per reporting thread. Connections are released together with
//! the consumer, either by an explicit [`Marquise::close`] or when the client
//! is dropped, whichever comes first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, ConnectionHandle, ConsumerHandle, SendKind, SEND_FAILED};
use crate::config::MarquiseConfig;
use crate::error::{MarquiseError, Result};
use crate::logging::{log_payload, truncate_field};
use crate::stats::{ReportStats, StatsRecorder};
use crate::value::{Arg, Observation, ObservationValue, ReportRequest};

/// Releases backend resources exactly once.
///
/// Shared by explicit close and drop; whichever runs first does the work.
struct Janitor {
    backend: Arc<dyn Backend>,
    consumer: ConsumerHandle,
    connections: Mutex<HashMap<ThreadId, ConnectionHandle>>,
    closed: AtomicBool,
}

impl Janitor {
    fn connections(&self) -> MutexGuard<'_, HashMap<ThreadId, ConnectionHandle>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every connection, then the consumer.
    ///
    /// Returns the number of connections closed, or `None` if already shut down.
    fn shutdown(&self) -> Option<usize> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }

        let connections = std::mem::take(&mut *self.connections());
        let count = connections.len();
        for connection in connections.into_values() {
            self.backend.close(connection);
        }
        self.backend.consumer_shutdown(self.consumer);
        Some(count)
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        if let Some(count) = self.shutdown() {
            debug!(connections = count, "Marquise closed on drop");
        }
    }
}

/// A client that reports data points to a broker through a [`Backend`].
///
/// `Marquise` is `Send + Sync`; share it across threads with an [`Arc`].
/// Each thread gets its own backend connection on first report.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use marquise::testing::RecordingBackend;
/// use marquise::{Marquise, ReportRequest};
///
/// let client = Marquise::open("tcp://localhost:4567", Arc::new(RecordingBackend::new()))?;
/// client.report(ReportRequest::value("disk full").tag("host", "db1"))?;
/// client.report(ReportRequest::counter())?;
/// client.close();
/// # Ok::<(), marquise::MarquiseError>(())
/// ```
pub struct Marquise {
    config: MarquiseConfig,
    janitor: Janitor,
    stats: StatsRecorder,
}

impl Marquise {
    /// Create a client bound to the broker in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::Configuration`] for an invalid config, and
    /// [`MarquiseError::BackendInit`] if the backend can't create a consumer.
    #[instrument(skip(config, backend), fields(broker = %config.broker_address()))]
    pub fn new(config: MarquiseConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;

        let consumer = backend
            .consumer_new(config.broker_address(), config.flush_interval_secs())
            .ok_or(MarquiseError::BackendInit)?;

        info!(
            flush_interval_secs = config.flush_interval_secs(),
            consumer = consumer.as_raw(),
            "Marquise consumer opened"
        );

        Ok(Self {
            config,
            janitor: Janitor {
                backend,
                consumer,
                connections: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            },
            stats: StatsRecorder::default(),
        })
    }

    /// Create a client with the default flush interval.
    ///
    /// # Errors
    ///
    /// See [`Marquise::new`].
    pub fn open(broker_address: impl Into<String>, backend: Arc<dyn Backend>) -> Result<Self> {
        Self::new(MarquiseConfig::new(broker_address), backend)
    }

    /// Open a client, run `f` with it, then close it.
    ///
    /// The client is closed even if `f` panics.
    ///
    /// # Errors
    ///
    /// Fails only if the client can't be opened; `f`'s result is returned as is.
    pub fn open_with<R>(
        config: MarquiseConfig,
        backend: Arc<dyn Backend>,
        f: impl FnOnce(&Marquise) -> R,
    ) -> Result<R> {
        let client = Self::new(config, backend)?;
        let result = f(&client);
        client.close();
        Ok(result)
    }

    /// Ensure the calling thread has a backend connection.
    ///
    /// Reports connect on demand, so calling this is only useful to surface
    /// connection failures early.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::Closed`] after close, or
    /// [`MarquiseError::Connect`] if the backend refuses the connection.
    pub fn connect(&self) -> Result<()> {
        self.connection().map(|_| ())
    }

    fn connection(&self) -> Result<ConnectionHandle> {
        if self.janitor.is_closed() {
            return Err(MarquiseError::Closed);
        }

        let thread_id = thread::current().id();
        if let Some(connection) = self.janitor.connections().get(&thread_id) {
            return Ok(*connection);
        }

        // Only this thread inserts under its own id, so there's no race
        // while the lock is released around the backend call.
        let connection = self
            .janitor
            .backend
            .connect(self.janitor.consumer)
            .ok_or(MarquiseError::Connect)?;

        let mut connections = self.janitor.connections();
        if self.janitor.is_closed() {
            drop(connections);
            self.janitor.backend.close(connection);
            return Err(MarquiseError::Closed);
        }
        connections.insert(thread_id, connection);
        drop(connections);

        self.stats.record_connection();
        debug!(
            thread = ?thread_id,
            connection = connection.as_raw(),
            "Opened connection for reporting thread"
        );
        Ok(connection)
    }

    /// Report one data point.
    ///
    /// Caller errors are detected before the backend is contacted.
    ///
    /// # Errors
    ///
    /// - [`MarquiseError::Closed`] after close
    /// - [`MarquiseError::ArgumentRange`] for an unencodable integer or timestamp
    /// - [`MarquiseError::InvalidCall`] for tags containing NUL bytes
    /// - [`MarquiseError::Connect`] if this thread's first connection fails
    /// - [`MarquiseError::BackendSend`] if the backend rejects the send
    pub fn report(&self, request: ReportRequest) -> Result<()> {
        if self.is_closed() {
            return Err(MarquiseError::Closed);
        }

        let observation = request.into_observation()?;
        self.dispatch(observation)
    }

    /// Report one data point from positional arguments.
    ///
    /// Accepts an optional value, then an optional timestamp, then an
    /// optional tag set. The [`report!`](crate::report) macro builds the
    /// argument list.
    ///
    /// # Errors
    ///
    /// Everything [`Marquise::report`] returns, plus
    /// [`MarquiseError::InvalidCall`] for an argument list that doesn't fit.
    pub fn report_args(&self, args: Vec<Arg>) -> Result<()> {
        if self.is_closed() {
            return Err(MarquiseError::Closed);
        }

        self.report(ReportRequest::from_args(args)?)
    }

    fn dispatch(&self, observation: Observation) -> Result<()> {
        let Observation {
            value,
            timestamp,
            tags,
        } = observation;

        let kind = value.kind();
        let arrays = tags.to_arrays()?;
        let connection = self.connection()?;
        let backend = &self.janitor.backend;
        let ts = timestamp.as_nanos();
        let log_config = self.config.log_config();

        debug!(
            kind = %kind,
            tags = arrays.len(),
            timestamp = %timestamp,
            "Dispatching observation"
        );

        let status = match &value {
            ObservationValue::Text(text) => {
                log_payload!(
                    log_config,
                    payload = %truncate_field(text, log_config.max_field_length),
                    "Text payload"
                );
                backend.send_text(connection, &arrays, text.as_bytes(), ts)
            }
            ObservationValue::Binary(bytes) => {
                log_payload!(log_config, payload = %format!("{} bytes", bytes.len()), "Binary payload");
                backend.send_binary(connection, &arrays, bytes, ts)
            }
            ObservationValue::Int(i) => backend.send_int(connection, &arrays, *i, ts),
            ObservationValue::Real(r) => backend.send_real(connection, &arrays, *r, ts),
            ObservationValue::Counter => backend.send_counter(connection, &arrays, ts),
        };

        self.check_status(kind, status)
    }

    fn check_status(&self, kind: SendKind, status: i32) -> Result<()> {
        if status != SEND_FAILED {
            self.stats.record_sent(kind);
            return Ok(());
        }

        let code = self.janitor.backend.last_error_code();
        self.stats.record_failure();
        let err = MarquiseError::backend_send(kind, code);
        warn!(kind = %kind, code, error = %err, "Backend send failed");
        Err(err)
    }

    /// Close every connection and the consumer.
    ///
    /// Safe to call more than once; only the first call does anything.
    pub fn close(&self) {
        if let Some(count) = self.janitor.shutdown() {
            info!(connections = count, "Marquise closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.janitor.is_closed()
    }

    /// Number of open per-thread connections.
    pub fn connection_count(&self) -> usize {
        self.janitor.connections().len()
    }

    pub fn config(&self) -> &MarquiseConfig {
        &self.config
    }

    pub fn stats(&self) -> ReportStats {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Marquise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marquise")
            .field("broker_address", &self.config.broker_address())
            .field("closed", &self.is_closed())
            .field("connections", &self.connection_count())
            .finish()
    }
}

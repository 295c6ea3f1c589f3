use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use marquise::testing::{BackendCall, RecordingBackend};
use marquise::{Marquise, MarquiseConfig, MarquiseError, ReportRequest};

const BROKER: &str = "tcp://localhost:4567";

#[test]
fn test_open_creates_consumer_with_default_flush_interval() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Marquise::open(BROKER, backend.clone()).expect("Failed to open client");

    assert_eq!(backend.consumers(), vec![(BROKER.to_string(), 5.0)]);
    assert!(!client.is_closed());
    assert_eq!(client.config().broker_address(), BROKER);
}

#[test]
fn test_custom_flush_interval_is_passed_through() {
    let backend = Arc::new(RecordingBackend::new());
    let config = MarquiseConfig::new(BROKER).with_flush_interval(Duration::from_millis(250));
    let _client = Marquise::new(config, backend.clone()).expect("Failed to open client");

    assert_eq!(backend.consumers(), vec![(BROKER.to_string(), 0.25)]);
}

#[test]
fn test_consumer_failure_is_backend_init() {
    let backend = Arc::new(RecordingBackend::new().failing_consumer_new());
    let err = Marquise::open(BROKER, backend.clone()).unwrap_err();

    assert!(matches!(err, MarquiseError::BackendInit));
    assert_eq!(
        err.to_string(),
        "libmarquise failed; check syslog (no, seriously)"
    );
    assert_eq!(backend.shutdowns(), 0);
}

#[test]
fn test_connect_once_per_thread() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Marquise::open(BROKER, backend.clone()).unwrap();

    for _ in 0..10 {
        client.connect().unwrap();
    }

    assert_eq!(backend.connects(), 1);
    assert_eq!(client.stats().connections_opened, 1);
}

#[test]
fn test_each_thread_gets_its_own_connection() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Arc::new(Marquise::open(BROKER, backend.clone()).unwrap());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for _ in 0..10 {
                    client.report(ReportRequest::counter()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(backend.connects(), 2);
    assert_eq!(client.connection_count(), 2);

    let connections: HashSet<_> = backend.sends().iter().map(|s| s.connection).collect();
    assert_eq!(connections.len(), 2);
}

#[test]
fn test_connect_failure() {
    let backend = Arc::new(RecordingBackend::new().failing_connect());
    let client = Marquise::open(BROKER, backend.clone()).unwrap();

    let err = client.connect().unwrap_err();
    assert!(matches!(err, MarquiseError::Connect));
    assert_eq!(
        err.to_string(),
        "marquise_connect() failed... consult syslog (no, seriously)"
    );

    // A failed connect isn't cached; the next report tries again.
    assert!(matches!(
        client.report(ReportRequest::value(1)),
        Err(MarquiseError::Connect)
    ));
    assert_eq!(backend.connects(), 2);
    assert!(backend.sends().is_empty());
}

#[test]
fn test_close_shuts_down_consumer_once() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Marquise::open(BROKER, backend.clone()).unwrap();

    client.close();
    client.close();
    assert!(client.is_closed());
    drop(client);

    assert_eq!(backend.shutdowns(), 1);
}

#[test]
fn test_close_closes_all_connections() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Arc::new(Marquise::open(BROKER, backend.clone()).unwrap());

    client.connect().unwrap();
    let other = Arc::clone(&client);
    thread::spawn(move || other.connect().unwrap())
        .join()
        .unwrap();

    client.close();

    assert_eq!(backend.connects(), 2);
    assert_eq!(backend.closes().len(), 2);
    assert_eq!(client.connection_count(), 0);
    assert!(matches!(
        backend.calls().last(),
        Some(BackendCall::ConsumerShutdown(_))
    ));
}

#[test]
fn test_report_after_close_fails_without_backend_contact() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Marquise::open(BROKER, backend.clone()).unwrap();
    client.close();
    let calls_before = backend.calls().len();

    let err = client.report(ReportRequest::value(1)).unwrap_err();
    assert!(matches!(err, MarquiseError::Closed));
    assert_eq!(err.to_string(), "Connection has been closed");

    let err = marquise::report!(client, 1).unwrap_err();
    assert!(matches!(err, MarquiseError::Closed));

    assert_eq!(backend.calls().len(), calls_before);
}

#[test]
fn test_connect_after_close_never_reaches_backend() {
    let backend = Arc::new(RecordingBackend::new());
    let client = Arc::new(Marquise::open(BROKER, backend.clone()).unwrap());
    client.close();
    let calls_before = backend.calls();

    let err = client.connect().unwrap_err();
    assert!(matches!(err, MarquiseError::Closed));

    let other = Arc::clone(&client);
    let err = thread::spawn(move || other.connect().unwrap_err())
        .join()
        .unwrap();
    assert!(matches!(err, MarquiseError::Closed));

    assert_eq!(backend.calls(), calls_before);
}

#[test]
fn test_drop_releases_everything() {
    let backend = Arc::new(RecordingBackend::new());
    {
        let client = Marquise::open(BROKER, backend.clone()).unwrap();
        client.report(ReportRequest::counter()).unwrap();
    }

    assert_eq!(backend.closes().len(), 1);
    assert_eq!(backend.shutdowns(), 1);
}

#[test]
fn test_open_with_closes_even_when_closure_errors() {
    let backend = Arc::new(RecordingBackend::new());
    let result = Marquise::open_with(MarquiseConfig::new(BROKER), backend.clone(), |client| {
        client.report(ReportRequest::value(1u64 << 63))
    })
    .expect("Failed to open client");

    assert!(matches!(result, Err(MarquiseError::ArgumentRange { .. })));
    assert_eq!(backend.shutdowns(), 1);
}

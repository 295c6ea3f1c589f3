//! Property-based tests for Marquise.
//!
//! These check the invariants that must hold for every input rather than for
//! hand-picked examples:
//! - value classification picks the right send and honours the integer range
//! - positional arguments resolve only in value, timestamp, tags order
//! - tag sets always serialize to parallel, terminated arrays
//! - explicit timestamps reach the backend unchanged

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use marquise::testing::{RecordedPayload, RecordingBackend};
use marquise::value::{classify, INT_LIMIT};
use marquise::{Arg, Marquise, MarquiseError, ObservationValue, ReportRequest, TagSet, Value};
use proptest::prelude::*;

fn client() -> (Arc<RecordingBackend>, Marquise) {
    let backend = Arc::new(RecordingBackend::new());
    let client = Marquise::open("tcp://localhost:4567", backend.clone()).unwrap();
    (backend, client)
}

fn arb_tags() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z_]{1,12}", "[ -~]{0,16}"), 0..8)
}

proptest! {
    #[test]
    fn prop_integers_in_range_are_sent_unchanged(i in -i64::MAX..=i64::MAX) {
        let (backend, client) = client();
        client.report(ReportRequest::value(i)).unwrap();

        let sends = backend.sends();
        prop_assert_eq!(sends.len(), 1);
        prop_assert_eq!(&sends[0].payload, &RecordedPayload::Int(i));
    }

    #[test]
    fn prop_integers_out_of_range_never_reach_backend(
        i in prop_oneof![(INT_LIMIT + 1)..=i128::MAX, i128::MIN..=-(INT_LIMIT + 1)]
    ) {
        let (backend, client) = client();
        let err = client.report(ReportRequest::value(i)).unwrap_err();

        prop_assert!(matches!(err, MarquiseError::ArgumentRange { .. }), "expected ArgumentRange, got {:?}", err);
        prop_assert_eq!(backend.connects(), 0);
        prop_assert!(backend.sends().is_empty());
    }

    #[test]
    fn prop_valid_utf8_is_text(s in ".*") {
        prop_assert_eq!(
            classify(Some(Value::from(s.as_str()))).unwrap(),
            ObservationValue::Text(s)
        );
    }

    #[test]
    fn prop_invalid_utf8_is_binary(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let expected = match std::str::from_utf8(&bytes) {
            Ok(s) => ObservationValue::Text(s.to_string()),
            Err(_) => ObservationValue::Binary(bytes.clone()),
        };
        prop_assert_eq!(classify(Some(Value::from(bytes))).unwrap(), expected);
    }

    #[test]
    fn prop_tags_serialize_to_terminated_parallel_arrays(pairs in arb_tags()) {
        let tags: TagSet = pairs.iter().cloned().collect();
        let arrays = tags.to_arrays().unwrap();

        prop_assert_eq!(arrays.len(), tags.len());
        if tags.is_empty() {
            prop_assert!(arrays.names().is_none());
            prop_assert!(arrays.names_ptr().is_null());
        } else {
            let names = arrays.names().unwrap();
            let values = arrays.values().unwrap();
            prop_assert_eq!(names.slots(), tags.len() + 1);
            prop_assert_eq!(values.slots(), tags.len() + 1);
            prop_assert!(names.is_terminated() && values.is_terminated());

            let expected: Vec<String> = tags.iter().map(|(n, _)| n.to_string()).collect();
            prop_assert_eq!(names.to_strings(), expected);
        }
    }

    #[test]
    fn prop_later_duplicate_tag_wins(name in "[a-z]{1,8}", first in "[a-z]{0,8}", second in "[a-z]{0,8}") {
        let tags = TagSet::new().with_tag(&name, &first).with_tag(&name, &second);
        prop_assert_eq!(tags.len(), 1);
        prop_assert_eq!(tags.get(&name), Some(second.as_str()));
    }

    #[test]
    fn prop_explicit_timestamp_is_exact(secs in 0i64..16_000_000_000, nanos in 0u32..1_000_000_000) {
        let (backend, client) = client();
        let t = Utc.timestamp_opt(secs, nanos).unwrap();
        client.report(ReportRequest::counter().at(t)).unwrap();

        let expected = secs as u64 * 1_000_000_000 + u64::from(nanos);
        prop_assert_eq!(backend.sends()[0].timestamp_ns, expected);
    }

    #[test]
    fn prop_only_ordered_arg_lists_resolve(order in prop::collection::vec(0u8..3, 0..5)) {
        let args: Vec<Arg> = order
            .iter()
            .map(|k| match k {
                0 => Arg::from(1),
                1 => Arg::from(Utc.timestamp_opt(0, 0).unwrap()),
                _ => Arg::from(TagSet::new().with_tag("a", "b")),
            })
            .collect();

        let strictly_increasing = order.windows(2).all(|w| w[0] < w[1]);
        prop_assert_eq!(ReportRequest::from_args(args).is_ok(), strictly_increasing);
    }
}

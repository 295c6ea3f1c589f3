//! Report arguments, request resolution, and value classification.
//!
//! A report accepts a value, a timestamp and a tag set, each optional, in that
//! order. [`ReportRequest::from_args`] applies the positional resolution rule to
//! a list of dynamically-typed [`Arg`]s; [`ReportRequest::into_observation`]
//! then classifies the value once into the closed [`ObservationValue`] type
//! that selects one of the five backend sends.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::backend::SendKind;
use crate::error::{MarquiseError, Result};
use crate::tags::TagSet;
use crate::timestamp::Timestamp;

/// Largest magnitude an integer observation may have. The range is symmetric,
/// so `i64::MIN` is rejected.
pub const INT_LIMIT: i128 = i64::MAX as i128;

/// A caller-supplied observation value, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String-like content. `binary` marks content explicitly tagged as raw
    /// bytes, which is always sent as binary.
    Str { bytes: Vec<u8>, binary: bool },
    /// An integral number, kept wide so out-of-range input can be rejected.
    Int(i128),
    /// A non-integral number.
    Real(f64),
}

impl Value {
    /// A byte blob that is sent as binary even if it happens to be valid UTF-8.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Str {
            bytes: bytes.into(),
            binary: true,
        }
    }
}

/// One positional argument to [`Marquise::report_args`](crate::Marquise::report_args).
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Time(DateTime<Utc>),
    Tags(TagSet),
    /// A value of a type that can't be reported, kept by its debug rendering.
    Unsupported(String),
}

impl Arg {
    /// A byte blob that is sent as binary even if it happens to be valid UTF-8.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Arg::Value(Value::binary(bytes))
    }

    /// An argument of a type Marquise has no encoding for.
    pub fn unsupported(value: &impl fmt::Debug) -> Self {
        Arg::Unsupported(format!("{value:?}"))
    }
}

macro_rules! impl_str_value {
    ($($ty:ty => |$v:ident| $bytes:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    Value::Str { bytes: $bytes, binary: false }
                }
            }

            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Value(v.into())
                }
            }
        )*
    };
}

impl_str_value! {
    &str => |s| s.as_bytes().to_vec(),
    String => |s| s.into_bytes(),
    &String => |s| s.as_bytes().to_vec(),
    Cow<'_, str> => |s| s.into_owned().into_bytes(),
    &[u8] => |b| b.to_vec(),
    Vec<u8> => |b| b,
    &Vec<u8> => |b| b.clone(),
}

macro_rules! impl_int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(v as i128)
                }
            }

            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Value(v.into())
                }
            }
        )*
    };
}

impl_int_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        // Anything above i128::MAX is out of range either way.
        Value::Int(i128::try_from(v).unwrap_or(i128::MAX))
    }
}

impl From<u128> for Arg {
    fn from(v: u128) -> Self {
        Arg::Value(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Value(v.into())
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Value(v.into())
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl From<DateTime<Utc>> for Arg {
    fn from(t: DateTime<Utc>) -> Self {
        Arg::Time(t)
    }
}

impl From<SystemTime> for Arg {
    fn from(t: SystemTime) -> Self {
        Arg::Time(t.into())
    }
}

impl From<Timestamp> for Arg {
    fn from(t: Timestamp) -> Self {
        Arg::Time(t.to_datetime())
    }
}

impl From<TagSet> for Arg {
    fn from(tags: TagSet) -> Self {
        Arg::Tags(tags)
    }
}

impl<K: fmt::Display, V: fmt::Display, S: BuildHasher> From<HashMap<K, V, S>> for Arg {
    fn from(map: HashMap<K, V, S>) -> Self {
        Arg::Tags(map.into())
    }
}

impl<K: fmt::Display, V: fmt::Display> From<BTreeMap<K, V>> for Arg {
    fn from(map: BTreeMap<K, V>) -> Self {
        Arg::Tags(map.into())
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Unsupported(b.to_string())
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(Value::Str { bytes, binary: false }) => {
                write!(f, "{:?}", String::from_utf8_lossy(bytes))
            }
            Arg::Value(Value::Str { bytes, binary: true }) => {
                write!(f, "b\"{}\"", bytes.escape_ascii())
            }
            Arg::Value(Value::Int(i)) => write!(f, "{i}"),
            Arg::Value(Value::Real(r)) => write!(f, "{r:?}"),
            Arg::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Arg::Tags(tags) => {
                f.write_str("{")?;
                for (i, (name, value)) in tags.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name:?} => {value:?}")?;
                }
                f.write_str("}")
            }
            Arg::Unsupported(s) => f.write_str(s),
        }
    }
}

/// An explicit report request: optional value, optional timestamp, tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRequest {
    value: Option<Value>,
    timestamp: Option<DateTime<Utc>>,
    tags: TagSet,
}

impl ReportRequest {
    /// A bare counter increment.
    pub fn counter() -> Self {
        Self::default()
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Set the observation time. Defaults to the time of classification.
    pub fn at(mut self, timestamp: impl Into<DateTime<Utc>>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<TagSet>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn tag(mut self, name: impl fmt::Display, value: impl fmt::Display) -> Self {
        self.tags.insert(name, value);
        self
    }

    pub fn value_ref(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Resolve positional arguments into a request.
    ///
    /// Arguments are consumed in a fixed order: an optional value, then an
    /// optional timestamp, then an optional tag set. Anything left over is a
    /// caller error.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::InvalidCall`] naming every argument passed if
    /// any argument is left unconsumed.
    pub fn from_args(args: Vec<Arg>) -> Result<Self> {
        let mut consumed = 0;
        if let Some(Arg::Value(_)) = args.get(consumed) {
            consumed += 1;
        }
        if let Some(Arg::Time(_)) = args.get(consumed) {
            consumed += 1;
        }
        if let Some(Arg::Tags(_)) = args.get(consumed) {
            consumed += 1;
        }

        if consumed < args.len() {
            let passed: Vec<_> = args.iter().map(ToString::to_string).collect();
            return Err(MarquiseError::invalid_call(passed.join(", ")));
        }

        // The shape check above admits each kind at most once, in order.
        let mut request = ReportRequest::counter();
        for arg in args {
            match arg {
                Arg::Value(v) => request.value = Some(v),
                Arg::Time(t) => request.timestamp = Some(t),
                Arg::Tags(tags) => request.tags = tags,
                Arg::Unsupported(_) => {}
            }
        }

        Ok(request)
    }

    /// Classify the value and fix the timestamp, producing a ready-to-send observation.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::ArgumentRange`] for an integer outside
    /// `-(2^63 - 1)..=2^63 - 1` or a timestamp that can't be encoded.
    pub fn into_observation(self) -> Result<Observation> {
        let value = classify(self.value)?;
        let timestamp = match self.timestamp {
            Some(t) => Timestamp::try_from(t)?,
            None => Timestamp::now(),
        };

        Ok(Observation {
            value,
            timestamp,
            tags: self.tags,
        })
    }
}

/// A classified observation value; each variant maps to exactly one send.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationValue {
    Counter,
    Text(String),
    Binary(Vec<u8>),
    Int(i64),
    Real(f64),
}

impl ObservationValue {
    pub fn kind(&self) -> SendKind {
        match self {
            ObservationValue::Counter => SendKind::Counter,
            ObservationValue::Text(_) => SendKind::Text,
            ObservationValue::Binary(_) => SendKind::Binary,
            ObservationValue::Int(_) => SendKind::Int,
            ObservationValue::Real(_) => SendKind::Real,
        }
    }
}

/// Classify a raw value.
///
/// String-like content is checked first: explicitly binary or invalid UTF-8
/// content becomes [`ObservationValue::Binary`], anything else
/// [`ObservationValue::Text`]. Integers are range-checked; reals pass through.
pub fn classify(value: Option<Value>) -> Result<ObservationValue> {
    match value {
        None => Ok(ObservationValue::Counter),
        Some(Value::Str {
            bytes,
            binary: true,
        }) => Ok(ObservationValue::Binary(bytes)),
        Some(Value::Str {
            bytes,
            binary: false,
        }) => Ok(match String::from_utf8(bytes) {
            Ok(text) => ObservationValue::Text(text),
            Err(e) => ObservationValue::Binary(e.into_bytes()),
        }),
        Some(Value::Int(i)) => {
            if !(-INT_LIMIT..=INT_LIMIT).contains(&i) {
                return Err(MarquiseError::integer_out_of_range());
            }
            // In range by the check above.
            Ok(ObservationValue::Int(i as i64))
        }
        Some(Value::Real(r)) => Ok(ObservationValue::Real(r)),
    }
}

/// A classified data point ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub value: ObservationValue,
    pub timestamp: Timestamp,
    pub tags: TagSet,
}

//! Structured activity argument values.

use crate::Duration;
use crate::time::{from_micros, to_micros};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// A named set of activity arguments.
pub type Arguments = BTreeMap<String, Value>;

/// A self-describing argument or resource value.
///
/// Durations are stored as [Value::Int] microseconds; see [Value::from_duration].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn from_duration(duration: Duration) -> Value {
        Value::Int(to_micros(duration))
    }

    /// Reads an integer number of microseconds as a duration.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Value::Int(micros) => Some(from_micros(*micros)),
            _ => None,
        }
    }

    /// Numeric view of the value, for comparisons against resource thresholds.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Reals compare through [OrderedFloat], so `NaN` equals itself and equality agrees with
/// [Hash].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => OrderedFloat(*a) == OrderedFloat(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Real(r) => OrderedFloat(*r).hash(state),
            Value::Str(s) => s.hash(state),
            Value::List(l) => l.hash(state),
            Value::Map(m) => m.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Value::from_duration(value)
    }
}

/// Whether `subset` is structurally contained in `superset`.
///
/// - [Value::Null] in the subset matches anything.
/// - Maps: every key of the subset must be present in the superset, with a value that is
///   itself a subset.
/// - Lists: compared index by index; the subset may be shorter than the superset but not
///   reordered. This is positional on purpose, because argument structure is positional.
/// - Scalars: exact equality, including the variant (`Int(1)` is not `Real(1.0)`). Reals
///   compare as in [PartialEq for Value](Value), so `NaN` contains itself.
pub fn subset_or_equal(superset: &Value, subset: &Value) -> bool {
    match (superset, subset) {
        (_, Value::Null) => true,
        (Value::Map(sup), Value::Map(sub)) => sub.iter().all(|(key, sub_value)| {
            sup.get(key)
                .is_some_and(|sup_value| subset_or_equal(sup_value, sub_value))
        }),
        (Value::List(sup), Value::List(sub)) => {
            sub.len() <= sup.len()
                && sup
                    .iter()
                    .zip(sub)
                    .all(|(sup_value, sub_value)| subset_or_equal(sup_value, sub_value))
        }
        (Value::Map(_) | Value::List(_), _) | (_, Value::Map(_) | Value::List(_)) => false,
        (sup, sub) => sup == sub,
    }
}

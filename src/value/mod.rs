//! Values held by model variables.
//!
//! A [`Value`] is owned by the variable that holds it (or by the composite
//! value containing it). Values compare structurally and serialize to the
//! JSON form used for state snapshots; decoding goes through the declaring
//! [`Type`](crate::types::Type) because only the type knows the shape.

mod ordered_set;

pub use ordered_set::OrderedSetValue;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value as Json;

use crate::error::ValueError;

/// A value of some model [`Type`](crate::types::Type).
///
/// # Examples
///
/// ```
/// use modelwalk::Value;
///
/// let n = Value::from(3);
/// assert_eq!(n.as_number(), Some(3));
/// assert_eq!(n.to_json(), serde_json::json!(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Number and Range values.
    Number(i64),
    Record(BTreeMap<String, Value>),
    Array(ArrayValue),
    Either(EitherValue),
    OrderedSet(OrderedSetValue),
}

/// A fixed-length array whose first slot is addressed by `low`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayValue {
    low: i64,
    items: Vec<Value>,
}

impl ArrayValue {
    #[must_use]
    pub const fn new(low: i64, items: Vec<Value>) -> Self {
        Self { low, items }
    }

    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Reads the slot at model index `i`.
    pub fn get(&self, i: i64) -> Result<&Value, ValueError> {
        let slot = self.slot(i)?;
        Ok(&self.items[slot])
    }

    /// Mutable access to the slot at model index `i`.
    pub fn get_mut(&mut self, i: i64) -> Result<&mut Value, ValueError> {
        let slot = self.slot(i)?;
        Ok(&mut self.items[slot])
    }

    /// Reads the slot addressed by a numeric value.
    pub fn index(&self, i: &Value) -> Result<&Value, ValueError> {
        self.get(index_arg(i)?)
    }

    fn slot(&self, i: i64) -> Result<usize, ValueError> {
        i.checked_sub(self.low)
            .and_then(|d| usize::try_from(d).ok())
            .filter(|slot| *slot < self.items.len())
            .ok_or_else(|| ValueError::bounds(format!("Cannot access index {i} of {self}")))
    }
}

/// The active branch of an Either value and its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitherValue {
    pub tag: String,
    pub fields: BTreeMap<String, Value>,
}

impl Value {
    /// An Either value for a branch without fields.
    #[must_use]
    pub fn variant(tag: impl Into<String>) -> Self {
        Self::Either(EitherValue {
            tag: tag.into(),
            fields: BTreeMap::new(),
        })
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_either(&self) -> Option<&EitherValue> {
        match self {
            Self::Either(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_ordered_set(&self) -> Option<&OrderedSetValue> {
        match self {
            Self::OrderedSet(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ordered_set_mut(&mut self) -> Option<&mut OrderedSetValue> {
        match self {
            Self::OrderedSet(v) => Some(v),
            _ => None,
        }
    }

    /// Reads a record field, failing with an internal error on a non-record.
    pub fn field(&self, name: &str) -> Result<&Self, ValueError> {
        self.as_record()
            .and_then(|fields| fields.get(name))
            .ok_or_else(|| ValueError::internal(format!("{self} has no field {name}")))
    }

    /// Returns a human-readable kind name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Record(_) => "record",
            Self::Array(_) => "array",
            Self::Either(_) => "either",
            Self::OrderedSet(_) => "ordered set",
        }
    }

    /// Serializes to the JSON form stored in snapshots.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Number(v) => Json::from(*v),
            Self::Record(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Array(array) => Json::Array(array.items.iter().map(Self::to_json).collect()),
            Self::Either(either) if either.fields.is_empty() => Json::String(either.tag.clone()),
            Self::Either(either) => {
                let fields: serde_json::Map<String, Json> = either
                    .fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.to_json()))
                    .collect();
                serde_json::json!({ "tag": either.tag, "fields": fields })
            }
            Self::OrderedSet(set) => Json::Array(set.values().iter().map(Self::to_json).collect()),
        }
    }
}

/// Converts an index argument to a model index.
pub(crate) fn index_arg(i: &Value) -> Result<i64, ValueError> {
    i.as_number()
        .ok_or_else(|| ValueError::internal(format!("Trying to index with {i}")))
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Record(fields) => {
                write!(f, "{{")?;
                write_fields(f, fields)?;
                write!(f, "}}")
            }
            Self::Array(array) => write!(f, "{array}"),
            Self::Either(either) if either.fields.is_empty() => write!(f, "{}", either.tag),
            Self::Either(either) => {
                write!(f, "{} {{", either.tag)?;
                write_fields(f, &either.fields)?;
                write!(f, "}}")
            }
            Self::OrderedSet(set) => write!(f, "{set}"),
        }
    }
}

impl fmt::Display for ArrayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &BTreeMap<String, Value>) -> fmt::Result {
    for (i, (name, v)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{name}: {v}")?;
    }
    Ok(())
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v)
    }
}

impl From<OrderedSetValue> for Value {
    fn from(v: OrderedSetValue) -> Self {
        Self::OrderedSet(v)
    }
}

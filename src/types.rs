//! Model types and the relations between them.
//!
//! A [`Type`] knows how to build its default value, how to decode a value
//! from its JSON serialization, and how to display itself. The free
//! functions at the bottom of this module implement the subtyping,
//! equality and ordering predicates the checker relies on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::ValueError;
use crate::value::{ArrayValue, EitherValue, OrderedSetValue, Value};

/// Shared handle to a type. Types are immutable once built.
pub type TypeRef = Arc<Type>;

/// A named, ordered list of record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, TypeRef)>,
}

/// One branch of an [`EitherType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDecl {
    pub tag: String,
    pub fields: Vec<(String, TypeRef)>,
}

impl VariantDecl {
    /// A variant that carries no fields.
    #[must_use]
    pub fn unit(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Vec::new(),
        }
    }

    /// A variant with the given fields.
    #[must_use]
    pub fn with_fields(tag: impl Into<String>, fields: Vec<(String, TypeRef)>) -> Self {
        Self {
            tag: tag.into(),
            fields,
        }
    }

    fn default_value(&self) -> Value {
        Value::Either(EitherValue {
            tag: self.tag.clone(),
            fields: default_fields(&self.fields),
        })
    }
}

/// A named tagged union. Always has at least one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitherType {
    pub name: String,
    variants: Vec<VariantDecl>,
}

impl EitherType {
    /// The declared variants, in declaration order.
    #[must_use]
    pub fn variants(&self) -> &[VariantDecl] {
        &self.variants
    }

    /// Looks up a variant by tag.
    #[must_use]
    pub fn variant(&self, tag: &str) -> Option<&VariantDecl> {
        self.variants.iter().find(|v| v.tag == tag)
    }
}

/// The kinds of type a model variable can have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Unbounded integer.
    Number,
    /// Integer restricted to `low..=high`.
    Range { low: i64, high: i64 },
    Record(RecordType),
    /// Fixed-length array indexed by `low..=high`.
    Array { element: TypeRef, low: i64, high: i64 },
    Either(Arc<EitherType>),
    /// A single branch of an Either, usable as a type on its own.
    Variant { parent: Arc<EitherType>, tag: String },
    /// Bounded, duplicate-free, insertion-ordered collection indexed by `low..=high`.
    OrderedSet { element: TypeRef, low: i64, high: i64 },
}

impl Type {
    #[must_use]
    pub fn number() -> TypeRef {
        Arc::new(Self::Number)
    }

    /// Builds a range type; `low` must not exceed `high`.
    pub fn range(low: i64, high: i64) -> Result<TypeRef, ValueError> {
        if low > high {
            return Err(ValueError::internal(format!(
                "Range lower bound {low} exceeds upper bound {high}"
            )));
        }
        Ok(Arc::new(Self::Range { low, high }))
    }

    #[must_use]
    pub fn record(name: impl Into<String>, fields: Vec<(String, TypeRef)>) -> TypeRef {
        Arc::new(Self::Record(RecordType {
            name: name.into(),
            fields,
        }))
    }

    /// Builds an array type indexed by the given range type.
    pub fn array(element: TypeRef, index: &TypeRef) -> Result<TypeRef, ValueError> {
        let (low, high) = index_bounds(index)?;
        Ok(Arc::new(Self::Array { element, low, high }))
    }

    /// Builds an Either type from its variants.
    pub fn either(name: impl Into<String>, variants: Vec<VariantDecl>) -> Result<TypeRef, ValueError> {
        let name = name.into();
        if variants.is_empty() {
            return Err(ValueError::internal(format!("Either type {name} has no variants")));
        }
        Ok(Arc::new(Self::Either(Arc::new(EitherType { name, variants }))))
    }

    /// Returns the subtype of `either` for the branch named `tag`.
    pub fn variant(either: &TypeRef, tag: &str) -> Result<TypeRef, ValueError> {
        let Self::Either(parent) = either.as_ref() else {
            return Err(ValueError::internal(format!("{either} is not an Either type")));
        };
        if parent.variant(tag).is_none() {
            return Err(ValueError::internal(format!("{either} has no variant {tag}")));
        }
        Ok(Arc::new(Self::Variant {
            parent: Arc::clone(parent),
            tag: tag.to_string(),
        }))
    }

    /// Builds an ordered set type indexed by the given range type.
    pub fn ordered_set(element: TypeRef, index: &TypeRef) -> Result<TypeRef, ValueError> {
        let (low, high) = index_bounds(index)?;
        Ok(Arc::new(Self::OrderedSet { element, low, high }))
    }

    /// Builds the value a freshly declared variable of this type holds.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            Self::Number => Value::Number(0),
            Self::Range { low, .. } => Value::Number(*low),
            Self::Record(record) => Value::Record(default_fields(&record.fields)),
            Self::Array { element, low, high } => {
                let items = (0..capacity(*low, *high))
                    .map(|_| element.default_value())
                    .collect();
                Value::Array(ArrayValue::new(*low, items))
            }
            Self::Either(either) => either.variants[0].default_value(),
            Self::Variant { parent, tag } => parent
                .variant(tag)
                .map_or_else(|| parent.variants[0].default_value(), VariantDecl::default_value),
            Self::OrderedSet { element, low, high } => {
                Value::OrderedSet(OrderedSetValue::new(Arc::clone(element), *low, *high))
            }
        }
    }

    /// Decodes a value of this type from its JSON serialization.
    pub fn decode(&self, json: &Json) -> Result<Value, ValueError> {
        match self {
            Self::Number => json_int(json, self).map(Value::Number),
            Self::Range { low, high } => {
                let v = json_int(json, self)?;
                if v < *low || v > *high {
                    return Err(ValueError::bounds(format!("{v} is not in range {self}")));
                }
                Ok(Value::Number(v))
            }
            Self::Record(record) => {
                let obj = json
                    .as_object()
                    .ok_or_else(|| shape_error(json, self))?;
                let mut fields = BTreeMap::new();
                for (name, ty) in &record.fields {
                    let field = obj.get(name).ok_or_else(|| {
                        ValueError::internal(format!("{self} is missing field {name} in {json}"))
                    })?;
                    fields.insert(name.clone(), ty.decode(field)?);
                }
                Ok(Value::Record(fields))
            }
            Self::Array { element, low, high } => {
                let items = json.as_array().ok_or_else(|| shape_error(json, self))?;
                let expected = capacity(*low, *high);
                if items.len() != expected {
                    return Err(ValueError::internal(format!(
                        "{self} expects {expected} items, got {}",
                        items.len()
                    )));
                }
                let items = items
                    .iter()
                    .map(|item| element.decode(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(ArrayValue::new(*low, items)))
            }
            Self::Either(either) => decode_variant(either, json, self),
            Self::Variant { parent, tag } => {
                let value = decode_variant(parent, json, self)?;
                match &value {
                    Value::Either(v) if v.tag == *tag => Ok(value),
                    _ => Err(shape_error(json, self)),
                }
            }
            Self::OrderedSet { element, low, high } => {
                let items = json.as_array().ok_or_else(|| shape_error(json, self))?;
                let mut set = OrderedSetValue::new(Arc::clone(element), *low, *high);
                for item in items {
                    set.push(element.decode(item)?)?;
                }
                Ok(Value::OrderedSet(set))
            }
        }
    }

    /// Checks that `value` may be stored in a variable of this type.
    ///
    /// This is a shallow kind check plus range bounds; composite contents are
    /// trusted since they are only built through typed operations.
    pub fn admits(&self, value: &Value) -> Result<(), ValueError> {
        let ok = match (self, value) {
            (Self::Number, Value::Number(_)) => true,
            (Self::Range { low, high }, Value::Number(v)) => {
                if v < low || v > high {
                    return Err(ValueError::bounds(format!("{v} is not in range {self}")));
                }
                true
            }
            (Self::Record(_), Value::Record(_))
            | (Self::Array { .. }, Value::Array(_))
            | (Self::OrderedSet { .. }, Value::OrderedSet(_)) => true,
            (Self::Either(either), Value::Either(v)) => either.variant(&v.tag).is_some(),
            (Self::Variant { tag, .. }, Value::Either(v)) => v.tag == *tag,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(ValueError::internal(format!(
                "Cannot store {} value {value} in a variable of type {self}",
                value.type_name()
            )))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => write!(f, "Number"),
            Self::Range { low, high } => write!(f, "{low}..{high}"),
            Self::Record(record) => write!(f, "{}", record.name),
            Self::Array { element, low, high } => write!(f, "Array<{element}>[{low}..{high}]"),
            Self::Either(either) => write!(f, "{}", either.name),
            Self::Variant { tag, .. } => write!(f, "{tag}"),
            Self::OrderedSet { element, low, high } => {
                write!(f, "OrderedSet<{element}>[{low}..{high}]")
            }
        }
    }
}

/// Number of slots in `low..=high`, or `None` if it does not fit.
fn slot_count(low: i64, high: i64) -> Option<usize> {
    high.checked_sub(low)
        .and_then(|d| d.checked_add(1))
        .and_then(|n| usize::try_from(n).ok())
}

/// Number of slots in `low..=high`; zero when the range is empty or too wide.
pub(crate) fn capacity(low: i64, high: i64) -> usize {
    slot_count(low, high).unwrap_or(0)
}

fn index_bounds(index: &TypeRef) -> Result<(i64, i64), ValueError> {
    match index.as_ref() {
        Type::Range { low, high } if slot_count(*low, *high).is_none() => Err(ValueError::internal(
            format!("Index range {index} is too wide for a collection"),
        )),
        Type::Range { low, high } => Ok((*low, *high)),
        other => Err(ValueError::internal(format!(
            "Collections must be indexed by a range type, not {other}"
        ))),
    }
}

fn default_fields(fields: &[(String, TypeRef)]) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(name, ty)| (name.clone(), ty.default_value()))
        .collect()
}

fn shape_error(json: &Json, ty: &Type) -> ValueError {
    ValueError::internal(format!("Cannot decode {json} as {ty}"))
}

fn json_int(json: &Json, ty: &Type) -> Result<i64, ValueError> {
    json.as_i64().ok_or_else(|| shape_error(json, ty))
}

fn decode_variant(either: &EitherType, json: &Json, ty: &Type) -> Result<Value, ValueError> {
    let (tag, fields_json) = match json {
        Json::String(tag) => (tag.as_str(), None),
        Json::Object(obj) => {
            let tag = obj
                .get("tag")
                .and_then(Json::as_str)
                .ok_or_else(|| shape_error(json, ty))?;
            (tag, obj.get("fields"))
        }
        _ => return Err(shape_error(json, ty)),
    };
    let decl = either
        .variant(tag)
        .ok_or_else(|| ValueError::internal(format!("{} has no variant {tag}", either.name)))?;

    let mut fields = BTreeMap::new();
    for (name, field_ty) in &decl.fields {
        let field = fields_json
            .and_then(|f| f.get(name))
            .ok_or_else(|| ValueError::internal(format!("{tag} is missing field {name} in {json}")))?;
        fields.insert(name.clone(), field_ty.decode(field)?);
    }
    Ok(Value::Either(EitherValue {
        tag: tag.to_string(),
        fields,
    }))
}

/// True if a value of type `sub` may be used where `par` is expected.
///
/// Number/Range compatibility is left to the runtime bounds check.
#[must_use]
pub fn subtype_of(sub: &Type, par: &Type) -> bool {
    if sub == par {
        return true;
    }
    match (sub, par) {
        (Type::Number | Type::Range { .. }, Type::Range { .. }) => true,
        (Type::Variant { parent, .. }, Type::Either(either)) => parent == either,
        _ => false,
    }
}

/// True if values of the two types may be compared with `==`.
#[must_use]
pub fn have_equality(left: &Type, right: &Type) -> bool {
    if subtype_of(left, right) || subtype_of(right, left) {
        return true;
    }
    matches!(
        (left, right),
        (Type::Variant { parent: a, .. }, Type::Variant { parent: b, .. }) if a == b
    )
}

/// True for the numeric family: Number and Range.
#[must_use]
pub const fn is_numeric(ty: &Type) -> bool {
    matches!(ty, Type::Number | Type::Range { .. })
}

/// True if values of the two types may be compared with `<`.
#[must_use]
pub const fn have_ordering(left: &Type, right: &Type) -> bool {
    is_numeric(left) && is_numeric(right)
}

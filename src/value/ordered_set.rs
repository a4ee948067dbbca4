//! Bounded, duplicate-free, insertion-ordered set.
//!
//! Storage is a fixed-capacity slot vector plus a `used` count. Used
//! elements densely occupy the first `used` slots (model indices
//! `low..low+used`); every other slot holds the element type's default
//! value. Removal shifts the tail left and backfills the vacated slot, so
//! model indices of surviving elements stay dense.

use std::fmt;

use crate::error::ValueError;
use crate::types::{capacity, TypeRef};

use super::{index_arg, Value};

#[derive(Debug, Clone)]
pub struct OrderedSetValue {
    element: TypeRef,
    low: i64,
    items: Vec<Value>,
    used: usize,
}

impl OrderedSetValue {
    /// Creates an empty set with capacity `high - low + 1`.
    #[must_use]
    pub fn new(element: TypeRef, low: i64, high: i64) -> Self {
        let items = (0..capacity(low, high)).map(|_| element.default_value()).collect();
        Self {
            element,
            low,
            items,
            used: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Number of slots currently holding elements.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    /// The used elements in insertion order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.items[..self.used]
    }

    /// Iterates `(model index, element)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &Value)> + '_ {
        self.values().iter().enumerate().map(move |(n, v)| {
            let offset = i64::try_from(n).unwrap_or(i64::MAX);
            (self.low.saturating_add(offset), v)
        })
    }

    /// Reads the element at model index `i`.
    pub fn get(&self, i: i64) -> Result<&Value, ValueError> {
        i.checked_sub(self.low)
            .and_then(|d| usize::try_from(d).ok())
            .filter(|slot| *slot < self.used)
            .map(|slot| &self.items[slot])
            .ok_or_else(|| ValueError::bounds(format!("Cannot access index {i} of {self}")))
    }

    /// Reads the element addressed by a numeric value.
    pub fn index(&self, i: &Value) -> Result<&Value, ValueError> {
        self.get(index_arg(i)?)
    }

    #[must_use]
    pub fn contains(&self, v: &Value) -> bool {
        self.values().contains(v)
    }

    /// Appends `v` unless it is already present.
    ///
    /// # Errors
    /// `Bounds` when the set is full and `v` is new.
    pub fn push(&mut self, v: Value) -> Result<(), ValueError> {
        if self.contains(&v) {
            return Ok(());
        }
        if self.is_full() {
            return Err(ValueError::bounds(format!("Cannot push onto {self}")));
        }
        self.items[self.used] = v;
        self.used += 1;
        Ok(())
    }

    /// Removes and returns the most recently pushed element.
    ///
    /// # Errors
    /// `Bounds` when the set is empty.
    pub fn pop(&mut self) -> Result<Value, ValueError> {
        if self.used == 0 {
            return Err(ValueError::bounds(format!("Cannot pop from empty set {self}")));
        }
        self.used -= 1;
        Ok(std::mem::replace(
            &mut self.items[self.used],
            self.element.default_value(),
        ))
    }

    /// Removes `v` if present, compacting later elements forward.
    pub fn remove(&mut self, v: &Value) -> bool {
        let Some(slot) = self.values().iter().position(|item| item == v) else {
            return false;
        };
        self.items.remove(slot);
        self.items.push(self.element.default_value());
        self.used -= 1;
        true
    }
}

// Unused slots always hold defaults, but equality is defined on contents only.
impl PartialEq for OrderedSetValue {
    fn eq(&self, other: &Self) -> bool {
        self.low == other.low
            && self.capacity() == other.capacity()
            && self.values() == other.values()
    }
}

impl Eq for OrderedSetValue {}

impl fmt::Display for OrderedSetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (n, (i, v)) in self.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{i}: {v}")?;
        }
        write!(f, "}}")
    }
}

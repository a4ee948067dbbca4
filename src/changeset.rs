//! Read tracking and change sets.
//!
//! Every computation that decides behavior by reading model state runs with
//! its own [`EvalContext`], which accumulates the names of the variables it
//! consulted. When the computation turns out to have no effect, that
//! [`Readset`] is cached and the computation is skipped until a committed
//! [`Changeset`] touches one of those names.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::SerializedState;

/// Names of the variables a computation read.
pub type Readset = BTreeSet<String>;

/// Accumulates the readset of one top-level evaluation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvalContext {
    readset: Readset,
}

impl EvalContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `name` was consulted.
    pub fn record(&mut self, name: &str) {
        self.readset.insert(name.to_string());
    }

    #[must_use]
    pub const fn readset(&self) -> &Readset {
        &self.readset
    }

    #[must_use]
    pub fn into_readset(self) -> Readset {
        self.readset
    }
}

/// Variables that differ between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "names", rename_all = "snake_case")]
pub enum Changeset {
    /// Exactly these variables changed.
    Vars(BTreeSet<String>),
    /// No diff was computed; treat every readset as affected.
    Everything,
}

impl Changeset {
    /// An empty changeset.
    #[must_use]
    pub const fn none() -> Self {
        Self::Vars(BTreeSet::new())
    }

    /// Computes which variables differ between `old` and `new`.
    ///
    /// Comparison is per variable (deep equality of its JSON form). A name
    /// present in only one of the states counts as changed.
    #[must_use]
    pub fn diff(old: &SerializedState, new: &SerializedState) -> Self {
        let mut names: BTreeSet<String> = new
            .iter()
            .filter(|(name, value)| old.get(name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        names.extend(
            old.iter()
                .filter(|(name, _)| new.get(name).is_none())
                .map(|(name, _)| name.clone()),
        );
        Self::Vars(names)
    }

    /// True iff no variable changed. `Everything` is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Vars(names) => names.is_empty(),
            Self::Everything => false,
        }
    }

    /// True if this change may invalidate a computation that read `readset`.
    #[must_use]
    pub fn affects(&self, readset: &Readset) -> bool {
        match self {
            Self::Vars(names) => !names.is_disjoint(readset),
            Self::Everything => true,
        }
    }

    /// The changed names, or `None` for `Everything`.
    #[must_use]
    pub const fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Vars(names) => Some(names),
            Self::Everything => None,
        }
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vars(names) => {
                let joined: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join(", "))
            }
            Self::Everything => write!(f, "everything"),
        }
    }
}

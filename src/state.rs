//! Serialized model state and execution history entries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Immutable mapping from non-constant variable name to its JSON value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedState(BTreeMap<String, Json>);

impl SerializedState {
    #[must_use]
    pub const fn new(vars: BTreeMap<String, Json>) -> Self {
        Self(vars)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Json> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> + '_ {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable digest of the state, independent of construction order.
    ///
    /// Keys are sorted (`BTreeMap`) and nested objects are `serde_json` maps,
    /// which are also sorted, so equal states always hash equally.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = self.to_json().to_string();
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        Json::Object(self.0.clone().into_iter().collect())
    }
}

impl fmt::Display for SerializedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(&self.0).map_err(|_| fmt::Error)?;
        write!(f, "{pretty}")
    }
}

/// One entry of the execution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Position in the history; entry `i` always has `index == i`.
    pub index: usize,
    /// Human-readable description of the transition that produced it.
    pub message: String,
    pub state: SerializedState,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionSnapshot {
    #[must_use]
    pub fn new(index: usize, message: impl Into<String>, state: SerializedState) -> Self {
        Self {
            index,
            message: message.into(),
            state,
            recorded_at: Utc::now(),
        }
    }
}

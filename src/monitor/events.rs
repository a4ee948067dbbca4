//! Engine event types.
//!
//! These types are serializable so a host can forward them as-is (to a log
//! file, a socket, a UI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changeset::Changeset;

/// What happened.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A transition changed state and was appended to the history.
    Committed {
        index: usize,
        message: String,
        changes: Vec<String>,
    },

    /// State was reset to the model's starting state.
    Reset,

    /// History was truncated back to `index`.
    Restored {
        index: usize,
    },

    /// An invariant check failed; `message` is what the error hook received.
    InvariantFailed {
        invariant: String,
        message: String,
    },
}

/// A timestamped engine event.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EngineEvent {
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    #[must_use]
    pub fn committed(index: usize, message: &str, changes: &Changeset) -> Self {
        let changes = changes
            .names()
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default();
        Self::new(EventPayload::Committed {
            index,
            message: message.to_string(),
            changes,
        })
    }

    #[must_use]
    pub fn invariant_failed(invariant: &str, message: &str) -> Self {
        Self::new(EventPayload::InvariantFailed {
            invariant: invariant.to_string(),
            message: message.to_string(),
        })
    }
}

//! Controller configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Check invariants against the initial state when the controller is built.
    pub check_invariants_on_load: bool,
    /// Description used when a mutator does not supply one.
    pub default_message: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            check_invariants_on_load: true,
            default_message: "state changed".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.default_message.trim().is_empty() {
            return Err(EngineError::Config {
                reason: "default_message must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

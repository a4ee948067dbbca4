//! External-selection driver.
//!
//! The engine never picks which rule to fire. A [`Driver`] does: it asks the
//! controller for the active rule instances, lets a [`RuleSelector`] choose
//! one and fires it, until the model goes idle, a step budget runs out or an
//! invariant fails.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::changeset::Changeset;
use crate::controller::Controller;
use crate::error::{EngineError, EngineResult};
use crate::rules::{RuleId, Ruleset};

/// Chooses the next rule instance to fire.
pub trait RuleSelector {
    /// Picks one of `candidates` (the active instances, in ruleset order),
    /// or `None` to stop.
    fn select(&mut self, candidates: &[RuleId], rulesets: &[Ruleset]) -> Option<RuleId>;
}

/// Cycles through the candidates: picks the first one after the previous
/// pick, wrapping around.
#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    last: Option<RuleId>,
}

impl RoundRobin {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }
}

impl RuleSelector for RoundRobin {
    fn select(&mut self, candidates: &[RuleId], _rulesets: &[Ruleset]) -> Option<RuleId> {
        let next = self
            .last
            .and_then(|last| candidates.iter().find(|id| **id > last))
            .or_else(|| candidates.first())
            .copied()?;
        self.last = Some(next);
        Some(next)
    }
}

/// Uniform random choice from a seeded generator, so runs repeat.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    seed: u64,
    rng: StdRng,
}

impl SeededRandom {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl RuleSelector for SeededRandom {
    fn select(&mut self, candidates: &[RuleId], _rulesets: &[Ruleset]) -> Option<RuleId> {
        candidates.choose(&mut self.rng).copied()
    }
}

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Upper bound on fired rules per [`Driver::run`].
    pub max_steps: usize,
    /// End the run at the first failed invariant.
    pub stop_on_violation: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            stop_on_violation: true,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_steps == 0 {
            return Err(EngineError::Config {
                reason: "max_steps must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// What a single [`Driver::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The fired rule committed a transition.
    Changed { rule: String, changes: Changeset },
    /// The fired rule had no effect and is now inactive.
    Unchanged { rule: String },
    /// No active rule instance was left to fire.
    Idle,
}

/// Summary of a [`Driver::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Rules fired.
    pub steps: usize,
    /// Firings that committed a transition.
    pub transitions: usize,
    /// The run ended because nothing was left to fire.
    pub idle: bool,
    /// Distinct states seen, the starting state included.
    pub distinct_states: usize,
    /// Some invariant failed during the run.
    pub violated: bool,
}

/// Repeatedly fires selected rules on a controller it owns.
#[derive(Debug)]
pub struct Driver<S: RuleSelector> {
    controller: Controller,
    selector: S,
    config: DriverConfig,
}

impl<S: RuleSelector> Driver<S> {
    pub fn new(controller: Controller, selector: S, config: DriverConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            controller,
            selector,
            config,
        })
    }

    #[must_use]
    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    #[must_use]
    pub fn into_controller(self) -> Controller {
        self.controller
    }

    /// Selects and fires one active rule instance.
    pub fn step(&mut self) -> EngineResult<StepOutcome> {
        let candidates = self.controller.active_rules();
        let Some(id) = self.selector.select(&candidates, self.controller.rulesets()) else {
            return Ok(StepOutcome::Idle);
        };
        let rule = self.controller.rule(id)?.name().to_string();
        let changes = self.controller.fire(id)?;
        debug!(rule = %rule, changed = !changes.is_empty(), "step");
        if changes.is_empty() {
            Ok(StepOutcome::Unchanged { rule })
        } else {
            Ok(StepOutcome::Changed { rule, changes })
        }
    }

    /// Steps until idle, `max_steps`, or (with `stop_on_violation`) the
    /// first failed invariant.
    ///
    /// A failed invariant surfaced by the error hook as
    /// [`EngineError::InvariantFailed`] is recorded in the report rather than
    /// returned. Any other error ends the run.
    pub fn run(&mut self) -> EngineResult<RunReport> {
        let mut report = RunReport::default();
        let mut seen = HashSet::new();
        seen.insert(self.controller.current().state.fingerprint());

        while report.steps < self.config.max_steps {
            match self.step() {
                Ok(StepOutcome::Idle) => {
                    report.idle = true;
                    break;
                }
                Ok(StepOutcome::Unchanged { .. }) => {}
                Ok(StepOutcome::Changed { .. }) => report.transitions += 1,
                Err(err @ EngineError::InvariantFailed { .. }) => {
                    warn!(error = %err, "invariant failed");
                    report.transitions += 1;
                }
                Err(err) => return Err(err),
            }
            report.steps += 1;
            seen.insert(self.controller.current().state.fingerprint());

            if !self.controller.invariants_hold() {
                report.violated = true;
                if self.config.stop_on_violation {
                    break;
                }
            }
        }

        report.distinct_states = seen.len();
        debug!(
            steps = report.steps,
            transitions = report.transitions,
            distinct_states = report.distinct_states,
            "run finished"
        );
        Ok(report)
    }
}

//! The state controller.
//!
//! [`Controller`] owns a loaded [`Module`] and is the only way state moves
//! forward. Every committed transition goes through
//! [`Controller::try_change_state`], which diffs the serialized state before
//! and after the mutator ran and, when something changed:
//!
//! 1. appends a snapshot to the history,
//! 2. reports the changeset to the event sink,
//! 3. reactivates the rules and invariants whose readsets it touches,
//! 4. re-checks the active invariants,
//! 5. notifies the views.
//!
//! Rules whose firing changes nothing are deactivated together with what
//! they read, and stay skipped until a later change touches that readset.

pub mod config;

pub use config::ControllerConfig;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::changeset::{Changeset, EvalContext};
use crate::error::{EngineError, EngineResult, InvariantViolation};
use crate::module::{Module, VariableBank};
use crate::monitor::{EngineEvent, EventPayload, EventSink, TracingSink, View};
use crate::rules::{Invariant, Rule, RuleId, Ruleset};
use crate::state::{ExecutionSnapshot, SerializedState};

/// Called with the formatted failure message when an invariant does not hold.
/// An error returned here propagates out of the operation that ran the check.
pub type ErrorHook = Box<dyn FnMut(&str, &InvariantViolation) -> EngineResult<()>>;

/// Called after the history has been reset.
pub type ResetHook = Box<dyn FnMut()>;

fn default_error_hook() -> ErrorHook {
    Box::new(|message: &str, violation: &InvariantViolation| {
        Err(EngineError::InvariantFailed {
            message: message.to_string(),
            violation: violation.clone(),
        })
    })
}

fn noop_reset_hook() -> ResetHook {
    Box::new(|| {})
}

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    module: Module,
    config: ControllerConfig,
    error_hook: Option<ErrorHook>,
    reset_hook: Option<ResetHook>,
    views: Vec<Box<dyn View>>,
    sink: Arc<dyn EventSink>,
}

impl ControllerBuilder {
    #[must_use]
    pub fn new(module: Module) -> Self {
        Self {
            module,
            config: ControllerConfig::default(),
            error_hook: None,
            reset_hook: None,
            views: Vec::new(),
            sink: Arc::new(TracingSink),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default error hook, which turns the failure into
    /// [`EngineError::InvariantFailed`].
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&str, &InvariantViolation) -> EngineResult<()> + 'static,
    {
        self.error_hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_reset<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.reset_hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn view<V: View + 'static>(mut self, view: V) -> Self {
        self.views.push(Box::new(view));
        self
    }

    /// Where engine events go. Defaults to [`TracingSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Seeds the history, runs the initial invariant check and builds one
    /// ruleset per declared rule.
    pub fn build(self) -> EngineResult<Controller> {
        self.config.validate()?;

        let initial = self.module.variables().serialize();
        let invariants = self
            .module
            .invariants()
            .map(|(name, check)| Invariant::new(name, Arc::clone(check)))
            .collect();

        let mut controller = Controller {
            module: self.module,
            config: self.config,
            error_hook: self.error_hook.unwrap_or_else(default_error_hook),
            reset_hook: self.reset_hook.unwrap_or_else(noop_reset_hook),
            views: self.views,
            sink: self.sink,
            invariants,
            rulesets: Vec::new(),
            history: vec![ExecutionSnapshot::new(0, "Initial state", initial)],
            invariants_hold: true,
        };

        if controller.config.check_invariants_on_load {
            controller.check_invariants()?;
        }

        let vars = controller.module.variables();
        let rulesets = controller
            .module
            .rules()
            .map(|(name, decl)| Ruleset::from_decl(name, decl, vars))
            .collect::<EngineResult<Vec<_>>>()?;
        controller.rulesets = rulesets;

        debug!(
            rulesets = controller.rulesets.len(),
            invariants = controller.invariants.len(),
            "controller ready"
        );
        Ok(controller)
    }
}

/// Drives a module through its state space one transition at a time.
pub struct Controller {
    module: Module,
    config: ControllerConfig,
    error_hook: ErrorHook,
    reset_hook: ResetHook,
    views: Vec<Box<dyn View>>,
    sink: Arc<dyn EventSink>,
    invariants: Vec<Invariant>,
    rulesets: Vec<Ruleset>,
    history: Vec<ExecutionSnapshot>,
    invariants_hold: bool,
}

impl Controller {
    /// Builds a controller with default hooks, no views and a [`TracingSink`].
    pub fn new(module: Module) -> EngineResult<Self> {
        ControllerBuilder::new(module).build()
    }

    #[must_use]
    pub fn builder(module: Module) -> ControllerBuilder {
        ControllerBuilder::new(module)
    }

    pub fn set_error_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&str, &InvariantViolation) -> EngineResult<()> + 'static,
    {
        self.error_hook = Box::new(hook);
    }

    pub fn set_reset_hook<F>(&mut self, hook: F)
    where
        F: FnMut() + 'static,
    {
        self.reset_hook = Box::new(hook);
    }

    pub fn add_view<V: View + 'static>(&mut self, view: V) {
        self.views.push(Box::new(view));
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub const fn variables(&self) -> &VariableBank {
        self.module.variables()
    }

    #[must_use]
    pub fn rulesets(&self) -> &[Ruleset] {
        &self.rulesets
    }

    #[must_use]
    pub fn invariants(&self) -> &[Invariant] {
        &self.invariants
    }

    #[must_use]
    pub fn history(&self) -> &[ExecutionSnapshot] {
        &self.history
    }

    /// The snapshot of the live state. The history is never empty.
    #[must_use]
    pub fn current(&self) -> &ExecutionSnapshot {
        &self.history[self.history.len() - 1]
    }

    /// Result of the last invariant check.
    #[must_use]
    pub const fn invariants_hold(&self) -> bool {
        self.invariants_hold
    }

    #[must_use]
    pub fn serialize_state(&self) -> SerializedState {
        self.module.variables().serialize()
    }

    /// Assigns every non-constant variable from `state` and reports that
    /// everything changed.
    pub fn restore_state(&mut self, state: &SerializedState) -> EngineResult<()> {
        self.module.variables_mut().restore(state)?;
        self.report_changes(&Changeset::Everything)
    }

    /// Reactivates what `changes` touches and regenerates rulesets whose
    /// domain read a changed variable.
    pub fn report_changes(&mut self, changes: &Changeset) -> EngineResult<()> {
        for invariant in &mut self.invariants {
            invariant.reactivate_if(changes);
        }
        let vars = self.module.variables();
        for ruleset in &mut self.rulesets {
            ruleset.report_changes(changes, vars)?;
        }
        Ok(())
    }

    /// Runs `mutator` and commits the result if the state changed.
    ///
    /// The mutator may return a description of the transition; the commit
    /// message is that description followed by ` (changed a, b)`. An empty
    /// changeset leaves the history untouched. If the mutator fails, live
    /// state is put back to the current snapshot and the error propagates.
    pub fn try_change_state<F>(&mut self, mutator: F) -> EngineResult<Changeset>
    where
        F: FnOnce(&mut VariableBank) -> EngineResult<Option<String>>,
    {
        let description = match mutator(self.module.variables_mut()) {
            Ok(description) => description,
            Err(err) => {
                let last = self.history.len() - 1;
                if let Err(rollback) = self
                    .module
                    .variables_mut()
                    .restore(&self.history[last].state)
                {
                    warn!(error = %rollback, "rollback after failed mutator did not complete");
                }
                return Err(err);
            }
        };

        let new_state = self.serialize_state();
        let changes = Changeset::diff(&self.current().state, &new_state);
        if changes.is_empty() {
            return Ok(changes);
        }

        let description = description.unwrap_or_else(|| self.config.default_message.clone());
        let message = format!("{description} (changed {changes})");
        let index = self.history.len();
        self.sink.record(&EngineEvent::committed(index, &message, &changes));
        self.history.push(ExecutionSnapshot::new(index, message, new_state));

        self.report_changes(&changes)?;
        self.check_invariants()?;
        self.update_views();
        Ok(changes)
    }

    /// Reports whether `mutator` would change state, without committing.
    ///
    /// A change is rolled back through [`Controller::restore_state`], so
    /// every cached readset is invalidated. On error the state is rolled
    /// back the same way before the error propagates.
    pub fn would_change_state<F>(&mut self, mutator: F) -> EngineResult<Option<Changeset>>
    where
        F: FnOnce(&mut VariableBank) -> EngineResult<()>,
    {
        let outcome = mutator(self.module.variables_mut());
        let changes = Changeset::diff(&self.current().state, &self.serialize_state());
        if changes.is_empty() {
            return outcome.map(|()| None);
        }
        let old = self.current().state.clone();
        let rolled_back = self.restore_state(&old);
        if let Err(err) = outcome {
            if let Err(rollback) = rolled_back {
                warn!(error = %rollback, "rollback after would_change_state did not complete");
            }
            return Err(err);
        }
        rolled_back.map(|()| Some(changes))
    }

    /// Checks the active invariants in declaration order.
    ///
    /// Stops at the first violation: formats `Failed invariant <name>: <why>`,
    /// reports it to the sink and hands it to the error hook. Returns whether
    /// all checked invariants held.
    pub fn check_invariants(&mut self) -> EngineResult<bool> {
        let vars = self.module.variables();
        for invariant in &mut self.invariants {
            if !invariant.active {
                continue;
            }
            let mut ctx = EvalContext::new();
            match (invariant.check)(vars, &mut ctx) {
                Ok(()) => invariant.readset = Some(ctx.into_readset()),
                Err(EngineError::Violation(violation)) => {
                    let message = format!("Failed invariant {}: {violation}", invariant.name);
                    self.invariants_hold = false;
                    self.sink
                        .record(&EngineEvent::invariant_failed(&invariant.name, &message));
                    (self.error_hook)(&message, &violation)?;
                    return Ok(false);
                }
                Err(err) => return Err(err),
            }
        }
        self.invariants_hold = true;
        Ok(true)
    }

    /// Puts the model back in its starting state with a one-entry history.
    ///
    /// Invariants are not re-checked. If the init code fails, neither the
    /// variables nor the history change.
    pub fn reset_to_starting_state(&mut self) -> EngineResult<()> {
        self.module.reset()?;
        self.history = vec![ExecutionSnapshot::new(0, "Reset", self.serialize_state())];
        (self.reset_hook)();
        self.report_changes(&Changeset::Everything)?;
        self.sink.record(&EngineEvent::new(EventPayload::Reset));
        self.update_views();
        Ok(())
    }

    /// Rewinds to history entry `index`, dropping every later entry.
    ///
    /// Returns the result of the invariant check run on the restored state.
    pub fn restore(&mut self, index: usize) -> EngineResult<bool> {
        let len = self.history.len();
        if index >= len {
            return Err(EngineError::SnapshotOutOfRange { index, len });
        }
        self.history.truncate(index + 1);
        let state = self.current().state.clone();
        self.restore_state(&state)?;
        self.sink
            .record(&EngineEvent::new(EventPayload::Restored { index }));
        self.update_views();
        self.check_invariants()
    }

    /// The rule instance at `id`.
    pub fn rule(&self, id: RuleId) -> EngineResult<&Rule> {
        self.rulesets
            .get(id.ruleset)
            .and_then(|ruleset| ruleset.rules().get(id.rule))
            .ok_or_else(|| EngineError::UnknownRule {
                name: id.to_string(),
            })
    }

    /// Looks up a rule instance by its name, e.g. `step` or `move(2)`.
    #[must_use]
    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.rulesets.iter().enumerate().find_map(|(ruleset, rs)| {
            rs.rules()
                .iter()
                .position(|rule| rule.name() == name)
                .map(|rule| RuleId { ruleset, rule })
        })
    }

    /// Every active rule instance, in ruleset then instance order.
    #[must_use]
    pub fn active_rules(&self) -> Vec<RuleId> {
        self.rulesets
            .iter()
            .enumerate()
            .flat_map(|(ruleset, rs)| {
                rs.rules()
                    .iter()
                    .enumerate()
                    .filter(|(_, rule)| rule.is_active())
                    .map(move |(rule, _)| RuleId { ruleset, rule })
            })
            .collect()
    }

    /// Fires a rule instance through [`Controller::try_change_state`].
    ///
    /// A firing that changes nothing deactivates the rule until one of the
    /// variables it read changes.
    pub fn fire(&mut self, id: RuleId) -> EngineResult<Changeset> {
        let rule = self.rule(id)?;
        let name = rule.name().to_string();
        let effect = rule.effect();

        let mut ctx = EvalContext::new();
        let changes = self.try_change_state(|vars| {
            effect(vars, &mut ctx)?;
            Ok(Some(name))
        })?;

        if changes.is_empty() {
            if let Some(rule) = self
                .rulesets
                .get_mut(id.ruleset)
                .and_then(|ruleset| ruleset.rule_mut(id.rule))
            {
                debug!(rule = %rule.name(), "no effect, deactivating");
                rule.deactivate(ctx.into_readset());
            }
        }
        Ok(changes)
    }

    pub fn fire_by_name(&mut self, name: &str) -> EngineResult<Changeset> {
        let id = self.rule_id(name).ok_or_else(|| EngineError::UnknownRule {
            name: name.to_string(),
        })?;
        self.fire(id)
    }

    /// Whether firing `id` would change state. Never commits.
    pub fn would_fire(&mut self, id: RuleId) -> EngineResult<Option<Changeset>> {
        let effect = self.rule(id)?.effect();
        let mut ctx = EvalContext::new();
        self.would_change_state(|vars| effect(vars, &mut ctx))
    }

    fn update_views(&mut self) {
        for view in &mut self.views {
            view.update(&self.history);
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("rulesets", &self.rulesets)
            .field("invariants", &self.invariants)
            .field("history_len", &self.history.len())
            .field("views", &self.views.len())
            .field("invariants_hold", &self.invariants_hold)
            .finish_non_exhaustive()
    }
}

//! Fireable rule instances, rule sets and tracked invariants.
//!
//! Each carries an `active` flag and a cached readset. An inactive rule is
//! one whose last firing changed nothing; it stays skipped until a
//! committed change touches a variable in its readset.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::changeset::{Changeset, EvalContext, Readset};
use crate::error::EngineResult;
use crate::module::{DomainExpr, Effect, IndexedEffect, InvariantCheck, RuleDecl, VariableBank};

/// Address of a rule instance: ruleset position, then instance position.
///
/// Ids of a parameterized ruleset's instances are only valid until the
/// ruleset is regenerated by a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId {
    pub ruleset: usize,
    pub rule: usize,
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ruleset, self.rule)
    }
}

/// A single fireable transition.
pub struct Rule {
    name: String,
    active: bool,
    readset: Option<Readset>,
    effect: Effect,
}

impl Rule {
    fn new(name: String, effect: Effect) -> Self {
        Self {
            name,
            active: true,
            readset: None,
            effect,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// False while the last firing is known to have no effect.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// The variables whose change reactivates this rule. `None` while active.
    #[must_use]
    pub const fn readset(&self) -> Option<&Readset> {
        self.readset.as_ref()
    }

    pub(crate) fn effect(&self) -> Effect {
        Arc::clone(&self.effect)
    }

    pub(crate) fn deactivate(&mut self, readset: Readset) {
        self.active = false;
        self.readset = Some(readset);
    }

    fn reactivate_if(&mut self, changes: &Changeset) {
        if !self.active && self.readset.as_ref().map_or(true, |r| changes.affects(r)) {
            self.active = true;
            self.readset = None;
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("readset", &self.readset)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
enum RulesetKind {
    Simple,
    Parameterized {
        domain: DomainExpr,
        effect: IndexedEffect,
    },
}

/// The instances generated from one declared rule.
pub struct Ruleset {
    name: String,
    kind: RulesetKind,
    rules: Vec<Rule>,
    readset: Readset,
}

impl Ruleset {
    /// Builds the ruleset for a declaration, evaluating the domain of a
    /// parameterized rule against the current state.
    pub(crate) fn from_decl(name: &str, decl: &RuleDecl, vars: &VariableBank) -> EngineResult<Self> {
        match decl {
            RuleDecl::Simple { effect } => Ok(Self {
                name: name.to_string(),
                kind: RulesetKind::Simple,
                rules: vec![Rule::new(name.to_string(), Arc::clone(effect))],
                readset: Readset::new(),
            }),
            RuleDecl::Parameterized { domain, effect } => {
                let mut ruleset = Self {
                    name: name.to_string(),
                    kind: RulesetKind::Parameterized {
                        domain: Arc::clone(domain),
                        effect: Arc::clone(effect),
                    },
                    rules: Vec::new(),
                    readset: Readset::new(),
                };
                ruleset.update(vars)?;
                Ok(ruleset)
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_parameterized(&self) -> bool {
        matches!(self.kind, RulesetKind::Parameterized { .. })
    }

    /// The live instances.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// What the domain expression read when the instances were generated.
    #[must_use]
    pub const fn readset(&self) -> &Readset {
        &self.readset
    }

    pub(crate) fn rule_mut(&mut self, index: usize) -> Option<&mut Rule> {
        self.rules.get_mut(index)
    }

    /// Regenerates the instances from scratch.
    ///
    /// A parameterized ruleset re-evaluates its domain and creates one rule
    /// `name(i)` per element, `i` being the enumeration position. A simple
    /// ruleset just reactivates its rule.
    pub fn update(&mut self, vars: &VariableBank) -> EngineResult<()> {
        let RulesetKind::Parameterized { domain, effect } = &self.kind else {
            for rule in &mut self.rules {
                rule.active = true;
                rule.readset = None;
            }
            return Ok(());
        };

        let mut ctx = EvalContext::new();
        let elements = domain(vars, &mut ctx)?;
        self.rules = (0..elements.len())
            .map(|i| {
                let effect = Arc::clone(effect);
                let bound: Effect = Arc::new(move |vars: &mut VariableBank, ctx: &mut EvalContext| {
                    effect(i, vars, ctx)
                });
                Rule::new(format!("{}({i})", self.name), bound)
            })
            .collect();
        self.readset = ctx.into_readset();
        Ok(())
    }

    pub(crate) fn report_changes(&mut self, changes: &Changeset, vars: &VariableBank) -> EngineResult<()> {
        if changes.affects(&self.readset) {
            return self.update(vars);
        }
        for rule in &mut self.rules {
            rule.reactivate_if(changes);
        }
        Ok(())
    }
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ruleset")
            .field("name", &self.name)
            .field("parameterized", &self.is_parameterized())
            .field("rules", &self.rules)
            .field("readset", &self.readset)
            .finish()
    }
}

/// A declared invariant with its tracking state.
pub struct Invariant {
    pub(crate) name: String,
    pub(crate) active: bool,
    pub(crate) readset: Option<Readset>,
    pub(crate) check: InvariantCheck,
}

impl Invariant {
    pub(crate) fn new(name: &str, check: InvariantCheck) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            readset: None,
            check,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// What the last successful check read.
    #[must_use]
    pub const fn readset(&self) -> Option<&Readset> {
        self.readset.as_ref()
    }

    pub(crate) fn reactivate_if(&mut self, changes: &Changeset) {
        if !self.active && self.readset.as_ref().map_or(true, |r| changes.affects(r)) {
            self.active = true;
            self.readset = None;
        }
    }
}

impl fmt::Debug for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invariant")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("readset", &self.readset)
            .finish_non_exhaustive()
    }
}

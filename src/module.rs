//! Model description consumed by the controller.
//!
//! A [`Module`] owns the variable bank and the declared rules, rule families
//! and invariants, each paired with its declared name. Parsing a modeling
//! language into a module is out of scope here; [`ModuleBuilder`] registers
//! declarations directly as closures.
//!
//! Rule effects, domain expressions and invariant checks must read state
//! through [`VariableBank::read`] (or [`VariableBank::read_mut`]) with the
//! [`EvalContext`] they were given, otherwise the dependency tracking will
//! miss the read and a cached "no effect" result may go stale.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::debug;

use crate::changeset::EvalContext;
use crate::error::{EngineError, EngineResult, ValueError};
use crate::state::SerializedState;
use crate::types::TypeRef;
use crate::value::Value;

/// Effect of a simple rule.
pub type Effect = Arc<dyn Fn(&mut VariableBank, &mut EvalContext) -> EngineResult<()>>;

/// Effect of a parameterized rule, given the enumeration index of its domain element.
pub type IndexedEffect = Arc<dyn Fn(usize, &mut VariableBank, &mut EvalContext) -> EngineResult<()>>;

/// Expression producing the domain of a parameterized rule.
pub type DomainExpr = Arc<dyn Fn(&VariableBank, &mut EvalContext) -> EngineResult<Vec<Value>>>;

/// Invariant check. Returns `EngineError::Violation` when the invariant does not hold.
pub type InvariantCheck = Arc<dyn Fn(&VariableBank, &mut EvalContext) -> EngineResult<()>>;

/// Global initialization code, run at load and on reset.
pub type InitEffect = Arc<dyn Fn(&mut VariableBank) -> EngineResult<()>>;

/// A declared rule, resolved once into its kind.
#[derive(Clone)]
pub enum RuleDecl {
    Simple { effect: Effect },
    Parameterized { domain: DomainExpr, effect: IndexedEffect },
}

impl fmt::Debug for RuleDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple { .. } => f.write_str("RuleDecl::Simple"),
            Self::Parameterized { .. } => f.write_str("RuleDecl::Parameterized"),
        }
    }
}

/// A named, typed state variable.
#[derive(Debug, Clone)]
pub struct ModelVariable {
    name: String,
    ty: TypeRef,
    constant: bool,
    value: Value,
}

impl ModelVariable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Constants never change and are left out of serialized state.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        self.constant
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        self.value.to_json()
    }

    /// Replaces the value after checking it fits the declared type.
    pub fn assign(&mut self, value: Value) -> Result<(), ValueError> {
        self.ty.admits(&value)?;
        self.value = value;
        Ok(())
    }

    /// Restores the value from its JSON serialization.
    pub fn assign_json(&mut self, json: &Json) -> Result<(), ValueError> {
        self.value = self.ty.decode(json)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.value = self.ty.default_value();
    }
}

/// All variables of a module, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct VariableBank {
    vars: Vec<ModelVariable>,
    by_name: HashMap<String, usize>,
}

impl VariableBank {
    fn declare(&mut self, var: ModelVariable) -> EngineResult<()> {
        if self.by_name.contains_key(&var.name) {
            return Err(EngineError::Config {
                reason: format!("variable {} declared twice", var.name),
            });
        }
        self.by_name.insert(var.name.clone(), self.vars.len());
        self.vars.push(var);
        Ok(())
    }

    fn slot(&self, name: &str) -> EngineResult<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownVariable {
                name: name.to_string(),
            })
    }

    fn writable_slot(&self, name: &str) -> EngineResult<usize> {
        let slot = self.slot(name)?;
        if self.vars[slot].constant {
            return Err(ValueError::internal(format!("Cannot assign to constant {name}")).into());
        }
        Ok(slot)
    }

    /// Reads a variable, recording the read in `ctx`.
    pub fn read(&self, name: &str, ctx: &mut EvalContext) -> EngineResult<&Value> {
        let slot = self.slot(name)?;
        ctx.record(name);
        Ok(&self.vars[slot].value)
    }

    /// Mutable access for in-place updates that depend on the current value
    /// (pushing into a set, bumping a counter). Records the read in `ctx`.
    pub fn read_mut(&mut self, name: &str, ctx: &mut EvalContext) -> EngineResult<&mut Value> {
        let slot = self.writable_slot(name)?;
        ctx.record(name);
        Ok(&mut self.vars[slot].value)
    }

    /// Reads a variable without dependency tracking. For views and tests.
    pub fn peek(&self, name: &str) -> EngineResult<&Value> {
        let slot = self.slot(name)?;
        Ok(&self.vars[slot].value)
    }

    /// Overwrites a variable. Writes are not reads and are not recorded.
    pub fn assign(&mut self, name: &str, value: Value) -> EngineResult<()> {
        let slot = self.writable_slot(name)?;
        self.vars[slot].assign(value)?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelVariable> {
        self.by_name.get(name).map(|slot| &self.vars[*slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelVariable> + '_ {
        self.vars.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Serializes every non-constant variable.
    #[must_use]
    pub fn serialize(&self) -> SerializedState {
        SerializedState::new(
            self.vars
                .iter()
                .filter(|var| !var.constant)
                .map(|var| (var.name.clone(), var.to_json()))
                .collect(),
        )
    }

    /// Assigns every non-constant variable from `state`.
    ///
    /// Every entry is decoded before anything is assigned, so a missing or
    /// malformed entry leaves the bank unchanged.
    pub fn restore(&mut self, state: &SerializedState) -> EngineResult<()> {
        let decoded = self
            .vars
            .iter()
            .filter(|var| !var.constant)
            .map(|var| {
                let json = state.get(&var.name).ok_or_else(|| {
                    ValueError::internal(format!("serialized state has no entry for {}", var.name))
                })?;
                var.ty.decode(json)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let writable = self.vars.iter_mut().filter(|var| !var.constant);
        for (var, value) in writable.zip(decoded) {
            var.value = value;
        }
        Ok(())
    }

    /// Resets every non-constant variable to its type's default value.
    pub fn reset(&mut self) {
        for var in self.vars.iter_mut().filter(|var| !var.constant) {
            var.reset();
        }
    }
}

/// A loaded model: variables plus named declarations.
pub struct Module {
    vars: VariableBank,
    rules: Vec<(String, RuleDecl)>,
    invariants: Vec<(String, InvariantCheck)>,
    init: Option<InitEffect>,
}

impl Module {
    #[must_use]
    pub fn builder() -> ModuleBuilder {
        ModuleBuilder::default()
    }

    #[must_use]
    pub const fn variables(&self) -> &VariableBank {
        &self.vars
    }

    pub(crate) fn variables_mut(&mut self) -> &mut VariableBank {
        &mut self.vars
    }

    /// Declared rules with their names, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &RuleDecl)> + '_ {
        self.rules.iter().map(|(name, decl)| (name.as_str(), decl))
    }

    /// Declared invariants with their names, in declaration order.
    pub fn invariants(&self) -> impl Iterator<Item = (&str, &InvariantCheck)> + '_ {
        self.invariants.iter().map(|(name, check)| (name.as_str(), check))
    }

    /// Runs the global initialization code, if any.
    pub fn initialize(&mut self) -> EngineResult<()> {
        match &self.init {
            Some(init) => init(&mut self.vars),
            None => Ok(()),
        }
    }

    /// Puts every non-constant variable back to its default and reruns the
    /// init code. If init fails the variables keep their current values.
    pub fn reset(&mut self) -> EngineResult<()> {
        let mut vars = self.vars.clone();
        vars.reset();
        if let Some(init) = &self.init {
            init(&mut vars)?;
        }
        self.vars = vars;
        Ok(())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("vars", &self.vars)
            .field("rules", &self.rules)
            .field(
                "invariants",
                &self.invariants.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("has_init", &self.init.is_some())
            .finish()
    }
}

/// Builder for [`Module`].
///
/// # Examples
///
/// ```
/// use modelwalk::{Module, Type, Value};
///
/// let module = Module::builder()
///     .variable("x", Type::number())
///     .rule("inc", |vars, ctx| {
///         let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
///         vars.assign("x", Value::from(x + 1))
///     })
///     .build()
///     .unwrap();
/// assert_eq!(module.variables().peek("x").unwrap(), &Value::from(0));
/// ```
#[derive(Default)]
pub struct ModuleBuilder {
    vars: Vec<(String, TypeRef, Option<Value>)>,
    rules: Vec<(String, RuleDecl)>,
    invariants: Vec<(String, InvariantCheck)>,
    init: Option<InitEffect>,
}

impl ModuleBuilder {
    /// Declares a state variable initialized to its type's default.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.vars.push((name.into(), ty, None));
        self
    }

    /// Declares a constant. Constants are never serialized or diffed.
    #[must_use]
    pub fn constant(mut self, name: impl Into<String>, ty: TypeRef, value: Value) -> Self {
        self.vars.push((name.into(), ty, Some(value)));
        self
    }

    #[must_use]
    pub fn rule<F>(mut self, name: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&mut VariableBank, &mut EvalContext) -> EngineResult<()> + 'static,
    {
        self.rules.push((
            name.into(),
            RuleDecl::Simple {
                effect: Arc::new(effect),
            },
        ));
        self
    }

    /// Declares a rule family with one instance per element of `domain`.
    #[must_use]
    pub fn rule_for<D, F>(mut self, name: impl Into<String>, domain: D, effect: F) -> Self
    where
        D: Fn(&VariableBank, &mut EvalContext) -> EngineResult<Vec<Value>> + 'static,
        F: Fn(usize, &mut VariableBank, &mut EvalContext) -> EngineResult<()> + 'static,
    {
        self.rules.push((
            name.into(),
            RuleDecl::Parameterized {
                domain: Arc::new(domain),
                effect: Arc::new(effect),
            },
        ));
        self
    }

    #[must_use]
    pub fn invariant<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&VariableBank, &mut EvalContext) -> EngineResult<()> + 'static,
    {
        self.invariants.push((name.into(), Arc::new(check)));
        self
    }

    /// Global initialization code, run once at build time and again on every reset.
    #[must_use]
    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut VariableBank) -> EngineResult<()> + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Declares the variables, checks names are unique and runs the init code.
    pub fn build(self) -> EngineResult<Module> {
        let mut vars = VariableBank::default();
        for (name, ty, constant) in self.vars {
            let is_constant = constant.is_some();
            let value = match constant {
                Some(value) => {
                    ty.admits(&value)?;
                    value
                }
                None => ty.default_value(),
            };
            vars.declare(ModelVariable {
                name,
                ty,
                constant: is_constant,
                value,
            })?;
        }

        ensure_unique("rule", self.rules.iter().map(|(name, _)| name))?;
        ensure_unique("invariant", self.invariants.iter().map(|(name, _)| name))?;

        let mut module = Module {
            vars,
            rules: self.rules,
            invariants: self.invariants,
            init: self.init,
        };
        module.initialize()?;
        debug!(
            variables = module.vars.len(),
            rules = module.rules.len(),
            invariants = module.invariants.len(),
            "module loaded"
        );
        Ok(module)
    }
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a String>) -> EngineResult<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(EngineError::Config {
                reason: format!("{kind} {name} declared twice"),
            });
        }
    }
    Ok(())
}

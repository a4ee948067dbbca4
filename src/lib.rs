//! # modelwalk - incremental execution engine for state-machine models
//!
//! A model declares typed state variables, named transition rules (plain
//! rules and rule families over a dynamically computed domain) and
//! invariants that must hold after every transition. `modelwalk` steps such
//! a model through its state space one transition at a time, keeps the
//! execution history for undo, and tracks what every rule and invariant
//! read so that work unaffected by a change is skipped.
//!
//! ## Core Concepts
//!
//! - **Module**: the loaded model, registered through [`ModuleBuilder`]
//! - **Controller**: owns the module, commits transitions, keeps history
//! - **Readset / Changeset**: what a computation read / what a transition changed
//! - **Driver**: picks and fires active rules until the model goes idle
//!
//! ## Usage
//!
//! ```rust
//! use modelwalk::{Controller, EngineError, Module, Type, Value};
//!
//! let module = Module::builder()
//!     .variable("x", Type::range(0, 5)?)
//!     .rule("inc", |vars, ctx| {
//!         let x = vars.read("x", ctx)?.as_number().unwrap_or(0);
//!         vars.assign("x", Value::from((x + 1).min(5)))
//!     })
//!     .invariant("small", |vars, ctx| match vars.read("x", ctx)?.as_number() {
//!         Some(x) if x > 3 => Err(EngineError::violation(format!("x is {x}"))),
//!         _ => Ok(()),
//!     })
//!     .build()?;
//!
//! let mut controller = Controller::new(module)?;
//! let changes = controller.fire_by_name("inc")?;
//! assert_eq!(changes.to_string(), "x");
//! assert_eq!(controller.current().message, "inc (changed x)");
//! # Ok::<(), EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Values and types
pub mod error;
pub mod types;
pub mod value;

// Dependency tracking and state
pub mod changeset;
pub mod module;
pub mod state;

// Engine
pub mod controller;
pub mod driver;
pub mod monitor;
pub mod rules;

// Re-export primary types at crate root for convenience
pub use changeset::{Changeset, EvalContext, Readset};
pub use controller::{Controller, ControllerBuilder, ControllerConfig, ErrorHook, ResetHook};
pub use driver::{Driver, DriverConfig, RoundRobin, RuleSelector, RunReport, SeededRandom, StepOutcome};
pub use error::{EngineError, EngineResult, InvariantViolation, ValueError};
pub use module::{ModelVariable, Module, ModuleBuilder, RuleDecl, VariableBank};
pub use monitor::{
    ChannelSink, ChannelSinkConfig, EngineEvent, EventPayload, EventSink, EventStream, NullSink,
    TracingSink, View,
};
pub use rules::{Invariant, Rule, RuleId, Ruleset};
pub use state::{ExecutionSnapshot, SerializedState};
pub use types::{have_equality, have_ordering, is_numeric, subtype_of, Type, TypeRef, VariantDecl};
pub use value::{ArrayValue, EitherValue, OrderedSetValue, Value};

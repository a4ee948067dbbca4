//! Observation of engine activity.
//!
//! The controller never logs or renders directly. Committed transitions,
//! resets, restores and invariant failures are reported as [`EngineEvent`]s
//! to an injected [`EventSink`], and registered [`View`]s are asked to
//! refresh after every change to the execution history.

/// Event type definitions.
pub mod events;
/// Event sinks: tracing, bounded channel, null.
pub mod sink;
/// View notification contract.
pub mod view;

pub use events::{EngineEvent, EventPayload};
pub use sink::{ChannelSink, ChannelSinkConfig, EventSink, EventStream, NullSink, TracingSink};
pub use view::View;

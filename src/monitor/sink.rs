//! Event sinks.
//!
//! Sinks run on the commit path, so they must not block: [`ChannelSink`]
//! enqueues with `try_send` and counts what it had to drop.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

use super::events::{EngineEvent, EventPayload};

/// Port the controller reports engine events to.
pub trait EventSink {
    fn record(&self, event: &EngineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &EngineEvent) {}
}

/// Emits events as `tracing` records. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &EngineEvent) {
        match &event.payload {
            EventPayload::Committed {
                index,
                message,
                changes,
            } => info!(index, changes = ?changes, "{message}"),
            EventPayload::Reset => info!("reset"),
            EventPayload::Restored { index } => info!(index, "restore"),
            EventPayload::InvariantFailed { invariant, message } => {
                warn!(invariant = %invariant, "{message}");
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSinkConfig {
    /// Max queued events before new ones are dropped.
    pub capacity: usize,
}

impl Default for ChannelSinkConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl ChannelSinkConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.capacity == 0 {
            return Err(EngineError::Config {
                reason: "channel sink capacity must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Forwards events into a bounded queue drained through an [`EventStream`].
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<EngineEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates the sink and the stream that receives its events.
    pub fn new(cfg: &ChannelSinkConfig) -> EngineResult<(Self, EventStream)> {
        cfg.validate()?;
        let (tx, rx) = bounded(cfg.capacity);
        let sink = Self {
            tx,
            dropped: AtomicU64::new(0),
        };
        Ok((sink, EventStream { rx }))
    }

    /// Events discarded because the queue was full or the stream was dropped.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn record(&self, event: &EngineEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Receiving end of a [`ChannelSink`].
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<EngineEvent>,
}

impl EventStream {
    /// Next queued event, if any. Never blocks.
    #[must_use]
    pub fn try_next(&self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every queued event.
    #[must_use]
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }
}

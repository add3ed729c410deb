//! In-process state bus
//!
//! Two last-value slots shared between the scoring paths and the streaming
//! publisher: the latest state snapshot and the latest adaptation event.
//! Publishes overwrite wholesale; readers always get a copy of the most
//! recent value. There is no history and no replay.

use crate::types::{now_iso, AdaptEvent, StateSnapshot};
use std::sync::RwLock;
use tracing::debug;

/// Last-value bus for state snapshots and adaptation events
#[derive(Default)]
pub struct StateBus {
    state: RwLock<Option<StateSnapshot>>,
    adapt: RwLock<Option<AdaptEvent>>,
}

impl StateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a state snapshot, stamping the timestamp if absent.
    /// Returns the stored snapshot as published.
    pub fn set_state(&self, mut snapshot: StateSnapshot) -> StateSnapshot {
        if snapshot.ts.is_none() {
            snapshot.ts = Some(now_iso());
        }
        debug!(state = snapshot.state.as_str(), "publishing state snapshot");
        let mut slot = self.state.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(snapshot.clone());
        snapshot
    }

    /// Latest published snapshot, if any
    pub fn get_state(&self) -> Option<StateSnapshot> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish an adaptation event, stamping the timestamp if absent
    pub fn set_adapt(&self, mut event: AdaptEvent) -> AdaptEvent {
        if event.ts.is_none() {
            event.ts = Some(now_iso());
        }
        debug!(event_id = %event.event_id, "publishing adaptation event");
        let mut slot = self.adapt.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(event.clone());
        event
    }

    /// Latest published adaptation event, if any
    pub fn get_adapt(&self) -> Option<AdaptEvent> {
        self.adapt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drop both slots (used by tests and the debug surface)
    pub fn clear(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = None;
        *self.adapt.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

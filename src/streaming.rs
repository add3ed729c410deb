//! Streaming publisher
//!
//! Pushes the latest bus values to subscribers on a fixed tick (5 Hz by
//! default). The state stream always sends: a neutral baseline when nothing
//! has been published yet, the latest snapshot otherwise. The adaptation
//! stream sends the latest event while it carries recommendations and an
//! empty heartbeat otherwise, never both in one tick. A tick loop stops as
//! soon as its subscriber goes away.

use crate::state_bus::StateBus;
use crate::types::{now_iso, AdaptEvent, CavState, StateSnapshot, SCHEMA_VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Heartbeat time-to-live on the adaptation stream
pub const HEARTBEAT_TTL_MS: u64 = 1500;

/// Subscriber channel depth; slow consumers exert backpressure on their tick
const CHANNEL_CAPACITY: usize = 16;

/// Tick-driven fan-out of bus state to stream subscribers
pub struct StreamPublisher {
    bus: Arc<StateBus>,
    tick_hz: f64,
}

impl StreamPublisher {
    pub fn new(bus: Arc<StateBus>, tick_hz: f64) -> Self {
        Self { bus, tick_hz }
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }

    /// Subscribe to the state stream: one snapshot per tick
    pub fn subscribe_state(&self) -> mpsc::Receiver<StateSnapshot> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let bus = Arc::clone(&self.bus);
        let period = self.period();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let payload = state_payload(bus.get_state());
                if tx.send(payload).await.is_err() {
                    debug!("state subscriber dropped, stopping tick loop");
                    break;
                }
            }
        });
        rx
    }

    /// Subscribe to the adaptation stream: the latest recommendation-bearing
    /// event per tick, or a heartbeat when there is none
    pub fn subscribe_adapt(&self) -> mpsc::Receiver<AdaptEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let bus = Arc::clone(&self.bus);
        let period = self.period();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let payload = match bus.get_adapt() {
                    Some(event) if event.has_recommendations() => event,
                    _ => AdaptEvent::heartbeat(HEARTBEAT_TTL_MS),
                };
                if tx.send(payload).await.is_err() {
                    debug!("adapt subscriber dropped, stopping tick loop");
                    break;
                }
            }
        });
        rx
    }
}

/// Neutral baseline overlaid with whatever the bus last published
fn state_payload(latest: Option<StateSnapshot>) -> StateSnapshot {
    let mut payload = StateSnapshot {
        schema: SCHEMA_VERSION.to_string(),
        ts: Some(now_iso()),
        state: CavState::Balanced,
        drift: Some(0.0),
        cav_raw: None,
        cav_smooth: None,
        confidence: 0.0,
        user_id: None,
        place_id: None,
        env: None,
        parts: None,
        mode: None,
    };
    if let Some(latest) = latest {
        payload.state = latest.state;
        if latest.drift.is_some() {
            payload.drift = latest.drift;
        }
        payload.confidence = latest.confidence;
        payload.user_id = latest.user_id;
        payload.place_id = latest.place_id;
    }
    payload
}

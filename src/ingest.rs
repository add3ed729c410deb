//! Environmental frame ingestion
//!
//! Reduces a batch of timestamped frames to an averaged environment reading,
//! derives a drift score and categorical state from it, publishes the snapshot
//! to the state bus, and emits an adaptation event when the batch crosses the
//! overload boundary in either direction.

use crate::recommend;
use crate::state_bus::StateBus;
use crate::types::{
    now_iso, AdaptEvent, AdaptKind, CavState, EnvSnapshot, IngestBatch, IngestResponse,
    StateSnapshot, SCHEMA_VERSION,
};
use tracing::info;

/// Drift above this is overload
pub const DRIFT_OVERLOAD: f64 = 0.6;
/// Drift above this (but not overload) is focus
pub const DRIFT_FOCUS: f64 = 0.35;
/// Confidence attached to heuristic environmental snapshots
pub const INGEST_CONFIDENCE: f64 = 0.9;
/// Adaptation event time-to-live
pub const ADAPT_TTL_MS: u64 = 5000;

/// Environment drift heuristic in [0, 1], rounded to two decimals.
///
/// CO2 contributes above 700 ppm scaled over 600 ppm, noise above 45 dBA
/// scaled over 20 dBA, weighted 0.6/0.4.
pub fn env_drift(co2: f64, dba: f64) -> f64 {
    let co2_term = ((co2 - 700.0) / 600.0).max(0.0);
    let dba_term = ((dba - 45.0) / 20.0).max(0.0);
    let drift = (0.6 * co2_term + 0.4 * dba_term).clamp(0.0, 1.0);
    (drift * 100.0).round() / 100.0
}

/// Map a drift score to the environmental state
pub fn drift_state(drift: f64) -> CavState {
    if drift > DRIFT_OVERLOAD {
        CavState::Overload
    } else if drift > DRIFT_FOCUS {
        CavState::Focus
    } else {
        CavState::Balanced
    }
}

/// Ingest a frame batch: publish the derived snapshot and fire adaptation
/// events on overload edges. An empty batch is acknowledged without touching
/// the bus.
pub fn ingest(bus: &StateBus, batch: &IngestBatch) -> IngestResponse {
    let frames = &batch.frames;
    if frames.is_empty() {
        return IngestResponse {
            ok: true,
            frames: 0,
            published: None,
        };
    }

    let first = &frames[0];

    // Previous state must be captured before the publish below
    let prev_state = bus.get_state().map(|s| s.state);

    let co2_vals: Vec<f64> = frames
        .iter()
        .filter_map(|f| f.env.as_ref().and_then(|e| e.co2))
        .collect();
    let dba_vals: Vec<f64> = frames
        .iter()
        .filter_map(|f| f.env.as_ref().and_then(|e| e.dba))
        .collect();

    let co2 = mean_or(&co2_vals, recommend::DEFAULT_CO2_PPM);
    let dba = mean_or(&dba_vals, recommend::DEFAULT_DBA);

    let drift = env_drift(co2, dba);
    let state = drift_state(drift);

    let snapshot = StateSnapshot {
        schema: SCHEMA_VERSION.to_string(),
        ts: Some(now_iso()),
        state,
        drift: Some(drift),
        cav_raw: None,
        cav_smooth: None,
        confidence: INGEST_CONFIDENCE,
        user_id: first.user_id.clone(),
        place_id: first.place_id.clone(),
        env: Some(first.env.unwrap_or_default()),
        parts: None,
        mode: None,
    };
    let published = bus.set_state(snapshot);

    let entering = state == CavState::Overload && prev_state != Some(CavState::Overload);
    let leaving = matches!(state, CavState::Balanced | CavState::Focus)
        && prev_state == Some(CavState::Overload);

    if entering || leaving {
        let env = first.env.unwrap_or_default();
        let recs = recommend::recommend_for(state, drift, &env);
        let kind = if entering {
            AdaptKind::OverloadStart
        } else {
            AdaptKind::OverloadClear
        };

        let event = AdaptEvent {
            schema: SCHEMA_VERSION.to_string(),
            ts: Some(now_iso()),
            event_id: uuid::Uuid::new_v4(),
            kind: Some(kind),
            state: Some(state),
            drift: Some(drift),
            ttl_ms: ADAPT_TTL_MS,
            recommendations: recs,
            user_id: first.user_id.clone(),
            place_id: first.place_id.clone(),
        };
        info!(
            kind = ?kind,
            recommendations = event.recommendations.len(),
            "overload boundary crossed"
        );
        bus.set_adapt(event);
    }

    IngestResponse {
        ok: true,
        frames: frames.len(),
        published: Some(published),
    }
}

fn mean_or(values: &[f64], default: f64) -> f64 {
    if values.is_empty() {
        default
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

//! Batch scoring controller
//!
//! Serializes concurrent batch requests over the single stateful engine: one
//! request holds the engine lock for its whole batch, so items are scored in
//! array order and the EMA evolves exactly as it would under sequential
//! submission. Per-item failures are isolated; the surviving items still
//! score, and the last successful result is published to the state bus.

use crate::engine::CavEngine;
use crate::error::EngineError;
use crate::state_bus::StateBus;
use crate::types::{
    now_iso, BatchItemResult, BatchRequest, BatchResponse, StateSnapshot, WindowPayload,
    SCHEMA_VERSION,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::warn;

/// Confidence attached to batch-derived snapshots
pub const BATCH_CONFIDENCE: f64 = 0.9;

/// Human-readable server identifier echoed in batch responses
pub fn server_version() -> String {
    format!("cav-engine v{}", env!("CARGO_PKG_VERSION"))
}

/// Shared batch entry point over one engine and one bus
pub struct BatchController {
    engine: Arc<Mutex<CavEngine>>,
    bus: Arc<StateBus>,
}

impl BatchController {
    pub fn new(engine: Arc<Mutex<CavEngine>>, bus: Arc<StateBus>) -> Self {
        Self { engine, bus }
    }

    pub fn engine(&self) -> Arc<Mutex<CavEngine>> {
        Arc::clone(&self.engine)
    }

    /// Score a batch of windows in array order under one engine lock.
    ///
    /// An all-feature-map batch whose first map falls under the schema
    /// threshold is rejected wholesale in strict mode; in relaxed mode the
    /// mismatching items fail individually. Raw windows never trip the
    /// request-level guard.
    pub async fn score(&self, request: &BatchRequest) -> Result<BatchResponse, EngineError> {
        let start = Instant::now();

        if request.windows.is_empty() {
            return Err(EngineError::InvalidRequest(
                "windows must be a non-empty list".to_string(),
            ));
        }

        let any_raw = request.windows.iter().any(WindowPayload::is_raw);

        let mut engine = self.engine.lock().await;
        let config = engine.config().clone();

        if !any_raw && config.strict_features && !config.relaxed_guard {
            if let Some(WindowPayload::Features(first)) = request.windows.first() {
                let report = engine.feature_overlap(first.features.keys().map(String::as_str));
                if report.ratio < config.min_schema_overlap {
                    return Err(EngineError::SchemaMismatch {
                        overlap: report.ratio * 100.0,
                        required: config.min_schema_overlap * 100.0,
                        missing: report.missing.len(),
                        unexpected: report.unexpected.len(),
                    });
                }
            }
        }

        let mut results = Vec::with_capacity(request.windows.len());
        for payload in &request.windows {
            let scored = match payload {
                WindowPayload::Raw(item) => {
                    engine.score_window(&item.window, item.env(), item.local_hour)
                }
                WindowPayload::Features(item) => {
                    engine.score_features(&item.features, item.env(), item.local_hour)
                }
            };
            results.push(match scored {
                Ok(outcome) => BatchItemResult::success(&outcome),
                Err(err) => {
                    warn!(error = %err, "batch item failed");
                    BatchItemResult::failure(err.to_string())
                }
            });
        }
        drop(engine);

        self.publish_last_success(&results);

        Ok(BatchResponse {
            results,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            server_version: server_version(),
        })
    }

    /// Publish the last successful item so state queries reflect this batch
    fn publish_last_success(&self, results: &[BatchItemResult]) {
        let last = results
            .iter()
            .rev()
            .find(|r| r.ok && r.state.is_some() && r.cav_smooth.is_some());
        if let Some(item) = last {
            if let Some(state) = item.state {
                self.bus.set_state(StateSnapshot {
                    schema: SCHEMA_VERSION.to_string(),
                    ts: Some(now_iso()),
                    state,
                    drift: None,
                    cav_raw: item.cav_raw,
                    cav_smooth: item.cav_smooth,
                    confidence: BATCH_CONFIDENCE,
                    user_id: None,
                    place_id: None,
                    env: None,
                    parts: item.parts,
                    mode: None,
                });
            }
        }
    }
}

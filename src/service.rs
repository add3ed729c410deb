//! Service facade
//!
//! Owns the shared engine, the state bus, and the request counters, and
//! exposes the operations a transport layer needs: batch scoring, frame
//! ingestion, state queries, the debug mode override, and telemetry.

use crate::batch::BatchController;
use crate::config::EngineConfig;
use crate::engine::CavEngine;
use crate::error::EngineError;
use crate::ingest;
use crate::state_bus::StateBus;
use crate::streaming::StreamPublisher;
use crate::types::{
    BatchRequest, BatchResponse, CavState, IngestBatch, IngestResponse, StateQueryResponse,
    StateSnapshot, Telemetry, SCHEMA_VERSION,
};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Default)]
struct Counters {
    requests: u64,
    latency_sum_ms: f64,
}

/// One engine, one bus, one set of counters
pub struct CavService {
    bus: Arc<StateBus>,
    controller: BatchController,
    config: EngineConfig,
    started: Instant,
    counters: StdMutex<Counters>,
}

impl CavService {
    pub fn new(config: EngineConfig, engine: CavEngine) -> Self {
        let bus = Arc::new(StateBus::new());
        let controller = BatchController::new(Arc::new(Mutex::new(engine)), Arc::clone(&bus));
        Self {
            bus,
            controller,
            config,
            started: Instant::now(),
            counters: StdMutex::new(Counters::default()),
        }
    }

    /// Build a service whose engine loads from the configured model directory
    pub fn from_artifacts(config: EngineConfig) -> Result<Self, EngineError> {
        let engine = CavEngine::from_artifacts(config.clone())?;
        Ok(Self::new(config, engine))
    }

    pub fn bus(&self) -> Arc<StateBus> {
        Arc::clone(&self.bus)
    }

    /// Streaming publisher ticking at the configured rate
    pub fn publisher(&self) -> StreamPublisher {
        StreamPublisher::new(Arc::clone(&self.bus), self.config.tick_hz)
    }

    /// Score a batch of windows and record the request latency
    pub async fn score_batch(&self, request: &BatchRequest) -> Result<BatchResponse, EngineError> {
        let response = self.controller.score(request).await?;
        self.record_request(response.latency_ms);
        Ok(response)
    }

    /// Ingest environmental frames
    pub fn ingest(&self, batch: &IngestBatch) -> IngestResponse {
        let start = Instant::now();
        let response = ingest::ingest(&self.bus, batch);
        self.record_request(start.elapsed().as_secs_f64() * 1000.0);
        response
    }

    /// Latest published state with the derived mode field.
    /// Safe to call before anything has been published.
    pub fn query_state(&self) -> StateQueryResponse {
        let state = self.bus.get_state();
        StateQueryResponse {
            ok: true,
            mode: state.as_ref().and_then(|s| s.mode.clone()),
            state,
        }
    }

    /// Latest adaptation event, for debug readback
    pub fn last_adapt(&self) -> Option<crate::types::AdaptEvent> {
        self.bus.get_adapt()
    }

    /// Force the published mode, creating a neutral snapshot if none exists.
    /// Debug surface for hardware bridges and manual testing.
    pub fn force_mode(&self, mode: &str) -> StateQueryResponse {
        let mut snapshot = self.bus.get_state().unwrap_or_else(|| StateSnapshot {
            schema: SCHEMA_VERSION.to_string(),
            ts: None,
            state: CavState::Balanced,
            drift: None,
            cav_raw: None,
            cav_smooth: None,
            confidence: 0.0,
            user_id: None,
            place_id: None,
            env: None,
            parts: None,
            mode: None,
        });
        snapshot.mode = Some(mode.to_string());
        snapshot.ts = None;
        let stored = self.bus.set_state(snapshot);
        StateQueryResponse {
            ok: true,
            mode: stored.mode.clone(),
            state: Some(stored),
        }
    }

    /// In-memory request counters; reset on restart
    pub fn telemetry(&self) -> Telemetry {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let avg_latency_ms = if counters.requests > 0 {
            counters.latency_sum_ms / counters.requests as f64
        } else {
            0.0
        };
        Telemetry {
            request_count: counters.requests,
            avg_latency_ms,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
        }
    }

    fn record_request(&self, latency_ms: f64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.requests += 1;
        counters.latency_sum_ms += latency_ms;
    }
}

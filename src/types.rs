//! Core types for the CAV pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: sensor windows, score components, categorical states, state-bus
//! snapshots, adaptation events, and the batch/ingest request envelopes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Schema version embedded in all published payloads
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Default local hour when a request does not carry one
pub const DEFAULT_LOCAL_HOUR: u32 = 12;

/// Format the current UTC time as an ISO-8601 second-resolution timestamp
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Categorical engine state derived from the smoothed CAV score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CavState {
    Overload,
    Balanced,
    Focus,
    Restorative,
}

impl CavState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CavState::Overload => "overload",
            CavState::Balanced => "balanced",
            CavState::Focus => "focus",
            CavState::Restorative => "restorative",
        }
    }
}

/// One window of raw sensor samples, six named channels.
///
/// Every channel must hold exactly the configured window length
/// (240 samples at 4 Hz by default); windows violating that are scored
/// with the fail-safe zeroed overload response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorWindow {
    #[serde(rename = "EDA", default)]
    pub eda: Vec<f64>,
    #[serde(rename = "TEMP", default)]
    pub temp: Vec<f64>,
    #[serde(rename = "BVP", default)]
    pub bvp: Vec<f64>,
    #[serde(rename = "ACC_x", default)]
    pub acc_x: Vec<f64>,
    #[serde(rename = "ACC_y", default)]
    pub acc_y: Vec<f64>,
    #[serde(rename = "ACC_z", default)]
    pub acc_z: Vec<f64>,
}

/// Raw channel names, used to discriminate batch payload variants
pub const CHANNEL_KEYS: [&str; 6] = ["EDA", "TEMP", "BVP", "ACC_x", "ACC_y", "ACC_z"];

impl SensorWindow {
    /// All six channels in canonical order
    pub fn channels(&self) -> [(&'static str, &[f64]); 6] {
        [
            ("EDA", &self.eda),
            ("TEMP", &self.temp),
            ("BVP", &self.bvp),
            ("ACC_x", &self.acc_x),
            ("ACC_y", &self.acc_y),
            ("ACC_z", &self.acc_z),
        ]
    }
}

/// Ambient conditions attached to a scoring request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnvConditions {
    pub temp_c: Option<f64>,
    pub humidity: Option<f64>,
    pub aqi: Option<f64>,
}

/// Component scores produced by fusion, returned alongside each result
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub bio: f64,
    pub env: f64,
    pub circadian: f64,
    pub p_stress: f64,
}

/// Fused CAV score, raw and EMA-smoothed, both scaled to [0, 10000]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CavScore {
    pub raw: u32,
    pub smooth: u32,
}

/// Full result of scoring one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: CavScore,
    pub state: CavState,
    pub parts: ScoreComponents,
}

impl ScoreOutcome {
    /// Fail-safe response for invalid windows: zeroed scores, overload state.
    /// Downstream consumers always receive a well-formed result.
    pub fn failsafe() -> Self {
        Self {
            score: CavScore { raw: 0, smooth: 0 },
            state: CavState::Overload,
            parts: ScoreComponents::default(),
        }
    }
}

/// Environment snapshot carried by ingestion frames and adaptation triggers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub co2: Option<f64>,
    pub dba: Option<f64>,
    pub lux: Option<f64>,
    pub temp_c: Option<f64>,
}

/// One timestamped ingestion frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    pub ts: Option<f64>,
    pub user_id: Option<String>,
    pub place_id: Option<String>,
    pub env: Option<EnvSnapshot>,
}

/// Batch of ingestion frames
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestBatch {
    #[serde(default)]
    pub frames: Vec<Frame>,
}

/// Latest published state, held by the state bus.
///
/// Overwritten wholesale on every publish; readers receive a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema: String,
    #[serde(default)]
    pub ts: Option<String>,
    pub state: CavState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cav_raw: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cav_smooth: Option<u32>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<ScoreComponents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Single prioritized action emitted by the recommendation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: u8,
    pub action: String,
    pub reason: String,
    pub ttl_ms: u64,
}

/// Which overload edge an adaptation event marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptKind {
    OverloadStart,
    OverloadClear,
}

/// Adaptation event emitted on a state-crossing edge.
///
/// Heartbeat frames on the adaptation stream reuse this shape with no kind
/// and an empty recommendation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptEvent {
    pub schema: String,
    #[serde(default)]
    pub ts: Option<String>,
    pub event_id: Uuid,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<AdaptKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CavState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<f64>,
    pub ttl_ms: u64,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

impl AdaptEvent {
    /// Empty heartbeat frame for the adaptation stream
    pub fn heartbeat(ttl_ms: u64) -> Self {
        Self {
            schema: SCHEMA_VERSION.to_string(),
            ts: Some(now_iso()),
            event_id: Uuid::new_v4(),
            kind: None,
            state: None,
            drift: None,
            ttl_ms,
            recommendations: Vec::new(),
            user_id: None,
            place_id: None,
        }
    }

    pub fn has_recommendations(&self) -> bool {
        !self.recommendations.is_empty()
    }
}

/// One batch item: a raw sensor window or a pre-computed feature map.
///
/// The variant is decided exactly once, at deserialization: an object carrying
/// any raw channel key is a raw window (missing channels default to empty and
/// fall to the fail-safe path), anything else is a feature map. Downstream
/// code takes two explicit paths and never re-inspects keys.
#[derive(Debug, Clone)]
pub enum WindowPayload {
    Raw(RawWindowItem),
    Features(FeatureMapItem),
}

impl WindowPayload {
    pub fn is_raw(&self) -> bool {
        matches!(self, WindowPayload::Raw(_))
    }
}

impl Serialize for WindowPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WindowPayload::Raw(item) => item.serialize(serializer),
            WindowPayload::Features(item) => item.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WindowPayload {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let value = serde_json::Value::deserialize(deserializer)?;
        let looks_raw = value
            .as_object()
            .map(|map| CHANNEL_KEYS.iter().any(|key| map.contains_key(*key)))
            .unwrap_or(false);

        if looks_raw {
            RawWindowItem::deserialize(value)
                .map(WindowPayload::Raw)
                .map_err(D::Error::custom)
        } else {
            FeatureMapItem::deserialize(value)
                .map(WindowPayload::Features)
                .map_err(D::Error::custom)
        }
    }
}

/// Raw window batch item with optional environmental context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWindowItem {
    #[serde(flatten)]
    pub window: SensorWindow,
    pub temp_c: Option<f64>,
    pub humidity: Option<f64>,
    pub aqi: Option<f64>,
    #[serde(default = "default_local_hour")]
    pub local_hour: u32,
}

impl RawWindowItem {
    pub fn env(&self) -> EnvConditions {
        EnvConditions {
            temp_c: self.temp_c,
            humidity: self.humidity,
            aqi: self.aqi,
        }
    }
}

/// Pre-computed feature map batch item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMapItem {
    pub temp_c: Option<f64>,
    pub humidity: Option<f64>,
    pub aqi: Option<f64>,
    #[serde(default = "default_local_hour")]
    pub local_hour: u32,
    #[serde(flatten)]
    pub features: HashMap<String, f64>,
}

impl FeatureMapItem {
    pub fn env(&self) -> EnvConditions {
        EnvConditions {
            temp_c: self.temp_c,
            humidity: self.humidity,
            aqi: self.aqi,
        }
    }
}

fn default_local_hour() -> u32 {
    DEFAULT_LOCAL_HOUR
}

/// Batch scoring request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub windows: Vec<WindowPayload>,
}

/// Per-item batch result: success with scores or failure with a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cav_raw: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cav_smooth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CavState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<ScoreComponents>,
}

impl BatchItemResult {
    pub fn success(outcome: &ScoreOutcome) -> Self {
        Self {
            ok: true,
            error: None,
            cav_raw: Some(outcome.score.raw),
            cav_smooth: Some(outcome.score.smooth),
            state: Some(outcome.state),
            parts: Some(outcome.parts),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            cav_raw: None,
            cav_smooth: None,
            state: None,
            parts: None,
        }
    }
}

/// Batch scoring response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
    pub latency_ms: f64,
    pub server_version: String,
}

/// Ingestion response: acknowledgement plus the published payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub frames: usize,
    #[serde(flatten)]
    pub published: Option<StateSnapshot>,
}

/// State query response with the derived mode field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateQueryResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSnapshot>,
}

/// In-memory request counters, reset on restart
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub request_count: u64,
    pub avg_latency_ms: f64,
    pub uptime_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_state_serialization_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&CavState::Overload).unwrap(),
            "\"overload\""
        );
        assert_eq!(
            serde_json::to_string(&CavState::Restorative).unwrap(),
            "\"restorative\""
        );
    }

    #[test]
    fn test_window_payload_raw_variant() {
        let json = r#"{
            "EDA": [0.1, 0.2], "TEMP": [33.0, 33.1], "BVP": [0.0, 0.1],
            "ACC_x": [0.0, 0.0], "ACC_y": [0.0, 0.0], "ACC_z": [1.0, 1.0],
            "temp_c": 22.0, "humidity": 45.0, "aqi": 30, "local_hour": 10
        }"#;
        let payload: WindowPayload = serde_json::from_str(json).unwrap();
        assert!(payload.is_raw());
        match payload {
            WindowPayload::Raw(item) => {
                assert_eq!(item.window.eda.len(), 2);
                assert_eq!(item.local_hour, 10);
                assert_eq!(item.env().temp_c, Some(22.0));
            }
            WindowPayload::Features(_) => panic!("expected raw variant"),
        }
    }

    #[test]
    fn test_window_payload_feature_map_variant() {
        let json = r#"{
            "eda_mean": 0.42, "eda_std": 0.05, "bvp_mean": -0.1,
            "bvp_std": 0.9, "acc_mean": 1.0, "acc_std": 0.02
        }"#;
        let payload: WindowPayload = serde_json::from_str(json).unwrap();
        assert!(!payload.is_raw());
        match payload {
            WindowPayload::Features(item) => {
                assert_eq!(item.features.len(), 6);
                assert_eq!(item.local_hour, DEFAULT_LOCAL_HOUR);
            }
            WindowPayload::Raw(_) => panic!("expected feature-map variant"),
        }
    }

    #[test]
    fn test_window_payload_partial_raw_stays_raw() {
        // A window missing channels is still a raw window; the absent
        // channels default to empty and trip the fail-safe at scoring time.
        let json = r#"{"EDA": [0.1, 0.2], "TEMP": [33.0, 33.1]}"#;
        let payload: WindowPayload = serde_json::from_str(json).unwrap();
        match payload {
            WindowPayload::Raw(item) => {
                assert_eq!(item.window.eda.len(), 2);
                assert!(item.window.bvp.is_empty());
            }
            WindowPayload::Features(_) => panic!("expected raw variant"),
        }
    }

    #[test]
    fn test_adapt_heartbeat_is_empty() {
        let hb = AdaptEvent::heartbeat(1500);
        assert!(!hb.has_recommendations());
        assert_eq!(hb.ttl_ms, 1500);
        assert!(hb.kind.is_none());

        let json = serde_json::to_string(&hb).unwrap();
        assert!(!json.contains("\"type\""));
        assert!(json.contains("\"recommendations\":[]"));
    }

    #[test]
    fn test_failsafe_outcome_is_zeroed_overload() {
        let outcome = ScoreOutcome::failsafe();
        assert_eq!(outcome.score.raw, 0);
        assert_eq!(outcome.score.smooth, 0);
        assert_eq!(outcome.state, CavState::Overload);
        assert_eq!(outcome.parts, ScoreComponents::default());
    }
}

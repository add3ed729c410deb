//! Engine configuration
//!
//! All recognized knobs live here: smoothing factor, schema guard toggles,
//! model directory override, streaming tick rate, and hysteresis bands.
//! Business thresholds (fusion weights, comfort tiers) are fixed by design
//! and are not configuration.

use crate::hysteresis::HysteresisBands;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default window length: 60 seconds at 4 Hz
pub const DEFAULT_WINDOW_LEN: usize = 240;

/// Default sensor sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 4.0;

/// Default EMA smoothing factor
pub const DEFAULT_EMA_ALPHA: f64 = 0.2;

/// Default stress class label in the classifier's label space
pub const DEFAULT_STRESS_LABEL: u32 = 2;

/// Minimum produced/expected feature-schema overlap ratio
pub const DEFAULT_MIN_SCHEMA_OVERLAP: f64 = 0.8;

/// Maximum tolerated fraction of non-finite samples per window
pub const DEFAULT_MISSING_GATE: f64 = 0.2;

/// Default streaming tick rate (Hz)
pub const DEFAULT_TICK_HZ: f64 = 5.0;

/// Engine configuration surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Required per-channel sample count
    pub window_len: usize,
    /// Sensor sample rate used for spectral features (Hz)
    pub sample_rate_hz: f64,
    /// EMA smoothing factor alpha
    pub ema_alpha: f64,
    /// Label of the stress class in the classifier's label space
    pub stress_label: u32,
    /// Schema-mismatch rejection threshold (overlap ratio)
    pub min_schema_overlap: f64,
    /// Missing-data gate: reject windows with more non-finite samples than this fraction
    pub missing_gate: f64,
    /// Enforce the strict feature-schema guard on all-feature-map batches
    pub strict_features: bool,
    /// Mark guard violations as failed items instead of rejecting the request
    pub relaxed_guard: bool,
    /// Override directory for model artifacts
    pub model_dir: Option<PathBuf>,
    /// Streaming publisher tick rate (Hz)
    pub tick_hz: f64,
    /// Hysteresis band thresholds
    pub bands: HysteresisBands,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_len: DEFAULT_WINDOW_LEN,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            ema_alpha: DEFAULT_EMA_ALPHA,
            stress_label: DEFAULT_STRESS_LABEL,
            min_schema_overlap: DEFAULT_MIN_SCHEMA_OVERLAP,
            missing_gate: DEFAULT_MISSING_GATE,
            strict_features: true,
            relaxed_guard: false,
            model_dir: None,
            tick_hz: DEFAULT_TICK_HZ,
            bands: HysteresisBands::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `CAV_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("CAV_STRICT_FEATURES") {
            config.strict_features = parse_bool(&v).unwrap_or(config.strict_features);
        }
        if let Ok(v) = std::env::var("CAV_RELAXED_GUARD") {
            config.relaxed_guard = parse_bool(&v).unwrap_or(config.relaxed_guard);
        }
        if let Ok(v) = std::env::var("CAV_MODEL_DIR") {
            if !v.is_empty() {
                config.model_dir = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("CAV_TICK_HZ") {
            if let Ok(hz) = v.parse::<f64>() {
                if hz > 0.0 {
                    config.tick_hz = hz;
                }
            }
        }
        if let Ok(v) = std::env::var("CAV_EMA_ALPHA") {
            if let Ok(alpha) = v.parse::<f64>() {
                if (0.0..=1.0).contains(&alpha) {
                    config.ema_alpha = alpha;
                }
            }
        }
        if let Ok(v) = std::env::var("CAV_STRESS_LABEL") {
            if let Ok(label) = v.parse::<u32>() {
                config.stress_label = label;
            }
        }

        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

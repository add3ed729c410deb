//! CAV Engine - Context-Aware Value scoring for physiological and environmental signals
//!
//! The engine turns sliding windows of wearable sensor samples into a bounded
//! comfort/load score through a deterministic pipeline: feature extraction →
//! standardization → stress classification → score fusion → EMA smoothing →
//! hysteresis state classification.
//!
//! ## Modules
//!
//! - **Scoring Pipeline**: `features`, `spectral`, `classifier`, `fusion`, `hysteresis`, `engine`
//! - **Request Surfaces**: `batch`, `ingest`, `service`
//! - **Distribution**: `state_bus`, `streaming`, `recommend`

pub mod batch;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod fusion;
pub mod hysteresis;
pub mod ingest;
pub mod recommend;
pub mod service;
pub mod spectral;
pub mod state_bus;
pub mod streaming;
pub mod types;

pub use config::EngineConfig;
pub use engine::CavEngine;
pub use error::EngineError;
pub use service::CavService;

// Schema exports
pub use features::FeatureSchema;
pub use types::{CavScore, CavState, ScoreOutcome, SCHEMA_VERSION};

/// Engine version embedded in batch responses
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

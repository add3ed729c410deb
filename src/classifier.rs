//! Classifier adapter
//!
//! The trained stress classifier is an external collaborator consumed through
//! a narrow contract: a probability distribution over a small set of discrete
//! classes, one of which is the designated stress class. The concrete model
//! format is irrelevant to the engine as long as the contract holds.
//!
//! This module also applies feature standardization (parameters are produced
//! externally and shipped as artifacts) and provides a softmax linear model
//! loadable from JSON artifacts.

use crate::error::EngineError;
use crate::features::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Narrow interface to the external stress classifier
pub trait StressClassifier: Send + Sync {
    /// Class labels, in the order probabilities are returned
    fn classes(&self) -> &[u32];

    /// Probability distribution over `classes()`, if the model supports one
    fn predict_proba(&self, features: &[f64]) -> Option<Vec<f64>>;

    /// Hard class prediction
    fn predict(&self, features: &[f64]) -> u32;
}

/// Extract P(stress) under the adapter contract.
///
/// A distribution lacking the stress class yields 0.0; a model exposing only
/// hard predictions degrades to p_stress ∈ {0.0, 1.0}.
pub fn p_stress(model: &dyn StressClassifier, features: &[f64], stress_label: u32) -> f64 {
    if let Some(proba) = model.predict_proba(features) {
        match model.classes().iter().position(|c| *c == stress_label) {
            Some(idx) if idx < proba.len() => proba[idx].clamp(0.0, 1.0),
            _ => 0.0,
        }
    } else if model.predict(features) == stress_label {
        1.0
    } else {
        0.0
    }
}

/// Feature standardization parameters (externally fitted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardizer {
    /// Standardize a feature row and scrub non-finite values to 0.0
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .enumerate()
            .map(|(idx, x)| {
                let mean = self.mean.get(idx).copied().unwrap_or(0.0);
                let mut scale = self.scale.get(idx).copied().unwrap_or(1.0);
                if !scale.is_finite() || scale == 0.0 {
                    scale = 1.0;
                }
                let z = (x - mean) / scale;
                if z.is_finite() {
                    z
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Scrub non-finite feature values to 0.0 without standardizing
pub fn scrub(features: &[f64]) -> Vec<f64> {
    features
        .iter()
        .map(|x| if x.is_finite() { *x } else { 0.0 })
        .collect()
}

/// Softmax linear classifier loaded from JSON artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub classes: Vec<u32>,
    /// One weight row per class
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    fn logits(&self, features: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(self.intercepts.iter())
            .map(|(row, b)| {
                row.iter()
                    .zip(features.iter())
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + b
            })
            .collect()
    }
}

impl StressClassifier for LinearModel {
    fn classes(&self) -> &[u32] {
        &self.classes
    }

    fn predict_proba(&self, features: &[f64]) -> Option<Vec<f64>> {
        let logits = self.logits(features);
        if logits.is_empty() {
            return None;
        }
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        Some(exps.iter().map(|e| e / total).collect())
    }

    fn predict(&self, features: &[f64]) -> u32 {
        let logits = self.logits(features);
        let best = logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        self.classes.get(best).copied().unwrap_or(0)
    }
}

/// Model artifacts loaded from a directory
pub struct ModelArtifacts {
    pub model: LinearModel,
    pub standardizer: Option<Standardizer>,
    pub schema: FeatureSchema,
}

/// Load `model.json`, `feature_schema.json`, and (optionally) `scaler.json`
/// from a model directory. Artifact discovery policy lives with the caller.
pub fn load_artifacts(dir: &Path) -> Result<ModelArtifacts, EngineError> {
    let model: LinearModel = read_json(&dir.join("model.json"))?;
    let schema: FeatureSchema = read_json(&dir.join("feature_schema.json"))?;

    if model.weights.len() != model.classes.len() || model.intercepts.len() != model.classes.len()
    {
        return Err(EngineError::ArtifactError(format!(
            "model.json shape mismatch: {} classes, {} weight rows, {} intercepts",
            model.classes.len(),
            model.weights.len(),
            model.intercepts.len()
        )));
    }

    let scaler_path = dir.join("scaler.json");
    let standardizer = if scaler_path.exists() {
        Some(read_json(&scaler_path)?)
    } else {
        None
    };

    Ok(ModelArtifacts {
        model,
        standardizer,
        schema,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::ArtifactError(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::ArtifactError(format!("{}: {}", path.display(), e)))
}

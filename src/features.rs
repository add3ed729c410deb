//! Feature extraction
//!
//! This module turns a raw sensor window into a fixed-order feature vector:
//! - Basic statistics over finite samples (mean, population std, min, max,
//!   bias-corrected skewness and excess kurtosis)
//! - Least-squares trend slope and std of the first difference
//! - Spectral band powers for BVP and the derived ACC magnitude
//! - Median and 95th percentile for EDA
//!
//! It also owns the reference feature schema: the names the classifier was
//! trained against, the produced/expected overlap check, and reindexing with
//! zero fill.

use crate::spectral;
use crate::types::SensorWindow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum finite samples required for spectral features
const MIN_SPECTRAL_SAMPLES: usize = 10;

/// Why a window cannot be scored
#[derive(Debug, Clone, PartialEq)]
pub enum WindowRejection {
    WrongLength {
        channel: &'static str,
        got: usize,
        want: usize,
    },
    TooManyMissing {
        fraction: f64,
    },
}

/// Ordered feature name/value pairs produced from one window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.names.push(name.into());
        self.values.push(value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Produced-vs-expected schema comparison
#[derive(Debug, Clone)]
pub struct OverlapReport {
    pub ratio: f64,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

/// Reference feature schema the classifier was trained against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub feature_names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::reference()
    }
}

impl FeatureSchema {
    /// Canonical schema: exactly the names the extractor produces, in order
    pub fn reference() -> Self {
        let mut names = Vec::new();
        for channel in ["EDA", "TEMP", "BVP", "ACC_mag"] {
            for stat in ["mean", "std", "min", "max", "skew", "kurtosis"] {
                names.push(format!("{channel}_{stat}"));
            }
            names.push(format!("{channel}_slope"));
            names.push(format!("{channel}_std_diff"));
            if channel == "BVP" || channel == "ACC_mag" {
                for band in ["low", "mid", "high"] {
                    names.push(format!("{channel}_power_{band}"));
                }
            }
            if channel == "EDA" {
                names.push(format!("{channel}_median"));
                names.push(format!("{channel}_p95"));
            }
        }
        Self {
            feature_names: names,
        }
    }

    pub fn len(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_names.is_empty()
    }

    /// Compare produced names against the schema, case-insensitively
    pub fn overlap<'a>(&self, produced: impl IntoIterator<Item = &'a str>) -> OverlapReport {
        let got: Vec<String> = produced
            .into_iter()
            .map(|n| n.to_ascii_lowercase())
            .collect();
        let expected: Vec<String> = self
            .feature_names
            .iter()
            .map(|n| n.to_ascii_lowercase())
            .collect();

        let missing: Vec<String> = self
            .feature_names
            .iter()
            .zip(expected.iter())
            .filter(|(_, lower)| !got.contains(lower))
            .map(|(name, _)| name.clone())
            .collect();
        let unexpected: Vec<String> = got
            .iter()
            .filter(|name| !expected.contains(name))
            .cloned()
            .collect();

        let overlap = expected.len() - missing.len();
        OverlapReport {
            ratio: overlap as f64 / expected.len().max(1) as f64,
            missing,
            unexpected,
        }
    }

    /// Reindex a produced vector to schema order, filling absent names with 0.0
    pub fn reindex(&self, vector: &FeatureVector) -> Vec<f64> {
        self.feature_names
            .iter()
            .map(|name| vector.get(name).unwrap_or(0.0))
            .collect()
    }

    /// Reindex a pre-computed feature map to schema order, case-insensitively
    pub fn reindex_map(&self, map: &HashMap<String, f64>) -> Vec<f64> {
        let lowered: HashMap<String, f64> = map
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), *v))
            .collect();
        self.feature_names
            .iter()
            .map(|name| {
                lowered
                    .get(&name.to_ascii_lowercase())
                    .copied()
                    .unwrap_or(0.0)
            })
            .collect()
    }
}

/// Validate window shape and the missing-data gate.
///
/// More than `missing_gate` non-finite samples across all six channels, or
/// any channel of the wrong length, makes the window unscoreable.
pub fn validate_window(
    window: &SensorWindow,
    window_len: usize,
    missing_gate: f64,
) -> Result<(), WindowRejection> {
    for (channel, samples) in window.channels() {
        if samples.len() != window_len {
            return Err(WindowRejection::WrongLength {
                channel,
                got: samples.len(),
                want: window_len,
            });
        }
    }

    let total = window_len * 6;
    let missing = window
        .channels()
        .iter()
        .flat_map(|(_, samples)| samples.iter())
        .filter(|x| !x.is_finite())
        .count();
    let fraction = missing as f64 / total.max(1) as f64;
    if fraction > missing_gate {
        return Err(WindowRejection::TooManyMissing { fraction });
    }

    Ok(())
}

/// Extract the full feature vector from a validated window.
///
/// Undefined statistics propagate as NaN, never as zero; they are scrubbed
/// only after standardization.
pub fn extract_features(window: &SensorWindow, fs: f64) -> FeatureVector {
    let acc_mag = acc_magnitude(&window.acc_x, &window.acc_y, &window.acc_z);

    let channels: [(&str, &[f64]); 4] = [
        ("EDA", &window.eda),
        ("TEMP", &window.temp),
        ("BVP", &window.bvp),
        ("ACC_mag", &acc_mag),
    ];

    let mut vector = FeatureVector::default();
    for (name, signal) in channels {
        let finite = finite_samples(signal);
        let stats = basic_stats(&finite);

        vector.push(format!("{name}_mean"), stats.mean);
        vector.push(format!("{name}_std"), stats.std);
        vector.push(format!("{name}_min"), stats.min);
        vector.push(format!("{name}_max"), stats.max);
        vector.push(format!("{name}_skew"), stats.skew);
        vector.push(format!("{name}_kurtosis"), stats.kurtosis);
        vector.push(format!("{name}_slope"), slope(&finite));
        vector.push(format!("{name}_std_diff"), std_first_diff(&finite));

        if name == "BVP" || name == "ACC_mag" {
            let powers = if finite.len() >= MIN_SPECTRAL_SAMPLES {
                spectral::band_powers(&finite, fs)
            } else {
                None
            };
            let (low, mid, high) = match powers {
                Some(p) => (p.low, p.mid, p.high),
                None => (f64::NAN, f64::NAN, f64::NAN),
            };
            vector.push(format!("{name}_power_low"), low);
            vector.push(format!("{name}_power_mid"), mid);
            vector.push(format!("{name}_power_high"), high);
        }

        if name == "EDA" {
            vector.push(format!("{name}_median"), median(&finite));
            vector.push(format!("{name}_p95"), percentile(&finite, 95.0));
        }
    }

    vector
}

/// Derived acceleration magnitude channel: sqrt(x² + y² + z²)
pub fn acc_magnitude(x: &[f64], y: &[f64], z: &[f64]) -> Vec<f64> {
    if x.is_empty() || y.is_empty() || z.is_empty() {
        return Vec::new();
    }
    x.iter()
        .zip(y.iter())
        .zip(z.iter())
        .map(|((a, b), c)| (a * a + b * b + c * c).sqrt())
        .collect()
}

/// Basic statistics over an already-filtered finite sample set
#[derive(Debug, Clone, Copy)]
pub struct BasicStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub skew: f64,
    pub kurtosis: f64,
}

fn finite_samples(signal: &[f64]) -> Vec<f64> {
    signal.iter().copied().filter(|x| x.is_finite()).collect()
}

/// Mean, population std, min, max, and bias-corrected skew / excess kurtosis
pub fn basic_stats(finite: &[f64]) -> BasicStats {
    let n = finite.len();
    if n == 0 {
        return BasicStats {
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            skew: f64::NAN,
            kurtosis: f64::NAN,
        };
    }

    let nf = n as f64;
    let mean = finite.iter().sum::<f64>() / nf;
    let m2 = finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / nf;
    let m3 = finite.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / nf;
    let m4 = finite.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / nf;

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    // Bias-corrected sample skewness (G1)
    let skew = if n >= 3 && m2 > f64::EPSILON {
        let g1 = m3 / m2.powf(1.5);
        g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0)
    } else {
        f64::NAN
    };

    // Bias-corrected excess kurtosis (G2)
    let kurtosis = if n >= 4 && m2 > f64::EPSILON {
        let g2 = m4 / (m2 * m2) - 3.0;
        ((nf - 1.0) / ((nf - 2.0) * (nf - 3.0))) * ((nf + 1.0) * g2 + 6.0)
    } else {
        f64::NAN
    };

    BasicStats {
        mean,
        std: m2.sqrt(),
        min,
        max,
        skew,
        kurtosis,
    }
}

/// Least-squares linear trend slope against sample index
pub fn slope(finite: &[f64]) -> f64 {
    let n = finite.len();
    if n < 2 {
        return f64::NAN;
    }

    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let y_mean = finite.iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (idx, y) in finite.iter().enumerate() {
        let dt = idx as f64 - t_mean;
        cov += dt * (y - y_mean);
        var += dt * dt;
    }

    cov / var
}

/// Population std of the first difference of the finite subsequence
pub fn std_first_diff(finite: &[f64]) -> f64 {
    if finite.len() < 2 {
        return f64::NAN;
    }
    let diffs: Vec<f64> = finite.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let nf = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / nf;
    (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / nf).sqrt()
}

/// Median of the finite samples (midpoint average for even counts)
pub fn median(finite: &[f64]) -> f64 {
    percentile(finite, 50.0)
}

/// Linear-interpolation percentile of the finite samples
pub fn percentile(finite: &[f64], pct: f64) -> f64 {
    if finite.is_empty() {
        return f64::NAN;
    }
    let mut sorted = finite.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (sorted.len() - 1) as f64 * pct / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let weight = rank - lo as f64;
        sorted[lo] * (1.0 - weight) + sorted[hi] * weight
    }
}

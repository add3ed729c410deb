//! Score fusion
//!
//! Combines the bio score (1 − P(stress)), tiered environmental comfort, and
//! the circadian factor into the raw CAV integer with fixed weights.

use crate::types::{EnvConditions, ScoreComponents};

/// Fixed fusion weights (sum = 1.0)
pub const WEIGHT_BIO: f64 = 0.6;
pub const WEIGHT_ENV: f64 = 0.2;
pub const WEIGHT_CIRCADIAN: f64 = 0.2;

/// CAV integer scale
pub const CAV_SCALE: f64 = 10000.0;

/// Neutral comfort used when any environmental input is absent
pub const NEUTRAL_ENV_COMFORT: f64 = 0.5;

/// Result of fusing one window's component scores
#[derive(Debug, Clone, Copy)]
pub struct FusedScore {
    /// Truncated integer score on [0, 10000]
    pub raw: u32,
    /// Clipped fraction on [0, 1], the value the EMA smooths
    pub fraction: f64,
    pub parts: ScoreComponents,
}

/// Fuse component scores into the raw CAV score.
///
/// Environmental comfort requires all of temperature, humidity, and AQI;
/// any absent input yields the neutral default instead of a partial average.
pub fn fuse(p_stress: f64, env: EnvConditions, local_hour: u32) -> FusedScore {
    let bio = 1.0 - p_stress;

    let env_comfort = match (env.temp_c, env.humidity, env.aqi) {
        (Some(temp_c), Some(humidity), Some(aqi)) => comfort_env(temp_c, humidity, aqi),
        _ => NEUTRAL_ENV_COMFORT,
    };

    let circadian = circadian_factor(local_hour);

    let weighted = WEIGHT_BIO * bio + WEIGHT_ENV * env_comfort + WEIGHT_CIRCADIAN * circadian;
    let fraction = weighted.clamp(0.0, 1.0);

    FusedScore {
        raw: (fraction * CAV_SCALE) as u32,
        fraction,
        parts: ScoreComponents {
            bio,
            env: env_comfort,
            circadian,
            p_stress,
        },
    }
}

/// Environmental comfort: three independently tiered sub-scores, averaged
pub fn comfort_env(temp_c: f64, humidity: f64, aqi: f64) -> f64 {
    let temp_score = if (20.0..=24.0).contains(&temp_c) {
        1.0
    } else if (18.0..20.0).contains(&temp_c) || (temp_c > 24.0 && temp_c <= 26.0) {
        0.8
    } else if (16.0..18.0).contains(&temp_c) || (temp_c > 26.0 && temp_c <= 28.0) {
        0.6
    } else {
        0.4
    };

    let hum_score = if (30.0..=60.0).contains(&humidity) {
        1.0
    } else if (20.0..30.0).contains(&humidity) || (humidity > 60.0 && humidity <= 70.0) {
        0.8
    } else if (10.0..20.0).contains(&humidity) || (humidity > 70.0 && humidity <= 80.0) {
        0.6
    } else {
        0.4
    };

    let aqi_score = if aqi <= 50.0 {
        1.0
    } else if aqi <= 100.0 {
        0.8
    } else if aqi <= 150.0 {
        0.6
    } else if aqi <= 200.0 {
        0.4
    } else if aqi <= 300.0 {
        0.2
    } else {
        0.1
    };

    (temp_score + hum_score + aqi_score) / 3.0
}

/// Circadian factor: waking hours [7, 21] score 1.0, otherwise 0.7
pub fn circadian_factor(local_hour: u32) -> f64 {
    if (7..=21).contains(&local_hour) {
        1.0
    } else {
        0.7
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_env() -> EnvConditions {
        EnvConditions {
            temp_c: Some(22.0),
            humidity: Some(45.0),
            aqi: Some(30.0),
        }
    }

    #[test]
    fn test_comfort_tiers() {
        // Ideal conditions
        assert!((comfort_env(22.0, 45.0, 30.0) - 1.0).abs() < 1e-12);
        // One tier down on each factor
        assert!((comfort_env(19.0, 65.0, 80.0) - 0.8).abs() < 1e-12);
        // Worst tiers
        assert!((comfort_env(5.0, 95.0, 400.0) - (0.4 + 0.4 + 0.1) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_comfort_boundary_values() {
        assert!((comfort_env(24.0, 60.0, 50.0) - 1.0).abs() < 1e-12);
        let one_past = comfort_env(24.1, 60.1, 51.0);
        assert!((one_past - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_circadian_factor() {
        assert_eq!(circadian_factor(7), 1.0);
        assert_eq!(circadian_factor(21), 1.0);
        assert_eq!(circadian_factor(6), 0.7);
        assert_eq!(circadian_factor(22), 0.7);
        assert_eq!(circadian_factor(0), 0.7);
    }

    #[test]
    fn test_fuse_ideal_daytime() {
        let fused = fuse(0.0, full_env(), 12);
        // 0.6·1.0 + 0.2·1.0 + 0.2·1.0 = 1.0
        assert_eq!(fused.raw, 10000);
        assert_eq!(fused.fraction, 1.0);
        let parts = fused.parts;
        assert_eq!(parts.bio, 1.0);
        assert_eq!(parts.env, 1.0);
        assert_eq!(parts.circadian, 1.0);
        assert_eq!(parts.p_stress, 0.0);
    }

    #[test]
    fn test_fuse_missing_env_defaults_neutral() {
        let partial = EnvConditions {
            temp_c: Some(22.0),
            humidity: None,
            aqi: Some(30.0),
        };
        let fused = fuse(0.5, partial, 12);
        assert_eq!(fused.parts.env, NEUTRAL_ENV_COMFORT);
    }

    #[test]
    fn test_fuse_full_stress_at_night() {
        let fused = fuse(1.0, EnvConditions::default(), 3);
        // 0.6·0.0 + 0.2·0.5 + 0.2·0.7 = 0.24
        assert_eq!(fused.raw, 2400);
        assert_eq!(fused.parts.bio, 0.0);
        assert_eq!(fused.parts.circadian, 0.7);
    }

    #[test]
    fn test_fuse_truncates_to_integer() {
        let fused = fuse(0.5, full_env(), 12);
        // 0.6·0.5 + 0.2 + 0.2 = 0.7 → 7000 (truncation, not rounding)
        assert_eq!(fused.raw, 7000);
        let fused = fuse(0.9, full_env(), 12);
        assert!(fused.raw <= 4600 && fused.raw >= 4599);
    }
}

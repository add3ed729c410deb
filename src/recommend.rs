//! Recommendation engine
//!
//! Pure rule table from (state, environment) to a prioritized action list.
//! Lower priority number means more urgent. The list is never empty: every
//! state contributes at least its baseline action, and the result is sorted
//! by priority.

use crate::types::{CavState, EnvSnapshot, Recommendation};

/// Environment defaults applied when a reading is absent
pub const DEFAULT_CO2_PPM: f64 = 600.0;
pub const DEFAULT_DBA: f64 = 40.0;
pub const DEFAULT_LUX: f64 = 300.0;

fn rec(priority: u8, action: &str, reason: String, ttl_ms: u64) -> Recommendation {
    Recommendation {
        priority,
        action: action.to_string(),
        reason,
        ttl_ms,
    }
}

/// Build the recommendation list for a state under the given environment
pub fn recommend_for(state: CavState, _drift: f64, env: &EnvSnapshot) -> Vec<Recommendation> {
    let co2 = env.co2.unwrap_or(DEFAULT_CO2_PPM);
    let dba = env.dba.unwrap_or(DEFAULT_DBA);
    let lux = env.lux.unwrap_or(DEFAULT_LUX);

    let mut recs = Vec::new();
    match state {
        CavState::Overload => {
            if co2 >= 900.0 {
                recs.push(rec(
                    1,
                    "ventilation_increase",
                    format!("CO2={}ppm", co2 as i64),
                    30000,
                ));
            }
            if dba >= 55.0 {
                recs.push(rec(1, "reduce_noise", format!("dBA≈{}", dba as i64), 20000));
            }
            if lux >= 500.0 {
                recs.push(rec(2, "dim_lights", format!("Lux≈{}", lux as i64), 20000));
            }
            recs.push(rec(
                3,
                "suggest_break",
                "high cognitive load".to_string(),
                60000,
            ));
        }
        CavState::Focus => {
            if (45.0..=55.0).contains(&dba) {
                recs.push(rec(
                    3,
                    "keep_noise_stable",
                    "good speech-band noise".to_string(),
                    20000,
                ));
            }
            if (250.0..=450.0).contains(&lux) {
                recs.push(rec(
                    3,
                    "keep_lighting",
                    "comfortable lighting".to_string(),
                    20000,
                ));
            }
            recs.push(rec(
                4,
                "maintain_conditions",
                "stable focus".to_string(),
                15000,
            ));
        }
        CavState::Balanced | CavState::Restorative => {
            recs.push(rec(
                4,
                "maintain_conditions",
                "good state".to_string(),
                15000,
            ));
        }
    }

    recs.sort_by_key(|r| r.priority);
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env(co2: f64, dba: f64, lux: f64) -> EnvSnapshot {
        EnvSnapshot {
            co2: Some(co2),
            dba: Some(dba),
            lux: Some(lux),
            temp_c: None,
        }
    }

    #[test]
    fn test_overload_bad_environment_triggers_all_rules() {
        let recs = recommend_for(CavState::Overload, 0.8, &env(1100.0, 62.0, 700.0));
        let actions: Vec<&str> = recs.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![
                "ventilation_increase",
                "reduce_noise",
                "dim_lights",
                "suggest_break"
            ]
        );
        assert_eq!(recs[0].reason, "CO2=1100ppm");
        assert_eq!(recs[0].ttl_ms, 30000);
    }

    #[test]
    fn test_overload_always_suggests_break() {
        let recs = recommend_for(CavState::Overload, 0.7, &env(600.0, 40.0, 300.0));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].action, "suggest_break");
        assert_eq!(recs[0].priority, 3);
        assert_eq!(recs[0].ttl_ms, 60000);
    }

    #[test]
    fn test_focus_in_good_conditions() {
        let recs = recommend_for(CavState::Focus, 0.4, &env(600.0, 50.0, 350.0));
        let actions: Vec<&str> = recs.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["keep_noise_stable", "keep_lighting", "maintain_conditions"]
        );
    }

    #[test]
    fn test_focus_outside_bands_keeps_baseline_only() {
        let recs = recommend_for(CavState::Focus, 0.4, &env(600.0, 70.0, 100.0));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].action, "maintain_conditions");
        assert_eq!(recs[0].reason, "stable focus");
    }

    #[test]
    fn test_balanced_and_restorative_share_baseline() {
        for state in [CavState::Balanced, CavState::Restorative] {
            let recs = recommend_for(state, 0.1, &env(600.0, 40.0, 300.0));
            assert_eq!(recs.len(), 1);
            assert_eq!(recs[0].action, "maintain_conditions");
            assert_eq!(recs[0].reason, "good state");
        }
    }

    #[test]
    fn test_missing_readings_use_defaults() {
        // Defaults (600/40/300) stay below every overload threshold
        let recs = recommend_for(CavState::Overload, 0.9, &EnvSnapshot::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].action, "suggest_break");
    }

    #[test]
    fn test_sorted_by_priority() {
        let recs = recommend_for(CavState::Overload, 0.8, &env(950.0, 40.0, 600.0));
        let priorities: Vec<u8> = recs.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
    }
}

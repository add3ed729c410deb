//! CAV fusion engine
//!
//! The engine is an explicitly-constructed stateful object: it owns the
//! classifier adapter, the reference feature schema, and the long-lived
//! EMA/hysteresis state. Every successful scoring call mutates that state;
//! callers serialize access with a single lock (see the batch controller).
//!
//! Invalid windows never surface as errors: they produce the fail-safe
//! zeroed overload response and leave the engine state untouched.

use crate::classifier::{self, Standardizer, StressClassifier};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::features::{self, FeatureSchema};
use crate::fusion;
use crate::types::{CavScore, CavState, EnvConditions, ScoreOutcome, SensorWindow};
use std::collections::HashMap;
use tracing::debug;

/// Long-lived per-engine smoothing and hysteresis state.
///
/// Never reset implicitly; only `CavEngine::clear` discards it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineState {
    /// EMA accumulator as a fraction in [0, 1]
    pub ema: Option<f64>,
    /// Previous categorical state for hysteresis
    pub last_state: Option<CavState>,
}

/// Stateful scoring engine
pub struct CavEngine {
    classifier: Box<dyn StressClassifier>,
    standardizer: Option<Standardizer>,
    schema: FeatureSchema,
    config: EngineConfig,
    state: EngineState,
}

impl CavEngine {
    pub fn new(
        config: EngineConfig,
        classifier: Box<dyn StressClassifier>,
        standardizer: Option<Standardizer>,
        schema: FeatureSchema,
    ) -> Self {
        Self {
            classifier,
            standardizer,
            schema,
            config,
            state: EngineState::default(),
        }
    }

    /// Build an engine from JSON artifacts in the configured model directory
    pub fn from_artifacts(config: EngineConfig) -> Result<Self, EngineError> {
        let dir = config.model_dir.clone().ok_or_else(|| {
            EngineError::ClassifierUnavailable("no model directory configured".to_string())
        })?;
        let artifacts = classifier::load_artifacts(&dir)?;
        Ok(Self::new(
            config,
            Box::new(artifacts.model),
            artifacts.standardizer,
            artifacts.schema,
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Explicitly discard EMA and hysteresis history
    pub fn clear(&mut self) {
        self.state = EngineState::default();
    }

    /// Score one raw sensor window.
    ///
    /// Windows failing the length or missing-data checks return the fail-safe
    /// zeroed overload outcome without touching engine state. A produced
    /// feature set overlapping the reference schema below the configured
    /// threshold is a schema-mismatch error.
    pub fn score_window(
        &mut self,
        window: &SensorWindow,
        env: EnvConditions,
        local_hour: u32,
    ) -> Result<ScoreOutcome, EngineError> {
        if let Err(rejection) =
            features::validate_window(window, self.config.window_len, self.config.missing_gate)
        {
            debug!(?rejection, "window rejected, returning fail-safe response");
            return Ok(ScoreOutcome::failsafe());
        }

        let vector = features::extract_features(window, self.config.sample_rate_hz);
        let report = self.schema.overlap(vector.names().iter().map(String::as_str));
        if report.ratio < self.config.min_schema_overlap {
            return Err(EngineError::SchemaMismatch {
                overlap: report.ratio * 100.0,
                required: self.config.min_schema_overlap * 100.0,
                missing: report.missing.len(),
                unexpected: report.unexpected.len(),
            });
        }

        let row = self.schema.reindex(&vector);
        Ok(self.score_row(&row, env, local_hour))
    }

    /// Score a pre-computed feature map after the schema-overlap guard
    pub fn score_features(
        &mut self,
        map: &HashMap<String, f64>,
        env: EnvConditions,
        local_hour: u32,
    ) -> Result<ScoreOutcome, EngineError> {
        let report = self.schema.overlap(map.keys().map(String::as_str));
        if report.ratio < self.config.min_schema_overlap {
            return Err(EngineError::SchemaMismatch {
                overlap: report.ratio * 100.0,
                required: self.config.min_schema_overlap * 100.0,
                missing: report.missing.len(),
                unexpected: report.unexpected.len(),
            });
        }

        let row = self.schema.reindex_map(map);
        Ok(self.score_row(&row, env, local_hour))
    }

    /// Check a feature map against the schema without scoring it
    pub fn feature_overlap<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> features::OverlapReport {
        self.schema.overlap(names)
    }

    fn score_row(&mut self, row: &[f64], env: EnvConditions, local_hour: u32) -> ScoreOutcome {
        let standardized = match &self.standardizer {
            Some(scaler) => scaler.transform(row),
            None => classifier::scrub(row),
        };

        let p_stress = classifier::p_stress(
            self.classifier.as_ref(),
            &standardized,
            self.config.stress_label,
        );

        let fused = fusion::fuse(p_stress, env, local_hour);
        let smooth_fraction = self.smooth(fused.fraction);
        let smooth = (smooth_fraction * fusion::CAV_SCALE) as u32;

        let state = self.config.bands.classify(self.state.last_state, smooth);
        self.state.last_state = Some(state);

        ScoreOutcome {
            score: CavScore {
                raw: fused.raw,
                smooth,
            },
            state,
            parts: fused.parts,
        }
    }

    /// EMA update: seed with the first fraction, then blend by alpha
    fn smooth(&mut self, fraction: f64) -> f64 {
        let alpha = self.config.ema_alpha;
        let next = match self.state.ema {
            None => fraction,
            Some(prev) => alpha * fraction + (1.0 - alpha) * prev,
        };
        self.state.ema = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Stub classifier with an adjustable stress probability
    struct StubClassifier {
        classes: Vec<u32>,
        p_stress: Mutex<f64>,
    }

    impl StubClassifier {
        fn with_p(p: f64) -> Self {
            Self {
                classes: vec![1, 2],
                p_stress: Mutex::new(p),
            }
        }
    }

    impl StressClassifier for StubClassifier {
        fn classes(&self) -> &[u32] {
            &self.classes
        }
        fn predict_proba(&self, _features: &[f64]) -> Option<Vec<f64>> {
            let p = *self.p_stress.lock().unwrap();
            Some(vec![1.0 - p, p])
        }
        fn predict(&self, _features: &[f64]) -> u32 {
            if *self.p_stress.lock().unwrap() >= 0.5 {
                2
            } else {
                1
            }
        }
    }

    fn make_engine(p: f64) -> CavEngine {
        CavEngine::new(
            EngineConfig::default(),
            Box::new(StubClassifier::with_p(p)),
            None,
            FeatureSchema::reference(),
        )
    }

    fn make_window(len: usize) -> SensorWindow {
        SensorWindow {
            eda: (0..len).map(|i| 0.3 + 0.001 * i as f64).collect(),
            temp: vec![33.2; len],
            bvp: (0..len)
                .map(|i| (2.0 * std::f64::consts::PI * 0.5 * i as f64 / 4.0).sin())
                .collect(),
            acc_x: vec![0.1; len],
            acc_y: vec![0.2; len],
            acc_z: vec![0.97; len],
        }
    }

    fn daytime_env() -> EnvConditions {
        EnvConditions {
            temp_c: Some(22.0),
            humidity: Some(45.0),
            aqi: Some(30.0),
        }
    }

    #[test]
    fn test_score_window_bounds_and_first_smooth() {
        let mut engine = make_engine(0.0);
        let outcome = engine
            .score_window(&make_window(240), daytime_env(), 12)
            .unwrap();

        assert!(outcome.score.raw <= 10000);
        assert!(outcome.score.smooth <= 10000);
        // Ideal conditions: bio 1.0, env 1.0, circadian 1.0
        assert_eq!(outcome.score.raw, 10000);
        // First successful score seeds the EMA
        assert_eq!(outcome.score.smooth, outcome.score.raw);
        assert_eq!(outcome.state, CavState::Restorative);
    }

    #[test]
    fn test_invalid_window_is_failsafe_and_leaves_state_alone() {
        let mut engine = make_engine(0.0);
        let before = engine.state();

        let outcome = engine
            .score_window(&make_window(100), daytime_env(), 12)
            .unwrap();
        assert_eq!(outcome.score.raw, 0);
        assert_eq!(outcome.score.smooth, 0);
        assert_eq!(outcome.state, CavState::Overload);
        assert_eq!(outcome.parts.bio, 0.0);
        assert_eq!(outcome.parts.env, 0.0);
        assert_eq!(engine.state(), before);
    }

    #[test]
    fn test_missing_gate_is_failsafe() {
        let mut engine = make_engine(0.0);
        let mut window = make_window(240);
        for samples in [&mut window.eda, &mut window.temp] {
            for sample in samples.iter_mut() {
                *sample = f64::NAN;
            }
        }

        let outcome = engine.score_window(&window, daytime_env(), 12).unwrap();
        assert_eq!(outcome.score.raw, 0);
        assert_eq!(outcome.state, CavState::Overload);
    }

    #[test]
    fn test_ema_converges_monotonically() {
        let mut engine = make_engine(1.0);
        let window = make_window(240);

        // Seed the EMA high, then feed a lower constant input
        {
            let stub = StubClassifier::with_p(0.0);
            engine.classifier = Box::new(stub);
        }
        let first = engine.score_window(&window, daytime_env(), 12).unwrap();
        let target_high = first.score.smooth;
        assert_eq!(target_high, 10000);

        engine.classifier = Box::new(StubClassifier::with_p(1.0));
        let target = fusion::fuse(1.0, daytime_env(), 12).raw;

        let mut prev = target_high;
        for _ in 0..40 {
            let outcome = engine.score_window(&window, daytime_env(), 12).unwrap();
            assert!(outcome.score.smooth <= prev);
            prev = outcome.score.smooth;
        }
        // Converged to the constant input within one integer step
        assert!(prev.abs_diff(target) <= 1);
    }

    #[test]
    fn test_score_features_full_map() {
        let mut engine = make_engine(0.2);
        let map: HashMap<String, f64> = FeatureSchema::reference()
            .feature_names
            .iter()
            .map(|name| (name.clone(), 0.5))
            .collect();

        let outcome = engine.score_features(&map, daytime_env(), 12).unwrap();
        assert!(outcome.score.raw <= 10000);
        assert!((outcome.parts.p_stress - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_score_features_schema_mismatch() {
        let mut engine = make_engine(0.2);
        let mut map = HashMap::new();
        map.insert("eda_mean".to_string(), 0.5);
        map.insert("eda_std".to_string(), 0.1);

        let err = engine
            .score_features(&map, daytime_env(), 12)
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_schema_overlap_at_threshold_is_accepted() {
        let mut engine = make_engine(0.2);
        let names = FeatureSchema::reference().feature_names;
        // 32 of 40 names = exactly 80%
        let map: HashMap<String, f64> = names
            .iter()
            .take(32)
            .map(|name| (name.clone(), 0.5))
            .collect();

        assert!(engine.score_features(&map, daytime_env(), 12).is_ok());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut engine = make_engine(0.5);
        engine
            .score_window(&make_window(240), daytime_env(), 12)
            .unwrap();
        assert!(engine.state().ema.is_some());

        engine.clear();
        assert_eq!(engine.state(), EngineState::default());
    }

    #[test]
    fn test_hysteresis_keeps_overload_inside_exit_margin() {
        let window = make_window(240);
        let night = EnvConditions::default();

        // Full stress, neutral env, night: fraction 0.24 → overload
        let mut engine = make_engine(1.0);
        let first = engine.score_window(&window, night, 3).unwrap();
        assert_eq!(first.score.smooth, 2400);
        assert_eq!(first.state, CavState::Overload);

        // Easing stress lifts the EMA just above the plain threshold but
        // below the overload exit; the state must hold.
        engine.classifier = Box::new(StubClassifier::with_p(0.4));
        let second = engine.score_window(&window, night, 3).unwrap();
        assert!(second.score.smooth >= 3000 && second.score.smooth < 3300);
        assert_eq!(second.state, CavState::Overload);

        // The same score without overload history reads as balanced
        let plain = engine
            .config()
            .bands
            .classify(None, second.score.smooth);
        assert_eq!(plain, CavState::Balanced);
    }
}

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::features::{RrFeatures, FEATURE_NAMES};
use super::Predictor;

// Embed default model for fallback
const DEFAULT_MODEL_JSON: &str = include_str!("turnaround_lr.json");

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model shape mismatch: {features} features, {weights} weights, {means} means, {stds} stds")]
    Shape {
        features: usize,
        weights: usize,
        means: usize,
        stds: usize,
    },
    #[error("model features {got:?} do not match expected order {expected:?}")]
    FeatureNames {
        expected: Vec<String>,
        got: Vec<String>,
    },
    #[error("feature vector length mismatch: expected {expected}, got {got}")]
    FeatureCount { expected: usize, got: usize },
    #[error("model produced a non-finite prediction ({0})")]
    NonFinite(f64),
}

/// Turnaround regressor (standardized linear regression).
///
/// Artifacts come from the offline trainer as JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct RegressionModel {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub means: Vec<f64>, // For standardization
    pub stds: Vec<f64>,  // For standardization
}

impl RegressionModel {
    /// Load from a JSON artifact, falling back to the embedded default if missing/invalid.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(model) => {
                info!(path = %path.display(), "loaded turnaround model");
                model
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using embedded default model");
                Self::embedded()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json)?;
        model.check_shape()?;
        Ok(model)
    }

    pub fn embedded() -> Self {
        Self::from_json(DEFAULT_MODEL_JSON).expect("Embedded default model is invalid")
    }

    fn check_shape(&self) -> Result<(), ModelError> {
        let n = self.feature_names.len();
        if self.weights.len() != n || self.means.len() != n || self.stds.len() != n {
            return Err(ModelError::Shape {
                features: n,
                weights: self.weights.len(),
                means: self.means.len(),
                stds: self.stds.len(),
            });
        }
        // Weights are positional, so the artifact must list features in input order.
        if !self.feature_names.iter().map(String::as_str).eq(FEATURE_NAMES) {
            return Err(ModelError::FeatureNames {
                expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                got: self.feature_names.clone(),
            });
        }
        Ok(())
    }

    /// Predicted turnaround in seconds, never negative.
    pub fn predict_vector(&self, raw: &[f64]) -> Result<f64, ModelError> {
        if raw.len() != self.means.len() {
            return Err(ModelError::FeatureCount {
                expected: self.means.len(),
                got: raw.len(),
            });
        }

        let mut score = self.bias;
        for (i, &x) in raw.iter().enumerate() {
            // A constant training feature carries no scale.
            let std = if self.stds[i] == 0.0 { 1.0 } else { self.stds[i] };
            score += self.weights[i] * (x - self.means[i]) / std;
        }

        if !score.is_finite() {
            return Err(ModelError::NonFinite(score));
        }
        Ok(score.max(0.0))
    }
}

impl Predictor for RegressionModel {
    fn predict(&self, features: &RrFeatures) -> Result<f64, ModelError> {
        self.predict_vector(&features.to_vector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_model(weights: Vec<f64>, bias: f64) -> RegressionModel {
        RegressionModel {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            means: vec![0.0; weights.len()],
            stds: vec![1.0; weights.len()],
            weights,
            bias,
        }
    }

    #[test]
    fn test_embedded_model_sanity() {
        let model = RegressionModel::load(Path::new("non_existent_path.json"));
        assert_eq!(model.feature_names.len(), 7);
        assert_eq!(model.feature_names, FEATURE_NAMES.to_vec());

        let features = RrFeatures {
            mean_burst: 12.0,
            mean_arrival: 3600.0,
            num_processes: 1.0,
            system_load: 0.3,
            time_quantum: 2.0,
            ..RrFeatures::default()
        };
        let pred = model.predict(&features).unwrap();
        assert!(pred.is_finite() && pred >= 0.0);
    }

    #[test]
    fn test_linear_prediction() {
        let model = unit_model(vec![1.0, 0.0, 0.5, 0.0, 0.0, 10.0, 2.0], 3.0);
        let features = RrFeatures {
            mean_burst: 4.0,
            mean_arrival: 10.0,
            system_load: 0.5,
            time_quantum: 1.0,
            ..RrFeatures::default()
        };
        // 3 + 4 + 5 + 5 + 2
        assert_eq!(model.predict(&features).unwrap(), 19.0);
    }

    #[test]
    fn test_standardization_and_zero_std() {
        let mut model = unit_model(vec![2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0], 0.0);
        model.means[0] = 10.0;
        model.stds[0] = 5.0;
        model.stds[6] = 0.0;
        let features = RrFeatures {
            mean_burst: 20.0,
            time_quantum: 3.0,
            ..RrFeatures::default()
        };
        // 2 * (20 - 10) / 5 + 1 * 3 / 1
        assert_eq!(model.predict(&features).unwrap(), 7.0);
    }

    #[test]
    fn test_negative_score_clamps_to_zero() {
        let model = unit_model(vec![-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 0.0);
        let features = RrFeatures {
            mean_burst: 50.0,
            ..RrFeatures::default()
        };
        assert_eq!(model.predict(&features).unwrap(), 0.0);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let model = unit_model(vec![1.0; 7], 0.0);
        let err = model.predict_vector(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ModelError::FeatureCount { expected: 7, got: 2 }));
    }

    #[test]
    fn test_non_finite_input_is_error() {
        let model = unit_model(vec![1.0; 7], 0.0);
        let features = RrFeatures {
            mean_burst: f64::INFINITY,
            ..RrFeatures::default()
        };
        assert!(matches!(model.predict(&features), Err(ModelError::NonFinite(_))));
    }

    #[test]
    fn test_bad_shape_rejected() {
        let json = r#"{"feature_names":["a","b"],"weights":[1.0],"bias":0.0,"means":[0,0],"stds":[1,1]}"#;
        assert!(matches!(
            RegressionModel::from_json(json),
            Err(ModelError::Shape { features: 2, weights: 1, .. })
        ));
    }

    fn artifact(names: &[&str]) -> String {
        serde_json::json!({
            "feature_names": names,
            "weights": [2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "bias": 1.0,
            "means": vec![0.0; 7],
            "stds": vec![1.0; 7],
        })
        .to_string()
    }

    #[test]
    fn test_reordered_features_rejected() {
        let mut names = FEATURE_NAMES;
        names.swap(0, 2);
        assert!(matches!(
            RegressionModel::from_json(&artifact(&names)),
            Err(ModelError::FeatureNames { .. })
        ));

        let mut renamed = FEATURE_NAMES;
        renamed[6] = "quantum";
        assert!(matches!(
            RegressionModel::from_json(&artifact(&renamed)),
            Err(ModelError::FeatureNames { .. })
        ));

        // A reordered file on disk falls back to the embedded model.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, artifact(&names)).unwrap();
        let model = RegressionModel::load(&path);
        assert_eq!(model.feature_names, FEATURE_NAMES.to_vec());
        assert_eq!(model.bias, 18.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, artifact(&FEATURE_NAMES)).unwrap();
        let model = RegressionModel::try_load(&path).unwrap();
        let input = [4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(model.predict_vector(&input).unwrap(), 9.0);
    }
}

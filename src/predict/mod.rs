//! Turnaround prediction: feature extraction and the regression model.

pub mod features;
pub mod model;

pub use self::features::{RrFeatures, FEATURE_NAMES};
pub use self::model::{ModelError, RegressionModel};

/// Maps a feature vector to a predicted turnaround, in seconds.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &RrFeatures) -> Result<f64, ModelError>;
}

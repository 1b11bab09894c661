//! Binary classifier interface and the JSON logistic model

use crate::error::{Result, ScoringError};
use crate::models::scaler::ScaledVector;
use crate::types::features::FEATURE_COUNT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Probability above which the positive class label is reported; ties go to class 0
pub const DECISION_THRESHOLD: f64 = 0.5;

/// A loaded binary classifier.
///
/// Implementations are shared read-only across request tasks and must only
/// expose inference.
pub trait Classifier: Send + Sync {
    /// Model name used in logs and health replies
    fn name(&self) -> &str;

    /// Probability of the positive (high-risk) class
    fn predict_proba(&self, features: &ScaledVector) -> Result<f64>;

    /// Class label (0 or 1) at the default decision threshold
    fn predict_label(&self, features: &ScaledVector) -> Result<u8> {
        let probability = checked_probability(self.predict_proba(features)?)?;
        Ok(u8::from(probability > DECISION_THRESHOLD))
    }
}

/// Reject probabilities a well-formed classifier can never produce.
pub fn checked_probability(probability: f64) -> Result<f64> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(ScoringError::inference(format!(
            "classifier returned probability {} outside [0, 1]",
            probability
        )))
    }
}

/// Serialized logistic regression: `{"weights": [..15], "intercept": b}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticArtifact {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

/// Logistic regression over standardized features
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    name: String,
    weights: [f64; FEATURE_COUNT],
    intercept: f64,
}

impl LogisticClassifier {
    pub fn new(name: &str, weights: [f64; FEATURE_COUNT], intercept: f64) -> Result<Self> {
        if weights.iter().any(|w| !w.is_finite()) || !intercept.is_finite() {
            return Err(ScoringError::model_unavailable(
                name,
                "logistic coefficients must be finite",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            weights,
            intercept,
        })
    }

    pub fn from_artifact(name: &str, artifact: LogisticArtifact) -> Result<Self> {
        let count = artifact.weights.len();
        let weights: [f64; FEATURE_COUNT] = artifact.weights.try_into().map_err(|_| {
            ScoringError::model_unavailable(
                name,
                format!("weights has {} entries, expected {}", count, FEATURE_COUNT),
            )
        })?;

        Self::new(name, weights, artifact.intercept)
    }

    /// Load a logistic model from a JSON file
    pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let path = path.as_ref();

        let raw = std::fs::read(path).map_err(|e| {
            ScoringError::model_unavailable(name, format!("{}: {}", path.display(), e))
        })?;
        let artifact: LogisticArtifact = serde_json::from_slice(&raw).map_err(|e| {
            ScoringError::model_unavailable(name, format!("{}: {}", path.display(), e))
        })?;

        let model = Self::from_artifact(name, artifact)?;
        info!(model = %name, path = %path.display(), "Logistic model loaded");
        Ok(model)
    }
}

impl Classifier for LogisticClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &ScaledVector) -> Result<f64> {
        let logit: f64 = self
            .weights
            .iter()
            .zip(features.values())
            .filter(|(w, _)| **w != 0.0)
            .map(|(w, x)| (w * x).clamp(f64::MIN, f64::MAX))
            .sum::<f64>()
            + self.intercept;

        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

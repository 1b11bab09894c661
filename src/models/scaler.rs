//! Standard scaler applied to feature vectors before inference

use crate::error::{Result, ScoringError};
use crate::types::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const ARTIFACT: &str = "scaler";

/// Feature vector after per-feature standardization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledVector([f64; FEATURE_COUNT]);

impl ScaledVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Single-precision copy for ONNX input tensors, saturated to the f32 range
    pub fn to_f32(&self) -> Vec<f32> {
        self.0
            .iter()
            .map(|&v| v.clamp(f32::MIN as f64, f32::MAX as f64) as f32)
            .collect()
    }
}

/// On-disk scaler representation.
///
/// Either the fitted statistics themselves, or a reference sample the
/// scaler is fitted on exactly once when loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalerArtifact {
    Fitted { mean: Vec<f64>, scale: Vec<f64> },
    Reference { reference_sample: Vec<Vec<f64>> },
}

/// Fitted z-score transform: `(x - mean) / scale` per feature.
///
/// Immutable once built; the only ways to obtain one are fitting a sample
/// or loading fitted statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Build a scaler from already fitted statistics.
    ///
    /// A zero scale marks a constant feature and is replaced by 1.
    pub fn from_params(mean: [f64; FEATURE_COUNT], scale: [f64; FEATURE_COUNT]) -> Result<Self> {
        let mut scale = scale;

        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            if !mean[i].is_finite() {
                return Err(ScoringError::model_unavailable(
                    ARTIFACT,
                    format!("mean for {} is not finite", name),
                ));
            }
            if !scale[i].is_finite() || scale[i] < 0.0 {
                return Err(ScoringError::model_unavailable(
                    ARTIFACT,
                    format!("scale for {} must be a finite non-negative number", name),
                ));
            }
            if scale[i] == 0.0 {
                scale[i] = 1.0;
            }
        }

        Ok(Self { mean, scale })
    }

    /// Fit mean and population standard deviation over a sample.
    pub fn fit(sample: &[[f64; FEATURE_COUNT]]) -> Result<Self> {
        if sample.is_empty() {
            return Err(ScoringError::model_unavailable(
                ARTIFACT,
                "cannot fit on an empty sample",
            ));
        }

        let n = sample.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [0.0; FEATURE_COUNT];

        for row in sample {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }

        for row in sample {
            for ((s, &m), &x) in scale.iter_mut().zip(&mean).zip(row) {
                *s += (x - m).powi(2) / n;
            }
        }

        for s in scale.iter_mut() {
            *s = s.sqrt();
        }

        Self::from_params(mean, scale)
    }

    /// Build a scaler from a deserialized artifact
    pub fn from_artifact(artifact: ScalerArtifact) -> Result<Self> {
        match artifact {
            ScalerArtifact::Fitted { mean, scale } => {
                Self::from_params(to_feature_array("mean", mean)?, to_feature_array("scale", scale)?)
            }
            ScalerArtifact::Reference { reference_sample } => {
                let rows = reference_sample
                    .into_iter()
                    .enumerate()
                    .map(|(i, row)| to_feature_array(&format!("reference_sample[{}]", i), row))
                    .collect::<Result<Vec<_>>>()?;
                Self::fit(&rows)
            }
        }
    }

    /// Load a scaler from a JSON artifact file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let raw = std::fs::read(path).map_err(|e| {
            ScoringError::model_unavailable(ARTIFACT, format!("{}: {}", path.display(), e))
        })?;
        let artifact: ScalerArtifact = serde_json::from_slice(&raw).map_err(|e| {
            ScoringError::model_unavailable(ARTIFACT, format!("{}: {}", path.display(), e))
        })?;

        let fitted_at_load = matches!(artifact, ScalerArtifact::Reference { .. });
        let scaler = Self::from_artifact(artifact)?;

        info!(
            path = %path.display(),
            fitted_at_load,
            "Scaler loaded"
        );

        Ok(scaler)
    }

    pub fn mean(&self) -> &[f64; FEATURE_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; FEATURE_COUNT] {
        &self.scale
    }

    /// Standardize a feature vector with the fitted statistics.
    pub fn transform(&self, features: &FeatureVector) -> ScaledVector {
        let raw = features.to_array();
        let mut scaled = [0.0; FEATURE_COUNT];

        for (i, out) in scaled.iter_mut().enumerate() {
            // Extreme inputs overflow; saturate so downstream sums stay defined
            *out = ((raw[i] - self.mean[i]) / self.scale[i]).clamp(f64::MIN, f64::MAX);
        }

        ScaledVector(scaled)
    }
}

fn to_feature_array(what: &str, values: Vec<f64>) -> Result<[f64; FEATURE_COUNT]> {
    values.try_into().map_err(|v: Vec<f64>| {
        ScoringError::model_unavailable(
            ARTIFACT,
            format!("{} has {} entries, expected {}", what, v.len(), FEATURE_COUNT),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn row(fill: f64) -> [f64; FEATURE_COUNT] {
        [fill; FEATURE_COUNT]
    }

    #[test]
    fn test_fit_computes_population_statistics() {
        let scaler = StandardScaler::fit(&[row(1.0), row(3.0)]).unwrap();

        assert_abs_diff_eq!(scaler.mean()[0], 2.0);
        assert_abs_diff_eq!(scaler.scale()[0], 1.0);
    }

    #[test]
    fn test_constant_feature_uses_unit_scale() {
        let scaler = StandardScaler::fit(&[row(5.0), row(5.0)]).unwrap();

        assert_eq!(scaler.scale(), &row(1.0));
        let scaled = scaler.transform(&FeatureVector::from_array(row(7.0)));
        assert_abs_diff_eq!(scaled.values()[3], 2.0);
    }

    #[test]
    fn test_fit_rejects_empty_sample() {
        assert!(matches!(
            StandardScaler::fit(&[]),
            Err(ScoringError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn test_transform_is_affine() {
        let mut mean = row(0.0);
        let mut scale = row(1.0);
        mean[0] = 100.0;
        scale[0] = 50.0;
        let scaler = StandardScaler::from_params(mean, scale).unwrap();

        let mut values = row(0.0);
        values[0] = 200.0;
        values[1] = -3.0;
        let scaled = scaler.transform(&FeatureVector::from_array(values));

        assert_abs_diff_eq!(scaled.values()[0], 2.0);
        assert_abs_diff_eq!(scaled.values()[1], -3.0);
    }

    #[test]
    fn test_transform_does_not_refit() {
        let scaler = StandardScaler::fit(&[row(0.0), row(10.0)]).unwrap();
        let before = scaler.clone();

        for fill in [1e6, -1e6, 0.5] {
            scaler.transform(&FeatureVector::from_array(row(fill)));
        }

        assert_eq!(scaler, before);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let mut scale = row(1.0);
        scale[4] = -1.0;
        assert!(StandardScaler::from_params(row(0.0), scale).is_err());

        let mut mean = row(0.0);
        mean[2] = f64::NAN;
        assert!(StandardScaler::from_params(mean, row(1.0)).is_err());
    }

    #[test]
    fn test_artifact_shapes() {
        let fitted: ScalerArtifact =
            serde_json::from_str(&format!(r#"{{"mean": {:?}, "scale": {:?}}}"#, row(1.0), row(2.0)))
                .unwrap();
        let scaler = StandardScaler::from_artifact(fitted).unwrap();
        assert_eq!(scaler.scale(), &row(2.0));

        let reference: ScalerArtifact = serde_json::from_str(&format!(
            r#"{{"reference_sample": [{:?}, {:?}]}}"#,
            row(0.0),
            row(4.0)
        ))
        .unwrap();
        let scaler = StandardScaler::from_artifact(reference).unwrap();
        assert_eq!(scaler.mean(), &row(2.0));

        let short = ScalerArtifact::Fitted {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        let err = StandardScaler::from_artifact(short).unwrap_err();
        assert!(err.to_string().contains("expected 15"));
    }
}

//! Startup loading of the classifier and scaler artifacts

use crate::config::ModelsConfig;
use crate::error::{Result, ScoringError};
use crate::models::classifier::{Classifier, LogisticClassifier};
use crate::models::onnx::OnnxClassifier;
use crate::models::scaler::StandardScaler;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Model state shared read-only by every request
#[derive(Clone)]
pub struct LoadedModels {
    pub scaler: Arc<StandardScaler>,
    pub classifier: Arc<dyn Classifier>,
}

/// Loader for model artifacts
pub struct ModelLoader {
    /// Number of intra-op threads for ONNX sessions
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a classifier, choosing the format from the file extension
    pub fn load_classifier<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<Arc<dyn Classifier>> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("onnx") => Ok(Arc::new(OnnxClassifier::load(path, name, self.onnx_threads)?)),
            Some("json") => Ok(Arc::new(LogisticClassifier::load(path, name)?)),
            _ => Err(ScoringError::model_unavailable(
                name,
                format!(
                    "unsupported classifier format {} (expected .onnx or .json)",
                    path.display()
                ),
            )),
        }
    }

    /// Load the scaler; it is fitted here, once, if the artifact is a sample
    pub fn load_scaler<P: AsRef<Path>>(&self, path: P) -> Result<Arc<StandardScaler>> {
        Ok(Arc::new(StandardScaler::load(path)?))
    }

    /// Load both artifacts named by the configuration
    pub fn load(&self, config: &ModelsConfig) -> Result<LoadedModels> {
        let scaler = self.load_scaler(&config.scaler_path)?;
        let classifier = self.load_classifier(&config.classifier_path, &config.classifier_name)?;

        info!(
            classifier = %classifier.name(),
            scaler = %config.scaler_path,
            "Model artifacts loaded"
        );

        Ok(LoadedModels { scaler, classifier })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::features::FEATURE_COUNT;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "risk_score_service_{}_{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn models_config(scaler: &Path, classifier: &Path) -> ModelsConfig {
        ModelsConfig {
            scaler_path: scaler.display().to_string(),
            classifier_path: classifier.display().to_string(),
            classifier_name: "logistic".to_string(),
            onnx_threads: 1,
        }
    }

    #[test]
    fn test_load_json_artifacts() {
        let scaler = write_temp(
            "scaler_ok.json",
            &format!(
                r#"{{"mean": {:?}, "scale": {:?}}}"#,
                [0.0; FEATURE_COUNT],
                [2.0; FEATURE_COUNT]
            ),
        );
        let classifier = write_temp(
            "classifier_ok.json",
            &format!(r#"{{"weights": {:?}, "intercept": 0.0}}"#, [0.1; FEATURE_COUNT]),
        );

        let models = ModelLoader::new()
            .load(&models_config(&scaler, &classifier))
            .unwrap();

        assert_eq!(models.classifier.name(), "logistic");
        assert_eq!(models.scaler.scale(), &[2.0; FEATURE_COUNT]);
    }

    #[test]
    fn test_missing_artifacts_are_fatal() {
        let missing = std::env::temp_dir().join("risk_score_service_does_not_exist.json");
        let loader = ModelLoader::new();

        assert!(matches!(
            loader.load_scaler(&missing),
            Err(ScoringError::ModelUnavailable { .. })
        ));
        assert!(matches!(
            loader.load_classifier(&missing, "logistic"),
            Err(ScoringError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn test_unsupported_format_is_rejected() {
        let pickle = write_temp("model.pkl", "not a model");
        let err = ModelLoader::new()
            .load_classifier(&pickle, "random_forest")
            .err()
            .unwrap();

        assert!(err.to_string().contains("unsupported classifier format"));
    }

    #[test]
    fn test_malformed_scaler_is_fatal() {
        let scaler = write_temp("scaler_bad.json", r#"{"mean": [1, 2, 3]}"#);
        assert!(ModelLoader::new().load_scaler(&scaler).is_err());
    }
}

//! Model artifacts and the risk scoring pipeline

pub mod classifier;
pub mod loader;
pub mod onnx;
pub mod scaler;
pub mod scorer;

pub use classifier::{Classifier, LogisticClassifier};
pub use loader::{LoadedModels, ModelLoader};
pub use onnx::OnnxClassifier;
pub use scaler::{ScaledVector, StandardScaler};
pub use scorer::{NoiseSource, RiskAssessment, RiskScorer, ScoringPolicy};

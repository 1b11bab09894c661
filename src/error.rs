//! Error taxonomy for the scoring pipeline

use thiserror::Error;

/// Errors raised while assembling features, loading artifacts or scoring.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// A required feature is absent from the payload
    #[error("missing required field: {field}")]
    MissingField { field: String },

    /// A feature is present but not usable as a number
    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Classifier or scaler artifact could not be loaded (fatal at startup)
    #[error("model unavailable ({artifact}): {reason}")]
    ModelUnavailable { artifact: String, reason: String },

    /// Classifier failed while serving a request
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ScoringError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn model_unavailable(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Whether the error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::InvalidValue { .. })
    }

    /// Status code reported to the transport layer
    pub fn status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;

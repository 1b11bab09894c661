//! Reply payloads produced for the transport layer

use crate::error::ScoringError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of a reply, reported as a status code header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    ClientError,
    ServerError,
}

impl ReplyStatus {
    pub fn code(&self) -> u16 {
        match self {
            ReplyStatus::Ok => 200,
            ReplyStatus::ClientError => 400,
            ReplyStatus::ServerError => 500,
        }
    }
}

impl From<&ScoringError> for ReplyStatus {
    fn from(err: &ScoringError) -> Self {
        if err.is_client_error() {
            ReplyStatus::ClientError
        } else {
            ReplyStatus::ServerError
        }
    }
}

/// Successful score reply: `{"riskScore": 72.41}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    #[serde(rename = "riskScore")]
    pub risk_score: f64,
}

/// Class label reply for positional feature requests: `{"prediction": [1]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Vec<u8>,
}

/// Error reply: `{"error": "missing required field: amount"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub classifier: String,
    pub started_at: DateTime<Utc>,
}

/// Serialized reply ready to publish
#[derive(Debug, Clone)]
pub struct ServiceReply {
    pub status: ReplyStatus,
    pub body: Vec<u8>,
}

impl ServiceReply {
    /// Serialize a successful reply body
    pub fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(body) => Self {
                status: ReplyStatus::Ok,
                body,
            },
            Err(e) => Self::from_error(&ScoringError::inference(format!(
                "failed to serialize reply: {}",
                e
            ))),
        }
    }

    /// Build the `{"error": ...}` reply for a pipeline error
    pub fn from_error(err: &ScoringError) -> Self {
        let body = ErrorResponse {
            error: err.to_string(),
        };
        // A struct holding one String always serializes
        let body = serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"error\":\"internal\"}".to_vec());

        Self {
            status: ReplyStatus::from(err),
            body,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

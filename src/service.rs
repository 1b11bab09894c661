//! Request handling boundary between the transport and the scoring pipeline.
//!
//! Every handler returns a [`ServiceReply`]; pipeline errors become error
//! replies here and never escape to the transport loop.

use crate::error::{Result, ScoringError};
use crate::feature_assembler::FeatureAssembler;
use crate::metrics::ScoringMetrics;
use crate::models::scorer::{RiskAssessment, RiskScorer};
use crate::types::response::{HealthResponse, PredictionResponse, ScoreResponse, ServiceReply};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Scoring pipeline plus its request-level bookkeeping
pub struct ScoringService {
    assembler: FeatureAssembler,
    scorer: RiskScorer,
    metrics: Arc<ScoringMetrics>,
    started_at: DateTime<Utc>,
}

impl ScoringService {
    pub fn new(scorer: RiskScorer, metrics: Arc<ScoringMetrics>) -> Self {
        Self {
            assembler: FeatureAssembler::new(),
            scorer,
            metrics,
            started_at: Utc::now(),
        }
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn metrics(&self) -> &Arc<ScoringMetrics> {
        &self.metrics
    }

    /// Assemble and score a named-field payload
    pub fn score_fields(&self, payload: &Map<String, Value>) -> Result<RiskAssessment> {
        let features = self.assembler.assemble(payload)?;
        self.scorer.score_random(&features)
    }

    /// Handle a raw `{"amount": .., ...}` request body
    pub fn handle_score(&self, body: &[u8]) -> ServiceReply {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        let result = parse_object(body).and_then(|payload| self.score_fields(&payload));

        match result {
            Ok(assessment) => {
                let latency = start.elapsed();
                self.metrics.record_score(latency, &assessment);
                debug!(
                    request_id = %request_id,
                    probability = assessment.probability,
                    base = assessment.base,
                    perturbation = assessment.perturbation,
                    risk_score = assessment.risk_score,
                    latency_us = latency.as_micros() as u64,
                    "Request scored"
                );
                ServiceReply::ok(&ScoreResponse {
                    risk_score: assessment.risk_score,
                })
            }
            Err(e) => self.reject(request_id, e),
        }
    }

    /// Handle a `{"features": [15 values]}` request, replying with a class label
    pub fn handle_predict(&self, body: &[u8]) -> ServiceReply {
        let request_id = Uuid::new_v4();

        let result = parse_object(body).and_then(|payload| {
            let values = match payload.get("features") {
                Some(Value::Array(values)) => values,
                Some(_) => {
                    return Err(ScoringError::invalid_value(
                        "features",
                        "expected an array of numbers",
                    ))
                }
                None => return Err(ScoringError::missing_field("features")),
            };
            let features = self.assembler.assemble_positional(values)?;
            self.scorer.predict_label(&features)
        });

        match result {
            Ok(label) => {
                debug!(request_id = %request_id, label, "Prediction served");
                ServiceReply::ok(&PredictionResponse {
                    prediction: vec![label],
                })
            }
            Err(e) => self.reject(request_id, e),
        }
    }

    /// Liveness reply naming the loaded classifier
    pub fn health(&self) -> ServiceReply {
        ServiceReply::ok(&HealthResponse {
            status: "ok".to_string(),
            classifier: self.scorer.classifier_name().to_string(),
            started_at: self.started_at,
        })
    }

    fn reject(&self, request_id: Uuid, err: ScoringError) -> ServiceReply {
        self.metrics.record_error(&err);
        if err.is_client_error() {
            warn!(request_id = %request_id, error = %err, "Rejected invalid request");
        } else {
            error!(request_id = %request_id, error = %err, "Request failed");
        }
        ServiceReply::from_error(&err)
    }
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ScoringError::invalid_value(
            "payload",
            "expected a JSON object",
        )),
        Err(e) => Err(ScoringError::invalid_value(
            "payload",
            format!("malformed JSON: {}", e),
        )),
    }
}

//! Feature assembly for risk model inference.
//!
//! Turns a request payload into the fixed-order feature vector the scaler
//! and classifier were trained on. Every field is validated up front so the
//! scorer never sees a partially populated vector.

use crate::error::{Result, ScoringError};
use crate::types::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use serde_json::{Map, Value};
use tracing::debug;

/// Pseudo-field name used when a positional `features` array is malformed
const POSITIONAL_FIELD: &str = "features";

/// Feature assembler that validates payloads into model input vectors.
pub struct FeatureAssembler;

impl FeatureAssembler {
    /// Create a new feature assembler.
    pub fn new() -> Self {
        Self
    }

    /// Assemble a feature vector from a named field mapping.
    ///
    /// Fields are read in [`FEATURE_NAMES`] order; the first absent field
    /// yields [`ScoringError::MissingField`] and the first non-numeric one
    /// yields [`ScoringError::InvalidValue`]. Extra keys are ignored.
    pub fn assemble(&self, payload: &Map<String, Value>) -> Result<FeatureVector> {
        let mut values = [0.0; FEATURE_COUNT];

        for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
            let value = payload
                .get(name)
                .ok_or_else(|| ScoringError::missing_field(name))?;
            *slot = numeric_value(name, value)?;
        }

        Ok(self.finish(values))
    }

    /// Assemble a feature vector from values already in model order.
    pub fn assemble_positional(&self, values: &[Value]) -> Result<FeatureVector> {
        if values.len() != FEATURE_COUNT {
            return Err(ScoringError::invalid_value(
                POSITIONAL_FIELD,
                format!("expected {} values, got {}", FEATURE_COUNT, values.len()),
            ));
        }

        let mut parsed = [0.0; FEATURE_COUNT];
        for ((slot, name), value) in parsed.iter_mut().zip(FEATURE_NAMES).zip(values) {
            *slot = numeric_value(name, value)?;
        }

        Ok(self.finish(parsed))
    }

    fn finish(&self, values: [f64; FEATURE_COUNT]) -> FeatureVector {
        let features = FeatureVector::from_array(values);

        if features.transaction_type().is_none() {
            debug!(
                cash_in = features.type_cash_in,
                cash_out = features.type_cash_out,
                debit = features.type_debit,
                payment = features.type_payment,
                transfer = features.type_transfer,
                "Transaction type indicators are not one-hot"
            );
        }

        features
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in model order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }
}

impl Default for FeatureAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Coerce a JSON value into a finite float.
///
/// Numbers and numeric strings are accepted; everything else is rejected.
fn numeric_value(field: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ScoringError::invalid_value(field, "number out of range"))?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            ScoringError::invalid_value(field, format!("expected a number, got string {:?}", s))
        })?,
        other => {
            return Err(ScoringError::invalid_value(
                field,
                format!("expected a number, got {}", json_kind(other)),
            ))
        }
    };

    if !parsed.is_finite() {
        return Err(ScoringError::invalid_value(field, "value is not finite"));
    }

    Ok(parsed)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

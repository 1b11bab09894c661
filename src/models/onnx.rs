//! ONNX Runtime backed classifier

use crate::error::{Result, ScoringError};
use crate::models::classifier::Classifier;
use crate::models::scaler::ScaledVector;
use anyhow::Context;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Positive class id in classifier outputs
const POSITIVE_CLASS: i64 = 1;

/// Classifier exported to ONNX (scikit-learn, XGBoost, LightGBM, ...)
pub struct OnnxClassifier {
    name: String,
    /// Sessions need exclusive access to run
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load an ONNX model and resolve its input and probability output names
    pub fn load<P: AsRef<Path>>(path: P, name: &str, intra_threads: usize) -> Result<Self> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = intra_threads, "Loading ONNX model");

        let session = build_session(path, intra_threads)
            .map_err(|e| ScoringError::model_unavailable(name, format!("{:#}", e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ScoringError::model_unavailable(name, "model declares no inputs"))?;

        // Prefer the probability tensor over the label output
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "ONNX model loaded"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn run(&self, features: &ScaledVector) -> anyhow::Result<f64> {
        let data = features.to_f32();
        let shape = vec![1_i64, data.len() as i64];
        let input = Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;

        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(prob) = positive_probability(output) {
                debug!(model = %self.name, prob, "Extracted positive class probability");
                return Ok(prob);
            }
        }

        // Exporters disagree on output naming; scan everything except labels
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = positive_probability(&output) {
                debug!(model = %self.name, output = %name, prob, "Extracted positive class probability (fallback)");
                return Ok(prob);
            }
        }

        anyhow::bail!("no probability output found")
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &ScaledVector) -> Result<f64> {
        self.run(features)
            .map_err(|e| ScoringError::inference(format!("{}: {:#}", self.name, e)))
    }
}

fn build_session(path: &Path, intra_threads: usize) -> anyhow::Result<Session> {
    ort::init().commit()?;

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model from {:?}", path))?;

    Ok(session)
}

/// Read the positive class probability from a tensor or seq(map) output
fn positive_probability(output: &ort::value::DynValue) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        return probability_from_tensor(&shape.iter().copied().collect::<Vec<i64>>(), data);
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return probability_from_sequence_map(output).ok();
    }

    None
}

/// `[batch, classes]`, `[classes]` or a single probability
fn probability_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] | [classes] => *classes,
        _ => return data.last().map(|&v| v as f64),
    };

    match classes {
        c if c >= 2 => data.get(POSITIVE_CLASS as usize).map(|&v| v as f64),
        1 => data.first().map(|&v| v as f64),
        _ => None,
    }
}

/// `seq(map(int64, float))` as emitted by tree model converters
fn probability_from_sequence_map(output: &ort::value::DynValue) -> anyhow::Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps
        .first()
        .ok_or_else(|| anyhow::anyhow!("Empty probability sequence"))?;

    let pairs = first.try_extract_key_values::<i64, f32>()?;

    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == POSITIVE_CLASS) {
        return Ok(*p as f64);
    }
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *p as f64);
    }

    anyhow::bail!("No class probability found in map")
}

//! ONNX Runtime autoencoder. Input: [1, n_features] f32, output: [1, n_features]
//! f32 reconstruction of the scaled input.

use super::{ModelLoadError, Reconstructor, ScoringError};
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

pub struct OnnxAutoencoder {
    // `Session::run` needs exclusive access; workers take turns
    session: Mutex<Session>,
    output_name: String,
    n_features: usize,
}

impl OnnxAutoencoder {
    pub fn load(path: &Path, n_features: usize) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError::ModelNotFound(path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| ModelLoadError::Onnx(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelLoadError::Onnx(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| ModelLoadError::Onnx(e.to_string()))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelLoadError::Onnx("model declares no outputs".into()))?;
        tracing::info!(path = %path.display(), n_features, "ONNX autoencoder loaded");

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            n_features,
        })
    }
}

impl Reconstructor for OnnxAutoencoder {
    fn reconstruct(&self, scaled: &[f64]) -> Result<Vec<f64>, ScoringError> {
        if scaled.len() != self.n_features {
            return Err(ScoringError::ShapeMismatch {
                expected: self.n_features,
                actual: scaled.len(),
            });
        }
        let input: Vec<f32> = scaled.iter().map(|v| *v as f32).collect();
        let arr = Array2::from_shape_vec((1, self.n_features), input)
            .map_err(|e| ScoringError::Model(e.to_string()))?;
        let tensor = Value::from_array(arr).map_err(|e| ScoringError::Model(e.to_string()))?;

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ScoringError::Model(e.to_string()))?;
        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| ScoringError::Model(format!("missing output {}", self.output_name)))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ScoringError::Model(e.to_string()))?;
        Ok(data.iter().map(|v| *v as f64).collect())
    }
}

//! Anomaly scoring: scale the feature vector, reconstruct it with the
//! autoencoder, and flag the batch when the mean absolute reconstruction
//! error exceeds the configured threshold.
//!
//! The autoencoder was trained on benign traffic only, so a low error means
//! the batch looks like learned normal behavior. `error > threshold` is
//! anomalous; `error == threshold` is not.

mod onnx;
mod scaler;

pub use onnx::OnnxAutoencoder;
pub use scaler::FeatureScaler;

use crate::config::ModelConfig;
use crate::features::{FeatureVector, FlowSchema};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("feature shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("model inference failed: {0}")]
    Model(String),
    #[error("reconstruction error is not finite")]
    NonFinite,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model not found at {0}")]
    ModelNotFound(PathBuf),
    #[error("failed to load ONNX model: {0}")]
    Onnx(String),
    #[error("failed to read scaler {path}: {source}")]
    ScalerRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scaler {path}: {source}")]
    ScalerParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid scaler parameters: {0}")]
    InvalidScaler(String),
    #[error("flow schema yields {schema} features but the scaler expects {scaler}")]
    SchemaMismatch { schema: usize, scaler: usize },
}

/// Feature-wise transform fitted at training time
pub trait Scaler: Send + Sync {
    fn n_features(&self) -> usize;
    fn transform(&self, input: &[f64]) -> Result<Vec<f64>, ScoringError>;
}

/// Reproduces its (scaled) input; the reproduction error is the anomaly signal
pub trait Reconstructor: Send + Sync {
    fn reconstruct(&self, scaled: &[f64]) -> Result<Vec<f64>, ScoringError>;
}

/// Scoring result for one batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub batch_index: u64,
    pub reconstruction_error: f64,
    pub threshold: f64,
    pub is_anomalous: bool,
}

pub struct AnomalyScorer {
    scaler: Box<dyn Scaler>,
    model: Box<dyn Reconstructor>,
    threshold: f64,
}

impl AnomalyScorer {
    pub fn new(scaler: Box<dyn Scaler>, model: Box<dyn Reconstructor>, threshold: f64) -> Self {
        Self {
            scaler,
            model,
            threshold,
        }
    }

    /// Scaler parameters and ONNX autoencoder from the configured paths
    pub fn load(config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let scaler = FeatureScaler::load(&config.scaler_path)?;
        let model = OnnxAutoencoder::load(&config.model_path, scaler.n_features())?;
        Ok(Self::new(Box::new(scaler), Box::new(model), config.threshold))
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Features the scaler/model pair was fitted on
    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Refuse a flow schema whose feature count differs from the scaler's
    pub fn check_schema(&self, schema: &FlowSchema) -> Result<(), ModelLoadError> {
        if schema.len() != self.n_features() {
            return Err(ModelLoadError::SchemaMismatch {
                schema: schema.len(),
                scaler: self.n_features(),
            });
        }
        Ok(())
    }

    pub fn score(&self, batch_index: u64, vector: &FeatureVector) -> Result<Verdict, ScoringError> {
        let expected = self.scaler.n_features();
        if vector.len() != expected {
            return Err(ScoringError::ShapeMismatch {
                expected,
                actual: vector.len(),
            });
        }
        let scaled = self.scaler.transform(vector.as_slice())?;
        let reconstructed = self.model.reconstruct(&scaled)?;
        if reconstructed.len() != scaled.len() {
            return Err(ScoringError::ShapeMismatch {
                expected: scaled.len(),
                actual: reconstructed.len(),
            });
        }

        let error = mean_absolute_error(&reconstructed, &scaled);
        if !error.is_finite() {
            return Err(ScoringError::NonFinite);
        }
        Ok(Verdict {
            batch_index,
            reconstruction_error: error,
            threshold: self.threshold,
            is_anomalous: error > self.threshold,
        })
    }
}

fn mean_absolute_error(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
}

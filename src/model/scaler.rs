//! Scaler parameters exported from training, e.g.
//! `{"kind": "min_max", "min": [...], "scale": [...]}` for a min-max scaler
//! (`x * scale + min`) or `{"kind": "standard", "mean": [...], "scale": [...]}`.

use super::{ModelLoadError, Scaler, ScoringError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureScaler {
    MinMax { min: Vec<f64>, scale: Vec<f64> },
    Standard { mean: Vec<f64>, scale: Vec<f64> },
}

impl FeatureScaler {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let data = std::fs::read_to_string(path).map_err(|source| ModelLoadError::ScalerRead {
            path: path.to_path_buf(),
            source,
        })?;
        let scaler: FeatureScaler = serde_json::from_str(&data).map_err(|source| ModelLoadError::ScalerParse {
            path: path.to_path_buf(),
            source,
        })?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn validate(&self) -> Result<(), ModelLoadError> {
        let (offsets, scale) = match self {
            FeatureScaler::MinMax { min, scale } => (min, scale),
            FeatureScaler::Standard { mean, scale } => (mean, scale),
        };
        if offsets.len() != scale.len() {
            return Err(ModelLoadError::InvalidScaler(format!(
                "{} offsets but {} scale factors",
                offsets.len(),
                scale.len()
            )));
        }
        if offsets.is_empty() {
            return Err(ModelLoadError::InvalidScaler("no features".into()));
        }
        if let FeatureScaler::Standard { scale, .. } = self {
            if scale.iter().any(|s| *s == 0.0) {
                return Err(ModelLoadError::InvalidScaler("zero standard deviation".into()));
            }
        }
        Ok(())
    }
}

impl Scaler for FeatureScaler {
    fn n_features(&self) -> usize {
        match self {
            FeatureScaler::MinMax { min, .. } => min.len(),
            FeatureScaler::Standard { mean, .. } => mean.len(),
        }
    }

    fn transform(&self, input: &[f64]) -> Result<Vec<f64>, ScoringError> {
        let expected = self.n_features();
        if input.len() != expected {
            return Err(ScoringError::ShapeMismatch {
                expected,
                actual: input.len(),
            });
        }
        let out = match self {
            FeatureScaler::MinMax { min, scale } => input
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
            FeatureScaler::Standard { mean, scale } => input
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_transform() {
        // fitted on [0, 10] and [-1, 1]
        let s = FeatureScaler::MinMax {
            min: vec![0.0, 0.5],
            scale: vec![0.1, 0.5],
        };
        assert_eq!(s.transform(&[5.0, 1.0]).unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn standard_transform() {
        let s = FeatureScaler::Standard {
            mean: vec![2.0],
            scale: vec![4.0],
        };
        assert_eq!(s.transform(&[10.0]).unwrap(), vec![2.0]);
    }

    #[test]
    fn loads_from_json_and_rejects_ragged_params() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("scaler.json");
        std::fs::write(&good, r#"{"kind": "min_max", "min": [0, 0], "scale": [1, 1]}"#).unwrap();
        assert_eq!(FeatureScaler::load(&good).unwrap().n_features(), 2);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"kind": "min_max", "min": [0, 0], "scale": [1]}"#).unwrap();
        assert!(matches!(FeatureScaler::load(&bad), Err(ModelLoadError::InvalidScaler(_))));
    }

    #[test]
    fn wrong_input_length() {
        let s = FeatureScaler::Standard {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        assert!(matches!(s.transform(&[1.0]), Err(ScoringError::ShapeMismatch { expected: 3, actual: 1 })));
    }
}

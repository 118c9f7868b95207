//! Statistical feature extraction: flow table → fixed-length feature vector.

mod aggregator;
mod schema;
pub mod stats;

pub use aggregator::{AggregationError, FeatureAggregator};
pub use schema::{Aggregation, FieldSpec, FlowSchema};

use serde::{Deserialize, Serialize};

/// Fixed-length model input, one value per schema (column, aggregation) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == name)?;
        self.values.get(i).copied()
    }
}

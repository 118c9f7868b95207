//! Which flow columns feed the model, and how each is summarized.

use super::stats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Std,
    Skew,
    Kurtosis,
    Median,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Mean,
        Aggregation::Std,
        Aggregation::Skew,
        Aggregation::Kurtosis,
        Aggregation::Median,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Std => "std",
            Aggregation::Skew => "skew",
            Aggregation::Kurtosis => "kurtosis",
            Aggregation::Median => "median",
        }
    }

    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Mean => stats::mean(values),
            Aggregation::Std => stats::std_dev(values),
            Aggregation::Skew => stats::skewness(values),
            Aggregation::Kurtosis => stats::kurtosis(values),
            Aggregation::Median => stats::median(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub column: String,
    pub aggregations: Vec<Aggregation>,
}

/// Ordered (column, aggregation) layout. The order is the model's input
/// order and must match what the scaler and autoencoder were trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for FlowSchema {
    /// CICFlowMeter inter-arrival and idle fields used by the shipped autoencoder
    fn default() -> Self {
        use Aggregation::*;
        Self::new([
            ("Flow IAT Max", vec![Std]),
            ("Fwd IAT Mean", vec![Mean, Std]),
            ("Bwd IAT Std", vec![Mean]),
            ("Idle Std", vec![Mean]),
        ])
    }
}

impl FlowSchema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Aggregation>)>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(column, aggregations)| FieldSpec {
                    column: column.into(),
                    aggregations,
                })
                .collect(),
        }
    }

    /// Every column summarized by all five moments (mean, std, skew, kurtosis, median)
    pub fn moments<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self::new(columns.into_iter().map(|c| (c, Aggregation::ALL.to_vec())))
    }

    /// Number of features the schema produces
    pub fn len(&self) -> usize {
        self.fields.iter().map(|f| f.aggregations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    /// `"<column>_<fn>"` per feature, in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .flat_map(|f| {
                f.aggregations
                    .iter()
                    .map(move |a| format!("{}_{}", f.column, a.name()))
            })
            .collect()
    }
}

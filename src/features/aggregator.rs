//! Flow table → feature vector, following a [`FlowSchema`].

use super::{FeatureVector, FlowSchema};
use crate::flows::FlowTable;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("flow table has no rows")]
    EmptyInput,
    #[error("flow table is missing required columns: {}", .0.join(", "))]
    SchemaMismatch(Vec<String>),
}

pub struct FeatureAggregator {
    schema: FlowSchema,
}

impl FeatureAggregator {
    pub fn new(schema: FlowSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FlowSchema {
        &self.schema
    }

    /// Summarize every schema column across all rows. Fails without producing
    /// anything if the table is empty or any schema column is absent.
    pub fn aggregate(&self, table: &FlowTable) -> Result<FeatureVector, AggregationError> {
        if table.is_empty() {
            return Err(AggregationError::EmptyInput);
        }
        let missing: Vec<String> = self
            .schema
            .required_columns()
            .filter(|c| !table.has_column(c))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(AggregationError::SchemaMismatch(missing));
        }

        let mut values = Vec::with_capacity(self.schema.len());
        for field in &self.schema.fields {
            let column = table
                .finite_values(&field.column)
                .ok_or_else(|| AggregationError::SchemaMismatch(vec![field.column.clone()]))?;
            values.extend(field.aggregations.iter().map(|a| a.apply(&column)));
        }
        Ok(FeatureVector {
            names: self.schema.feature_names(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Aggregation;
    use crate::flows::FlowValue;

    fn table(columns: &[&str], rows: &[&[f64]]) -> FlowTable {
        FlowTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| FlowValue::Number(*v)).collect())
                .collect(),
        )
    }

    const CIC: [&str; 5] = ["Flow IAT Max", "Fwd IAT Mean", "Bwd IAT Std", "Idle Std", "Flow Duration"];

    #[test]
    fn default_schema_in_declared_order() {
        let t = table(
            &CIC,
            &[
                &[10.0, 1.0, 4.0, 0.0, 99.0],
                &[20.0, 3.0, 6.0, 2.0, 99.0],
                &[30.0, 5.0, 8.0, 4.0, 99.0],
            ],
        );
        let v = FeatureAggregator::new(FlowSchema::default()).aggregate(&t).unwrap();
        assert_eq!(v.len(), 5);
        assert_eq!(v.values, vec![10.0, 3.0, 2.0, 6.0, 2.0]);
        assert_eq!(v.get("Fwd IAT Mean_std"), Some(2.0));
    }

    #[test]
    fn missing_column_is_hard_failure() {
        let t = table(&["Flow IAT Max", "Fwd IAT Mean", "Idle Std"], &[&[1.0, 2.0, 3.0]]);
        let err = FeatureAggregator::new(FlowSchema::default()).aggregate(&t).unwrap_err();
        assert_eq!(err, AggregationError::SchemaMismatch(vec!["Bwd IAT Std".into()]));
    }

    #[test]
    fn empty_table_rejected() {
        let t = table(&CIC, &[]);
        let err = FeatureAggregator::new(FlowSchema::default()).aggregate(&t).unwrap_err();
        assert_eq!(err, AggregationError::EmptyInput);
    }

    #[test]
    fn single_row_has_zero_skew_and_kurtosis() {
        let t = table(&["A", "B"], &[&[7.0, -2.0]]);
        let v = FeatureAggregator::new(FlowSchema::moments(["A", "B"])).aggregate(&t).unwrap();
        for col in ["A", "B"] {
            assert_eq!(v.get(&format!("{}_skew", col)), Some(0.0));
            assert_eq!(v.get(&format!("{}_kurtosis", col)), Some(0.0));
        }
        assert_eq!(v.get("A_mean"), Some(7.0));
        assert_eq!(v.get("B_median"), Some(-2.0));
        assert_eq!(v.get("A_std"), Some(0.0));
    }

    #[test]
    fn non_finite_cells_are_ignored() {
        let t = FlowTable::new(
            vec!["A".into()],
            vec![
                vec![FlowValue::Number(2.0)],
                vec![FlowValue::Number(f64::INFINITY)],
                vec![FlowValue::Number(f64::NAN)],
                vec![FlowValue::Text("n/a".into())],
                vec![FlowValue::Number(4.0)],
            ],
        );
        let schema = FlowSchema::new([("A", vec![Aggregation::Mean, Aggregation::Median])]);
        let v = FeatureAggregator::new(schema).aggregate(&t).unwrap();
        assert_eq!(v.values, vec![3.0, 3.0]);
    }
}

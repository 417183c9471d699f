//! # Schema Alignment
//!
//! Reconciles the output of a fitted preprocessor with the feature schema it
//! declares. The aligned row always carries exactly the declared columns, in
//! declared order:
//!
//! 1. The record is transformed by the preprocessor.
//! 2. The expected feature names are queried from the same preprocessor.
//! 3. The transform output is labelled: positional output takes the declared
//!    names, labelled output keeps its own.
//! 4. The labelled frame is reindexed against the declared names. Absent
//!    columns are filled with [`FILL_VALUE`] and extra columns are dropped.
//!
//! Step 4 runs even when step 3 already produced the declared layout, in which
//! case it changes nothing.

use polars::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

use crate::preprocessor::{Preprocessor, TransformError};
use crate::types::RawInputRecord;

/// Value given to declared features the transform did not produce.
pub const FILL_VALUE: f64 = 0.0;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("Failed to assemble the feature frame: {0}")]
    Frame(#[from] PolarsError),
    #[error(
        "Shape of passed values is {found} columns, but the preprocessor declares {expected} feature names."
    )]
    ShapeMismatch { found: usize, expected: usize },
    #[error("Transform output labels {labels} columns but holds {found} values per row.")]
    LabelMismatch { labels: usize, found: usize },
    #[error("The preprocessor declares no output feature names.")]
    EmptySchema,
}

/// A single-row frame whose columns are exactly the declared feature names.
#[derive(Debug, Clone)]
pub struct AlignedFeatureRow {
    frame: DataFrame,
}

impl PartialEq for AlignedFeatureRow {
    fn eq(&self, other: &Self) -> bool {
        self.frame.equals(&other.frame)
    }
}

impl AlignedFeatureRow {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    /// Value of one feature in the first row.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.frame.column(name).ok()?.f64().ok()?.get(0)
    }

    pub fn values(&self) -> Vec<f64> {
        self.frame
            .get_columns()
            .iter()
            .filter_map(|column| column.f64().ok().and_then(|values| values.get(0)))
            .collect()
    }
}

/// Transforms `record` with `preprocessor` and aligns the result to the
/// preprocessor's declared feature names.
pub fn align(
    record: &RawInputRecord,
    preprocessor: &dyn Preprocessor,
) -> Result<AlignedFeatureRow, AlignError> {
    let raw = record.to_frame()?;
    let output = preprocessor.transform(&raw)?;
    let expected = preprocessor.feature_names();
    if expected.is_empty() {
        return Err(AlignError::EmptySchema);
    }

    let labelled = internal::label_output(&output.values, output.columns.as_deref(), &expected)?;
    let frame = internal::reindex(&labelled, &expected, FILL_VALUE)?;
    Ok(AlignedFeatureRow { frame })
}

mod internal {
    use super::*;
    use ndarray::Array2;

    /// Wraps the numeric transform output in a frame with column labels.
    pub(super) fn label_output(
        values: &Array2<f64>,
        labels: Option<&[String]>,
        expected: &[String],
    ) -> Result<DataFrame, AlignError> {
        let labels = match labels {
            Some(labels) => {
                if labels.len() != values.ncols() {
                    return Err(AlignError::LabelMismatch {
                        labels: labels.len(),
                        found: values.ncols(),
                    });
                }
                labels
            }
            None => {
                if values.ncols() != expected.len() {
                    return Err(AlignError::ShapeMismatch {
                        found: values.ncols(),
                        expected: expected.len(),
                    });
                }
                expected
            }
        };

        let columns = labels
            .iter()
            .zip(values.columns())
            .map(|(label, column)| Column::new(label.as_str().into(), column.to_vec()))
            .collect::<Vec<_>>();
        Ok(DataFrame::new(columns)?)
    }

    /// Returns a frame with exactly `expected` columns, in order.
    pub(super) fn reindex(
        frame: &DataFrame,
        expected: &[String],
        fill_value: f64,
    ) -> Result<DataFrame, AlignError> {
        let present: HashSet<String> = frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();

        let missing: Vec<&str> = expected
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "Transform output is missing {} expected feature(s), filling with {fill_value}: {}",
                missing.len(),
                missing.join(", ")
            );
        }

        let wanted: HashSet<&str> = expected.iter().map(String::as_str).collect();
        let extra = present
            .iter()
            .filter(|name| !wanted.contains(name.as_str()))
            .count();
        if extra > 0 {
            log::debug!("Dropping {extra} column(s) not declared by the preprocessor");
        }

        let height = frame.height();
        let columns = expected
            .iter()
            .map(|name| match frame.column(name) {
                Ok(column) => column.cast(&DataType::Float64),
                Err(_) => Ok(Column::new(name.as_str().into(), vec![fill_value; height])),
            })
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(DataFrame::new(columns)?)
    }
}

//! # Fitted Preprocessor
//!
//! The pipeline treats the preprocessing artifact as a black box behind the
//! [`Preprocessor`] trait: it transforms raw input frames into numeric rows
//! and declares the ordered feature names those rows are meant to carry.
//!
//! [`FittedPreprocessor`] is the concrete artifact shipped with the crate. It
//! is a column transformer whose steps run in order and each contribute a
//! contiguous block of output columns:
//!
//! - `scale`: standardizes numeric columns as `(x - mean) / scale`.
//!   Output names are `num__<column>`.
//! - `one_hot`: one indicator per fitted category of a text column.
//!   Output names are `cat__<column>_<category>`.
//! - `passthrough`: copies numeric columns unchanged.
//!   Output names are `remainder__<column>`.
//!
//! The fitted state (means, scales, category lists) is read from TOML and
//! never changes after loading.

use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::artifacts::{ArtifactError, read_toml, write_toml};

/// Errors raised while applying a fitted transform to input data.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("The input column '{0}' required by the preprocessor was not found.")]
    ColumnNotFound(String),
    #[error(
        "The input column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing values were found in the input column '{0}'.")]
    MissingValuesFound(String),
    #[error("Found unknown category '{value}' in column '{column_name}' during transform.")]
    UnknownCategory { column_name: String, value: String },
    #[error("The fitted preprocessor is malformed: {0}")]
    InvalidPreprocessor(String),
}

/// Numeric rows produced by a transform.
///
/// When `columns` is `Some`, each output column carries its own label and may
/// legitimately differ from the declared feature names. When it is `None`,
/// the columns are positional and are labelled with the declared names.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub values: Array2<f64>,
    pub columns: Option<Vec<String>>,
}

impl TransformOutput {
    pub fn labelled(values: Array2<f64>, columns: Vec<String>) -> Self {
        Self {
            values,
            columns: Some(columns),
        }
    }

    pub fn positional(values: Array2<f64>) -> Self {
        Self {
            values,
            columns: None,
        }
    }
}

/// The operations the pipeline needs from a fitted preprocessing artifact.
pub trait Preprocessor {
    /// Applies the fitted transform, one output row per input row.
    fn transform(&self, frame: &DataFrame) -> Result<TransformOutput, TransformError>;

    /// The ordered feature names the transform output is expected to carry.
    fn feature_names(&self) -> Vec<String>;
}

/// How a one-hot step treats a value absent from its fitted categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Reject the row with [`TransformError::UnknownCategory`].
    #[default]
    Error,
    /// Emit all-zero indicators.
    Ignore,
}

/// One fitted step of the column transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformStep {
    Scale {
        columns: Vec<String>,
        means: Vec<f64>,
        scales: Vec<f64>,
    },
    OneHot {
        column: String,
        categories: Vec<String>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
    Passthrough {
        columns: Vec<String>,
    },
}

impl TransformStep {
    fn output_names(&self) -> Vec<String> {
        match self {
            Self::Scale { columns, .. } => columns.iter().map(|c| format!("num__{c}")).collect(),
            Self::OneHot {
                column, categories, ..
            } => categories
                .iter()
                .map(|category| format!("cat__{column}_{category}"))
                .collect(),
            Self::Passthrough { columns } => {
                columns.iter().map(|c| format!("remainder__{c}")).collect()
            }
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::Scale { columns, .. } | Self::Passthrough { columns } => columns.len(),
            Self::OneHot { categories, .. } => categories.len(),
        }
    }
}

/// A column transformer fitted offline and loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub steps: Vec<TransformStep>,
}

impl FittedPreprocessor {
    /// Loads a fitted preprocessor from a TOML file and checks its structure.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let preprocessor: Self = read_toml(path)?;
        preprocessor
            .validate()
            .map_err(|reason| ArtifactError::Invalid {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(preprocessor)
    }

    /// Saves the fitted preprocessor in human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        write_toml(self, path)
    }

    /// Checks the fitted state for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        for step in &self.steps {
            match step {
                TransformStep::Scale {
                    columns,
                    means,
                    scales,
                } => {
                    if means.len() != columns.len() || scales.len() != columns.len() {
                        return Err(format!(
                            "scale step has {} columns but {} means and {} scales",
                            columns.len(),
                            means.len(),
                            scales.len()
                        ));
                    }
                    if means.iter().chain(scales).any(|v| !v.is_finite()) {
                        return Err("scale step contains non-finite parameters".to_string());
                    }
                }
                TransformStep::OneHot {
                    column, categories, ..
                } => {
                    if categories.is_empty() {
                        return Err(format!("one-hot step for '{column}' has no categories"));
                    }
                }
                TransformStep::Passthrough { .. } => {}
            }
        }

        let names = self.feature_names();
        if names.is_empty() {
            return Err("the preprocessor declares no output features".to_string());
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(format!("output feature '{name}' is declared twice"));
            }
        }
        Ok(())
    }
}

impl Preprocessor for FittedPreprocessor {
    fn transform(&self, frame: &DataFrame) -> Result<TransformOutput, TransformError> {
        // The fields are public, so the state may not have come through `load`.
        self.validate().map_err(TransformError::InvalidPreprocessor)?;

        let n_rows = frame.height();
        let names = self.feature_names();
        let mut values = Array2::<f64>::zeros((n_rows, names.len()));
        let mut offset = 0;

        for step in &self.steps {
            match step {
                TransformStep::Scale {
                    columns,
                    means,
                    scales,
                } => {
                    for (j, column_name) in columns.iter().enumerate() {
                        let scale = if scales[j] == 0.0 { 1.0 } else { scales[j] };
                        let raw = internal::numeric_column(frame, column_name)?;
                        for (row, value) in raw.into_iter().enumerate() {
                            values[[row, offset + j]] = (value - means[j]) / scale;
                        }
                    }
                }
                TransformStep::OneHot {
                    column,
                    categories,
                    handle_unknown,
                } => {
                    let raw = internal::text_column(frame, column)?;
                    for (row, value) in raw.into_iter().enumerate() {
                        match categories.iter().position(|category| *category == value) {
                            Some(k) => values[[row, offset + k]] = 1.0,
                            None if *handle_unknown == HandleUnknown::Ignore => {
                                log::debug!(
                                    "Ignoring unknown category '{value}' in column '{column}'"
                                );
                            }
                            None => {
                                return Err(TransformError::UnknownCategory {
                                    column_name: column.clone(),
                                    value,
                                });
                            }
                        }
                    }
                }
                TransformStep::Passthrough { columns } => {
                    for (j, column_name) in columns.iter().enumerate() {
                        let raw = internal::numeric_column(frame, column_name)?;
                        for (row, value) in raw.into_iter().enumerate() {
                            values[[row, offset + j]] = value;
                        }
                    }
                }
            }
            offset += step.width();
        }

        Ok(TransformOutput::labelled(values, names))
    }

    fn feature_names(&self) -> Vec<String> {
        self.steps.iter().flat_map(TransformStep::output_names).collect()
    }
}

/// Column extraction shared by the transform steps.
mod internal {
    use super::*;

    pub(super) fn numeric_column(
        frame: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<f64>, TransformError> {
        let column = frame
            .column(column_name)
            .map_err(|_| TransformError::ColumnNotFound(column_name.to_string()))?;
        if column.null_count() > 0 {
            return Err(TransformError::MissingValuesFound(column_name.to_string()));
        }

        let wrong_type = || TransformError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        };
        let casted = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
        if casted.null_count() > 0 {
            return Err(wrong_type());
        }

        let chunked = casted.f64()?.rechunk();
        Ok(chunked.into_no_null_iter().collect())
    }

    pub(super) fn text_column(
        frame: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<String>, TransformError> {
        let column = frame
            .column(column_name)
            .map_err(|_| TransformError::ColumnNotFound(column_name.to_string()))?;
        if column.null_count() > 0 {
            return Err(TransformError::MissingValuesFound(column_name.to_string()));
        }

        let casted = column.cast(&DataType::String)?;
        let chunked = casted.str()?;
        Ok(chunked
            .into_iter()
            .map(|value| value.unwrap_or_default().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::NamedTempFile;

    fn small_preprocessor() -> FittedPreprocessor {
        FittedPreprocessor {
            steps: vec![
                TransformStep::Scale {
                    columns: vec!["age".to_string(), "bmi".to_string()],
                    means: vec![40.0, 25.0],
                    scales: vec![20.0, 0.0],
                },
                TransformStep::OneHot {
                    column: "gender".to_string(),
                    categories: vec!["Female".to_string(), "Male".to_string()],
                    handle_unknown: HandleUnknown::Error,
                },
                TransformStep::Passthrough {
                    columns: vec!["hypertension".to_string()],
                },
            ],
        }
    }

    fn frame(gender: &str) -> DataFrame {
        DataFrame::new(vec![
            Column::new("age".into(), [50.0]),
            Column::new("bmi".into(), [27.5]),
            Column::new("gender".into(), [gender]),
            Column::new("hypertension".into(), [1i64]),
        ])
        .unwrap()
    }

    #[test]
    fn feature_names_follow_step_order() {
        assert_eq!(
            small_preprocessor().feature_names(),
            vec![
                "num__age",
                "num__bmi",
                "cat__gender_Female",
                "cat__gender_Male",
                "remainder__hypertension",
            ]
        );
    }

    #[test]
    fn transform_scales_encodes_and_passes_through() {
        let output = small_preprocessor().transform(&frame("Male")).unwrap();
        assert_eq!(output.columns.as_deref(), Some(&small_preprocessor().feature_names()[..]));
        assert_eq!(output.values.dim(), (1, 5));

        let row = output.values.row(0);
        assert_abs_diff_eq!(row[0], 0.5, epsilon = 1e-12);
        // Zero scale is treated as one.
        assert_abs_diff_eq!(row[1], 2.5, epsilon = 1e-12);
        assert_eq!(row[2], 0.0);
        assert_eq!(row[3], 1.0);
        assert_eq!(row[4], 1.0);
    }

    #[test]
    fn unknown_category_is_rejected_by_default() {
        let err = small_preprocessor().transform(&frame("Unknown")).unwrap_err();
        match err {
            TransformError::UnknownCategory { column_name, value } => {
                assert_eq!(column_name, "gender");
                assert_eq!(value, "Unknown");
            }
            other => panic!("expected UnknownCategory, got {other:?}"),
        }
    }

    #[test]
    fn unknown_category_can_be_ignored() {
        let mut preprocessor = small_preprocessor();
        if let TransformStep::OneHot { handle_unknown, .. } = &mut preprocessor.steps[1] {
            *handle_unknown = HandleUnknown::Ignore;
        }
        let output = preprocessor.transform(&frame("Unknown")).unwrap();
        assert_eq!(output.values[[0, 2]], 0.0);
        assert_eq!(output.values[[0, 3]], 0.0);
    }

    #[test]
    fn missing_input_column_is_reported() {
        let frame = frame("Male").drop("bmi").unwrap();
        let err = small_preprocessor().transform(&frame).unwrap_err();
        assert!(matches!(err, TransformError::ColumnNotFound(ref c) if c == "bmi"));
    }

    #[test]
    fn text_in_numeric_column_is_a_type_error() {
        let frame = DataFrame::new(vec![
            Column::new("age".into(), ["forty"]),
            Column::new("bmi".into(), [27.5]),
            Column::new("gender".into(), ["Male"]),
            Column::new("hypertension".into(), [0i64]),
        ])
        .unwrap();
        let err = small_preprocessor().transform(&frame).unwrap_err();
        assert!(
            matches!(err, TransformError::ColumnWrongType { ref column_name, .. } if column_name == "age"),
            "got {err:?}"
        );
    }

    #[test]
    fn validation_rejects_mismatched_scale_parameters() {
        let preprocessor = FittedPreprocessor {
            steps: vec![TransformStep::Scale {
                columns: vec!["age".to_string()],
                means: vec![],
                scales: vec![1.0],
            }],
        };
        assert!(preprocessor.validate().is_err());
    }

    #[test]
    fn transform_rejects_unvalidated_state_instead_of_indexing_past_it() {
        let mut preprocessor = small_preprocessor();
        if let TransformStep::Scale { means, .. } = &mut preprocessor.steps[0] {
            means.pop();
        }
        let err = preprocessor.transform(&frame("Male")).unwrap_err();
        assert!(
            matches!(err, TransformError::InvalidPreprocessor(ref reason) if reason.contains("1 means")),
            "got {err:?}"
        );
    }

    #[test]
    fn validation_rejects_duplicate_outputs() {
        let preprocessor = FittedPreprocessor {
            steps: vec![
                TransformStep::Passthrough {
                    columns: vec!["age".to_string()],
                },
                TransformStep::Passthrough {
                    columns: vec!["age".to_string()],
                },
            ],
        };
        let reason = preprocessor.validate().unwrap_err();
        assert!(reason.contains("remainder__age"));
    }

    #[test]
    fn save_and_load_preserve_steps() {
        let original = small_preprocessor();
        let file = NamedTempFile::new().expect("temp file");
        original.save(file.path()).expect("save");
        let loaded = FittedPreprocessor::load(file.path()).expect("load");
        assert_eq!(loaded, original);
    }

    #[test]
    fn handle_unknown_defaults_to_error_when_omitted() {
        let text = r#"
[[steps]]
kind = "one_hot"
column = "gender"
categories = ["Female", "Male"]
"#;
        let preprocessor: FittedPreprocessor = toml::from_str(text).unwrap();
        assert_eq!(
            preprocessor.steps[0],
            TransformStep::OneHot {
                column: "gender".to_string(),
                categories: vec!["Female".to_string(), "Male".to_string()],
                handle_unknown: HandleUnknown::Error,
            }
        );
    }
}

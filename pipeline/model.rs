use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::artifacts::{ArtifactError, read_toml, write_toml};

/// Errors raised by a classifier while predicting.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("The model requires feature '{0}', which is absent from the aligned input.")]
    FeatureNotFound(String),
    #[error("Feature '{0}' contains missing or non-numeric values.")]
    NonNumericFeature(String),
    #[error("The model returned {found} predictions for {expected} input rows.")]
    UnexpectedOutputLength { found: usize, expected: usize },
    #[error("The trained classifier is malformed: {0}")]
    InvalidModel(String),
}

/// The operation the pipeline needs from a fitted classification artifact.
pub trait Classifier {
    /// One class label per input row. Labels are `0.0` or `1.0` for a binary
    /// model.
    fn predict(&self, features: &DataFrame) -> Result<Array1<f64>, ModelError>;
}

fn default_threshold() -> f64 {
    0.5
}

/// A logistic-regression classifier fitted offline and saved as TOML.
///
/// Features are looked up by name, so the aligned input may carry columns the
/// model gives no weight to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedClassifier {
    pub intercept: f64,
    /// Names of the weighted features, parallel to `coefficients`.
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    /// Probability at or above which the positive class is predicted.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl TrainedClassifier {
    /// Loads a trained classifier from a TOML file and checks its structure.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let model: Self = read_toml(path)?;
        model.validate().map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(model)
    }

    /// Saves the trained classifier in human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        write_toml(self, path)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.feature_names.len() != self.coefficients.len() {
            return Err(format!(
                "{} feature names but {} coefficients",
                self.feature_names.len(),
                self.coefficients.len()
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("coefficients must be finite".to_string());
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(format!(
                "threshold {} must lie strictly between 0 and 1",
                self.threshold
            ));
        }
        Ok(())
    }

    /// Positive-class probabilities, one per input row.
    pub fn predict_proba(&self, features: &DataFrame) -> Result<Array1<f64>, ModelError> {
        self.validate().map_err(ModelError::InvalidModel)?;
        let x = self.design_matrix(features)?;
        let eta = x.dot(&ArrayView1::from(&self.coefficients[..])) + self.intercept;
        // Clamp eta so exp() cannot overflow.
        Ok(eta.mapv(|e| 1.0 / (1.0 + f64::exp(-e.clamp(-700.0, 700.0)))))
    }

    fn design_matrix(&self, features: &DataFrame) -> Result<Array2<f64>, ModelError> {
        let mut x = Array2::<f64>::zeros((features.height(), self.feature_names.len()));
        for (j, name) in self.feature_names.iter().enumerate() {
            let column = features
                .column(name)
                .map_err(|_| ModelError::FeatureNotFound(name.clone()))?;
            let casted = column
                .cast(&DataType::Float64)
                .map_err(|_| ModelError::NonNumericFeature(name.clone()))?;
            if casted.null_count() > 0 {
                return Err(ModelError::NonNumericFeature(name.clone()));
            }
            let chunked = casted.f64()?.rechunk();
            for (i, value) in chunked.into_no_null_iter().enumerate() {
                x[[i, j]] = value;
            }
        }
        Ok(x)
    }
}

impl Classifier for TrainedClassifier {
    fn predict(&self, features: &DataFrame) -> Result<Array1<f64>, ModelError> {
        let threshold = self.threshold;
        Ok(self
            .predict_proba(features)?
            .mapv(|p| if p >= threshold { 1.0 } else { 0.0 }))
    }
}

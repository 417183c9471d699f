//! # Inference
//!
//! Runs the aligned feature row through the classifier and maps its raw
//! output to a [`Diagnosis`]. [`predict`] is the protective boundary around
//! alignment and inference: any failure inside it comes back as a
//! [`PredictionFailure`] carrying a user-facing message and a diagnostic
//! trace, never as a panic, so the caller can accept the next submission.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

use crate::align::{AlignError, AlignedFeatureRow, align};
use crate::builder::build_record;
use crate::model::{Classifier, ModelError};
use crate::preprocessor::Preprocessor;
use crate::types::{PatientInput, RawInputRecord};

/// The binary outcome shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    Diabetic,
    NotDiabetic,
}

impl Diagnosis {
    /// Raw model output `1` is the positive class; every other value is not.
    pub fn from_raw(value: f64) -> Self {
        if value == 1.0 {
            Self::Diabetic
        } else {
            Self::NotDiabetic
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Diabetic => "Diabetic",
            Self::NotDiabetic => "Not Diabetic",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Anything that can go wrong between a built record and a diagnosis.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// What the presenter receives when a submission could not be scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionFailure {
    message: String,
    trace: String,
}

impl PredictionFailure {
    /// Captures the error chain and the current backtrace.
    pub fn capture(error: &PredictError) -> Self {
        let mut trace = format!("{error:?}\n");
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str(&format!("Caused by: {cause}\n"));
            source = cause.source();
        }
        trace.push_str(&format!("\nBacktrace:\n{}", Backtrace::force_capture()));

        Self {
            message: format!("Prediction failed: {error}"),
            trace,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }
}

impl fmt::Display for PredictionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for PredictionFailure {}

/// Runs the model on an aligned row and maps its single output to a
/// diagnosis.
pub fn invoke(row: &AlignedFeatureRow, model: &dyn Classifier) -> Result<Diagnosis, ModelError> {
    let predictions = model.predict(row.frame())?;
    if predictions.len() != 1 {
        return Err(ModelError::UnexpectedOutputLength {
            found: predictions.len(),
            expected: 1,
        });
    }
    Ok(Diagnosis::from_raw(predictions[0]))
}

/// Aligns an already-built record and runs inference, behind the boundary.
pub fn predict_record(
    record: &RawInputRecord,
    preprocessor: &dyn Preprocessor,
    model: &dyn Classifier,
) -> Result<Diagnosis, PredictionFailure> {
    let attempt = || -> Result<Diagnosis, PredictError> {
        let row = align(record, preprocessor)?;
        Ok(invoke(&row, model)?)
    };

    attempt().map_err(|err| {
        log::error!("Prediction failed: {err}");
        PredictionFailure::capture(&err)
    })
}

/// Builds, aligns, and scores one submission.
pub fn predict(
    input: &PatientInput,
    preprocessor: &dyn Preprocessor,
    model: &dyn Classifier,
) -> Result<Diagnosis, PredictionFailure> {
    let record = build_record(input);
    predict_record(&record, preprocessor, model)
}

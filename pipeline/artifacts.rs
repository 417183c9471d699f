//! # Artifact Loading
//!
//! The fitted preprocessor and classifier are produced offline and shipped as
//! human-readable TOML files. They are read once when the process starts; a
//! missing or malformed file is fatal and surfaces as an [`ArtifactError`]
//! before any prediction is attempted.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::infer::{self, Diagnosis, PredictionFailure};
use crate::model::{Classifier, TrainedClassifier};
use crate::preprocessor::{FittedPreprocessor, Preprocessor};
use crate::types::PatientInput;

/// Failures while reading, writing, or validating an artifact file.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read artifact file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write artifact file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML artifact '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize artifact to TOML format: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Artifact '{}' is malformed: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

pub(crate) fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ArtifactError> {
    let toml_string = toml::to_string_pretty(value)?;
    let write_err = |source: std::io::Error| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = BufWriter::new(fs::File::create(path).map_err(write_err)?);
    file.write_all(toml_string.as_bytes()).map_err(write_err)?;
    file.flush().map_err(write_err)?;
    Ok(())
}

/// The two fitted artifacts, loaded once and shared read-only for the
/// lifetime of the process.
#[derive(Debug)]
pub struct Artifacts {
    pub preprocessor: FittedPreprocessor,
    pub model: TrainedClassifier,
}

impl Artifacts {
    /// Loads and validates both artifacts. Any error here should stop the
    /// process before it starts serving predictions.
    pub fn load(model_path: &Path, preprocessor_path: &Path) -> Result<Self, ArtifactError> {
        let model = TrainedClassifier::load(model_path)?;
        let preprocessor = FittedPreprocessor::load(preprocessor_path)?;

        let schema = preprocessor.feature_names();
        let declared: HashSet<&str> = schema.iter().map(String::as_str).collect();
        if let Some(name) = model
            .feature_names
            .iter()
            .find(|name| !declared.contains(name.as_str()))
        {
            return Err(ArtifactError::Invalid {
                path: model_path.to_path_buf(),
                reason: format!(
                    "weighted feature '{name}' is not declared by the preprocessor at '{}'",
                    preprocessor_path.display()
                ),
            });
        }

        log::info!(
            "Loaded preprocessor from '{}' ({} output features)",
            preprocessor_path.display(),
            schema.len()
        );
        log::info!(
            "Loaded classifier from '{}' ({} weighted features)",
            model_path.display(),
            model.feature_names.len()
        );
        Ok(Self {
            preprocessor,
            model,
        })
    }

    pub fn preprocessor(&self) -> &dyn Preprocessor {
        &self.preprocessor
    }

    pub fn model(&self) -> &dyn Classifier {
        &self.model
    }

    /// Runs one submission through the full pipeline behind the protective
    /// boundary.
    pub fn predict(&self, input: &PatientInput) -> Result<Diagnosis, PredictionFailure> {
        infer::predict(input, self.preprocessor(), self.model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shipped(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("artifacts")
            .join(name)
    }

    #[test]
    fn shipped_artifacts_load() {
        let artifacts = Artifacts::load(
            &shipped("diabetes_model.toml"),
            &shipped("preprocessor.toml"),
        )
        .expect("shipped artifacts should load");
        assert!(!artifacts.preprocessor.feature_names().is_empty());
        assert!(!artifacts.model.feature_names.is_empty());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().expect("temp dir");
        let err = Artifacts::load(
            &dir.path().join("absent_model.toml"),
            &shipped("preprocessor.toml"),
        )
        .unwrap_err();
        match err {
            ArtifactError::Read { path, .. } => assert!(path.ends_with("absent_model.toml")),
            other => panic!("expected a read error, got {other:?}"),
        }
    }

    #[test]
    fn model_weighting_an_undeclared_feature_is_rejected_at_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("diabetes_model.toml");
        let model = TrainedClassifier {
            intercept: 0.0,
            feature_names: vec!["num__age".to_string(), "num__insulin".to_string()],
            coefficients: vec![1.0, 1.0],
            threshold: 0.5,
        };
        model.save(&path).expect("save");

        let err = Artifacts::load(&path, &shipped("preprocessor.toml")).unwrap_err();
        match err {
            ArtifactError::Invalid { path, reason } => {
                assert!(path.ends_with("diabetes_model.toml"));
                assert!(reason.contains("num__insulin"), "{reason}");
            }
            other => panic!("expected an invalid-artifact error, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("preprocessor.toml");
        fs::write(&path, "steps = [ this is not toml").expect("write");
        let err = Artifacts::load(&shipped("diabetes_model.toml"), &path).unwrap_err();
        assert!(matches!(err, ArtifactError::Parse { .. }), "got {err:?}");
        assert!(err.to_string().contains("preprocessor.toml"));
    }
}

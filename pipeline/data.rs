//! # Batch Input
//!
//! Reads many submissions at once from a tab-separated file whose header
//! names the form fields (`year`, `age`, `gender`, `race`, ...). Every row
//! becomes one [`PatientRow`]; rows are scored independently afterwards, so a
//! bad cell only fails its own row.
//!
//! Validation here is limited to what is needed to fill the typed fields.
//! A missing header column fails the whole file. An empty text cell is read as
//! `""` and left for the feature builder and the fitted transform to handle.
//! An empty or non-numeric cell in a numeric field fails that row only.

use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::types::{FORM_FIELDS, PatientInput};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Row {row}: the required field '{column_name}' is empty.")]
    MissingValue { row: usize, column_name: String },
    #[error("Row {row}: the field '{column_name}' expects {expected_type}, found '{found}'.")]
    InvalidValue {
        row: usize,
        column_name: String,
        expected_type: &'static str,
        found: String,
    },
}

/// One row of a batch file: a submission, or the reason it could not be read.
pub type PatientRow = Result<PatientInput, DataError>;

/// Loads every row of a tab-separated file as a submission.
///
/// The outer error is for problems with the file as a whole. Row numbers in
/// per-row errors start at 1 and do not count the header.
pub fn load_patients(path: &Path) -> Result<Vec<PatientRow>, DataError> {
    log::info!("Loading submissions from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    let columns_set: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    for field in FORM_FIELDS {
        if !columns_set.contains(field) {
            return Err(DataError::ColumnNotFound(field.to_string()));
        }
    }

    let year = internal::integer_column(&df, "year")?;
    let age = internal::numeric_column(&df, "age")?;
    let gender = internal::text_column(&df, "gender")?;
    let race = internal::text_column(&df, "race")?;
    let hypertension = internal::text_column(&df, "hypertension")?;
    let heart_disease = internal::text_column(&df, "heart_disease")?;
    let bmi = internal::numeric_column(&df, "bmi")?;
    let hba1c_level = internal::numeric_column(&df, "hbA1c_level")?;
    let blood_glucose_level = internal::integer_column(&df, "blood_glucose_level")?;
    let location = internal::text_column(&df, "location")?;
    let smoking_history = internal::text_column(&df, "smoking_history")?;

    let rows = (0..df.height())
        .map(|i| -> PatientRow {
            Ok(PatientInput {
                year: year.get(i)?,
                age: age.get(i)?,
                gender: gender.get(i)?,
                race: race.get(i)?,
                hypertension: hypertension.get(i)?,
                heart_disease: heart_disease.get(i)?,
                bmi: bmi.get(i)?,
                hba1c_level: hba1c_level.get(i)?,
                blood_glucose_level: blood_glucose_level.get(i)?,
                location: location.get(i)?,
                smoking_history: smoking_history.get(i)?,
            })
        })
        .collect::<Vec<_>>();

    let unreadable = rows.iter().filter(|row| row.is_err()).count();
    if unreadable > 0 {
        log::warn!("{unreadable} of {} rows could not be read", rows.len());
    }
    log::info!("Loaded {} submissions", rows.len());
    Ok(rows)
}

mod internal {
    use super::*;

    enum Cell<T> {
        Value(T),
        Missing,
        Invalid(String),
    }

    /// The cells of one input column, read once and handed out row by row.
    pub(super) struct Cells<T> {
        column_name: &'static str,
        expected_type: &'static str,
        cells: Vec<Cell<T>>,
    }

    impl<T: Clone> Cells<T> {
        pub(super) fn get(&self, row: usize) -> Result<T, DataError> {
            match &self.cells[row] {
                Cell::Value(value) => Ok(value.clone()),
                Cell::Missing => Err(DataError::MissingValue {
                    row: row + 1,
                    column_name: self.column_name.to_string(),
                }),
                Cell::Invalid(found) => Err(DataError::InvalidValue {
                    row: row + 1,
                    column_name: self.column_name.to_string(),
                    expected_type: self.expected_type,
                    found: found.clone(),
                }),
            }
        }
    }

    pub(super) fn numeric_column(
        df: &DataFrame,
        column_name: &'static str,
    ) -> Result<Cells<f64>, DataError> {
        let column = df.column(column_name)?;
        let casted = column
            .cast(&DataType::Float64)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", column.dtype()),
            })?;
        let text = column.cast(&DataType::String)?;

        let cells = casted
            .f64()?
            .into_iter()
            .zip(text.str()?.into_iter())
            .map(|(value, raw)| match (value, raw) {
                (Some(v), _) if v.is_finite() => Cell::Value(v),
                (Some(v), _) => Cell::Invalid(v.to_string()),
                (None, Some(raw)) if !raw.trim().is_empty() => Cell::Invalid(raw.to_string()),
                (None, _) => Cell::Missing,
            })
            .collect();
        Ok(Cells {
            column_name,
            expected_type: "a number",
            cells,
        })
    }

    pub(super) fn integer_column(
        df: &DataFrame,
        column_name: &'static str,
    ) -> Result<Cells<i64>, DataError> {
        let numeric = numeric_column(df, column_name)?;
        let cells = numeric
            .cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Value(v) if v.fract() == 0.0 => Cell::Value(v as i64),
                Cell::Value(v) => Cell::Invalid(v.to_string()),
                Cell::Missing => Cell::Missing,
                Cell::Invalid(raw) => Cell::Invalid(raw),
            })
            .collect();
        Ok(Cells {
            column_name,
            expected_type: "a whole number",
            cells,
        })
    }

    /// Empty text cells read as null and become `""`.
    pub(super) fn text_column(
        df: &DataFrame,
        column_name: &'static str,
    ) -> Result<Cells<String>, DataError> {
        let casted = df.column(column_name)?.cast(&DataType::String)?;
        let cells = casted
            .str()?
            .into_iter()
            .map(|value| Cell::Value(value.unwrap_or_default().to_string()))
            .collect();
        Ok(Cells {
            column_name,
            expected_type: "text",
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "year\tage\tgender\trace\thypertension\theart_disease\tbmi\thbA1c_level\tblood_glucose_level\tlocation\tsmoking_history";

    fn load(body: &str) -> Vec<PatientRow> {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("patients.tsv");
        fs::write(&path, format!("{HEADER}\n{body}")).expect("write");
        load_patients(&path).expect("load")
    }

    #[test]
    fn loads_each_row_as_a_submission() {
        let rows = load(
            "2023\t45\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n\
2021\t67.5\tFemale\tAsian\tYes\tNo\t31.2\t7.1\t210\tNew York\tNo Info\n",
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(
            *rows[0].as_ref().expect("row 1"),
            PatientInput {
                year: 2023,
                age: 45.0,
                gender: "Male".to_string(),
                race: "Caucasian".to_string(),
                hypertension: "No".to_string(),
                heart_disease: "No".to_string(),
                bmi: 28.0,
                hba1c_level: 5.8,
                blood_glucose_level: 100,
                location: "California".to_string(),
                smoking_history: "never".to_string(),
            }
        );
        let second = rows[1].as_ref().expect("row 2");
        assert_eq!(second.age, 67.5);
        assert_eq!(second.location, "New York");
        assert_eq!(second.smoking_history, "No Info");
    }

    #[test]
    fn empty_text_cell_is_read_as_empty_string() {
        let rows = load(
            "2023\t45\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n\
2023\t50\tFemale\tAsian\t\tYes\t30.0\t6.1\t140\tTexas\tformer\n",
        );
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        let second = rows[1].as_ref().expect("empty text cell keeps the row");
        assert_eq!(second.hypertension, "");
        assert_eq!(second.heart_disease, "Yes");
    }

    #[test]
    fn empty_numeric_cell_fails_only_its_row() {
        let rows = load(
            "2023\t\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n\
2023\t45\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n",
        );
        assert!(matches!(
            rows[0],
            Err(DataError::MissingValue { row: 1, ref column_name }) if column_name == "age"
        ));
        assert_eq!(rows[1].as_ref().expect("row 2").age, 45.0);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("patients.tsv");
        fs::write(&path, "year\tage\n2023\t45\n").expect("write");
        let err = load_patients(&path).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(ref c) if c == "gender"));
    }

    #[test]
    fn non_numeric_age_fails_only_its_row() {
        let rows = load(
            "2023\t45\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n\
2023\tforty\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n",
        );
        assert!(rows[0].is_ok());
        let err = rows[1].as_ref().unwrap_err();
        assert!(
            matches!(err, DataError::InvalidValue { row: 2, column_name, found, .. }
                if column_name == "age" && found == "forty"),
            "got {err:?}"
        );
    }

    #[test]
    fn fractional_year_is_rejected() {
        let rows = load("2023.5\t45\tMale\tCaucasian\tNo\tNo\t28.0\t5.8\t100\tCalifornia\tnever\n");
        assert!(
            matches!(rows[0], Err(DataError::InvalidValue { ref column_name, .. }) if column_name == "year")
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().expect("temp dir");
        let err = load_patients(&dir.path().join("absent.tsv")).unwrap_err();
        assert!(matches!(err, DataError::IoError(_)));
    }
}

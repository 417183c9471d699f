//! # Feature Builder
//!
//! Turns a [`PatientInput`] into the flat [`RawInputRecord`] the fitted
//! preprocessor was trained on. Two encodings happen here rather than inside
//! the preprocessor:
//!
//! - `hypertension` and `heart_disease` become 1 for the exact string `"Yes"`
//!   and 0 for anything else.
//! - `race` is expanded into one `race:<category>` indicator per entry of
//!   [`RACES`]. A race outside that list leaves all five indicators at 0.
//!
//! Every other field is passed through under its own name.

use crate::types::{FieldValue, PatientInput, RACES, RawInputRecord};

/// Prefix of the race indicator columns.
pub const RACE_PREFIX: &str = "race:";

/// Builds the single-row record for one submission.
pub fn build_record(input: &PatientInput) -> RawInputRecord {
    let mut fields: Vec<(String, FieldValue)> = vec![
        ("year".to_string(), FieldValue::Int(input.year)),
        ("age".to_string(), FieldValue::Float(input.age)),
        (
            "hypertension".to_string(),
            FieldValue::Int(encode_yes_no(&input.hypertension)),
        ),
        (
            "heart_disease".to_string(),
            FieldValue::Int(encode_yes_no(&input.heart_disease)),
        ),
        ("bmi".to_string(), FieldValue::Float(input.bmi)),
        ("hbA1c_level".to_string(), FieldValue::Float(input.hba1c_level)),
        (
            "blood_glucose_level".to_string(),
            FieldValue::Int(input.blood_glucose_level),
        ),
        ("gender".to_string(), FieldValue::Text(input.gender.clone())),
        ("location".to_string(), FieldValue::Text(input.location.clone())),
        (
            "smoking_history".to_string(),
            FieldValue::Text(input.smoking_history.clone()),
        ),
    ];

    fields.extend(
        race_indicators(&input.race)
            .into_iter()
            .map(|(name, flag)| (name, FieldValue::Int(flag))),
    );

    RawInputRecord::from_fields(fields)
}

/// Case-sensitive: only `"Yes"` maps to 1.
pub fn encode_yes_no(answer: &str) -> i64 {
    i64::from(answer == "Yes")
}

/// Indicator column name for a race category.
pub fn race_column(category: &str) -> String {
    format!("{RACE_PREFIX}{category}")
}

/// One `(column, 0|1)` pair per known race, in [`RACES`] order.
pub fn race_indicators(race: &str) -> Vec<(String, i64)> {
    RACES
        .iter()
        .map(|&category| (race_column(category), i64::from(race == category)))
        .collect()
}

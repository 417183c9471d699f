//! # Input Types
//!
//! The patient attributes collected for one submission and the flat record
//! the feature builder turns them into. Categorical fields stay plain strings:
//! the collector restricts them to the enumerations below, and anything that
//! slips past is left for the fitted transform to accept or reject.

use polars::prelude::*;

pub const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

/// Race categories expanded into `race:<category>` indicator columns.
pub const RACES: [&str; 5] = ["AfricanAmerican", "Asian", "Caucasian", "Hispanic", "Other"];

pub const YES_NO: [&str; 2] = ["No", "Yes"];

pub const SMOKING_HISTORIES: [&str; 6] =
    ["never", "current", "former", "not current", "ever", "No Info"];

pub const LOCATIONS: [&str; 55] = [
    "Alabama",
    "Alaska",
    "Arizona",
    "Arkansas",
    "California",
    "Colorado",
    "Connecticut",
    "Delaware",
    "District of Columbia",
    "Florida",
    "Georgia",
    "Guam",
    "Hawaii",
    "Idaho",
    "Illinois",
    "Indiana",
    "Iowa",
    "Kansas",
    "Kentucky",
    "Louisiana",
    "Maine",
    "Maryland",
    "Massachusetts",
    "Michigan",
    "Minnesota",
    "Mississippi",
    "Missouri",
    "Montana",
    "Nebraska",
    "Nevada",
    "New Hampshire",
    "New Jersey",
    "New Mexico",
    "New York",
    "North Carolina",
    "North Dakota",
    "Ohio",
    "Oklahoma",
    "Oregon",
    "Pennsylvania",
    "Puerto Rico",
    "Rhode Island",
    "South Carolina",
    "South Dakota",
    "Tennessee",
    "Texas",
    "United States",
    "Utah",
    "Vermont",
    "Virgin Islands",
    "Virginia",
    "Washington",
    "West Virginia",
    "Wisconsin",
    "Wyoming",
];

/// Column names of the collected fields, as they appear in batch files.
pub const FORM_FIELDS: [&str; 11] = [
    "year",
    "age",
    "gender",
    "race",
    "hypertension",
    "heart_disease",
    "bmi",
    "hbA1c_level",
    "blood_glucose_level",
    "location",
    "smoking_history",
];

/// The raw attributes of one patient, exactly as the collector gathered them.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInput {
    pub year: i64,
    pub age: f64,
    pub gender: String,
    pub race: String,
    /// "Yes" or "No".
    pub hypertension: String,
    /// "Yes" or "No".
    pub heart_disease: String,
    pub bmi: f64,
    pub hba1c_level: f64,
    pub blood_glucose_level: i64,
    pub location: String,
    pub smoking_history: String,
}

impl Default for PatientInput {
    fn default() -> Self {
        Self {
            year: 2023,
            age: 45.0,
            gender: GENDERS[0].to_string(),
            race: RACES[0].to_string(),
            hypertension: "No".to_string(),
            heart_disease: "No".to_string(),
            bmi: 28.0,
            hba1c_level: 5.8,
            blood_glucose_level: 100,
            location: LOCATIONS[0].to_string(),
            smoking_history: SMOKING_HISTORIES[0].to_string(),
        }
    }
}

/// A scalar held by one field of a [`RawInputRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// One submission flattened into named scalar fields, in insertion order.
///
/// Built once by [`crate::builder::build_record`] and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInputRecord {
    fields: Vec<(String, FieldValue)>,
}

impl RawInputRecord {
    pub(crate) fn from_fields(fields: Vec<(String, FieldValue)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Lays the record out as a one-row frame, one column per field.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .fields
            .iter()
            .map(|(name, value)| {
                let name = PlSmallStr::from(name.as_str());
                match value {
                    FieldValue::Int(v) => Column::new(name, [*v]),
                    FieldValue::Float(v) => Column::new(name, [*v]),
                    FieldValue::Text(v) => Column::new(name, [v.as_str()]),
                }
            })
            .collect::<Vec<_>>();
        DataFrame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_input_matches_form_defaults() {
        let input = PatientInput::default();
        assert_eq!(input.year, 2023);
        assert_eq!(input.age, 45.0);
        assert_eq!(input.gender, "Male");
        assert_eq!(input.race, "AfricanAmerican");
        assert_eq!(input.hypertension, "No");
        assert_eq!(input.location, "Alabama");
        assert_eq!(input.smoking_history, "never");
    }

    #[test]
    fn record_frame_has_one_row_per_submission() {
        let record = RawInputRecord::from_fields(vec![
            ("year".to_string(), FieldValue::Int(2023)),
            ("bmi".to_string(), FieldValue::Float(28.0)),
            ("gender".to_string(), FieldValue::Text("Male".to_string())),
        ]);
        let frame = record.to_frame().expect("frame");
        assert_eq!(frame.height(), 1);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.column("year").unwrap().dtype(), &DataType::Int64);
        assert_eq!(frame.column("bmi").unwrap().dtype(), &DataType::Float64);
        assert_eq!(frame.column("gender").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn field_lookup_by_name() {
        let record = RawInputRecord::from_fields(vec![(
            "race:Asian".to_string(),
            FieldValue::Int(1),
        )]);
        assert_eq!(record.get("race:Asian").and_then(FieldValue::as_f64), Some(1.0));
        assert!(record.get("race:Other").is_none());
        assert_eq!(record.names().collect::<Vec<_>>(), vec!["race:Asian"]);
    }
}

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::builder::PossibleValuesParser;
use clap::{Args, CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use std::path::PathBuf;
use std::process;

use glyco::artifacts::Artifacts;
use glyco::data::load_patients;
use glyco::preprocessor::Preprocessor;
use glyco::types::{GENDERS, LOCATIONS, PatientInput, RACES, SMOKING_HISTORIES, YES_NO};

#[derive(Parser)]
#[command(
    name = "glyco",
    about = "Check the likelihood of diabetes with a pre-trained classifier",
    long_about = "Collects patient attributes, aligns them with the feature schema of a fitted \
                  preprocessor, and reports the prediction of a fitted classifier."
)]
pub struct Cli {
    #[command(flatten)]
    pub artifacts: ArtifactArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args)]
pub struct ArtifactArgs {
    /// Path to the trained classifier (.toml)
    #[arg(long, global = true, default_value = "diabetes_model.toml")]
    pub model: PathBuf,

    /// Path to the fitted preprocessor (.toml)
    #[arg(long, global = true, default_value = "preprocessor.toml")]
    pub preprocessor: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict for one patient described on the command line
    #[command(about = "Predict for one patient (outputs the diagnosis label)")]
    Predict(PredictArgs),

    /// Predict for every row of a tab-separated file
    #[command(about = "Predict for every row of a TSV file (outputs row<TAB>label lines)")]
    Batch(BatchArgs),

    /// List the feature names the preprocessor declares
    #[command(about = "Print the expected feature schema of the preprocessor")]
    Schema,

    /// Display version information
    Version,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Year of the record
    #[arg(long, default_value_t = 2023, value_parser = clap::value_parser!(i64).range(2000..=2030))]
    pub year: i64,

    /// Age in years
    #[arg(long, default_value_t = 45.0, value_parser = parse_age)]
    pub age: f64,

    #[arg(long, default_value = GENDERS[0], value_parser = PossibleValuesParser::new(GENDERS))]
    pub gender: String,

    #[arg(long, default_value = RACES[0], value_parser = PossibleValuesParser::new(RACES))]
    pub race: String,

    #[arg(long, default_value = YES_NO[0], value_parser = PossibleValuesParser::new(YES_NO))]
    pub hypertension: String,

    #[arg(long, default_value = YES_NO[0], value_parser = PossibleValuesParser::new(YES_NO))]
    pub heart_disease: String,

    /// Body mass index
    #[arg(long, default_value_t = 28.0, value_parser = parse_bmi)]
    pub bmi: f64,

    /// HbA1c level (%)
    #[arg(long, default_value_t = 5.8, value_parser = parse_hba1c)]
    pub hba1c_level: f64,

    /// Blood glucose level (mg/dL)
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(i64).range(0..))]
    pub blood_glucose_level: i64,

    #[arg(long, default_value = LOCATIONS[0], value_parser = PossibleValuesParser::new(LOCATIONS))]
    pub location: String,

    #[arg(long, default_value = SMOKING_HISTORIES[0], value_parser = PossibleValuesParser::new(SMOKING_HISTORIES))]
    pub smoking_history: String,
}

impl From<PredictArgs> for PatientInput {
    fn from(args: PredictArgs) -> Self {
        Self {
            year: args.year,
            age: args.age,
            gender: args.gender,
            race: args.race,
            hypertension: args.hypertension,
            heart_disease: args.heart_disease,
            bmi: args.bmi,
            hba1c_level: args.hba1c_level,
            blood_glucose_level: args.blood_glucose_level,
            location: args.location,
            smoking_history: args.smoking_history,
        }
    }
}

#[derive(Args)]
pub struct BatchArgs {
    /// Path to a TSV file with one column per form field
    pub input: PathBuf,
}

fn parse_at_least(value: &str, min: f64) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !parsed.is_finite() || parsed < min {
        return Err(format!("must be a number no smaller than {min}"));
    }
    Ok(parsed)
}

fn parse_age(value: &str) -> Result<f64, String> {
    parse_at_least(value, 1.0)
}

fn parse_bmi(value: &str) -> Result<f64, String> {
    parse_at_least(value, 1.0)
}

fn parse_hba1c(value: &str) -> Result<f64, String> {
    parse_at_least(value, 0.0)
}

fn load_artifacts(args: &ArtifactArgs) -> Result<Artifacts, Box<dyn std::error::Error>> {
    println!("Loading preprocessor from: {}", args.preprocessor.display());
    println!("Loading model from: {}", args.model.display());
    Ok(Artifacts::load(&args.model, &args.preprocessor)?)
}

pub fn predict(artifacts: &Artifacts, args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let input = PatientInput::from(args);
    match artifacts.predict(&input) {
        Ok(diagnosis) => {
            println!("Prediction Result");
            println!("{diagnosis}");
        }
        Err(failure) => {
            eprintln!("{}", failure.message());
            eprintln!("{}", failure.trace());
        }
    }
    Ok(())
}

pub fn batch(artifacts: &Artifacts, args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let rows = load_patients(&args.input)?;
    println!("row\tprediction");

    let mut failures = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let patient = match row {
            Ok(patient) => patient,
            Err(e) => {
                failures += 1;
                println!("{}\t{e}", i + 1);
                continue;
            }
        };
        match artifacts.predict(patient) {
            Ok(diagnosis) => println!("{}\t{diagnosis}", i + 1),
            Err(failure) => {
                failures += 1;
                println!("{}\t{}", i + 1, failure.message());
                log::debug!("Row {} trace:\n{}", i + 1, failure.trace());
            }
        }
    }

    if failures > 0 {
        eprintln!(
            "{failures} of {} submissions could not be scored.",
            rows.len()
        );
    }
    Ok(())
}

pub fn schema(artifacts: &Artifacts) -> Result<(), Box<dyn std::error::Error>> {
    let names = artifacts.preprocessor.feature_names();
    println!("{} expected features:", names.len());
    println!("{}", names.iter().join("\n"));
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { artifacts, command } = Cli::parse();

    let result = match command {
        Some(Commands::Version) => {
            println!("glyco {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
        Some(command) => load_artifacts(&artifacts).and_then(|loaded| match command {
            Commands::Predict(args) => predict(&loaded, args),
            Commands::Batch(args) => batch(&loaded, args),
            Commands::Schema => schema(&loaded),
            Commands::Version => unreachable!("handled before loading artifacts"),
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Gender, StudentId, StudentRecord};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error on line {line}: {source}")]
    Csv {
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("line {line}: column '{column}' has invalid value '{value}'")]
    InvalidValue {
        line: usize,
        column: &'static str,
        value: String,
    },
}

/// Column layout of the student performance export.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "StudentID")]
    student_id: u32,
    #[serde(rename = "Age")]
    age: u8,
    #[serde(rename = "Gender")]
    gender: u8,
    #[serde(rename = "Ethnicity")]
    ethnicity: u8,
    #[serde(rename = "ParentalEducation")]
    parental_education: u8,
    #[serde(rename = "StudyTimeWeekly")]
    study_time_weekly: f64,
    #[serde(rename = "Absences")]
    absences: u32,
    #[serde(rename = "Tutoring")]
    tutoring: u8,
    #[serde(rename = "ParentalSupport")]
    parental_support: u8,
    #[serde(rename = "Extracurricular")]
    extracurricular: u8,
    #[serde(rename = "Sports")]
    sports: u8,
    #[serde(rename = "Music")]
    music: u8,
    #[serde(rename = "Volunteering")]
    volunteering: u8,
    #[serde(rename = "GPA")]
    gpa: f64,
    // exported as a float ("2.0") by some tools
    #[serde(rename = "GradeClass")]
    grade_class: f64,
}

impl CsvRow {
    fn into_record(self, line: usize) -> Result<StudentRecord, LoaderError> {
        let invalid = |column: &'static str, value: String| LoaderError::InvalidValue {
            line,
            column,
            value,
        };
        let flag = |column: &'static str, value: u8| match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(invalid(column, other.to_string())),
        };

        let gender = Gender::from_code(self.gender)
            .ok_or_else(|| invalid("Gender", self.gender.to_string()))?;
        if self.grade_class.fract() != 0.0 || !(0.0..=255.0).contains(&self.grade_class) {
            return Err(invalid("GradeClass", self.grade_class.to_string()));
        }

        Ok(StudentRecord {
            student_id: StudentId(self.student_id),
            age: self.age,
            gender,
            ethnicity: self.ethnicity,
            parental_education: self.parental_education,
            study_time_weekly: self.study_time_weekly,
            absences: self.absences,
            tutoring: flag("Tutoring", self.tutoring)?,
            parental_support: self.parental_support,
            extracurricular: flag("Extracurricular", self.extracurricular)?,
            sports: flag("Sports", self.sports)?,
            music: flag("Music", self.music)?,
            volunteering: flag("Volunteering", self.volunteering)?,
            gpa: self.gpa,
            grade_class: self.grade_class as u8,
        })
    }
}

/// Parses rows into records. Domain checks (GPA range, ordinal ranges) are
/// left to scoring so the caller can decide what to do with bad rows.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<StudentRecord>, LoaderError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let row = result.map_err(|source| LoaderError::Csv { line, source })?;
        records.push(row.into_record(line)?);
    }

    log::info!("loaded {} student records", records.len());
    Ok(records)
}

pub fn load_csv(path: &Path) -> Result<Vec<StudentRecord>, LoaderError> {
    let file = File::open(path)?;
    read_records(file)
}

use thiserror::Error;

use crate::models::StudentId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Cohort is empty")]
    EmptyCohort,

    #[error("Student {student_id}: field '{field}' out of range (got {value})")]
    DataValidation {
        student_id: StudentId,
        field: &'static str,
        value: f64,
    },

    #[error("Scenario parameter '{field}' must be a finite non-negative number (got {value})")]
    InvalidScenario { field: &'static str, value: f64 },

    #[error("Insufficient data: need at least {needed} values, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Correlation undefined: '{field}' has zero variance")]
    UndefinedCorrelation { field: String },
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

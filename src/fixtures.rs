use crate::models::{Gender, ScoredRecord, StudentId, StudentRecord};
use crate::risk;

pub fn sample_record(
    id: u32,
    gpa: f64,
    absences: u32,
    study_time: f64,
    support: u8,
    grade_class: u8,
) -> StudentRecord {
    StudentRecord {
        student_id: StudentId(id),
        age: 16,
        gender: Gender::Female,
        ethnicity: 0,
        parental_education: 2,
        study_time_weekly: study_time,
        absences,
        tutoring: false,
        parental_support: support,
        extracurricular: false,
        sports: false,
        music: false,
        volunteering: false,
        gpa,
        grade_class,
    }
}

/// Wraps a record with a fixed score, bypassing cohort normalization.
pub fn scored(record: StudentRecord, risk_score: f64) -> ScoredRecord {
    ScoredRecord {
        record,
        risk_score,
        risk_tier: risk::risk_tier(risk_score),
    }
}

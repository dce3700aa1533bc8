use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub u32);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Gender::Female),
            1 => Some(Gender::Male),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Male => "Male",
        }
    }
}

/// One row of the source table. Demographic and activity columns are only
/// used for slicing; scoring reads GPA, absences, study time, parental
/// support and grade class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_id: StudentId,
    pub age: u8,
    pub gender: Gender,
    pub ethnicity: u8,
    pub parental_education: u8,
    pub study_time_weekly: f64,
    pub absences: u32,
    pub tutoring: bool,
    pub parental_support: u8,
    pub extracurricular: bool,
    pub sports: bool,
    pub music: bool,
    pub volunteering: bool,
    pub gpa: f64,
    pub grade_class: u8,
}

impl StudentRecord {
    pub fn grade_letter(&self) -> Option<GradeLetter> {
        GradeLetter::from_class(self.grade_class)
    }

    /// Grade class 4 (F) is a fail.
    pub fn is_fail(&self) -> bool {
        self.grade_class == GradeLetter::F as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeLetter {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    F = 4,
}

impl GradeLetter {
    pub const ALL: [GradeLetter; 5] = [
        GradeLetter::A,
        GradeLetter::B,
        GradeLetter::C,
        GradeLetter::D,
        GradeLetter::F,
    ];

    pub fn from_class(grade_class: u8) -> Option<Self> {
        Self::ALL.get(grade_class as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            GradeLetter::A => "A",
            GradeLetter::B => "B",
            GradeLetter::C => "C",
            GradeLetter::D => "D",
            GradeLetter::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        }
    }

    pub fn recommended_action(self) -> &'static str {
        match self {
            RiskTier::Critical => "Immediate 1-on-1 counseling",
            RiskTier::High => "Weekly check-in + tutoring",
            RiskTier::Medium => "Bi-weekly monitoring",
            RiskTier::Low => "Standard support",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const PARENTAL_SUPPORT_LABELS: [&str; 5] = ["None", "Low", "Moderate", "High", "Very High"];
const PARENTAL_EDUCATION_LABELS: [&str; 5] = [
    "None",
    "High School",
    "Some College",
    "Bachelor's",
    "Higher",
];

pub fn parental_support_label(level: u8) -> Option<&'static str> {
    PARENTAL_SUPPORT_LABELS.get(level as usize).copied()
}

pub fn parental_education_label(level: u8) -> Option<&'static str> {
    PARENTAL_EDUCATION_LABELS.get(level as usize).copied()
}

/// A student record with its cohort-relative risk score attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: StudentRecord,
    pub risk_score: f64,
    pub risk_tier: RiskTier,
}

impl ScoredRecord {
    /// Score strictly above 55.
    pub fn is_at_risk(&self) -> bool {
        self.risk_score > crate::risk::AT_RISK_THRESHOLD
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub key: String,
    pub count: usize,
    pub share: f64,
    pub mean_gpa: Option<f64>,
    pub mean_absences: Option<f64>,
    pub mean_study_time: Option<f64>,
    pub mean_risk_score: Option<f64>,
    pub fail_count: usize,
    pub fail_rate: Option<f64>,
    /// Within-group correlation of the banded covariate with GPA, when the
    /// grouping key bands a continuous field and the correlation is defined.
    pub gpa_correlation: Option<f64>,
}

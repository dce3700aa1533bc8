use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{RiskTier, ScoredRecord, StudentRecord};

pub const GPA_WEIGHT: f64 = 35.0;
pub const ABSENCE_WEIGHT: f64 = 25.0;
pub const STUDY_TIME_WEIGHT: f64 = 20.0;
pub const PARENTAL_SUPPORT_WEIGHT: f64 = 10.0;
pub const GRADE_CLASS_WEIGHT: f64 = 10.0;

pub const AT_RISK_THRESHOLD: f64 = 55.0;

const MAX_GPA: f64 = 4.0;
const MAX_ORDINAL: u8 = 4;

/// Cohort-wide maxima used to normalize absences and study time. Scores are
/// only comparable between records scored against the same stats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortStats {
    pub max_absences: u32,
    pub max_study_time: f64,
}

impl CohortStats {
    pub fn from_records<'a, I>(records: I) -> AnalyticsResult<Self>
    where
        I: IntoIterator<Item = &'a StudentRecord>,
    {
        let mut iter = records.into_iter();
        let first = iter.next().ok_or(AnalyticsError::EmptyCohort)?;
        let mut stats = CohortStats {
            max_absences: first.absences,
            max_study_time: first.study_time_weekly,
        };
        for record in iter {
            stats.max_absences = stats.max_absences.max(record.absences);
            stats.max_study_time = stats.max_study_time.max(record.study_time_weekly);
        }
        Ok(stats)
    }
}

/// Result of one scoring pass. Records that failed validation are kept
/// aside with their error and excluded from the cohort maxima.
#[derive(Debug, Clone)]
pub struct ScoringPass {
    pub stats: CohortStats,
    pub scored: Vec<ScoredRecord>,
    pub rejected: Vec<AnalyticsError>,
}

impl ScoringPass {
    /// Fails on the first rejected record instead of dropping it.
    pub fn into_strict(self) -> AnalyticsResult<Vec<ScoredRecord>> {
        match self.rejected.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.scored),
        }
    }
}

pub fn validate(record: &StudentRecord) -> AnalyticsResult<()> {
    let invalid = |field: &'static str, value: f64| AnalyticsError::DataValidation {
        student_id: record.student_id,
        field,
        value,
    };

    if !(0.0..=MAX_GPA).contains(&record.gpa) {
        return Err(invalid("gpa", record.gpa));
    }
    if record.grade_class > MAX_ORDINAL {
        return Err(invalid("grade_class", f64::from(record.grade_class)));
    }
    if record.parental_support > MAX_ORDINAL {
        return Err(invalid("parental_support", f64::from(record.parental_support)));
    }
    if record.parental_education > MAX_ORDINAL {
        return Err(invalid(
            "parental_education",
            f64::from(record.parental_education),
        ));
    }
    if !record.study_time_weekly.is_finite() || record.study_time_weekly < 0.0 {
        return Err(invalid("study_time_weekly", record.study_time_weekly));
    }
    Ok(())
}

pub fn score_cohort(cohort: &[StudentRecord]) -> AnalyticsResult<ScoringPass> {
    if cohort.is_empty() {
        return Err(AnalyticsError::EmptyCohort);
    }

    let mut valid = Vec::with_capacity(cohort.len());
    let mut rejected = Vec::new();
    for record in cohort {
        match validate(record) {
            Ok(()) => valid.push(record),
            Err(err) => {
                log::warn!("rejecting record: {err}");
                rejected.push(err);
            }
        }
    }

    let stats = CohortStats::from_records(valid.iter().copied())?;
    log::debug!(
        "scoring {} records (max absences {}, max study time {:.2})",
        valid.len(),
        stats.max_absences,
        stats.max_study_time
    );

    let scored = valid
        .into_iter()
        .map(|record| {
            let risk_score = risk_score(record, &stats);
            ScoredRecord {
                record: record.clone(),
                risk_score,
                risk_tier: risk_tier(risk_score),
            }
        })
        .collect();

    Ok(ScoringPass {
        stats,
        scored,
        rejected,
    })
}

/// Composite score in [0, 100]. Only sound for a validated record scored
/// against stats drawn from its own cohort, so callers go through
/// [`score_cohort`].
pub(crate) fn risk_score(record: &StudentRecord, stats: &CohortStats) -> f64 {
    let gpa_term = (1.0 - record.gpa / MAX_GPA) * GPA_WEIGHT;

    let absence_term = if stats.max_absences == 0 {
        0.0
    } else {
        f64::from(record.absences) / f64::from(stats.max_absences) * ABSENCE_WEIGHT
    };

    let study_term = if stats.max_study_time <= 0.0 {
        0.0
    } else {
        (1.0 - record.study_time_weekly / stats.max_study_time) * STUDY_TIME_WEIGHT
    };

    let support_share = f64::from(record.parental_support) / f64::from(MAX_ORDINAL);
    let support_term = (1.0 - support_share) * PARENTAL_SUPPORT_WEIGHT;
    let grade_term = f64::from(record.grade_class) / f64::from(MAX_ORDINAL) * GRADE_CLASS_WEIGHT;

    round2(gpa_term + absence_term + study_term + support_term + grade_term)
}

/// Right-closed bins with the lowest edge included: [0,30], (30,55],
/// (55,75], (75,100].
pub fn risk_tier(score: f64) -> RiskTier {
    if score <= 30.0 {
        RiskTier::Low
    } else if score <= AT_RISK_THRESHOLD {
        RiskTier::Medium
    } else if score <= 75.0 {
        RiskTier::High
    } else {
        RiskTier::Critical
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_record;
    use crate::models::StudentId;

    fn four_student_cohort() -> Vec<StudentRecord> {
        vec![
            sample_record(1, 4.0, 0, 20.0, 4, 0),
            sample_record(2, 0.0, 30, 0.0, 0, 4),
            sample_record(3, 2.0, 15, 10.0, 2, 2),
            sample_record(4, 1.0, 10, 5.0, 2, 3),
        ]
    }

    #[test]
    fn extreme_records_hit_both_bounds() {
        let pass = score_cohort(&four_student_cohort()).unwrap();
        assert!(pass.rejected.is_empty());

        let best = &pass.scored[0];
        assert_eq!(best.risk_score, 0.0);
        assert_eq!(best.risk_tier, RiskTier::Low);

        let worst = &pass.scored[1];
        assert_eq!(worst.risk_score, 100.0);
        assert_eq!(worst.risk_tier, RiskTier::Critical);
    }

    #[test]
    fn middle_records_follow_weighted_formula() {
        let pass = score_cohort(&four_student_cohort()).unwrap();
        // 17.5 + 12.5 + 10 + 5 + 5
        assert_eq!(pass.scored[2].risk_score, 50.0);
        assert_eq!(pass.scored[2].risk_tier, RiskTier::Medium);
        // 26.25 + 8.33 + 15 + 5 + 7.5
        assert_eq!(pass.scored[3].risk_score, 62.08);
        assert_eq!(pass.scored[3].risk_tier, RiskTier::High);
    }

    #[test]
    fn tier_boundaries_belong_to_lower_tier() {
        assert_eq!(risk_tier(0.0), RiskTier::Low);
        assert_eq!(risk_tier(30.0), RiskTier::Low);
        assert_eq!(risk_tier(30.01), RiskTier::Medium);
        assert_eq!(risk_tier(55.0), RiskTier::Medium);
        assert_eq!(risk_tier(55.01), RiskTier::High);
        assert_eq!(risk_tier(75.0), RiskTier::High);
        assert_eq!(risk_tier(75.01), RiskTier::Critical);
        assert_eq!(risk_tier(100.0), RiskTier::Critical);
    }

    #[test]
    fn zero_absence_cohort_skips_absence_term() {
        let cohort = vec![
            sample_record(1, 2.0, 0, 10.0, 2, 2),
            sample_record(2, 3.0, 0, 5.0, 3, 1),
        ];
        let pass = score_cohort(&cohort).unwrap();
        assert_eq!(pass.stats.max_absences, 0);
        // 17.5 + 0 + 0 + 5 + 5
        assert_eq!(pass.scored[0].risk_score, 27.5);
    }

    #[test]
    fn zero_study_time_cohort_skips_study_term() {
        let cohort = vec![sample_record(1, 4.0, 0, 0.0, 4, 0)];
        let pass = score_cohort(&cohort).unwrap();
        assert_eq!(pass.scored[0].risk_score, 0.0);
    }

    #[test]
    fn empty_cohort_is_rejected() {
        assert_eq!(score_cohort(&[]).unwrap_err(), AnalyticsError::EmptyCohort);
    }

    #[test]
    fn invalid_records_are_rejected_individually() {
        let mut cohort = four_student_cohort();
        cohort.push(sample_record(9, 4.5, 100, 40.0, 2, 1));
        cohort.push(sample_record(10, 3.0, 1, 2.0, 2, 7));

        let pass = score_cohort(&cohort).unwrap();
        assert_eq!(pass.scored.len(), 4);
        assert_eq!(
            pass.rejected,
            vec![
                AnalyticsError::DataValidation {
                    student_id: StudentId(9),
                    field: "gpa",
                    value: 4.5,
                },
                AnalyticsError::DataValidation {
                    student_id: StudentId(10),
                    field: "grade_class",
                    value: 7.0,
                },
            ]
        );
        // rejected rows do not move the cohort maxima
        assert_eq!(pass.stats.max_absences, 30);
        assert_eq!(pass.scored[1].risk_score, 100.0);

        let strict = score_cohort(&cohort).unwrap().into_strict();
        assert!(matches!(
            strict,
            Err(AnalyticsError::DataValidation { field: "gpa", .. })
        ));
    }

    #[test]
    fn cohort_of_only_invalid_records_is_empty() {
        let cohort = vec![sample_record(1, -1.0, 0, 1.0, 0, 0)];
        assert_eq!(score_cohort(&cohort).unwrap_err(), AnalyticsError::EmptyCohort);
    }

    #[test]
    fn rescoring_is_idempotent() {
        let cohort = four_student_cohort();
        let first = score_cohort(&cohort).unwrap();
        let second = score_cohort(&cohort).unwrap();
        assert_eq!(first.scored, second.scored);
    }

    #[test]
    fn round2_rounds_half_up() {
        assert_eq!(round2(12.345678), 12.35);
        assert_eq!(round2(8.333333), 8.33);
        assert_eq!(round2(0.125), 0.13);
    }
}

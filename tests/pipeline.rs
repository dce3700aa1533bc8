use cohort_risk_analytics::cohort::{self, Banding, Field, GroupKey};
use cohort_risk_analytics::loader;
use cohort_risk_analytics::models::{Gender, RiskTier, StudentId, StudentRecord};
use cohort_risk_analytics::risk;
use cohort_risk_analytics::simulate::{self, BaselineStats, SimulationScenario};
use cohort_risk_analytics::AnalyticsError;
use proptest::prelude::*;

const EXPORT: &str = "\
StudentID,Age,Gender,Ethnicity,ParentalEducation,StudyTimeWeekly,Absences,Tutoring,ParentalSupport,Extracurricular,Sports,Music,Volunteering,GPA,GradeClass
1001,17,1,0,2,20.0,0,1,4,0,0,1,0,4.0,0.0
1002,18,0,0,1,0.0,30,0,0,0,0,0,0,0.0,4.0
1003,15,0,2,3,10.0,15,0,2,0,0,0,0,2.0,2.0
1004,17,1,1,2,5.0,10,0,2,1,0,0,0,1.0,3.0
1005,16,0,0,4,12.0,3,1,3,1,1,0,1,4.6,0.0
";

fn record(
    id: u32,
    gpa: f64,
    absences: u32,
    study_time: f64,
    support: u8,
    grade_class: u8,
) -> StudentRecord {
    StudentRecord {
        student_id: StudentId(id),
        age: 17,
        gender: if id % 2 == 0 { Gender::Male } else { Gender::Female },
        ethnicity: (id % 3) as u8,
        parental_education: 1,
        study_time_weekly: study_time,
        absences,
        tutoring: id % 4 == 0,
        parental_support: support,
        extracurricular: false,
        sports: false,
        music: false,
        volunteering: false,
        gpa,
        grade_class,
    }
}

#[test]
fn export_flows_through_scoring_grouping_and_simulation() {
    let records = loader::read_records(EXPORT.as_bytes()).unwrap();
    assert_eq!(records.len(), 5);

    let pass = risk::score_cohort(&records).unwrap();
    assert_eq!(pass.rejected.len(), 1);
    assert!(matches!(
        pass.rejected[0],
        AnalyticsError::DataValidation {
            student_id: StudentId(1005),
            field: "gpa",
            ..
        }
    ));

    let scored = pass.scored;
    assert_eq!(scored[0].risk_score, 0.0);
    assert_eq!(scored[0].risk_tier, RiskTier::Low);
    assert_eq!(scored[1].risk_score, 100.0);
    assert_eq!(scored[1].risk_tier, RiskTier::Critical);

    let tiers = cohort::group_by(&scored, &GroupKey::RiskTier).unwrap();
    let counts: Vec<usize> = tiers.iter().map(|t| t.count).collect();
    assert_eq!(counts, [1, 1, 1, 1]);

    let bands = cohort::group_by(&scored, &GroupKey::Band(Banding::absences())).unwrap();
    assert_eq!(bands.len(), 7);
    assert_eq!(bands[5].key, "26-30");
    assert_eq!(bands[5].count, 1);

    let baseline = BaselineStats::from_scored(&scored).unwrap();
    assert_eq!(baseline.total_students, 4);
    assert_eq!(baseline.fail_count, 1);
    assert_eq!(baseline.at_risk_count, 2);
    assert_eq!(baseline.avg_gpa_at_risk, 0.5);

    let result = simulate::simulate(&baseline, &SimulationScenario::default()).unwrap();
    // round(1 * 0.35 / 3.5) = round(0.1)
    assert_eq!(result.students_saved, 0);
    assert_eq!(result.tutored_count, 0);
    assert!(!result.target_met);
}

#[test]
fn linear_cohort_has_perfect_negative_correlation() {
    let cohort: Vec<StudentRecord> = (0..30u32)
        .map(|absences| {
            let gpa = 4.0 - 0.1 * f64::from(absences);
            record(absences, gpa, absences, 8.0, 2, 2)
        })
        .collect();
    let scored = risk::score_cohort(&cohort).unwrap().into_strict().unwrap();
    let r = cohort::correlate(&scored, Field::Absences, Field::Gpa).unwrap();
    assert!((r + 1.0).abs() < 1e-9);
}

#[test]
fn documented_simulation_example() {
    let baseline = BaselineStats {
        total_students: 1000,
        fail_count: 500,
        at_risk_count: 400,
        avg_gpa_at_risk: 1.0,
        avg_absences_at_risk: None,
    };
    let scenario = SimulationScenario {
        study_time_increase_hours: 5.0,
        absence_reduction: 5.0,
        tutoring_enrollment_pct: 20.0,
        cost_per_tutor: 500.0,
        mentoring: None,
    };
    let result = simulate::simulate(&baseline, &scenario).unwrap();
    assert!((result.gpa_lift - 0.35).abs() < 1e-12);
    assert_eq!(result.students_saved, 58);
    assert_eq!(result.new_fail_count, 442);
    assert_eq!(result.tutored_count, 80);
    assert_eq!(result.total_cost, 40_000.0);
    assert_eq!(result.cost_per_saved, 690.0);
}

#[test]
fn scenario_file_format_round_trips_through_serde() {
    let json = r#"{
        "study_time_increase_hours": 3,
        "absence_reduction": 4,
        "tutoring_enrollment_pct": 50,
        "cost_per_tutor": 450
    }"#;
    let scenario: SimulationScenario = serde_json::from_str(json).unwrap();
    assert_eq!(scenario.absence_reduction, 4.0);
    assert!(scenario.mentoring.is_none());
}

fn cohort_strategy() -> impl Strategy<Value = Vec<StudentRecord>> {
    prop::collection::vec(
        (0.0f64..=4.0, 0u32..40, 0.0f64..25.0, 0u8..=4, 0u8..=4),
        1..60,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, (gpa, absences, study, support, grade))| {
                record(idx as u32, gpa, absences, study, support, grade)
            })
            .collect()
    })
}

fn baseline_strategy() -> impl Strategy<Value = BaselineStats> {
    (1usize..5000, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=4.0).prop_map(
        |(total, fail_share, at_risk_share, avg_gpa_at_risk)| BaselineStats {
            total_students: total,
            fail_count: (total as f64 * fail_share) as usize,
            at_risk_count: (total as f64 * at_risk_share) as usize,
            avg_gpa_at_risk,
            avg_absences_at_risk: None,
        },
    )
}

proptest! {
    #[test]
    fn scores_stay_within_bounds(cohort in cohort_strategy()) {
        let pass = risk::score_cohort(&cohort).unwrap();
        prop_assert!(pass.rejected.is_empty());
        for scored in &pass.scored {
            prop_assert!((0.0..=100.0).contains(&scored.risk_score), "score {}", scored.risk_score);
            prop_assert_eq!(scored.risk_tier, risk::risk_tier(scored.risk_score));
        }
    }

    #[test]
    fn zero_absence_cohort_drops_absence_term(cohort in cohort_strategy()) {
        let cohort: Vec<StudentRecord> = cohort
            .into_iter()
            .map(|mut r| { r.absences = 0; r })
            .collect();
        let pass = risk::score_cohort(&cohort).unwrap();
        prop_assert_eq!(pass.stats.max_absences, 0);

        let max_study = pass.stats.max_study_time;
        for scored in &pass.scored {
            let r = &scored.record;
            let study_term = if max_study == 0.0 {
                0.0
            } else {
                (1.0 - r.study_time_weekly / max_study) * 20.0
            };
            let expected = risk::round2(
                (1.0 - r.gpa / 4.0) * 35.0
                    + study_term
                    + (1.0 - f64::from(r.parental_support) / 4.0) * 10.0
                    + f64::from(r.grade_class) / 4.0 * 10.0,
            );
            prop_assert_eq!(scored.risk_score, expected);
        }
    }

    #[test]
    fn correlation_is_symmetric_and_bounded(cohort in cohort_strategy()) {
        let scored = risk::score_cohort(&cohort).unwrap().scored;
        match cohort::correlate(&scored, Field::StudyTimeWeekly, Field::Gpa) {
            Ok(r) => {
                prop_assert!((-1.0..=1.0).contains(&r));
                let back = cohort::correlate(&scored, Field::Gpa, Field::StudyTimeWeekly).unwrap();
                prop_assert_eq!(r, back);
            }
            Err(err) => prop_assert!(matches!(
                err,
                AnalyticsError::InsufficientData { .. }
                    | AnalyticsError::UndefinedCorrelation { .. }
            ), "unexpected error: {:?}", err),
        }
    }

    #[test]
    fn more_effort_never_saves_fewer_students(
        baseline in baseline_strategy(),
        hours in 0.0f64..20.0,
        extra_hours in 0.0f64..20.0,
        absences in 0.0f64..20.0,
        extra_absences in 0.0f64..20.0,
    ) {
        let base = SimulationScenario {
            study_time_increase_hours: hours,
            absence_reduction: absences,
            ..SimulationScenario::default()
        };
        let more_study = SimulationScenario {
            study_time_increase_hours: hours + extra_hours,
            ..base.clone()
        };
        let fewer_absences = SimulationScenario {
            absence_reduction: absences + extra_absences,
            ..base.clone()
        };

        let saved = simulate::simulate(&baseline, &base).unwrap().students_saved;
        let saved_study = simulate::simulate(&baseline, &more_study).unwrap().students_saved;
        let saved_absences = simulate::simulate(&baseline, &fewer_absences).unwrap().students_saved;

        prop_assert!(saved <= saved_study);
        prop_assert!(saved <= saved_absences);
        prop_assert!(saved_study <= baseline.fail_count);
        prop_assert!(saved_absences <= baseline.fail_count);
    }

    #[test]
    fn perfect_gpa_baseline_saves_nobody(
        mut baseline in baseline_strategy(),
        hours in 0.0f64..50.0,
        absences in 0.0f64..50.0,
    ) {
        baseline.avg_gpa_at_risk = 4.0;
        let scenario = SimulationScenario {
            study_time_increase_hours: hours,
            absence_reduction: absences,
            ..SimulationScenario::default()
        };
        let result = simulate::simulate(&baseline, &scenario).unwrap();
        prop_assert_eq!(result.students_saved, 0);
        prop_assert_eq!(result.new_fail_count, baseline.fail_count);
    }
}

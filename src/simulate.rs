//! What-if projection of intervention programs onto aggregate fail counts.
//!
//! The simulator only sees cohort-level aggregates ([`BaselineStats`]); it
//! never touches individual records, so any number of scenarios can be
//! evaluated against one baseline, in parallel if needed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{RiskTier, ScoredRecord};

/// GPA points gained per extra weekly study hour.
pub const GPA_PER_STUDY_HOUR: f64 = 0.04;
/// GPA points gained per absence avoided.
pub const GPA_PER_ABSENCE_AVOIDED: f64 = 0.03;
/// A program meets its target when it saves at least one in this many of
/// the baseline fails (a 20% relative reduction).
pub const TARGET_SAVED_ONE_IN: usize = 5;
pub const DROPOUT_COST_PER_STUDENT: f64 = 30_000.0;

const MAX_GPA: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub total_students: usize,
    pub fail_count: usize,
    pub at_risk_count: usize,
    pub avg_gpa_at_risk: f64,
    pub avg_absences_at_risk: Option<f64>,
}

impl BaselineStats {
    /// With no at-risk students the at-risk GPA is taken as 4.0, which
    /// projects no students saved.
    pub fn from_scored(records: &[ScoredRecord]) -> AnalyticsResult<Self> {
        if records.is_empty() {
            return Err(AnalyticsError::EmptyCohort);
        }
        let at_risk: Vec<&ScoredRecord> = records.iter().filter(|s| s.is_at_risk()).collect();
        let at_risk_count = at_risk.len();
        let (avg_gpa_at_risk, avg_absences_at_risk) = if at_risk_count == 0 {
            (MAX_GPA, None)
        } else {
            let n = at_risk_count as f64;
            let gpa: f64 = at_risk.iter().map(|s| s.record.gpa).sum();
            let absences: f64 = at_risk.iter().map(|s| f64::from(s.record.absences)).sum();
            (gpa / n, Some(absences / n))
        };

        Ok(BaselineStats {
            total_students: records.len(),
            fail_count: records.iter().filter(|s| s.record.is_fail()).count(),
            at_risk_count,
            avg_gpa_at_risk,
            avg_absences_at_risk,
        })
    }

    pub fn fail_rate(&self) -> f64 {
        self.fail_count as f64 / self.total_students as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentoringPlan {
    pub enrollment_pct: f64,
    pub cost_per_mentor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationScenario {
    pub study_time_increase_hours: f64,
    pub absence_reduction: f64,
    pub tutoring_enrollment_pct: f64,
    pub cost_per_tutor: f64,
    #[serde(default)]
    pub mentoring: Option<MentoringPlan>,
}

impl Default for SimulationScenario {
    fn default() -> Self {
        SimulationScenario {
            study_time_increase_hours: 5.0,
            absence_reduction: 5.0,
            tutoring_enrollment_pct: 20.0,
            cost_per_tutor: 500.0,
            mentoring: None,
        }
    }
}

impl SimulationScenario {
    fn validate(&self) -> AnalyticsResult<()> {
        let mut params = vec![
            ("study_time_increase_hours", self.study_time_increase_hours),
            ("absence_reduction", self.absence_reduction),
            ("tutoring_enrollment_pct", self.tutoring_enrollment_pct),
            ("cost_per_tutor", self.cost_per_tutor),
        ];
        if let Some(plan) = &self.mentoring {
            params.push(("mentoring.enrollment_pct", plan.enrollment_pct));
            params.push(("mentoring.cost_per_mentor", plan.cost_per_mentor));
        }
        match params
            .into_iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            Some((field, value)) => Err(AnalyticsError::InvalidScenario { field, value }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub gpa_lift: f64,
    pub new_avg_gpa_at_risk: f64,
    pub students_saved: usize,
    pub baseline_fail_rate: f64,
    pub new_fail_count: usize,
    pub new_fail_rate: f64,
    pub reduction: f64,
    pub target_met: bool,
    pub tutored_count: usize,
    pub mentored_count: usize,
    pub tutoring_cost: f64,
    pub mentoring_cost: f64,
    pub total_cost: f64,
    pub cost_per_saved: f64,
}

pub fn simulate(
    baseline: &BaselineStats,
    scenario: &SimulationScenario,
) -> AnalyticsResult<SimulationResult> {
    if baseline.total_students == 0 {
        return Err(AnalyticsError::EmptyCohort);
    }
    scenario.validate()?;

    let gpa_lift = scenario.study_time_increase_hours * GPA_PER_STUDY_HOUR
        + scenario.absence_reduction * GPA_PER_ABSENCE_AVOIDED;
    let fail_count = baseline.fail_count as f64;

    let headroom = MAX_GPA - baseline.avg_gpa_at_risk;
    let students_saved = if headroom > 0.0 {
        round_count(fail_count * gpa_lift / headroom).min(baseline.fail_count)
    } else {
        0
    };

    let total = baseline.total_students as f64;
    let baseline_fail_rate = fail_count / total;
    let new_fail_count = baseline.fail_count - students_saved;
    let new_fail_rate = new_fail_count as f64 / total;
    let reduction = baseline_fail_rate - new_fail_rate;

    let at_risk = baseline.at_risk_count as f64;
    let tutored_count = round_count(at_risk * scenario.tutoring_enrollment_pct / 100.0);
    let tutoring_cost = tutored_count as f64 * scenario.cost_per_tutor;
    let (mentored_count, mentoring_cost) = match &scenario.mentoring {
        Some(plan) => {
            let mentored = round_count(at_risk * plan.enrollment_pct / 100.0);
            (mentored, mentored as f64 * plan.cost_per_mentor)
        }
        None => (0, 0.0),
    };
    let total_cost = tutoring_cost + mentoring_cost;
    let cost_per_saved = if students_saved > 0 {
        (total_cost / students_saved as f64).round()
    } else {
        0.0
    };

    Ok(SimulationResult {
        gpa_lift,
        new_avg_gpa_at_risk: baseline.avg_gpa_at_risk + gpa_lift,
        students_saved,
        baseline_fail_rate,
        new_fail_count,
        new_fail_rate,
        reduction,
        target_met: meets_target(students_saved, baseline.fail_count),
        tutored_count,
        mentored_count,
        tutoring_cost,
        mentoring_cost,
        total_cost,
        cost_per_saved,
    })
}

/// reduction / baseline rate == saved / fail count, so the target is
/// decided on whole counts.
fn meets_target(students_saved: usize, fail_count: usize) -> bool {
    students_saved * TARGET_SAVED_ONE_IN >= fail_count
}

/// Nearest integer, halves away from zero; negatives clamp to 0.
fn round_count(value: f64) -> usize {
    if value <= 0.0 {
        0
    } else {
        value.round() as usize
    }
}

/// Runs every scenario against the same baseline. Output order matches
/// input order.
pub fn sweep(
    baseline: &BaselineStats,
    scenarios: &[SimulationScenario],
) -> AnalyticsResult<Vec<SimulationResult>> {
    log::debug!("sweeping {} scenarios", scenarios.len());
    scenarios
        .par_iter()
        .map(|scenario| simulate(baseline, scenario))
        .collect()
}

/// Cartesian grid over whole study-hour and absence-reduction steps, with
/// the remaining parameters taken from `template`.
pub fn scenario_grid(
    template: &SimulationScenario,
    max_study_hours: u32,
    max_absence_reduction: u32,
) -> Vec<SimulationScenario> {
    (0..=max_study_hours)
        .flat_map(|hours| {
            (0..=max_absence_reduction).map(move |absences| SimulationScenario {
                study_time_increase_hours: f64::from(hours),
                absence_reduction: f64::from(absences),
                ..template.clone()
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramCosts {
    pub cost_per_tutor: f64,
    pub cost_per_mentor: f64,
}

impl Default for ProgramCosts {
    fn default() -> Self {
        ProgramCosts {
            cost_per_tutor: 500.0,
            cost_per_mentor: 300.0,
        }
    }
}

/// Share of each tier's students offered tutoring and mentoring, in percent.
pub fn tier_allocation_pct(tier: RiskTier) -> (f64, f64) {
    match tier {
        RiskTier::Low => (0.0, 0.0),
        RiskTier::Medium => (10.0, 5.0),
        RiskTier::High => (40.0, 30.0),
        RiskTier::Critical => (50.0, 65.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAllocation {
    pub tier: RiskTier,
    pub students: usize,
    pub share: f64,
    pub tutored: usize,
    pub mentored: usize,
    pub tutoring_cost: f64,
    pub mentoring_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub tiers: Vec<TierAllocation>,
    pub students_targeted: usize,
    pub budget: f64,
}

pub fn allocate_by_tier(
    records: &[ScoredRecord],
    costs: &ProgramCosts,
) -> AnalyticsResult<AllocationPlan> {
    if records.is_empty() {
        return Err(AnalyticsError::EmptyCohort);
    }
    let total = records.len() as f64;

    let tiers: Vec<TierAllocation> = RiskTier::ALL
        .iter()
        .map(|&tier| {
            let students = records.iter().filter(|s| s.risk_tier == tier).count();
            let (tutor_pct, mentor_pct) = tier_allocation_pct(tier);
            let tutored = round_count(students as f64 * tutor_pct / 100.0);
            let mentored = round_count(students as f64 * mentor_pct / 100.0);
            TierAllocation {
                tier,
                students,
                share: students as f64 / total,
                tutored,
                mentored,
                tutoring_cost: tutored as f64 * costs.cost_per_tutor,
                mentoring_cost: mentored as f64 * costs.cost_per_mentor,
            }
        })
        .collect();

    let students_targeted: usize = tiers.iter().map(|t| t.tutored + t.mentored).sum();
    let budget: f64 = tiers
        .iter()
        .map(|t| t.tutoring_cost + t.mentoring_cost)
        .sum();

    Ok(AllocationPlan {
        tiers,
        students_targeted,
        budget,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiSummary {
    pub budget: f64,
    pub students_targeted: usize,
    pub cost_per_targeted: f64,
    pub students_saved: usize,
    pub cost_per_saved: f64,
    pub dropout_cost_avoided: f64,
    pub net_roi: f64,
}

pub fn roi(plan: &AllocationPlan, students_saved: usize) -> RoiSummary {
    let per = |count: usize| {
        if count > 0 {
            (plan.budget / count as f64).round()
        } else {
            0.0
        }
    };
    let dropout_cost_avoided = students_saved as f64 * DROPOUT_COST_PER_STUDENT;

    RoiSummary {
        budget: plan.budget,
        students_targeted: plan.students_targeted,
        cost_per_targeted: per(plan.students_targeted),
        students_saved,
        cost_per_saved: per(students_saved),
        dropout_cost_avoided,
        net_roi: dropout_cost_avoided - plan.budget,
    }
}

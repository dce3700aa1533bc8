use std::fmt::Write;

use chrono::NaiveDate;

use crate::cohort::{self, Field, GroupKey};
use crate::error::AnalyticsResult;
use crate::models::{CohortSummary, ScoredRecord};
use crate::simulate::{self, BaselineStats, SimulationScenario};

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "n/a".to_string(),
    }
}

fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "n/a".to_string(),
    }
}

fn write_summary_table(output: &mut String, heading: &str, groups: &[CohortSummary]) {
    let _ = writeln!(
        output,
        "| {heading} | Students | Share | Avg GPA | Avg Absences | Avg Risk | Fail Rate |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");
    for group in groups {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} |",
            group.key,
            group.count,
            pct(Some(group.share)),
            fmt_opt(group.mean_gpa, 2),
            fmt_opt(group.mean_absences, 1),
            fmt_opt(group.mean_risk_score, 1),
            pct(group.fail_rate)
        );
    }
}

pub fn build_report(
    cohort_label: Option<&str>,
    generated_on: NaiveDate,
    records: &[ScoredRecord],
    scenario: &SimulationScenario,
) -> AnalyticsResult<String> {
    let kpis = cohort::overview(records)?;
    let tiers = cohort::group_by(records, &GroupKey::RiskTier)?;
    let grades = cohort::group_by(records, &GroupKey::Grade)?;
    let factors = cohort::factor_correlations(records)?;
    let baseline = BaselineStats::from_scored(records)?;
    let projection = simulate::simulate(&baseline, scenario)?;

    let mut output = String::new();
    let label = cohort_label.unwrap_or("full cohort");

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(output, "Generated for {label} on {generated_on}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Students: {}", kpis.total);
    let _ = writeln!(output, "- Average GPA: {:.2}", kpis.mean_gpa);
    let _ = writeln!(output, "- Pass rate: {}", pct(Some(kpis.pass_rate)));
    let _ = writeln!(output, "- Fail rate: {}", pct(Some(kpis.fail_rate)));
    let _ = writeln!(output, "- Average weekly study time: {:.1} hrs", kpis.mean_study_time);
    let _ = writeln!(output, "- Average absences: {:.1}", kpis.mean_absences);
    let _ = writeln!(
        output,
        "- At-risk (score > 55): {} ({})",
        kpis.at_risk_count,
        pct(Some(kpis.at_risk_rate))
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Tiers");
    write_summary_table(&mut output, "Tier", &tiers);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");
    write_summary_table(&mut output, "Grade", &grades);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Distribution");
    for field in [Field::Gpa, Field::StudyTimeWeekly, Field::Absences, Field::RiskScore] {
        if let Some(stats) = cohort::describe_field(records, field) {
            let _ = writeln!(
                output,
                "- {}: mean {:.2}, median {:.2}, sd {}, range {:.2}-{:.2}",
                field.label(),
                stats.mean,
                stats.median,
                fmt_opt(stats.std_dev, 2),
                stats.min,
                stats.max
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Factors Correlated with GPA");
    for factor in &factors {
        match (factor.coefficient, factor.impact) {
            (Some(r), Some(impact)) => {
                let _ = writeln!(
                    output,
                    "- {}: r = {:+.4} ({}, {})",
                    factor.factor.label(),
                    r,
                    impact.strength_label(),
                    impact.priority_label()
                );
            }
            _ => {
                let _ = writeln!(output, "- {}: undefined (constant)", factor.factor.label());
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fairness");
    for key in [GroupKey::Gender, GroupKey::Ethnicity] {
        let groups = cohort::group_by(records, &key)?;
        let rates: Vec<String> = groups
            .iter()
            .map(|g| format!("{} {}", g.key, pct(g.fail_rate)))
            .collect();
        match cohort::disparity(&groups) {
            Ok(check) => {
                let _ = writeln!(
                    output,
                    "- {}: {} (gap {:.1}pp, {})",
                    key.name(),
                    rates.join(", "),
                    check.gap * 100.0,
                    check.verdict.label()
                );
            }
            Err(_) => {
                let _ = writeln!(output, "- {}: only one group present", key.name());
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");
    let top = cohort::top_at_risk(records, 10);
    for scored in top.iter().filter(|s| s.is_at_risk()) {
        let _ = writeln!(
            output,
            "- {} score {:.2} ({}, GPA {:.2}, {} absences): {}",
            scored.record.student_id,
            scored.risk_score,
            scored.risk_tier,
            scored.record.gpa,
            scored.record.absences,
            scored.risk_tier.recommended_action()
        );
    }
    if !top.iter().any(|s| s.is_at_risk()) {
        let _ = writeln!(output, "No students above the at-risk threshold.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Intervention Projection");
    let _ = writeln!(
        output,
        "Scenario: +{} study hrs/week, {} fewer absences, {}% of at-risk tutored at ${:.0}",
        scenario.study_time_increase_hours,
        scenario.absence_reduction,
        scenario.tutoring_enrollment_pct,
        scenario.cost_per_tutor
    );
    let _ = writeln!(output, "- Students saved: {}", projection.students_saved);
    let _ = writeln!(
        output,
        "- Fail rate: {} -> {} ({:.1}pp reduction)",
        pct(Some(projection.baseline_fail_rate)),
        pct(Some(projection.new_fail_rate)),
        projection.reduction * 100.0
    );
    let _ = writeln!(
        output,
        "- 20% reduction target: {}",
        if projection.target_met { "met" } else { "not met" }
    );
    let _ = writeln!(output, "- Program cost: ${:.0}", projection.total_cost);
    let _ = writeln!(output, "- Cost per student saved: ${:.0}", projection.cost_per_saved);

    Ok(output)
}

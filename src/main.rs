use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use cohort_risk_analytics::cohort::{self, Banding, GroupKey};
use cohort_risk_analytics::loader;
use cohort_risk_analytics::models::ScoredRecord;
use cohort_risk_analytics::report;
use cohort_risk_analytics::risk;
use cohort_risk_analytics::simulate::{self, BaselineStats, MentoringPlan, SimulationScenario};

#[derive(Parser)]
#[command(name = "cohort-risk")]
#[command(about = "Student risk scoring and intervention simulator", long_about = None)]
struct Cli {
    /// Student performance CSV export
    #[arg(long, env = "STUDENT_DATA_CSV", global = true)]
    csv: Option<PathBuf>,
    /// Abort when any record fails validation instead of dropping it
    #[arg(long, global = true)]
    strict: bool,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupBy {
    Tier,
    Grade,
    Gender,
    Ethnicity,
    ParentalEducation,
    ParentalSupport,
    Tutoring,
    Extracurricular,
    Sports,
    Music,
    Volunteering,
    AbsenceBand,
    StudyBand,
    AgeBand,
}

impl GroupBy {
    fn key(self) -> GroupKey {
        match self {
            GroupBy::Tier => GroupKey::RiskTier,
            GroupBy::Grade => GroupKey::Grade,
            GroupBy::Gender => GroupKey::Gender,
            GroupBy::Ethnicity => GroupKey::Ethnicity,
            GroupBy::ParentalEducation => GroupKey::ParentalEducation,
            GroupBy::ParentalSupport => GroupKey::ParentalSupport,
            GroupBy::Tutoring => GroupKey::Tutoring,
            GroupBy::Extracurricular => GroupKey::Extracurricular,
            GroupBy::Sports => GroupKey::Sports,
            GroupBy::Music => GroupKey::Music,
            GroupBy::Volunteering => GroupKey::Volunteering,
            GroupBy::AbsenceBand => GroupKey::Band(Banding::absences()),
            GroupBy::StudyBand => GroupKey::Band(Banding::study_time()),
            GroupBy::AgeBand => GroupKey::Band(Banding::age()),
        }
    }
}

#[derive(clap::Args)]
struct ScenarioArgs {
    /// JSON file holding a full scenario; overrides the flags below
    #[arg(long)]
    scenario: Option<PathBuf>,
    #[arg(long, default_value_t = 5.0)]
    study_hours: f64,
    #[arg(long, default_value_t = 5.0)]
    absence_reduction: f64,
    #[arg(long, default_value_t = 20.0)]
    tutoring_pct: f64,
    #[arg(long, default_value_t = 500.0)]
    cost_per_tutor: f64,
    #[arg(long)]
    mentoring_pct: Option<f64>,
    #[arg(long, default_value_t = 300.0)]
    cost_per_mentor: f64,
}

impl ScenarioArgs {
    fn resolve(&self) -> anyhow::Result<SimulationScenario> {
        if let Some(path) = &self.scenario {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read scenario {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("invalid scenario in {}", path.display()));
        }
        Ok(SimulationScenario {
            study_time_increase_hours: self.study_hours,
            absence_reduction: self.absence_reduction,
            tutoring_enrollment_pct: self.tutoring_pct,
            cost_per_tutor: self.cost_per_tutor,
            mentoring: self.mentoring_pct.map(|enrollment_pct| MentoringPlan {
                enrollment_pct,
                cost_per_mentor: self.cost_per_mentor,
            }),
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the highest-risk students
    Score {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Summarize the cohort by a grouping key
    Group {
        #[arg(long, value_enum)]
        by: GroupBy,
    },
    /// Correlate each factor with GPA
    Correlate,
    /// Compare fail rates across gender and ethnicity
    Fairness,
    /// Project an intervention scenario
    Simulate {
        #[command(flatten)]
        scenario: ScenarioArgs,
    },
    /// Project a grid of study-time and absence-reduction scenarios
    Sweep {
        #[arg(long, default_value_t = 10)]
        max_study_hours: u32,
        #[arg(long, default_value_t = 15)]
        max_absence_reduction: u32,
        #[command(flatten)]
        scenario: ScenarioArgs,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[command(flatten)]
        scenario: ScenarioArgs,
    },
}

fn load_scored(csv: Option<&Path>, strict: bool) -> anyhow::Result<Vec<ScoredRecord>> {
    let path = csv.context("--csv or STUDENT_DATA_CSV must point at the student data export")?;
    let records = loader::load_csv(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let pass = risk::score_cohort(&records).context("failed to score cohort")?;
    if strict {
        return pass.into_strict().context("strict mode: invalid record");
    }
    if !pass.rejected.is_empty() {
        log::warn!("dropped {} invalid records", pass.rejected.len());
    }
    Ok(pass.scored)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let records = load_scored(cli.csv.as_deref(), cli.strict)?;

    match cli.command {
        Commands::Score { limit } => {
            let top = cohort::top_at_risk(&records, limit);
            if cli.json {
                return print_json(&top);
            }
            println!("Top students by risk score:");
            for scored in top {
                println!(
                    "- {} score {:.2} ({}) GPA {:.2}, {} absences, {:.1} study hrs: {}",
                    scored.record.student_id,
                    scored.risk_score,
                    scored.risk_tier,
                    scored.record.gpa,
                    scored.record.absences,
                    scored.record.study_time_weekly,
                    scored.risk_tier.recommended_action()
                );
            }
        }
        Commands::Group { by } => {
            let key = by.key();
            let groups = cohort::group_by(&records, &key)?;
            if cli.json {
                return print_json(&groups);
            }
            println!("{} breakdown:", key.name());
            for group in &groups {
                match group.mean_gpa {
                    Some(mean_gpa) => println!(
                        "- {}: {} students ({:.1}%), avg GPA {:.2}, avg risk {:.1}, fail rate {:.1}%",
                        group.key,
                        group.count,
                        group.share * 100.0,
                        mean_gpa,
                        group.mean_risk_score.unwrap_or_default(),
                        group.fail_rate.unwrap_or_default() * 100.0
                    ),
                    None => println!("- {}: no students", group.key),
                }
            }
        }
        Commands::Correlate => {
            let factors = cohort::factor_correlations(&records)?;
            if cli.json {
                return print_json(&factors);
            }
            println!("Correlation with GPA:");
            for factor in &factors {
                match (factor.coefficient, factor.impact) {
                    (Some(r), Some(impact)) => println!(
                        "- {}: {:+.4} ({})",
                        factor.factor.label(),
                        r,
                        impact.strength_label()
                    ),
                    _ => println!("- {}: undefined", factor.factor.label()),
                }
            }
        }
        Commands::Fairness => {
            let mut checks = Vec::new();
            for key in [GroupKey::Gender, GroupKey::Ethnicity] {
                let groups = cohort::group_by(&records, &key)?;
                let check = cohort::disparity(&groups)
                    .with_context(|| format!("cannot compare {} groups", key.name()))?;
                checks.push((key.name(), check));
            }
            if cli.json {
                return print_json(&checks);
            }
            for (name, check) in &checks {
                println!(
                    "- {name}: gap {:.1}pp between {} and {} -> {}",
                    check.gap * 100.0,
                    check.highest_group,
                    check.lowest_group,
                    check.verdict.label()
                );
            }
        }
        Commands::Simulate { scenario } => {
            let scenario = scenario.resolve()?;
            let baseline = BaselineStats::from_scored(&records)?;
            let result = simulate::simulate(&baseline, &scenario)?;
            if cli.json {
                return print_json(&result);
            }
            println!(
                "Students saved: {} (fail count {} -> {})",
                result.students_saved, baseline.fail_count, result.new_fail_count
            );
            println!(
                "Fail rate: {:.1}% -> {:.1}% ({:.1}pp reduction, target {})",
                result.baseline_fail_rate * 100.0,
                result.new_fail_rate * 100.0,
                result.reduction * 100.0,
                if result.target_met { "met" } else { "not met" }
            );
            println!(
                "Program cost: ${:.0} ({} tutored, {} mentored), ${:.0} per student saved",
                result.total_cost,
                result.tutored_count,
                result.mentored_count,
                result.cost_per_saved
            );
        }
        Commands::Sweep {
            max_study_hours,
            max_absence_reduction,
            scenario,
        } => {
            let template = scenario.resolve()?;
            let baseline = BaselineStats::from_scored(&records)?;
            let grid = simulate::scenario_grid(&template, max_study_hours, max_absence_reduction);
            let results = simulate::sweep(&baseline, &grid)?;
            if cli.json {
                let rows: Vec<_> = grid.iter().zip(&results).collect();
                return print_json(&rows);
            }
            println!("study_hours,absence_reduction,students_saved,new_fail_rate,target_met");
            for (scenario, result) in grid.iter().zip(&results) {
                println!(
                    "{},{},{},{:.4},{}",
                    scenario.study_time_increase_hours,
                    scenario.absence_reduction,
                    result.students_saved,
                    result.new_fail_rate,
                    result.target_met
                );
            }
        }
        Commands::Report {
            label,
            out,
            scenario,
        } => {
            let scenario = scenario.resolve()?;
            let today = chrono::Utc::now().date_naive();
            let text = report::build_report(label.as_deref(), today, &records, &scenario)?;
            std::fs::write(&out, text)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

//! Grouped summaries, correlations and fairness checks over a scored cohort.
//!
//! Every view the reports need (grade distribution, tier distribution,
//! tutoring impact, absence bands, ...) is a [`GroupKey`] handed to
//! [`group_by`]; nothing downstream re-derives its own aggregates.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{
    parental_education_label, parental_support_label, CohortSummary, Gender, GradeLetter,
    RiskTier, ScoredRecord,
};

/// Numeric columns that can be correlated or banded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Gpa,
    Absences,
    StudyTimeWeekly,
    ParentalSupport,
    ParentalEducation,
    GradeClass,
    Age,
    Tutoring,
    RiskScore,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Gpa => "GPA",
            Field::Absences => "Absences",
            Field::StudyTimeWeekly => "Study Time Weekly",
            Field::ParentalSupport => "Parental Support",
            Field::ParentalEducation => "Parental Education",
            Field::GradeClass => "Grade Class",
            Field::Age => "Age",
            Field::Tutoring => "Tutoring",
            Field::RiskScore => "Risk Score",
        }
    }

    pub fn value(self, scored: &ScoredRecord) -> f64 {
        let record = &scored.record;
        match self {
            Field::Gpa => record.gpa,
            Field::Absences => f64::from(record.absences),
            Field::StudyTimeWeekly => record.study_time_weekly,
            Field::ParentalSupport => f64::from(record.parental_support),
            Field::ParentalEducation => f64::from(record.parental_education),
            Field::GradeClass => f64::from(record.grade_class),
            Field::Age => f64::from(record.age),
            Field::Tutoring => f64::from(u8::from(record.tutoring)),
            Field::RiskScore => scored.risk_score,
        }
    }
}

/// Factors reported against GPA in the factor table.
pub const GPA_FACTORS: [Field; 6] = [
    Field::StudyTimeWeekly,
    Field::Absences,
    Field::ParentalSupport,
    Field::ParentalEducation,
    Field::Tutoring,
    Field::Age,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub label: String,
    pub min: f64,
    /// `None` for an open-ended top band.
    pub max: Option<f64>,
    pub closed_max: bool,
}

impl Band {
    /// `[min, max]`
    pub fn closed(label: impl Into<String>, min: f64, max: f64) -> Self {
        Band {
            label: label.into(),
            min,
            max: Some(max),
            closed_max: true,
        }
    }

    /// `[min, max)`
    pub fn half_open(label: impl Into<String>, min: f64, max: f64) -> Self {
        Band {
            label: label.into(),
            min,
            max: Some(max),
            closed_max: false,
        }
    }

    /// `[min, inf)`
    pub fn open_ended(label: impl Into<String>, min: f64) -> Self {
        Band {
            label: label.into(),
            min,
            max: None,
            closed_max: false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if value < self.min {
            return false;
        }
        match self.max {
            None => true,
            Some(max) if self.closed_max => value <= max,
            Some(max) => value < max,
        }
    }
}

/// A numeric field cut into labelled bands. The first band containing a
/// value wins; values outside every band are left ungrouped.
#[derive(Debug, Clone, PartialEq)]
pub struct Banding {
    pub field: Field,
    pub bands: Vec<Band>,
}

impl Banding {
    pub fn new(field: Field, bands: Vec<Band>) -> Self {
        Banding { field, bands }
    }

    pub fn absences() -> Self {
        let mut bands = vec![Band::closed("0-5", 0.0, 5.0)];
        for lo in (6..=26).step_by(5) {
            let hi = lo + 4;
            bands.push(Band::closed(
                format!("{lo}-{hi}"),
                f64::from(lo),
                f64::from(hi),
            ));
        }
        bands.push(Band::open_ended("31+", 31.0));
        Banding::new(Field::Absences, bands)
    }

    pub fn study_time() -> Self {
        let mut bands: Vec<Band> = (0..4)
            .map(|i| {
                let lo = i * 5;
                let hi = lo + 5;
                Band::half_open(format!("{lo}-{hi} hrs"), f64::from(lo), f64::from(hi))
            })
            .collect();
        bands.push(Band::open_ended("20+ hrs", 20.0));
        Banding::new(Field::StudyTimeWeekly, bands)
    }

    pub fn age() -> Self {
        Banding::new(
            Field::Age,
            vec![
                Band::closed("15-16", 15.0, 16.0),
                Band::closed("17-18", 17.0, 18.0),
            ],
        )
    }

    pub fn band_of(&self, value: f64) -> Option<usize> {
        self.bands.iter().position(|band| band.contains(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    RiskTier,
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
    Band(Banding),
}

impl GroupKey {
    pub fn name(&self) -> String {
        match self {
            GroupKey::RiskTier => "Risk Tier".to_string(),
            GroupKey::Grade => "Grade".to_string(),
            GroupKey::Gender => "Gender".to_string(),
            GroupKey::Ethnicity => "Ethnicity".to_string(),
            GroupKey::ParentalEducation => "Parental Education".to_string(),
            GroupKey::ParentalSupport => "Parental Support".to_string(),
            GroupKey::Tutoring => "Tutoring".to_string(),
            GroupKey::Extracurricular => "Extracurricular".to_string(),
            GroupKey::Sports => "Sports".to_string(),
            GroupKey::Music => "Music".to_string(),
            GroupKey::Volunteering => "Volunteering".to_string(),
            GroupKey::Band(banding) => format!("{} Band", banding.field.label()),
        }
    }

    /// All group slots known up front, in display order. `None` when the
    /// key's values are only discovered from the data.
    fn enumerate(&self) -> Option<Vec<(u32, String)>> {
        let slots: Vec<(u32, String)> = match self {
            GroupKey::RiskTier => RiskTier::ALL
                .iter()
                .map(|tier| (*tier as u32, tier.label().to_string()))
                .collect(),
            GroupKey::Grade => GradeLetter::ALL
                .iter()
                .map(|grade| (*grade as u32, grade.label().to_string()))
                .collect(),
            GroupKey::Gender => [Gender::Female, Gender::Male]
                .iter()
                .map(|gender| (*gender as u32, gender.label().to_string()))
                .collect(),
            GroupKey::Ethnicity => return None,
            GroupKey::ParentalEducation => (0..=4u8)
                .filter_map(|level| {
                    parental_education_label(level).map(|l| (u32::from(level), l.to_string()))
                })
                .collect(),
            GroupKey::ParentalSupport => (0..=4u8)
                .filter_map(|level| {
                    parental_support_label(level).map(|l| (u32::from(level), l.to_string()))
                })
                .collect(),
            GroupKey::Tutoring
            | GroupKey::Extracurricular
            | GroupKey::Sports
            | GroupKey::Music
            | GroupKey::Volunteering => [false, true]
                .iter()
                .map(|flag| (u32::from(*flag), self.flag_label(*flag)))
                .collect(),
            GroupKey::Band(banding) => banding
                .bands
                .iter()
                .enumerate()
                .map(|(idx, band)| (idx as u32, band.label.clone()))
                .collect(),
        };
        Some(slots)
    }

    fn flag_label(&self, flag: bool) -> String {
        match (self, flag) {
            (GroupKey::Tutoring, false) => "No Tutoring".to_string(),
            (GroupKey::Tutoring, true) => "With Tutoring".to_string(),
            (_, false) => "No".to_string(),
            (_, true) => "Yes".to_string(),
        }
    }

    fn classify(&self, scored: &ScoredRecord) -> Option<(u32, String)> {
        let record = &scored.record;
        let flag = |value: bool| Some((u32::from(value), self.flag_label(value)));
        match self {
            GroupKey::RiskTier => Some((
                scored.risk_tier as u32,
                scored.risk_tier.label().to_string(),
            )),
            GroupKey::Grade => record
                .grade_letter()
                .map(|grade| (grade as u32, grade.label().to_string())),
            GroupKey::Gender => Some((record.gender as u32, record.gender.label().to_string())),
            GroupKey::Ethnicity => Some((
                u32::from(record.ethnicity),
                format!("Ethnicity {}", record.ethnicity),
            )),
            GroupKey::ParentalEducation => parental_education_label(record.parental_education)
                .map(|l| (u32::from(record.parental_education), l.to_string())),
            GroupKey::ParentalSupport => parental_support_label(record.parental_support)
                .map(|l| (u32::from(record.parental_support), l.to_string())),
            GroupKey::Tutoring => flag(record.tutoring),
            GroupKey::Extracurricular => flag(record.extracurricular),
            GroupKey::Sports => flag(record.sports),
            GroupKey::Music => flag(record.music),
            GroupKey::Volunteering => flag(record.volunteering),
            GroupKey::Band(banding) => banding
                .band_of(banding.field.value(scored))
                .map(|idx| (idx as u32, banding.bands[idx].label.clone())),
        }
    }

    fn covariate(&self) -> Option<Field> {
        match self {
            GroupKey::Band(banding) if banding.field != Field::Gpa => Some(banding.field),
            _ => None,
        }
    }
}

pub fn group_by(records: &[ScoredRecord], key: &GroupKey) -> AnalyticsResult<Vec<CohortSummary>> {
    if records.is_empty() {
        return Err(AnalyticsError::EmptyCohort);
    }

    let mut groups: BTreeMap<u32, (String, Vec<&ScoredRecord>)> = key
        .enumerate()
        .unwrap_or_default()
        .into_iter()
        .map(|(slot, label)| (slot, (label, Vec::new())))
        .collect();

    let mut ungrouped = 0usize;
    for scored in records {
        match key.classify(scored) {
            Some((slot, label)) => groups
                .entry(slot)
                .or_insert_with(|| (label, Vec::new()))
                .1
                .push(scored),
            None => ungrouped += 1,
        }
    }
    if ungrouped > 0 {
        log::debug!("{ungrouped} records fall outside every '{}' group", key.name());
    }

    let total = records.len();
    let covariate = key.covariate();
    groups
        .into_values()
        .map(|(label, members)| summarize(label, &members, total, covariate))
        .collect()
}

fn summarize(
    key: String,
    members: &[&ScoredRecord],
    total: usize,
    covariate: Option<Field>,
) -> AnalyticsResult<CohortSummary> {
    let count = members.len();
    let fail_count = members.iter().filter(|s| s.record.is_fail()).count();
    let mean_of = |field: Field| mean(members.iter().map(|s| field.value(s)));

    let gpa_correlation = match covariate {
        Some(field) => group_correlation(&key, members, field)?,
        None => None,
    };

    Ok(CohortSummary {
        key,
        count,
        share: count as f64 / total as f64,
        mean_gpa: mean_of(Field::Gpa),
        mean_absences: mean_of(Field::Absences),
        mean_study_time: mean_of(Field::StudyTimeWeekly),
        mean_risk_score: mean_of(Field::RiskScore),
        fail_count,
        fail_rate: (count > 0).then(|| fail_count as f64 / count as f64),
        gpa_correlation,
    })
}

/// Groups too small or too uniform to correlate report `None`; empty slots
/// are never correlated.
fn group_correlation(
    key: &str,
    members: &[&ScoredRecord],
    field: Field,
) -> AnalyticsResult<Option<f64>> {
    if members.is_empty() {
        return Ok(None);
    }
    match correlate(members.iter().copied(), field, Field::Gpa) {
        Ok(r) => Ok(Some(r)),
        Err(err @ AnalyticsError::InsufficientData { .. })
        | Err(err @ AnalyticsError::UndefinedCorrelation { .. }) => {
            log::debug!("no GPA correlation for group '{key}': {err}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn correlate<'a, I>(records: I, a: Field, b: Field) -> AnalyticsResult<f64>
where
    I: IntoIterator<Item = &'a ScoredRecord>,
{
    let (xs, ys): (Vec<f64>, Vec<f64>) = records
        .into_iter()
        .map(|scored| (a.value(scored), b.value(scored)))
        .unzip();
    pearson(&xs, &ys, a.label(), b.label())
}

/// Pearson correlation coefficient of two equally long series.
pub fn pearson(xs: &[f64], ys: &[f64], x_name: &str, y_name: &str) -> AnalyticsResult<f64> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return Err(AnalyticsError::EmptyCohort);
    }
    if n < 2 {
        return Err(AnalyticsError::InsufficientData { needed: 2, got: n });
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    for (series, name) in [(xs, x_name), (ys, y_name)] {
        if series.iter().all(|v| *v == series[0]) {
            return Err(AnalyticsError::UndefinedCorrelation {
                field: name.to_string(),
            });
        }
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    Ok((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ImpactLevel {
    Negligible,
    Weak,
    Moderate,
    Strong,
}

impl ImpactLevel {
    pub fn classify(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude >= 0.5 {
            ImpactLevel::Strong
        } else if magnitude >= 0.3 {
            ImpactLevel::Moderate
        } else if magnitude >= 0.1 {
            ImpactLevel::Weak
        } else {
            ImpactLevel::Negligible
        }
    }

    pub fn strength_label(self) -> &'static str {
        match self {
            ImpactLevel::Strong => "Strong",
            ImpactLevel::Moderate => "Moderate",
            ImpactLevel::Weak => "Weak",
            ImpactLevel::Negligible => "Negligible",
        }
    }

    /// Label used when the factor table is read as an action priority.
    pub fn priority_label(self) -> &'static str {
        match self {
            ImpactLevel::Strong => "Critical",
            ImpactLevel::Moderate => "Important",
            ImpactLevel::Weak => "Monitor",
            ImpactLevel::Negligible => "Negligible",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorCorrelation {
    pub factor: Field,
    /// `None` when the factor (or GPA) is constant across the cohort.
    pub coefficient: Option<f64>,
    pub impact: Option<ImpactLevel>,
}

pub fn factor_correlations(records: &[ScoredRecord]) -> AnalyticsResult<Vec<FactorCorrelation>> {
    GPA_FACTORS
        .iter()
        .map(|&factor| {
            let coefficient = match correlate(records, factor, Field::Gpa) {
                Ok(r) => Some(r),
                Err(AnalyticsError::UndefinedCorrelation { field }) => {
                    log::info!(
                        "correlation of {} with GPA undefined: {field} is constant",
                        factor.label()
                    );
                    None
                }
                Err(err) => return Err(err),
            };
            Ok(FactorCorrelation {
                factor,
                coefficient,
                impact: coefficient.map(ImpactLevel::classify),
            })
        })
        .collect()
}

pub const DISPARITY_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisparityVerdict {
    Acceptable,
    ReviewNeeded,
}

impl DisparityVerdict {
    pub fn label(self) -> &'static str {
        match self {
            DisparityVerdict::Acceptable => "ACCEPTABLE",
            DisparityVerdict::ReviewNeeded => "REVIEW NEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisparityCheck {
    pub highest_group: String,
    pub lowest_group: String,
    pub gap: f64,
    pub verdict: DisparityVerdict,
}

pub fn disparity_gap(fail_rates: &[f64]) -> AnalyticsResult<f64> {
    if fail_rates.len() < 2 {
        return Err(AnalyticsError::InsufficientData {
            needed: 2,
            got: fail_rates.len(),
        });
    }
    let max = fail_rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = fail_rates.iter().copied().fold(f64::INFINITY, f64::min);
    Ok(max - min)
}

pub fn verdict_for(gap: f64) -> DisparityVerdict {
    if gap > DISPARITY_THRESHOLD {
        DisparityVerdict::ReviewNeeded
    } else {
        DisparityVerdict::Acceptable
    }
}

/// Compares fail rates across the non-empty groups of one grouping.
pub fn disparity(summaries: &[CohortSummary]) -> AnalyticsResult<DisparityCheck> {
    let rated: Vec<(&str, f64)> = summaries
        .iter()
        .filter_map(|s| s.fail_rate.map(|rate| (s.key.as_str(), rate)))
        .collect();
    let rates: Vec<f64> = rated.iter().map(|(_, rate)| *rate).collect();
    let gap = disparity_gap(&rates)?;

    let highest = rated
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(key, _)| key.to_string());
    let lowest = rated
        .iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(key, _)| key.to_string());

    Ok(DisparityCheck {
        highest_group: highest.unwrap_or_default(),
        lowest_group: lowest.unwrap_or_default(),
        gap,
        verdict: verdict_for(gap),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; undefined for a single value.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Option<DescriptiveStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };
    let std_dev = (count > 1).then(|| {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    });

    Some(DescriptiveStats {
        count,
        mean,
        median,
        std_dev,
        min: sorted[0],
        max: sorted[count - 1],
    })
}

pub fn describe_field(records: &[ScoredRecord], field: Field) -> Option<DescriptiveStats> {
    let values: Vec<f64> = records.iter().map(|s| field.value(s)).collect();
    describe(&values)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortOverview {
    pub total: usize,
    pub mean_gpa: f64,
    pub pass_rate: f64,
    pub fail_rate: f64,
    pub mean_study_time: f64,
    pub mean_absences: f64,
    pub at_risk_count: usize,
    pub at_risk_rate: f64,
}

pub fn overview(records: &[ScoredRecord]) -> AnalyticsResult<CohortOverview> {
    if records.is_empty() {
        return Err(AnalyticsError::EmptyCohort);
    }
    let total = records.len();
    let n = total as f64;
    let fail_count = records.iter().filter(|s| s.record.is_fail()).count();
    let at_risk_count = records.iter().filter(|s| s.is_at_risk()).count();
    let sum = |field: Field| records.iter().map(|s| field.value(s)).sum::<f64>();

    Ok(CohortOverview {
        total,
        mean_gpa: sum(Field::Gpa) / n,
        pass_rate: (total - fail_count) as f64 / n,
        fail_rate: fail_count as f64 / n,
        mean_study_time: sum(Field::StudyTimeWeekly) / n,
        mean_absences: sum(Field::Absences) / n,
        at_risk_count,
        at_risk_rate: at_risk_count as f64 / n,
    })
}

/// Highest risk first; ties broken by ascending student id.
pub fn top_at_risk(records: &[ScoredRecord], limit: usize) -> Vec<&ScoredRecord> {
    let mut ranked: Vec<&ScoredRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.record.student_id.cmp(&b.record.student_id))
    });
    ranked.truncate(limit);
    ranked
}

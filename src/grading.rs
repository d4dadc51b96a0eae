use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

pub const PERFORMANCE_WEIGHT: f64 = 45.0;
pub const PROFICIENCY_WEIGHT: f64 = 35.0;
pub const PROFESSIONALISM_WEIGHT: f64 = 20.0;
pub const MAX_RATING: f64 = 5.0;
pub const NOMINAL_STATUS: &str = "Operational";
pub const CHECKLIST_LEN: usize = 6;

/// The rating block attached to a transmission and to validated stats.
///
/// `final_score` and `incentive_pct` are only ever derived from the three
/// sub-ratings, so the block has no setters. Stored graded blocks are
/// re-derived on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRatings")]
pub struct Ratings {
    performance: f64,
    proficiency: f64,
    professionalism: f64,
    final_score: u32,
    incentive_pct: f64,
}

impl Ratings {
    /// Supervisor grading: derives the weighted score and incentive tier.
    pub fn graded(performance: f64, proficiency: f64, professionalism: f64) -> Self {
        let final_score = weighted_score(performance, proficiency, professionalism);
        Self {
            performance,
            proficiency,
            professionalism,
            final_score,
            incentive_pct: incentive_tier(final_score),
        }
    }

    /// Advisory block computed at submission time; score fields stay at zero
    /// until a supervisor grades the transmission.
    pub fn suggested(performance: f64, proficiency: f64, professionalism: f64) -> Self {
        Self {
            performance,
            proficiency,
            professionalism,
            final_score: 0,
            incentive_pct: 0.0,
        }
    }

    pub fn performance(&self) -> f64 {
        self.performance
    }

    pub fn proficiency(&self) -> f64 {
        self.proficiency
    }

    pub fn professionalism(&self) -> f64 {
        self.professionalism
    }

    pub fn final_score(&self) -> u32 {
        self.final_score
    }

    pub fn incentive_pct(&self) -> f64 {
        self.incentive_pct
    }

    pub fn is_graded(&self) -> bool {
        self.final_score > 0
    }

    pub fn check_range(&self) -> Result<(), PolicyError> {
        check_rating("performance", self.performance)?;
        check_rating("proficiency", self.proficiency)?;
        check_rating("professionalism", self.professionalism)?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRatings {
    performance: f64,
    proficiency: f64,
    professionalism: f64,
    #[serde(default)]
    final_score: u32,
}

impl From<StoredRatings> for Ratings {
    fn from(stored: StoredRatings) -> Self {
        let StoredRatings {
            performance,
            proficiency,
            professionalism,
            final_score,
        } = stored;
        if final_score > 0 {
            Ratings::graded(performance, proficiency, professionalism)
        } else {
            Ratings::suggested(performance, proficiency, professionalism)
        }
    }
}

/// A manual rating must be a finite value in `[0, 5]`.
pub fn check_rating(field: &'static str, value: f64) -> Result<f64, PolicyError> {
    if value.is_finite() && (0.0..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(PolicyError::RatingOutOfRange(field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClassification {
    Installation,
    PreventiveMaintenance,
    ReactiveRepair,
    EmergencyResponse,
    SiteSurvey,
}

impl JobClassification {
    pub const ALL: [JobClassification; 5] = [
        JobClassification::Installation,
        JobClassification::PreventiveMaintenance,
        JobClassification::ReactiveRepair,
        JobClassification::EmergencyResponse,
        JobClassification::SiteSurvey,
    ];

    pub fn label(self) -> &'static str {
        match self {
            JobClassification::Installation => "Installation",
            JobClassification::PreventiveMaintenance => "Preventive Maintenance",
            JobClassification::ReactiveRepair => "Reactive Repair",
            JobClassification::EmergencyResponse => "Emergency Response",
            JobClassification::SiteSurvey => "Site Survey",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    pub fn complexity_base(self) -> f64 {
        match self {
            JobClassification::EmergencyResponse => 5.0,
            JobClassification::ReactiveRepair | JobClassification::Installation => 4.5,
            JobClassification::PreventiveMaintenance | JobClassification::SiteSurvey => 4.0,
        }
    }

    pub fn checklist(self) -> [&'static str; CHECKLIST_LEN] {
        match self {
            JobClassification::Installation => [
                "Hardware Mounting Secure",
                "Cable Routing Compliance",
                "Initial Power-On Test",
                "Signal Strength Validation",
                "PPE Compliance Verified",
                "Work Area Hazard Sweep",
            ],
            JobClassification::PreventiveMaintenance => [
                "Voltage Levels Verified",
                "Connectivity Stability Check",
                "Firmware Integrity Audit",
                "Physical Wear Inspection",
                "PPE Compliance Verified",
                "Work Area Hazard Sweep",
            ],
            JobClassification::ReactiveRepair => [
                "Fault Root Cause Identified",
                "Component Replacement Done",
                "Functional Restoration Test",
                "Worksite Hazard Clearance",
                "PPE Compliance Verified",
                "Work Area Hazard Sweep",
            ],
            JobClassification::EmergencyResponse => [
                "Critical System Bypass",
                "Emergency Power Restoration",
                "Secure Data Recovery Init",
                "Incident Severity Logged",
                "PPE Compliance Verified",
                "Work Area Hazard Sweep",
            ],
            JobClassification::SiteSurvey => [
                "Structural Dimension Audit",
                "Signal Obstruction Check",
                "Power Source Availability",
                "Environmental Risk Analysis",
                "PPE Compliance Verified",
                "Work Area Hazard Sweep",
            ],
        }
    }
}

/// Checklist for a raw job-type label; unknown labels use the installation list.
pub fn checklist_for(job_type: &str) -> [&'static str; CHECKLIST_LEN] {
    JobClassification::from_label(job_type)
        .unwrap_or(JobClassification::Installation)
        .checklist()
}

/// Raw activity-log attributes the automatic suggestion is computed from.
#[derive(Debug, Clone, Copy)]
pub struct ActivityEvidence<'a> {
    pub job_type: &'a str,
    pub system_status: &'a str,
    pub checklist_completed: usize,
    pub report_len: usize,
    pub attachment_count: usize,
}

pub fn weighted_score(performance: f64, proficiency: f64, professionalism: f64) -> u32 {
    let total = performance / MAX_RATING * PERFORMANCE_WEIGHT
        + proficiency / MAX_RATING * PROFICIENCY_WEIGHT
        + professionalism / MAX_RATING * PROFESSIONALISM_WEIGHT;
    total.round().max(0.0) as u32
}

pub fn incentive_tier(final_score: u32) -> f64 {
    match final_score {
        90.. => 1.0,
        85..=89 => 0.75,
        80..=84 => 0.5,
        75..=79 => 0.25,
        _ => 0.0,
    }
}

pub fn suggest_ratings(evidence: &ActivityEvidence<'_>) -> Ratings {
    let mut performance = JobClassification::from_label(evidence.job_type)
        .map(JobClassification::complexity_base)
        .unwrap_or(4.0);
    if evidence.system_status != NOMINAL_STATUS {
        performance -= 0.5;
    }

    let proficiency =
        (evidence.checklist_completed as f64 / CHECKLIST_LEN as f64 * MAX_RATING).min(MAX_RATING);

    let report_score = (evidence.report_len as f64 / 300.0 * 2.5).min(2.5);
    let attachment_score = (evidence.attachment_count as f64 / 3.0 * 2.5).min(2.5);
    let professionalism = (report_score + attachment_score + 2.0).clamp(3.0, MAX_RATING);

    Ratings::suggested(
        one_decimal(performance),
        one_decimal(proficiency),
        one_decimal(professionalism),
    )
}

/// Manual slider positions shown to a supervisor before grading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualGrades {
    pub performance: f64,
    pub proficiency: f64,
    pub professionalism: f64,
}

impl ManualGrades {
    pub fn into_ratings(self) -> Result<Ratings, PolicyError> {
        let ratings = Ratings::graded(self.performance, self.proficiency, self.professionalism);
        ratings.check_range()?;
        Ok(ratings)
    }
}

impl Default for ManualGrades {
    fn default() -> Self {
        Self {
            performance: MAX_RATING,
            proficiency: MAX_RATING,
            professionalism: MAX_RATING,
        }
    }
}

/// Any ratings already on the transmission only seed the controls; the
/// supervisor's final values always win.
pub fn prefill(existing: Option<&Ratings>) -> ManualGrades {
    existing
        .map(|ratings| ManualGrades {
            performance: ratings.performance,
            proficiency: ratings.proficiency,
            professionalism: ratings.professionalism,
        })
        .unwrap_or_default()
}

pub fn improvement_hint(ratings: &Ratings) -> &'static str {
    let hints = [
        (
            ratings.performance,
            "Focus on reducing field response times and optimizing task execution speed.",
        ),
        (
            ratings.proficiency,
            "Request advanced node calibration training to improve technical accuracy.",
        ),
        (
            ratings.professionalism,
            "Ensure all logs include high-fidelity proof-of-work per ISO standards.",
        ),
    ];

    let (lowest, hint) = hints
        .into_iter()
        .fold(hints[0], |acc, item| if item.0 < acc.0 { item } else { acc });

    if lowest >= 4.5 {
        "Exceptional metrics detected. Maintain technical excellence."
    } else {
        hint
    }
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence<'a>(job_type: &'a str, status: &'a str) -> ActivityEvidence<'a> {
        ActivityEvidence {
            job_type,
            system_status: status,
            checklist_completed: 6,
            report_len: 300,
            attachment_count: 3,
        }
    }

    #[test]
    fn incentive_follows_score_brackets() {
        assert_eq!(incentive_tier(100), 1.0);
        assert_eq!(incentive_tier(90), 1.0);
        assert_eq!(incentive_tier(89), 0.75);
        assert_eq!(incentive_tier(85), 0.75);
        assert_eq!(incentive_tier(84), 0.5);
        assert_eq!(incentive_tier(80), 0.5);
        assert_eq!(incentive_tier(79), 0.25);
        assert_eq!(incentive_tier(75), 0.25);
        assert_eq!(incentive_tier(74), 0.0);
        assert_eq!(incentive_tier(0), 0.0);
    }

    #[test]
    fn weighted_score_matches_formula() {
        assert_eq!(weighted_score(5.0, 5.0, 5.0), 100);
        assert_eq!(weighted_score(5.0, 5.0, 4.0), 96);
        assert_eq!(weighted_score(0.0, 0.0, 0.0), 0);
        assert_eq!(weighted_score(3.0, 4.0, 2.0), 63);
        assert_eq!(weighted_score(4.0, 4.0, 4.0), 80);
    }

    #[test]
    fn weighted_score_is_monotonic_in_each_rating() {
        let steps: Vec<f64> = (0..=10).map(|step| step as f64 * 0.5).collect();
        for &p in &steps {
            for &q in &steps {
                for window in steps.windows(2) {
                    let (low, high) = (window[0], window[1]);
                    assert!(weighted_score(low, p, q) <= weighted_score(high, p, q));
                    assert!(weighted_score(p, low, q) <= weighted_score(p, high, q));
                    assert!(weighted_score(p, q, low) <= weighted_score(p, q, high));
                }
            }
        }
    }

    #[test]
    fn graded_ratings_derive_score_and_tier_together() {
        let ratings = Ratings::graded(5.0, 5.0, 4.0);
        assert_eq!(ratings.final_score(), 96);
        assert_eq!(ratings.incentive_pct(), 1.0);
        assert!(ratings.is_graded());

        let ratings = Ratings::graded(4.0, 4.0, 4.0);
        assert_eq!(ratings.final_score(), 80);
        assert_eq!(ratings.incentive_pct(), 0.5);
    }

    #[test]
    fn suggestion_uses_complexity_table() {
        let ratings = suggest_ratings(&evidence("Emergency Response", NOMINAL_STATUS));
        assert_eq!(ratings.performance(), 5.0);
        assert_eq!(ratings.final_score(), 0);
        assert_eq!(ratings.incentive_pct(), 0.0);

        let ratings = suggest_ratings(&evidence("Site Survey", "Degraded"));
        assert_eq!(ratings.performance(), 3.5);

        let ratings = suggest_ratings(&evidence("Negotiation", NOMINAL_STATUS));
        assert_eq!(ratings.performance(), 4.0);
    }

    #[test]
    fn professionalism_is_clamped() {
        let mut sparse = evidence("Installation", NOMINAL_STATUS);
        sparse.report_len = 0;
        sparse.attachment_count = 0;
        assert_eq!(suggest_ratings(&sparse).professionalism(), 3.0);

        let mut rich = evidence("Installation", NOMINAL_STATUS);
        rich.report_len = 5_000;
        rich.attachment_count = 12;
        assert_eq!(suggest_ratings(&rich).professionalism(), 5.0);

        let mut middle = evidence("Installation", NOMINAL_STATUS);
        middle.report_len = 150;
        middle.attachment_count = 0;
        assert_eq!(suggest_ratings(&middle).professionalism(), 3.3);
    }

    #[test]
    fn proficiency_caps_at_full_checklist() {
        let mut over = evidence("Installation", NOMINAL_STATUS);
        over.checklist_completed = 9;
        assert_eq!(suggest_ratings(&over).proficiency(), 5.0);

        let mut partial = evidence("Installation", NOMINAL_STATUS);
        partial.checklist_completed = 3;
        assert_eq!(suggest_ratings(&partial).proficiency(), 2.5);
    }

    #[test]
    fn unknown_job_type_uses_installation_checklist() {
        assert_eq!(checklist_for("Negotiation"), JobClassification::Installation.checklist());
        assert_eq!(checklist_for("Site Survey")[0], "Structural Dimension Audit");
    }

    #[test]
    fn prefill_defaults_to_full_marks() {
        assert_eq!(prefill(None), ManualGrades::default());
        let suggested = Ratings::suggested(4.5, 3.3, 5.0);
        let grades = prefill(Some(&suggested));
        assert_eq!(grades.performance, 4.5);
        assert_eq!(grades.proficiency, 3.3);
    }

    #[test]
    fn hint_targets_lowest_rating() {
        let ratings = Ratings::graded(5.0, 3.0, 4.0);
        assert!(improvement_hint(&ratings).contains("calibration training"));

        let ratings = Ratings::graded(5.0, 4.5, 4.8);
        assert!(improvement_hint(&ratings).starts_with("Exceptional"));
    }

    #[test]
    fn manual_grades_outside_the_scale_are_refused() {
        let too_high = ManualGrades {
            performance: 9.0,
            ..ManualGrades::default()
        };
        assert_eq!(
            too_high.into_ratings(),
            Err(PolicyError::RatingOutOfRange("performance"))
        );

        let not_a_number = ManualGrades {
            professionalism: f64::NAN,
            ..ManualGrades::default()
        };
        assert_eq!(
            not_a_number.into_ratings(),
            Err(PolicyError::RatingOutOfRange("professionalism"))
        );

        assert_eq!(ManualGrades::default().into_ratings().unwrap().final_score(), 100);
    }

    #[test]
    fn stored_graded_blocks_are_rederived() {
        let tampered = r#"{"performance":5.0,"proficiency":5.0,"professionalism":4.0,"finalScore":12,"incentivePct":0.0}"#;
        let ratings: Ratings = serde_json::from_str(tampered).unwrap();
        assert_eq!(ratings.final_score(), 96);
        assert_eq!(ratings.incentive_pct(), 1.0);

        let suggestion = r#"{"performance":4.5,"proficiency":3.3,"professionalism":5.0,"finalScore":0,"incentivePct":0}"#;
        let ratings: Ratings = serde_json::from_str(suggestion).unwrap();
        assert!(!ratings.is_graded());
        assert_eq!(ratings.proficiency(), 3.3);
    }
}

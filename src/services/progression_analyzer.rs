//! Longitudinal progression math over a photo session's analyses (§4.11.4, §4.11.5).
//!
//! Pure functions over extracted measurement points; no I/O, no LLM calls. The caller
//! (`photo_pipeline`) is responsible for loading `PhotoAnalysis` rows in chronological
//! order and handing them here.

use crate::models::{FollowUpSuggestion, PhotoAnalysis, ProgressionAnalysis, ProgressionResult, RiskIndicators};
use chrono::{DateTime, Utc};

const DEADBAND_MM: f64 = 0.5;
const ACCELERATION_DEADBAND_MM_PER_WEEK: f64 = 0.05;

/// One analysis's extracted clinically-relevant facts, pulled out of its free-form
/// `analysis_data_json`/`comparison_json` blobs. Absent keys default conservatively.
#[derive(Debug, Clone)]
pub struct ProgressionPoint {
    pub at: DateTime<Utc>,
    pub size_mm: Option<f64>,
    pub red_flags: Vec<String>,
    pub trend: Option<String>,
    pub color_darkening: bool,
    pub border_irregularity: bool,
    pub new_colors: bool,
    pub asymmetry_increasing: bool,
}

pub fn extract_points(analyses: &[PhotoAnalysis]) -> Vec<ProgressionPoint> {
    analyses
        .iter()
        .map(|analysis| {
            let data = analysis.analysis_data();
            let comparison: serde_json::Value =
                analysis.comparison_json.as_deref().and_then(|s| serde_json::from_str(s).ok()).unwrap_or(serde_json::Value::Null);

            ProgressionPoint {
                at: analysis.created_at,
                size_mm: data["key_measurements"]["size_estimate_mm"].as_f64(),
                red_flags: data["red_flags"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
                    .unwrap_or_default(),
                trend: comparison["trend"].as_str().map(|s| s.to_string()),
                color_darkening: comparison["color_darkening"].as_bool().unwrap_or(false),
                border_irregularity: comparison["border_irregularity"].as_bool().unwrap_or(false),
                new_colors: comparison["new_colors_appearing"].as_bool().unwrap_or(false),
                asymmetry_increasing: comparison["asymmetry_increasing"].as_bool().unwrap_or(false),
            }
        })
        .collect()
}

/// Expects `points` already ordered by `at` ascending. Fewer than two analyses can't
/// establish a trend (§8's boundary case); mirrors the donor's `insufficient_data` sentinel
/// instead of computing zero-valued metrics off a single point.
pub fn analyze(points: &[ProgressionPoint]) -> ProgressionResult {
    if points.len() < 2 {
        return ProgressionResult::insufficient_data();
    }

    let sized: Vec<&ProgressionPoint> = points.iter().filter(|p| p.size_mm.is_some()).collect();

    let velocity_mm_per_week = velocity(&sized);
    let acceleration = acceleration(&sized);
    let last_size = sized.last().and_then(|p| p.size_mm).unwrap_or(0.0);
    let projected_size_30d = last_size + (velocity_mm_per_week / 7.0) * 30.0;
    let overall_trend = overall_trend(&sized);
    let monitoring_phase = monitoring_phase(points.len(), &overall_trend);
    let risk_indicators = risk_indicators(&sized, points);
    let overall_risk_level = match risk_indicators.true_count() {
        0 => "low",
        1..=2 => "moderate",
        _ => "high",
    }
    .to_string();

    ProgressionResult::Analysis(ProgressionAnalysis {
        velocity_mm_per_week,
        acceleration,
        projected_size_30d,
        overall_trend,
        monitoring_phase,
        risk_indicators,
        overall_risk_level,
    })
}

fn velocity(sized: &[&ProgressionPoint]) -> f64 {
    let (Some(first), Some(last)) = (sized.first(), sized.last()) else { return 0.0 };
    if std::ptr::eq(*first, *last) {
        return 0.0;
    }
    let weeks = (last.at - first.at).num_seconds() as f64 / (7.0 * 86400.0);
    if weeks <= 0.0 {
        return 0.0;
    }
    (last.size_mm.unwrap() - first.size_mm.unwrap()) / weeks
}

fn acceleration(sized: &[&ProgressionPoint]) -> String {
    if sized.len() < 3 {
        return "stable".to_string();
    }
    let mid = sized.len() / 2;
    let first_half = &sized[..=mid.max(1)];
    let second_half = &sized[mid..];

    let first_rate = half_rate(first_half);
    let second_rate = half_rate(second_half);
    let delta = second_rate - first_rate;

    if delta > ACCELERATION_DEADBAND_MM_PER_WEEK {
        "increasing".to_string()
    } else if delta < -ACCELERATION_DEADBAND_MM_PER_WEEK {
        "decreasing".to_string()
    } else {
        "stable".to_string()
    }
}

fn half_rate(half: &[&ProgressionPoint]) -> f64 {
    let (Some(first), Some(last)) = (half.first(), half.last()) else { return 0.0 };
    if std::ptr::eq(*first, *last) {
        return 0.0;
    }
    let weeks = (last.at - first.at).num_seconds() as f64 / (7.0 * 86400.0);
    if weeks <= 0.0 {
        return 0.0;
    }
    (last.size_mm.unwrap() - first.size_mm.unwrap()) / weeks
}

fn overall_trend(sized: &[&ProgressionPoint]) -> String {
    let (Some(first), Some(last)) = (sized.first(), sized.last()) else { return "stable".to_string() };
    let net_change = last.size_mm.unwrap() - first.size_mm.unwrap();
    if net_change > DEADBAND_MM {
        "growing".to_string()
    } else if net_change < -DEADBAND_MM {
        "shrinking".to_string()
    } else {
        "stable".to_string()
    }
}

fn monitoring_phase(analysis_count: usize, overall_trend: &str) -> String {
    if analysis_count <= 2 {
        "initial".to_string()
    } else if analysis_count <= 5 && overall_trend != "stable" {
        "active_monitoring".to_string()
    } else if analysis_count > 5 && overall_trend == "stable" {
        "maintenance".to_string()
    } else {
        "ongoing".to_string()
    }
}

fn risk_indicators(sized: &[&ProgressionPoint], all_points: &[ProgressionPoint]) -> RiskIndicators {
    let rapid_growth = sized.windows(2).any(|pair| {
        let (prev, next) = (pair[0].size_mm.unwrap(), pair[1].size_mm.unwrap());
        prev > 0.0 && (next - prev) / prev * 100.0 > 20.0
    });

    RiskIndicators {
        rapid_growth,
        color_darkening: all_points.iter().any(|p| p.color_darkening),
        border_irregularity_increase: all_points.iter().any(|p| p.border_irregularity),
        new_colors_appearing: all_points.iter().any(|p| p.new_colors),
        asymmetry_increasing: all_points.iter().any(|p| p.asymmetry_increasing),
    }
}

/// Condition-specific clinical threshold note (§4.11.4's closing sentence). Not part of
/// the persisted `ProgressionAnalysis` shape; callers append it to report text as needed.
pub fn clinical_threshold_note(condition_name: &str, last_size_mm: Option<f64>) -> Option<String> {
    let condition = condition_name.to_lowercase();
    let is_mole_or_lesion = condition.contains("mole") || condition.contains("lesion") || condition.contains("nevus");
    match (is_mole_or_lesion, last_size_mm) {
        (true, Some(size)) if size >= 6.0 => {
            Some("Size has reached or exceeded 6mm; recommend dermatology review.".to_string())
        }
        _ => None,
    }
}

/// Recommended follow-up interval and priority (§4.11.5).
pub fn suggest_follow_up(
    progression: &ProgressionAnalysis,
    red_flags_total: u32,
    change_significance: &str,
    ai_optimal_interval_days: Option<f64>,
) -> FollowUpSuggestion {
    suggest_follow_up_for_condition(progression, red_flags_total, change_significance, ai_optimal_interval_days, None, None)
}

/// As [`suggest_follow_up`], additionally attaching a condition-specific clinical
/// threshold note (§4.11.4's closing sentence) when the condition name and last
/// measured size warrant one.
pub fn suggest_follow_up_for_condition(
    progression: &ProgressionAnalysis,
    red_flags_total: u32,
    change_significance: &str,
    ai_optimal_interval_days: Option<f64>,
    condition_name: Option<&str>,
    last_size_mm: Option<f64>,
) -> FollowUpSuggestion {
    let mut days: f64 = if progression.monitoring_phase == "initial" {
        7.0
    } else if progression.overall_trend == "growing" {
        3.0
    } else if progression.overall_trend == "shrinking" {
        21.0
    } else {
        14.0
    };

    if progression.acceleration == "increasing" {
        days = (days / 2.0).max(2.0);
    } else if progression.acceleration == "decreasing" {
        days = (days * 1.5).min(30.0);
    }

    if red_flags_total > 0 {
        days = days.min(7.0);
    }

    if progression.monitoring_phase == "active_monitoring" {
        days = days.min(7.0);
    } else if progression.monitoring_phase == "maintenance" {
        days = days.max(30.0);
    }

    if let Some(optimal) = ai_optimal_interval_days {
        days = (days + optimal) / 2.0;
    }

    let priority = if red_flags_total > 0 || change_significance == "critical" {
        "urgent"
    } else if progression.overall_trend == "growing" || progression.acceleration == "increasing" {
        "important"
    } else {
        "routine"
    };

    let clinical_note = condition_name.and_then(|name| clinical_threshold_note(name, last_size_mm));

    FollowUpSuggestion { interval_days: days.round() as i32, priority: priority.to_string(), clinical_note }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn point(days_offset: i64, size_mm: f64) -> ProgressionPoint {
        ProgressionPoint {
            at: Utc::now() + Duration::days(days_offset),
            size_mm: Some(size_mm),
            red_flags: vec![],
            trend: None,
            color_darkening: false,
            border_irregularity: false,
            new_colors: false,
            asymmetry_increasing: false,
        }
    }

    #[test]
    fn velocity_is_positive_for_a_growing_series() {
        let points = vec![point(0, 4.0), point(7, 4.0), point(14, 6.0)];
        let result = analyze(&points).as_analysis().expect("sufficient points").clone();
        assert!(result.velocity_mm_per_week > 0.0);
        assert_eq!(result.overall_trend, "growing");
    }

    #[test]
    fn stable_series_stays_within_deadband() {
        let points = vec![point(0, 5.0), point(7, 5.1), point(14, 5.2)];
        let result = analyze(&points).as_analysis().expect("sufficient points").clone();
        assert_eq!(result.overall_trend, "stable");
    }

    #[test]
    fn acceleration_requires_at_least_three_points() {
        let points = vec![point(0, 4.0), point(7, 6.0)];
        let result = analyze(&points).as_analysis().expect("sufficient points").clone();
        assert_eq!(result.acceleration, "stable");
    }

    #[test]
    fn rapid_growth_flag_trips_on_a_large_step_increase() {
        let points = vec![point(0, 5.0), point(7, 7.0)];
        let result = analyze(&points).as_analysis().expect("sufficient points").clone();
        assert!(result.risk_indicators.rapid_growth);
    }

    #[test]
    fn monitoring_phase_is_initial_for_two_or_fewer_analyses() {
        let points = vec![point(0, 4.0), point(7, 4.1)];
        let result = analyze(&points).as_analysis().expect("sufficient points").clone();
        assert_eq!(result.monitoring_phase, "initial");
    }

    #[test]
    fn single_analysis_returns_insufficient_data() {
        let points = vec![point(0, 4.0)];
        let result = analyze(&points);
        assert!(result.as_analysis().is_none());
        match result {
            ProgressionResult::InsufficientData { status, .. } => assert_eq!(status, "insufficient_data"),
            ProgressionResult::Analysis(_) => panic!("expected insufficient_data for a single analysis"),
        }
    }

    #[test]
    fn zero_analyses_returns_insufficient_data() {
        let result = analyze(&[]);
        assert!(result.as_analysis().is_none());
    }

    #[test]
    fn clinical_note_triggers_at_six_millimeters_for_a_mole() {
        assert!(clinical_threshold_note("Mole on left shoulder", Some(6.2)).is_some());
        assert!(clinical_threshold_note("Mole on left shoulder", Some(3.0)).is_none());
        assert!(clinical_threshold_note("Rash on forearm", Some(8.0)).is_none());
    }

    #[test]
    fn follow_up_suggestion_escalates_to_urgent_on_red_flags() {
        let progression = ProgressionAnalysis {
            velocity_mm_per_week: 0.0,
            acceleration: "stable".into(),
            projected_size_30d: 5.0,
            overall_trend: "stable".into(),
            monitoring_phase: "ongoing".into(),
            risk_indicators: RiskIndicators::default(),
            overall_risk_level: "low".into(),
        };
        let suggestion = suggest_follow_up(&progression, 2, "moderate", None);
        assert_eq!(suggestion.priority, "urgent");
        assert!(suggestion.interval_days <= 7);
    }

    #[test]
    fn follow_up_suggestion_averages_with_ai_optimal_interval() {
        let progression = ProgressionAnalysis {
            velocity_mm_per_week: 0.0,
            acceleration: "stable".into(),
            projected_size_30d: 5.0,
            overall_trend: "stable".into(),
            monitoring_phase: "ongoing".into(),
            risk_indicators: RiskIndicators::default(),
            overall_risk_level: "low".into(),
        };
        let without_ai = suggest_follow_up(&progression, 0, "minor", None);
        let with_ai = suggest_follow_up(&progression, 0, "minor", Some(28.0));
        assert!(with_ai.interval_days > without_ai.interval_days);
    }

    #[test]
    fn follow_up_suggestion_for_condition_attaches_clinical_note_for_a_large_mole() {
        let progression = ProgressionAnalysis {
            velocity_mm_per_week: 0.0,
            acceleration: "stable".into(),
            projected_size_30d: 7.0,
            overall_trend: "stable".into(),
            monitoring_phase: "ongoing".into(),
            risk_indicators: RiskIndicators::default(),
            overall_risk_level: "low".into(),
        };
        let suggestion =
            suggest_follow_up_for_condition(&progression, 0, "minor", None, Some("Mole on left shoulder"), Some(6.5));
        assert!(suggestion.clinical_note.is_some());

        let no_note = suggest_follow_up_for_condition(&progression, 0, "minor", None, Some("Rash on forearm"), Some(8.0));
        assert!(no_note.clinical_note.is_none());
    }
}

//! Deterministic subset selection when a photo session outgrows the vision window (§4.11.3).

use crate::models::{PhotoAnalysis, PhotoUpload, SelectionInfo, SmartBatchResult};
use std::collections::HashMap;

pub const DEFAULT_MAX_PHOTOS: usize = 40;

/// `photos` need not be pre-sorted; this sorts by `uploaded_at` ascending itself.
pub fn select(photos: &[PhotoUpload], analyses: &[PhotoAnalysis], max_photos: usize) -> SmartBatchResult {
    let mut sorted: Vec<PhotoUpload> = photos.to_vec();
    sorted.sort_by_key(|p| p.uploaded_at);

    if sorted.len() <= max_photos {
        let count = sorted.len();
        return SmartBatchResult {
            selected: sorted,
            selection_info: SelectionInfo {
                total_photos: count,
                photos_shown: count,
                selection_reasoning: vec!["all photos fit within the vision window".to_string()],
                omitted_date_ranges: vec![],
            },
        };
    }

    let total = sorted.len();
    let baseline = sorted[0].clone();
    let tail_start = total - 5;
    let tail: Vec<PhotoUpload> = sorted[tail_start..].to_vec();
    let middle: Vec<PhotoUpload> = sorted[1..tail_start].to_vec();

    let mut analysis_lookup: HashMap<String, &PhotoAnalysis> = HashMap::new();
    for analysis in analyses {
        for photo_id in analysis.photo_ids() {
            analysis_lookup.entry(photo_id).or_insert(analysis);
        }
    }

    let slots = max_photos.saturating_sub(6);
    let n = middle.len();
    let ideal_spacing = if slots > 0 { n as f64 / slots as f64 } else { f64::INFINITY };

    let mut scored: Vec<(usize, f64)> = middle
        .iter()
        .enumerate()
        .map(|(i, photo)| (i, importance_score(i, photo, ideal_spacing, analysis_lookup.get(&photo.id).copied())))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    let mut chosen_indices: Vec<usize> = scored.into_iter().take(slots).map(|(i, _)| i).collect();
    chosen_indices.sort_unstable();

    let chosen_set: std::collections::HashSet<usize> = chosen_indices.iter().copied().collect();
    let selected_middle: Vec<PhotoUpload> = chosen_indices.iter().map(|&i| middle[i].clone()).collect();

    let omitted_date_ranges = omitted_ranges(&middle, &chosen_set);

    let mut selected = Vec::with_capacity(1 + selected_middle.len() + tail.len());
    selected.push(baseline);
    selected.extend(selected_middle.clone());
    selected.extend(tail);

    let mut selection_reasoning = vec![
        "kept the first (baseline) photo".to_string(),
        "kept the last 5 photos".to_string(),
    ];
    selection_reasoning.push(format!(
        "selected {} of {} middle photos by temporal spacing, quality, and clinical signal",
        selected_middle.len(),
        n
    ));
    if !omitted_date_ranges.is_empty() {
        selection_reasoning.push(format!("omitted {} contiguous date range(s) of lower-signal photos", omitted_date_ranges.len()));
    }

    let photos_shown = selected.len();
    SmartBatchResult {
        selected,
        selection_info: SelectionInfo { total_photos: total, photos_shown, selection_reasoning, omitted_date_ranges },
    }
}

fn importance_score(i: usize, photo: &PhotoUpload, ideal_spacing: f64, analysis: Option<&PhotoAnalysis>) -> f64 {
    let mut score = 0.0;

    if ideal_spacing.is_finite() && ideal_spacing > 0.0 {
        let remainder = (i as f64).rem_euclid(ideal_spacing);
        score += 100.0 * (1.0 - (remainder / ideal_spacing));
    }

    if let Some(quality) = photo.quality_score {
        score += 0.5 * quality;
    }

    if let Some(analysis) = analysis {
        if analysis.confidence_score < 70.0 {
            score += 50.0;
        }
        let data = analysis.analysis_data();
        if data["red_flags"].as_array().map(|a| !a.is_empty()).unwrap_or(false) {
            score += 100.0;
        }
        let comparison: serde_json::Value =
            analysis.comparison_json.as_deref().and_then(|s| serde_json::from_str(s).ok()).unwrap_or(serde_json::Value::Null);
        if comparison["trend"].as_str() == Some("worsening") {
            score += 80.0;
        }
    }

    if photo.followup_notes.as_deref().map(|s| !s.is_empty()).unwrap_or(false) {
        score += 75.0;
    }

    score
}

fn omitted_ranges(middle: &[PhotoUpload], chosen: &std::collections::HashSet<usize>) -> Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    for i in 0..middle.len() {
        if chosen.contains(&i) {
            if let Some(start) = run_start.take() {
                ranges.push((middle[start].uploaded_at, middle[i - 1].uploaded_at));
            }
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }
    if let Some(start) = run_start {
        ranges.push((middle[start].uploaded_at, middle[middle.len() - 1].uploaded_at));
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn upload(id: &str, offset_days: i64) -> PhotoUpload {
        PhotoUpload {
            id: id.to_string(),
            session_id: "s1".into(),
            category: "medical_normal".into(),
            storage_url: Some(format!("local://{id}")),
            temporary_data: None,
            file_metadata_json: "{}".into(),
            is_followup: false,
            quality_score: None,
            followup_notes: None,
            uploaded_at: Utc::now() + Duration::days(offset_days),
        }
    }

    #[test]
    fn returns_all_photos_when_under_the_limit() {
        let photos: Vec<PhotoUpload> = (0..10).map(|i| upload(&format!("p{i}"), i)).collect();
        let result = select(&photos, &[], DEFAULT_MAX_PHOTOS);
        assert_eq!(result.selected.len(), 10);
        assert!(result.selection_info.omitted_date_ranges.is_empty());
    }

    #[test]
    fn always_keeps_baseline_and_last_five_when_over_the_limit() {
        let photos: Vec<PhotoUpload> = (0..60).map(|i| upload(&format!("p{i}"), i)).collect();
        let result = select(&photos, &[], DEFAULT_MAX_PHOTOS);
        assert_eq!(result.selected.first().unwrap().id, "p0");
        let last_five: Vec<&str> = result.selected[result.selected.len() - 5..].iter().map(|p| p.id.as_str()).collect();
        assert_eq!(last_five, vec!["p55", "p56", "p57", "p58", "p59"]);
        assert_eq!(result.selected.len(), DEFAULT_MAX_PHOTOS);
    }

    #[test]
    fn selection_preserves_chronological_order() {
        let photos: Vec<PhotoUpload> = (0..60).map(|i| upload(&format!("p{i}"), i)).collect();
        let result = select(&photos, &[], DEFAULT_MAX_PHOTOS);
        let mut prev = result.selected[0].uploaded_at;
        for photo in &result.selected[1..] {
            assert!(photo.uploaded_at >= prev);
            prev = photo.uploaded_at;
        }
    }

    #[test]
    fn photo_with_followup_notes_is_favored_over_similar_neighbor() {
        let mut photos: Vec<PhotoUpload> = (0..60).map(|i| upload(&format!("p{i}"), i)).collect();
        photos[30].followup_notes = Some("patient reports itching".to_string());
        let result = select(&photos, &[], DEFAULT_MAX_PHOTOS);
        assert!(result.selected.iter().any(|p| p.id == "p30"));
    }
}

//! Hourly incident analysis.
//!
//! Derives an hour-of-day histogram from raw incident records, extracts
//! the safest/riskiest hours, and computes a directional trend relative
//! to the current hour.

use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike as _};
use safety_watch_models::{EventAnalysis, RecentEvent, RiskTrend};

/// How many hours ahead the next-safer/next-riskier scan looks.
pub const LOOKAHEAD_HOURS: u8 = 6;

/// How many hours the safest/riskiest extracts report.
const EXTREME_HOUR_COUNT: usize = 3;

/// Analyzes a batch of recent incidents.
///
/// Returns `None` for an empty batch. Events whose `"HH:mm"` time field
/// does not parse are skipped — they contribute to neither the histogram
/// nor the trend, and never fail the whole analysis. Hours with zero
/// incidents are absent from the histogram, not present as zero.
#[must_use]
pub fn analyze(events: &[RecentEvent], current_hour: u8) -> Option<EventAnalysis> {
    if events.is_empty() {
        return None;
    }

    let primary_category = primary_category(events);
    let hourly_counts = hourly_histogram(events);

    let (safest_hours, riskiest_hours) = extreme_hours(&hourly_counts);
    let (next_safer, next_riskier) = lookahead(&hourly_counts, current_hour);

    let trend = match (next_safer, next_riskier) {
        (Some((_, safer_offset)), Some((_, riskier_offset))) => {
            if safer_offset < riskier_offset {
                RiskTrend::SaferSoon
            } else {
                RiskTrend::RiskierSoon
            }
        }
        (Some(_), None) => RiskTrend::SaferSoon,
        (None, Some(_)) => RiskTrend::RiskierSoon,
        (None, None) => RiskTrend::Stable,
    };

    Some(EventAnalysis {
        primary_category,
        hourly_counts,
        safest_hours,
        riskiest_hours,
        next_safer_hour: next_safer.map(|(hour, _)| hour),
        next_riskier_hour: next_riskier.map(|(hour, _)| hour),
        trend,
    })
}

/// Mode of the non-empty category labels. Ties break to the first label
/// encountered in input order whose count equals the maximum — a stable
/// first-max, not alphabetical.
fn primary_category(events: &[RecentEvent]) -> Option<String> {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for event in events {
        let label = event.category.trim();
        if !label.is_empty() {
            *counts.entry(label).or_insert(0) += 1;
        }
    }

    let max = counts.values().copied().max()?;
    events
        .iter()
        .map(|event| event.category.trim())
        .find(|label| counts.get(label) == Some(&max))
        .map(str::to_string)
}

fn hourly_histogram(events: &[RecentEvent]) -> BTreeMap<u8, u32> {
    let mut histogram = BTreeMap::new();
    for event in events {
        let Some(hour) = parse_hour(&event.time) else {
            log::debug!(
                "skipping event {} with unparsable time {:?}",
                event.incident_number,
                event.time
            );
            continue;
        };
        *histogram.entry(hour).or_insert(0) += 1;
    }
    histogram
}

/// Locale-independent 24-hour `"HH:mm"` parse.
fn parse_hour(time: &str) -> Option<u8> {
    let parsed = NaiveTime::parse_from_str(time.trim(), "%H:%M").ok()?;
    u8::try_from(parsed.hour()).ok()
}

/// The up-to-3 lowest-count hours (count asc, hour asc on ties) and the
/// up-to-3 highest-count hours (count desc, hour asc on ties).
fn extreme_hours(histogram: &BTreeMap<u8, u32>) -> (Vec<u8>, Vec<u8>) {
    let mut by_count: Vec<(u8, u32)> = histogram.iter().map(|(&h, &c)| (h, c)).collect();
    by_count.sort_by_key(|&(hour, count)| (count, hour));

    let safest: Vec<u8> = by_count
        .iter()
        .take(EXTREME_HOUR_COUNT)
        .map(|&(hour, _)| hour)
        .collect();

    by_count.sort_by_key(|&(hour, count)| (std::cmp::Reverse(count), hour));
    let riskiest: Vec<u8> = by_count
        .iter()
        .take(EXTREME_HOUR_COUNT)
        .map(|&(hour, _)| hour)
        .collect();

    (safest, riskiest)
}

/// Scans offsets 1..=6 forward from `current_hour` (wrapping mod 24) for
/// the first hour with strictly fewer / strictly more incidents than the
/// current hour. Hours absent from the histogram are not comparable and
/// are skipped. Returns `(hour, offset)` pairs so the caller can
/// tie-break the trend by offset.
fn lookahead(
    histogram: &BTreeMap<u8, u32>,
    current_hour: u8,
) -> (Option<(u8, u8)>, Option<(u8, u8)>) {
    let current_count = histogram.get(&current_hour).copied().unwrap_or(0);

    let mut next_safer = None;
    let mut next_riskier = None;

    for offset in 1..=LOOKAHEAD_HOURS {
        let hour = (current_hour + offset) % 24;
        let Some(&count) = histogram.get(&hour) else {
            continue;
        };
        if next_safer.is_none() && count < current_count {
            next_safer = Some((hour, offset));
        }
        if next_riskier.is_none() && count > current_count {
            next_riskier = Some((hour, offset));
        }
        if next_safer.is_some() && next_riskier.is_some() {
            break;
        }
    }

    (next_safer, next_riskier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(time: &str, category: &str) -> RecentEvent {
        RecentEvent {
            date: "2025-10-24".to_string(),
            time: time.to_string(),
            incident_number: "250880000".to_string(),
            location: "MISSION ST / 16TH ST".to_string(),
            district: "Mission".to_string(),
            category: category.to_string(),
            description: String::new(),
            resolution: "Open or Active".to_string(),
        }
    }

    #[test]
    fn empty_batch_yields_no_analysis() {
        assert!(analyze(&[], 12).is_none());
    }

    #[test]
    fn histogram_and_extremes() {
        // Hours [1,1,1,2,2,3] -> {1:3, 2:2, 3:1}.
        let events: Vec<RecentEvent> = ["01:00", "01:15", "01:45", "02:00", "02:30", "03:05"]
            .iter()
            .map(|t| event(t, "Assault"))
            .collect();

        let analysis = analyze(&events, 12).unwrap();
        assert_eq!(analysis.hourly_counts.get(&1), Some(&3));
        assert_eq!(analysis.hourly_counts.get(&2), Some(&2));
        assert_eq!(analysis.hourly_counts.get(&3), Some(&1));
        assert_eq!(analysis.hourly_counts.get(&4), None);

        assert_eq!(analysis.safest_hours, vec![3, 2, 1]);
        assert_eq!(analysis.riskiest_hours, vec![1, 2, 3]);
    }

    #[test]
    fn extreme_ties_break_by_hour_ascending() {
        // {5:1, 9:1, 14:1, 20:1}: all tied.
        let events: Vec<RecentEvent> = ["05:00", "09:00", "14:00", "20:00"]
            .iter()
            .map(|t| event(t, "Theft"))
            .collect();

        let analysis = analyze(&events, 0).unwrap();
        assert_eq!(analysis.safest_hours, vec![5, 9, 14]);
        assert_eq!(analysis.riskiest_hours, vec![5, 9, 14]);
    }

    #[test]
    fn primary_category_is_stable_first_max() {
        let events = vec![
            event("10:00", "Burglary"),
            event("11:00", "Theft"),
            event("12:00", "Theft"),
            event("13:00", "Burglary"),
            event("14:00", ""),
        ];
        // Burglary and Theft both count 2; Burglary appeared first.
        let analysis = analyze(&events, 12).unwrap();
        assert_eq!(analysis.primary_category.as_deref(), Some("Burglary"));
    }

    #[test]
    fn all_empty_labels_yield_no_primary_category() {
        let events = vec![event("10:00", ""), event("11:00", "  ")];
        let analysis = analyze(&events, 12).unwrap();
        assert_eq!(analysis.primary_category, None);
    }

    #[test]
    fn unparsable_times_are_skipped_not_fatal() {
        let events = vec![
            event("10:00", "Theft"),
            event("25:99", "Theft"),
            event("noon", "Theft"),
        ];
        let analysis = analyze(&events, 12).unwrap();
        assert_eq!(analysis.hourly_counts.len(), 1);
        assert_eq!(analysis.hourly_counts.get(&10), Some(&1));
    }

    #[test]
    fn lookahead_skips_absent_hours() {
        // Current hour 3 has count 1; hours 4..9 ahead: only 5 is
        // present (count 4, greater). No strictly-smaller candidate in
        // the window.
        let events: Vec<RecentEvent> = [
            "01:00", "01:10", "01:20", "02:00", "02:10", "03:00", "05:00", "05:10", "05:20",
            "05:30",
        ]
        .iter()
        .map(|t| event(t, "Theft"))
        .collect();

        let analysis = analyze(&events, 3).unwrap();
        assert_eq!(analysis.next_safer_hour, None);
        assert_eq!(analysis.next_riskier_hour, Some(5));
        assert_eq!(analysis.trend, RiskTrend::RiskierSoon);
    }

    #[test]
    fn safer_wins_when_it_comes_first() {
        // Current hour 1 (count 3). Hour 2 (count 1) is safer at offset
        // 1; hour 4 (count 5) is riskier at offset 3.
        let events: Vec<RecentEvent> = [
            "01:00", "01:10", "01:20", "02:00", "04:00", "04:10", "04:20", "04:30", "04:40",
        ]
        .iter()
        .map(|t| event(t, "Theft"))
        .collect();

        let analysis = analyze(&events, 1).unwrap();
        assert_eq!(analysis.next_safer_hour, Some(2));
        assert_eq!(analysis.next_riskier_hour, Some(4));
        assert_eq!(analysis.trend, RiskTrend::SaferSoon);
    }

    #[test]
    fn lookahead_wraps_past_midnight() {
        // Current hour 22 (absent -> count 0); hour 1 (offset 3) has
        // incidents, so it is the next riskier hour.
        let events: Vec<RecentEvent> =
            ["01:00", "01:30"].iter().map(|t| event(t, "Theft")).collect();

        let analysis = analyze(&events, 22).unwrap();
        assert_eq!(analysis.next_safer_hour, None);
        assert_eq!(analysis.next_riskier_hour, Some(1));
        assert_eq!(analysis.trend, RiskTrend::RiskierSoon);
    }

    #[test]
    fn quiet_forward_window_is_stable() {
        // All incidents behind the current hour; nothing in 1..=6 ahead.
        let events: Vec<RecentEvent> =
            ["01:00", "02:00"].iter().map(|t| event(t, "Theft")).collect();

        let analysis = analyze(&events, 10).unwrap();
        assert_eq!(analysis.next_safer_hour, None);
        assert_eq!(analysis.next_riskier_hour, None);
        assert_eq!(analysis.trend, RiskTrend::Stable);
    }
}

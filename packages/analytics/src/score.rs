//! The risk scoring function.
//!
//! Deterministic except for one explicit bounded jitter term, which the
//! caller supplies (see [`jitter`]) so tests can pin it to zero.

use chrono::Weekday;
use safety_watch_models::HourWindow;

/// Fallback time-of-day window used when no event analysis is available
/// (event fetch failed, or the batch was empty).
pub const DEFAULT_SAFE_WINDOW: HourWindow = HourWindow { start: 6, end: 18 };

/// Lower/upper bounds on the deterministic score before jitter.
pub const PRE_JITTER_FLOOR: f64 = 15.0;
/// See [`PRE_JITTER_FLOOR`].
pub const PRE_JITTER_CEILING: f64 = 88.0;

const BASE: f64 = 18.0;
const OUTSIDE_WINDOW_ADJUSTMENT: f64 = 5.0;
const APPROACH_BAND_ADJUSTMENT: f64 = 3.0;
const WEEKDAY_ADJUSTMENT: f64 = 1.0;
const WEEKEND_ADJUSTMENT: f64 = 3.0;
const NO_STATION_ADJUSTMENT: f64 = 10.0;
const STATION_ADJUSTMENT_STEP: f64 = 2.2;
const INCIDENTS_PER_UNIT: f64 = 150.0;
const NORMALIZED_CRIME_CAP: f64 = 3.0;
const CRIME_EXPONENT: f64 = 1.55;
const CRIME_WEIGHT: f64 = 20.0;

/// The deterministic, pre-jitter score, clamped to
/// `[PRE_JITTER_FLOOR, PRE_JITTER_CEILING]`.
///
/// Higher = riskier. `window` is the safest-hours band from event
/// analysis, or [`DEFAULT_SAFE_WINDOW`] when none is available.
#[must_use]
pub fn base_score(
    incident_count: u32,
    station_count: u32,
    window: HourWindow,
    hour: u8,
    weekday: Weekday,
) -> f64 {
    let mut total = BASE;

    // Time-of-day band. The widened "approach" band [start-2, end] fully
    // contains the strict band, so once the out-of-band check fails,
    // every remaining hour lands in the +3 branch and the +0 arm is
    // unreachable. This matches the shipped behavior; kept as-is pending
    // product clarification (see DESIGN.md).
    if hour < window.start || hour > window.end {
        total += OUTSIDE_WINDOW_ADJUSTMENT;
    } else if hour + 2 >= window.start && hour <= window.end {
        total += APPROACH_BAND_ADJUSTMENT;
    }

    total += if matches!(weekday, Weekday::Sat | Weekday::Sun) {
        WEEKEND_ADJUSTMENT
    } else {
        WEEKDAY_ADJUSTMENT
    };

    total += match station_count {
        0 => NO_STATION_ADJUSTMENT,
        n @ 1..=4 => f64::from(5 - n) * STATION_ADJUSTMENT_STEP,
        _ => 0.0,
    };

    let normalized_crime =
        (f64::from(incident_count) / INCIDENTS_PER_UNIT).min(NORMALIZED_CRIME_CAP);
    total += normalized_crime.powf(CRIME_EXPONENT) * CRIME_WEIGHT;

    total.clamp(PRE_JITTER_FLOOR, PRE_JITTER_CEILING)
}

/// The final displayed score: [`base_score`] plus `jitter`, clamped to
/// `[0.0, 100.0]` and rounded to one decimal place.
///
/// `jitter` exists for display variance only and must be in
/// `[-1.0, 1.0]`; deterministic callers (tests) pass `0.0`.
#[must_use]
pub fn score(
    incident_count: u32,
    station_count: u32,
    window: HourWindow,
    hour: u8,
    weekday: Weekday,
    jitter: f64,
) -> f64 {
    let total = base_score(incident_count, station_count, window, hour, weekday) + jitter;
    round_to_tenth(total.clamp(0.0, 100.0))
}

/// Uniform random jitter in `[-1.0, 1.0]` — the scorer's one
/// non-deterministic input.
#[must_use]
pub fn jitter() -> f64 {
    use rand::Rng as _;
    rand::thread_rng().gen_range(-1.0..=1.0)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

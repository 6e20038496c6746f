#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared domain types for the safety-watch risk pipeline.
//!
//! Everything here is a plain immutable value: the location being
//! evaluated, the three raw source payloads (recommendations, police
//! stations, recent incidents), and the derived analysis/risk types.
//! Orchestration lives in `safety_watch_context`; computation in
//! `safety_watch_analytics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

/// One immutable snapshot of "where are we evaluating risk for, and when".
///
/// A location change produces a fresh `LocationQuery` (and a fresh
/// aggregator context); queries are never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Neighborhood name as selected/detected (free text, may carry a
    /// " District" suffix — see [`Self::normalized_neighborhood`]).
    pub neighborhood: String,
    /// City name.
    pub city: String,
    /// Full state name (e.g. "California").
    pub state: String,
    /// When this query was created (ISO 8601 on the wire).
    pub queried_at: DateTime<Utc>,
}

/// The one neighborhood whose " District" suffix is part of its actual
/// name and must not be stripped.
const DISTRICT_SUFFIX_EXEMPTION: &str = "Fashion District";

impl LocationQuery {
    /// Creates a query for a neighborhood in the default coverage city
    /// (San Francisco, California), timestamped now.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, neighborhood: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            neighborhood: neighborhood.into(),
            city: "San Francisco".to_string(),
            state: "California".to_string(),
            queried_at: Utc::now(),
        }
    }

    /// The query point as [`Coordinates`].
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.latitude,
            lng: self.longitude,
        }
    }

    /// Neighborhood name with a trailing `" District"` suffix stripped.
    ///
    /// "Fashion District" is exempt — that suffix is the name, not an
    /// administrative label.
    #[must_use]
    pub fn normalized_neighborhood(&self) -> &str {
        if self.neighborhood == DISTRICT_SUFFIX_EXEMPTION {
            return &self.neighborhood;
        }
        self.neighborhood
            .strip_suffix(" District")
            .unwrap_or(&self.neighborhood)
    }
}

/// A police station near the query point.
///
/// Produced by the station fetcher after distance filtering; the exposed
/// set is always ≤ 2 miles out and sorted ascending by distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoliceStation {
    /// Station name (e.g. "Mission Police Station").
    pub name: String,
    /// Postal address.
    pub address: String,
    /// Phone number, when the place search knows one.
    pub phone: Option<String>,
    /// Station coordinates.
    pub location: Coordinates,
    /// Great-circle distance from the query point, in miles.
    pub distance_miles: f64,
}

/// A recent incident record from the incident-scraper service.
///
/// Field names mirror the scraper's wire schema verbatim. Individual
/// malformed records are dropped during decode rather than failing the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEvent {
    /// Incident date as reported (free-form date string).
    #[serde(rename = "Date")]
    pub date: String,
    /// Incident time, `"HH:mm"` 24-hour.
    #[serde(rename = "Time")]
    pub time: String,
    /// Police incident number.
    #[serde(rename = "Incident #")]
    pub incident_number: String,
    /// Location text (block or intersection).
    #[serde(rename = "Location")]
    pub location: String,
    /// Police district.
    #[serde(rename = "District")]
    pub district: String,
    /// SFPD category label. May be empty.
    #[serde(rename = "CategorySFPD")]
    pub category: String,
    /// Free-text description.
    #[serde(rename = "Description")]
    pub description: String,
    /// Resolution label (e.g. "Open or Active").
    #[serde(rename = "Resolution")]
    pub resolution: String,
}

/// An inclusive `[start, end]` hour-of-day band (0–23).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourWindow {
    /// First hour of the band.
    pub start: u8,
    /// Last hour of the band (inclusive).
    pub end: u8,
}

impl HourWindow {
    /// Whether `hour` falls inside the band.
    #[must_use]
    pub const fn contains(self, hour: u8) -> bool {
        hour >= self.start && hour <= self.end
    }
}

/// Directional risk trend relative to the current hour.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTrend {
    /// A lower-incident hour arrives within the lookahead window first.
    SaferSoon,
    /// A higher-incident hour arrives within the lookahead window first.
    RiskierSoon,
    /// Neither direction found within the lookahead window.
    Stable,
}

/// Derived summary of an incident list's time-of-day distribution.
///
/// Computed by `safety_watch_analytics` from the raw events; `None` at
/// the aggregator level until the event slot resolves with ≥ 1 event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAnalysis {
    /// Most frequent non-empty category label (stable first-max on ties).
    pub primary_category: Option<String>,
    /// Incident count per hour of day. Hours with zero incidents are
    /// absent, never present as zero.
    pub hourly_counts: std::collections::BTreeMap<u8, u32>,
    /// Up to 3 hours with the lowest counts, ascending by count (hour
    /// ascending on ties).
    pub safest_hours: Vec<u8>,
    /// Up to 3 hours with the highest counts, descending by count (hour
    /// ascending on ties).
    pub riskiest_hours: Vec<u8>,
    /// First hour within the 1–6 hour forward lookahead with strictly
    /// fewer incidents than the current hour.
    pub next_safer_hour: Option<u8>,
    /// First hour within the 1–6 hour forward lookahead with strictly
    /// more incidents than the current hour.
    pub next_riskier_hour: Option<u8>,
    /// Direction the neighborhood is trending over the next few hours.
    pub trend: RiskTrend,
}

impl EventAnalysis {
    /// The safest-hours band as an [`HourWindow`] (min to max of
    /// [`Self::safest_hours`]), used as the scorer's time-of-day context.
    ///
    /// Returns `None` when no hour was analyzable (all times unparsable).
    #[must_use]
    pub fn safest_window(&self) -> Option<HourWindow> {
        let start = self.safest_hours.iter().copied().min()?;
        let end = self.safest_hours.iter().copied().max()?;
        Some(HourWindow { start, end })
    }
}

/// Categorical bucket derived from the numeric risk score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyState {
    /// Score dependencies (station count, event window) not yet resolved.
    Loading,
    /// Score in `[1, 60]`.
    Safe,
    /// Score in `(60, 75]`.
    Moderate,
    /// Anything else — including 0, which falls outside the safe band's
    /// lower bound and takes the default branch.
    Danger,
}

impl SafetyState {
    /// Maps a final (post-jitter, post-clamp) score to its bucket.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if (1.0..=60.0).contains(&score) {
            Self::Safe
        } else if score > 60.0 && score <= 75.0 {
            Self::Moderate
        } else {
            Self::Danger
        }
    }
}

/// The composite risk result for one [`LocationQuery`].
///
/// Never partially valid: `score` is `None` exactly while `state` is
/// [`SafetyState::Loading`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskState {
    /// Final score in `[0.0, 100.0]`, one decimal place.
    pub score: Option<f64>,
    /// Categorical bucket for the score.
    pub state: SafetyState,
}

impl RiskState {
    /// The pre-resolution state.
    #[must_use]
    pub const fn loading() -> Self {
        Self {
            score: None,
            state: SafetyState::Loading,
        }
    }

    /// Wraps a computed score with its categorical bucket.
    #[must_use]
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            state: SafetyState::from_score(score),
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk data source traits and their HTTP implementations.
//!
//! Each of the three sources the aggregator fans out to — crime
//! recommendations, nearby police stations, recent incidents — sits
//! behind its own trait so the aggregator and tests can substitute
//! fakes. The HTTP implementations live in the submodules; none of them
//! retries: a failed fetch stays failed until a new location query opens
//! a fresh context.

pub mod events;
pub mod nominatim;
pub mod recommendations;
pub mod stations;

use std::collections::BTreeMap;

use async_trait::async_trait;
use safety_watch_models::{Coordinates, LocationQuery, PoliceStation, RecentEvent};

/// Errors that can occur while fetching from a data source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the JSON we expected.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service answered with a non-success status.
    #[error("{service} returned HTTP {status}")]
    Status {
        /// Which service answered.
        service: &'static str,
        /// The status it answered with.
        status: reqwest::StatusCode,
    },

    /// Response decoded as JSON but not into the expected shape.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of what went wrong.
        message: String,
    },
}

/// Neighborhood safety recommendations: ordered free-text advisory
/// strings. An empty list is a valid response, not an error.
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    /// Fetches advisory strings for the query's neighborhood.
    ///
    /// `user_stats` is optional request context from the user profile;
    /// an empty map is valid input and must not block the fetch.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure, non-200 status, or
    /// decode failure. Callers surface this as "no recommendations
    /// available" — never retry, never block the other sources.
    async fn recommendations(
        &self,
        query: &LocationQuery,
        user_stats: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, SourceError>;
}

/// Police stations near a point, filtered to ≤ 2 miles and sorted
/// ascending by distance. An empty result set is success.
#[async_trait]
pub trait StationSource: Send + Sync {
    /// Finds nearby police stations around `center`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the underlying place search fails.
    async fn stations_near(&self, center: Coordinates) -> Result<Vec<PoliceStation>, SourceError>;
}

/// Recent incident records for a neighborhood. Malformed individual
/// records are dropped; only an undecodable envelope is an error.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches recent incidents for the (already normalized)
    /// neighborhood name.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failure or when the response
    /// envelope is not a JSON array at all.
    async fn recent_events(&self, neighborhood: &str) -> Result<Vec<RecentEvent>, SourceError>;
}

/// Supplies the flattened user-profile context attached to
/// recommendation requests (e.g. `additionalProp1: "Age: 25-30"`).
pub trait ProfileSource: Send + Sync {
    /// The current flattened key/value profile. May be empty.
    fn user_stats(&self) -> BTreeMap<String, String>;
}

/// The no-profile default: always an empty map.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyProfile;

impl ProfileSource for EmptyProfile {
    fn user_stats(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

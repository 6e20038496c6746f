#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the safety-watch server.
//!
//! These types are serialized to JSON for the REST API. They are
//! separate from the domain types to allow independent evolution of the
//! API contract.

use safety_watch_models::LocationQuery;
use serde::{Deserialize, Serialize};

/// `GET /api/health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always true when the server answers.
    pub healthy: bool,
    /// Server crate version.
    pub version: String,
}

/// `POST /api/locations` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLocationRequest {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Neighborhood name (raw; normalization happens server-side).
    pub neighborhood: String,
    /// City; defaults to San Francisco when absent.
    pub city: Option<String>,
    /// State; defaults to California when absent.
    pub state: Option<String>,
    /// A previous session this query supersedes; it is closed and its
    /// in-flight work cancelled.
    pub supersedes: Option<String>,
}

impl OpenLocationRequest {
    /// Builds the immutable query this request describes.
    #[must_use]
    pub fn to_query(&self) -> LocationQuery {
        let mut query =
            LocationQuery::new(self.latitude, self.longitude, self.neighborhood.clone());
        if let Some(city) = &self.city {
            query.city.clone_from(city);
        }
        if let Some(state) = &self.state {
            query.state.clone_from(state);
        }
        query
    }
}

/// `POST /api/locations` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLocationResponse {
    /// Session id for subsequent snapshot requests.
    pub id: String,
}

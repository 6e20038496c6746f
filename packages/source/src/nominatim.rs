//! Nominatim / OpenStreetMap place search.
//!
//! Production [`PoiSearch`] implementation. Nominatim has strict rate
//! limits (1 request/second on the public instance); one search per
//! location change stays well inside that.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use async_trait::async_trait;
use safety_watch_models::Coordinates;

use crate::stations::{PoiPlace, PoiSearch};
use crate::SourceError;

/// Public Nominatim search endpoint.
pub const DEFAULT_POI_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Maximum results requested per search.
const RESULT_LIMIT: &str = "30";

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Nominatim-backed [`PoiSearch`].
#[derive(Debug, Clone)]
pub struct NominatimPoiSearch {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimPoiSearch {
    /// Creates a search client against `base_url`.
    #[must_use]
    pub const fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl PoiSearch for NominatimPoiSearch {
    async fn search(
        &self,
        query: &str,
        center: Coordinates,
        radius_meters: f64,
    ) -> Result<Vec<PoiPlace>, SourceError> {
        let viewbox = bounding_viewbox(center, radius_meters);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("limit", RESULT_LIMIT),
                ("viewbox", viewbox.as_str()),
                ("bounded", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SourceError::Status {
                service: "nominatim",
                status,
            });
        }

        let body: serde_json::Value = response.json().await?;
        parse_response(&body)
    }
}

/// `left,top,right,bottom` viewbox covering `radius_meters` around the
/// center.
fn bounding_viewbox(center: Coordinates, radius_meters: f64) -> String {
    let delta_lat = radius_meters / METERS_PER_DEGREE;
    let shrink = center.lat.to_radians().cos().max(0.01);
    let delta_lng = radius_meters / (METERS_PER_DEGREE * shrink);
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        center.lng - delta_lng,
        center.lat + delta_lat,
        center.lng + delta_lng,
        center.lat - delta_lat,
    )
}

/// Parses a Nominatim `jsonv2` response array into places. Entries
/// without usable coordinates are skipped.
fn parse_response(body: &serde_json::Value) -> Result<Vec<PoiPlace>, SourceError> {
    let results = body.as_array().ok_or_else(|| SourceError::Decode {
        message: "Nominatim response is not an array".to_string(),
    })?;

    Ok(results.iter().filter_map(parse_place).collect())
}

fn parse_place(entry: &serde_json::Value) -> Option<PoiPlace> {
    let lat = entry["lat"].as_str().and_then(|s| s.parse::<f64>().ok())?;
    let lng = entry["lon"].as_str().and_then(|s| s.parse::<f64>().ok())?;

    let display_name = entry["display_name"].as_str();
    let name = entry["name"]
        .as_str()
        .filter(|s| !s.is_empty())
        .or(display_name)?
        .to_string();

    Some(PoiPlace {
        name,
        address: display_name.map(String::from),
        phone: None,
        location: Coordinates { lat, lng },
    })
}

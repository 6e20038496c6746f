//! Nearby police-station lookup.
//!
//! The underlying place search is a black-box [`PoiSearch`]
//! collaborator; this module's own logic is the great-circle distance
//! computation, the 2-mile filter, and the ascending distance sort.

use std::sync::Arc;

use async_trait::async_trait;
use geo::{Distance as _, Haversine, Point};
use safety_watch_models::{Coordinates, PoliceStation};

use crate::{SourceError, StationSource};

/// Search radius handed to the place search.
pub const STATION_SEARCH_RADIUS_METERS: f64 = 3_200.0;

/// Stations farther out than this are dropped before exposure.
pub const MAX_STATION_DISTANCE_MILES: f64 = 2.0;

const MILES_PER_METER: f64 = 0.000_621_371;

const STATION_QUERY: &str = "police station";

/// A candidate place from the black-box search, before distance
/// filtering.
#[derive(Debug, Clone)]
pub struct PoiPlace {
    /// Place name.
    pub name: String,
    /// Postal address, when known.
    pub address: Option<String>,
    /// Phone number, when known.
    pub phone: Option<String>,
    /// Place coordinates.
    pub location: Coordinates,
}

/// Black-box point-of-interest search collaborator.
#[async_trait]
pub trait PoiSearch: Send + Sync {
    /// Returns candidate places matching `query` around `center`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the search fails.
    async fn search(
        &self,
        query: &str,
        center: Coordinates,
        radius_meters: f64,
    ) -> Result<Vec<PoiPlace>, SourceError>;
}

/// [`StationSource`] built on a [`PoiSearch`] collaborator.
pub struct PoiStationSource {
    poi: Arc<dyn PoiSearch>,
}

impl PoiStationSource {
    /// Wraps a place-search collaborator.
    #[must_use]
    pub fn new(poi: Arc<dyn PoiSearch>) -> Self {
        Self { poi }
    }
}

#[async_trait]
impl StationSource for PoiStationSource {
    async fn stations_near(&self, center: Coordinates) -> Result<Vec<PoliceStation>, SourceError> {
        let places = self
            .poi
            .search(STATION_QUERY, center, STATION_SEARCH_RADIUS_METERS)
            .await?;

        let candidates = places
            .into_iter()
            .map(|place| {
                let distance_miles = distance_miles(center, place.location);
                PoliceStation {
                    name: place.name,
                    address: place
                        .address
                        .unwrap_or_else(|| "Unknown address".to_string()),
                    phone: place.phone,
                    location: place.location,
                    distance_miles,
                }
            })
            .collect();

        let stations = nearest_stations(candidates);
        log::info!("{} police station(s) within 2 miles", stations.len());
        Ok(stations)
    }
}

/// Filters to ≤ [`MAX_STATION_DISTANCE_MILES`] and sorts ascending by
/// distance. The sort is stable, so equidistant stations keep their
/// original response order.
#[must_use]
pub fn nearest_stations(mut stations: Vec<PoliceStation>) -> Vec<PoliceStation> {
    stations.retain(|station| station.distance_miles <= MAX_STATION_DISTANCE_MILES);
    stations.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));
    stations
}

/// Great-circle (haversine) distance between two points, in miles.
#[must_use]
pub fn distance_miles(from: Coordinates, to: Coordinates) -> f64 {
    let meters = Haversine.distance(
        Point::new(from.lng, from.lat),
        Point::new(to.lng, to.lat),
    );
    meters * MILES_PER_METER
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(name: &str, distance_miles: f64) -> PoliceStation {
        PoliceStation {
            name: name.to_string(),
            address: "Unknown address".to_string(),
            phone: None,
            location: Coordinates { lat: 0.0, lng: 0.0 },
            distance_miles,
        }
    }

    #[test]
    fn filters_beyond_two_miles_and_sorts_ascending() {
        let input = vec![
            station("c", 2.0),
            station("e", 5.0),
            station("a", 0.5),
            station("d", 2.1),
            station("b", 1.9),
        ];
        let result = nearest_stations(input);
        let distances: Vec<f64> = result.iter().map(|s| s.distance_miles).collect();
        assert_eq!(distances, vec![0.5, 1.9, 2.0]);
        assert_eq!(result[0].name, "a");
    }

    #[test]
    fn equidistant_stations_keep_response_order() {
        let input = vec![station("first", 1.0), station("second", 1.0)];
        let result = nearest_stations(input);
        assert_eq!(result[0].name, "first");
        assert_eq!(result[1].name, "second");
    }

    #[test]
    fn empty_result_set_is_valid() {
        assert!(nearest_stations(Vec::new()).is_empty());
    }

    #[test]
    fn haversine_distance_sanity() {
        // SF Mission to SF Civic Center, roughly 1.4 miles.
        let mission = Coordinates {
            lat: 37.7599,
            lng: -122.4148,
        };
        let civic_center = Coordinates {
            lat: 37.7793,
            lng: -122.4193,
        };
        let miles = distance_miles(mission, civic_center);
        assert!((1.2..=1.6).contains(&miles), "got {miles}");
    }

    #[test]
    fn zero_distance_for_same_point() {
        let point = Coordinates {
            lat: 37.76,
            lng: -122.41,
        };
        assert!(distance_miles(point, point).abs() < 1e-9);
    }
}

//! Crime-recommendation service fetcher.
//!
//! POST-based JSON endpoint: the request carries the normalized
//! neighborhood, city/state, the flattened user-profile context, a fixed
//! transport mode, and the query timestamp; the response is a list of
//! free-text advisory strings (plus a `crime_amount` field this client
//! ignores).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::SecondsFormat;
use safety_watch_models::LocationQuery;
use serde::Deserialize;
use serde_json::json;

use crate::{RecommendationSource, SourceError};

/// Production recommendation endpoint.
pub const DEFAULT_RECS_URL: &str = "https://cal-hacks-pro-backend.vercel.app/scraper/crime-recs/";

/// Transport mode sent with every request.
const TRANSPORT_MODE: &str = "walk";

/// The fields of the response this client consumes. Unknown fields
/// (`crime_amount`, older schema variants) are ignored by serde.
#[derive(Debug, Deserialize)]
struct RecommendationResponse {
    recommendations: Vec<String>,
}

/// HTTP implementation of [`RecommendationSource`].
#[derive(Debug, Clone)]
pub struct HttpRecommendationSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecommendationSource {
    /// Creates a fetcher against `base_url`.
    #[must_use]
    pub const fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl RecommendationSource for HttpRecommendationSource {
    async fn recommendations(
        &self,
        query: &LocationQuery,
        user_stats: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, SourceError> {
        let body = json!({
            "neighborhood": query.normalized_neighborhood(),
            "city": query.city,
            "state": query.state,
            "user_stats": user_stats,
            "transport": TRANSPORT_MODE,
            "time": query.queried_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let response = self
            .client
            .post(&self.base_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            log::warn!("recommendation service returned {status}");
            return Err(SourceError::Status {
                service: "recommendation service",
                status,
            });
        }

        let decoded: RecommendationResponse = response.json().await?;
        log::info!(
            "fetched {} recommendation(s) for {}",
            decoded.recommendations.len(),
            query.normalized_neighborhood(),
        );
        Ok(decoded.recommendations)
    }
}

//! Recent-incident fetcher for the incident-scraper service.
//!
//! POST to an endpoint parameterized by the URL-encoded neighborhood
//! name; the response is a JSON array of incident records. A strict
//! decode is attempted first; on failure, a lenient per-record pass
//! salvages whatever decodes, dropping malformed records. Only an
//! envelope that is not a JSON array at all fails the fetch.

use async_trait::async_trait;
use safety_watch_models::RecentEvent;

use crate::{EventSource, SourceError};

/// Production incident-scraper endpoint.
pub const DEFAULT_EVENTS_URL: &str =
    "https://cal-hacks-pro-backend.vercel.app/scraper/recent-events/";

/// HTTP implementation of [`EventSource`].
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventSource {
    /// Creates a fetcher against `base_url`.
    #[must_use]
    pub const fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn recent_events(&self, neighborhood: &str) -> Result<Vec<RecentEvent>, SourceError> {
        let mut url =
            reqwest::Url::parse(&self.base_url).map_err(|e| SourceError::Decode {
                message: format!("invalid events URL {:?}: {e}", self.base_url),
            })?;
        url.query_pairs_mut().append_pair("neighborhood", neighborhood);

        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            log::warn!("incident scraper returned {status} for {neighborhood}");
            return Err(SourceError::Status {
                service: "incident scraper",
                status,
            });
        }

        let body = response.text().await?;
        let events = decode_events(&body)?;
        log::info!("fetched {} recent event(s) for {neighborhood}", events.len());
        Ok(events)
    }
}

/// Strict decode of the whole batch, falling back to a per-record
/// lenient decode that drops malformed records.
///
/// # Errors
///
/// Returns [`SourceError`] only when the envelope itself is not a JSON
/// array.
pub fn decode_events(body: &str) -> Result<Vec<RecentEvent>, SourceError> {
    if let Ok(events) = serde_json::from_str::<Vec<RecentEvent>>(body) {
        return Ok(events);
    }

    let envelope: serde_json::Value = serde_json::from_str(body)?;
    let records = envelope.as_array().ok_or_else(|| SourceError::Decode {
        message: "incident response is not a JSON array".to_string(),
    })?;

    let mut events = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for record in records {
        match serde_json::from_value::<RecentEvent>(record.clone()) {
            Ok(event) => events.push(event),
            Err(e) => {
                dropped += 1;
                log::warn!("dropping malformed incident record: {e}");
            }
        }
    }
    if dropped > 0 {
        log::warn!("salvaged {} of {} incident record(s)", events.len(), records.len());
    }
    Ok(events)
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-location fetch orchestration.
//!
//! [`LocationContext::open`] fans out the three source fetchers as
//! concurrent tasks and returns immediately. Each fetcher writes exactly
//! one terminal value into its [`FetchSlot`] watch channel; a dedicated
//! derive task awaits the police-station and event slots (event-driven,
//! bounded by the per-fetch timeout — no polling loops), then computes
//! the event analysis and risk score exactly once. Consumers read
//! [`LocationContext::snapshot`] or subscribe to the watch channels and
//! render whatever is available as partial results arrive.
//!
//! A location change opens a fresh context; dropping the old one aborts
//! its in-flight tasks, so stale completions are never observed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{Datelike as _, Local, Timelike as _};
use safety_watch_analytics::score::{self, DEFAULT_SAFE_WINDOW};
use safety_watch_analytics::events as event_analysis;
use safety_watch_models::{
    EventAnalysis, LocationQuery, PoliceStation, RecentEvent, RiskState,
};
use safety_watch_source::{
    EventSource, ProfileSource, RecommendationSource, SourceError, StationSource,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Upper bound on each source fetch. Expiry moves the slot to `Failed`
/// rather than hanging; the derive task inherits this bound through the
/// slots it awaits.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Single-writer, multi-reader terminal-state container for one
/// source's async result.
///
/// Transitions are monotonic: `Pending` then exactly one terminal
/// state, never reverting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum FetchSlot<T> {
    /// The fetch has not completed yet.
    Pending,
    /// The fetch succeeded.
    Ready(T),
    /// The fetch failed; the payload is the rendered error.
    Failed(String),
}

impl<T> FetchSlot<T> {
    /// Whether the slot is still awaiting its fetcher.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The success payload, if any.
    #[must_use]
    pub const fn as_ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// The dependency-injected collaborators the aggregator fans out to.
pub struct Sources {
    /// Crime-recommendation service.
    pub recommendations: Arc<dyn RecommendationSource>,
    /// Nearby police-station search.
    pub stations: Arc<dyn StationSource>,
    /// Recent-incident scraper.
    pub events: Arc<dyn EventSource>,
    /// Optional user-profile context for the recommendation request.
    pub profile: Arc<dyn ProfileSource>,
}

/// Read-only view of everything the aggregator currently knows for one
/// query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    /// The query this context serves.
    pub query: LocationQuery,
    /// Advisory strings, once fetched.
    pub recommendations: FetchSlot<Vec<String>>,
    /// Nearby stations (≤ 2 miles, distance ascending), once fetched.
    pub stations: FetchSlot<Vec<PoliceStation>>,
    /// Recent incidents, once fetched.
    pub events: FetchSlot<Vec<RecentEvent>>,
    /// Time-of-day analysis; `None` until computable (and `None`
    /// forever when the event batch was empty or failed).
    pub analysis: Option<EventAnalysis>,
    /// Composite risk; `Loading` until both prerequisites resolve.
    pub risk: RiskState,
}

/// Owns the fetch lifecycle for one [`LocationQuery`].
///
/// Constructed by [`Self::open`]; dropping it aborts any in-flight
/// work, which is how a superseded query is cancelled.
pub struct LocationContext {
    query: LocationQuery,
    query_id: u64,
    recommendations_rx: watch::Receiver<FetchSlot<Vec<String>>>,
    stations_rx: watch::Receiver<FetchSlot<Vec<PoliceStation>>>,
    events_rx: watch::Receiver<FetchSlot<Vec<RecentEvent>>>,
    analysis_rx: watch::Receiver<Option<EventAnalysis>>,
    risk_rx: watch::Receiver<RiskState>,
    tasks: Vec<JoinHandle<()>>,
}

impl LocationContext {
    /// Launches all three fetchers for `query` and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn open(query: LocationQuery, sources: &Arc<Sources>) -> Self {
        let query_id = NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "[q{query_id}] opening context for {} ({}, {})",
            query.neighborhood,
            query.latitude,
            query.longitude,
        );

        let (recommendations_tx, recommendations_rx) = watch::channel(FetchSlot::Pending);
        let (stations_tx, stations_rx) = watch::channel(FetchSlot::Pending);
        let (events_tx, events_rx) = watch::channel(FetchSlot::Pending);
        let (analysis_tx, analysis_rx) = watch::channel(None);
        let (risk_tx, risk_rx) = watch::channel(RiskState::loading());

        let mut tasks = Vec::with_capacity(4);

        {
            let sources = Arc::clone(sources);
            let query = query.clone();
            tasks.push(tokio::spawn(async move {
                let user_stats: BTreeMap<String, String> = sources.profile.user_stats();
                let result = tokio::time::timeout(
                    FETCH_TIMEOUT,
                    sources.recommendations.recommendations(&query, &user_stats),
                )
                .await;
                let _ = recommendations_tx.send(terminal_slot(query_id, "recommendations", result));
            }));
        }

        {
            let sources = Arc::clone(sources);
            let center = query.coordinates();
            tasks.push(tokio::spawn(async move {
                let result =
                    tokio::time::timeout(FETCH_TIMEOUT, sources.stations.stations_near(center))
                        .await;
                let _ = stations_tx.send(terminal_slot(query_id, "stations", result));
            }));
        }

        {
            let sources = Arc::clone(sources);
            let neighborhood = query.normalized_neighborhood().to_string();
            tasks.push(tokio::spawn(async move {
                let result = tokio::time::timeout(
                    FETCH_TIMEOUT,
                    sources.events.recent_events(&neighborhood),
                )
                .await;
                let _ = events_tx.send(terminal_slot(query_id, "events", result));
            }));
        }

        {
            let mut stations_rx = stations_rx.clone();
            let mut events_rx = events_rx.clone();
            tasks.push(tokio::spawn(async move {
                let stations = wait_terminal(&mut stations_rx).await;
                let events = wait_terminal(&mut events_rx).await;
                derive(query_id, &stations, &events, &analysis_tx, &risk_tx);
            }));
        }

        Self {
            query,
            query_id,
            recommendations_rx,
            stations_rx,
            events_rx,
            analysis_rx,
            risk_rx,
            tasks,
        }
    }

    /// The query this context was opened for.
    #[must_use]
    pub const fn query(&self) -> &LocationQuery {
        &self.query
    }

    /// Internal id tagging this context's log lines.
    #[must_use]
    pub const fn query_id(&self) -> u64 {
        self.query_id
    }

    /// A point-in-time view of all slots and derived values.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            query: self.query.clone(),
            recommendations: self.recommendations_rx.borrow().clone(),
            stations: self.stations_rx.borrow().clone(),
            events: self.events_rx.borrow().clone(),
            analysis: self.analysis_rx.borrow().clone(),
            risk: *self.risk_rx.borrow(),
        }
    }

    /// Subscribes to risk-state changes (one `Loading` value, then at
    /// most one scored value).
    #[must_use]
    pub fn subscribe_risk(&self) -> watch::Receiver<RiskState> {
        self.risk_rx.clone()
    }

    /// Subscribes to the recommendation slot.
    #[must_use]
    pub fn subscribe_recommendations(&self) -> watch::Receiver<FetchSlot<Vec<String>>> {
        self.recommendations_rx.clone()
    }

    /// Subscribes to the police-station slot.
    #[must_use]
    pub fn subscribe_stations(&self) -> watch::Receiver<FetchSlot<Vec<PoliceStation>>> {
        self.stations_rx.clone()
    }

    /// Subscribes to the recent-event slot.
    #[must_use]
    pub fn subscribe_events(&self) -> watch::Receiver<FetchSlot<Vec<RecentEvent>>> {
        self.events_rx.clone()
    }
}

impl Drop for LocationContext {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        log::debug!("[q{}] context closed, in-flight work aborted", self.query_id);
    }
}

/// Collapses a timeout-wrapped fetch result into a terminal slot.
fn terminal_slot<T>(
    query_id: u64,
    label: &str,
    result: Result<Result<T, SourceError>, tokio::time::error::Elapsed>,
) -> FetchSlot<T> {
    match result {
        Ok(Ok(value)) => FetchSlot::Ready(value),
        Ok(Err(e)) => {
            log::warn!("[q{query_id}] {label} fetch failed: {e}");
            FetchSlot::Failed(e.to_string())
        }
        Err(_) => {
            log::warn!(
                "[q{query_id}] {label} fetch timed out after {}s",
                FETCH_TIMEOUT.as_secs(),
            );
            FetchSlot::Failed(format!("timed out after {}s", FETCH_TIMEOUT.as_secs()))
        }
    }
}

/// Awaits a slot's terminal state via its watch channel. Event-driven —
/// suspends until the writer sends — and bounded because every fetch
/// task sends a terminal value within [`FETCH_TIMEOUT`].
async fn wait_terminal<T: Clone>(rx: &mut watch::Receiver<FetchSlot<T>>) -> FetchSlot<T> {
    loop {
        {
            let current = rx.borrow_and_update();
            if !current.is_pending() {
                return current.clone();
            }
        }
        if rx.changed().await.is_err() {
            // Writer dropped while pending: the fetch task was aborted.
            return FetchSlot::Failed("fetch cancelled".to_string());
        }
    }
}

/// Computes the event analysis and risk score from the two terminal
/// prerequisite slots. Runs exactly once per context — the derive task
/// calls it a single time after both awaits resolve.
fn derive(
    query_id: u64,
    stations: &FetchSlot<Vec<PoliceStation>>,
    events: &FetchSlot<Vec<RecentEvent>>,
    analysis_tx: &watch::Sender<Option<EventAnalysis>>,
    risk_tx: &watch::Sender<RiskState>,
) {
    let now = Local::now();
    let current_hour = u8::try_from(now.hour()).unwrap_or(0);
    let weekday = now.weekday();

    let event_list: &[RecentEvent] = events.as_ready().map_or(&[], Vec::as_slice);
    let station_count = stations
        .as_ready()
        .map_or(0, |stations| u32::try_from(stations.len()).unwrap_or(u32::MAX));
    let incident_count = u32::try_from(event_list.len()).unwrap_or(u32::MAX);

    let analysis = event_analysis::analyze(event_list, current_hour);
    let window = analysis
        .as_ref()
        .and_then(EventAnalysis::safest_window)
        .unwrap_or(DEFAULT_SAFE_WINDOW);

    let value = score::score(
        incident_count,
        station_count,
        window,
        current_hour,
        weekday,
        score::jitter(),
    );
    let risk = RiskState::scored(value);

    log::info!(
        "[q{query_id}] derived risk {value} ({:?}) from {incident_count} incident(s), \
         {station_count} station(s), window {}-{}",
        risk.state,
        window.start,
        window.end,
    );

    let _ = analysis_tx.send(analysis);
    let _ = risk_tx.send(risk);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use safety_watch_models::Coordinates;
    use std::sync::atomic::AtomicUsize;

    struct FakeRecommendations {
        delay: Duration,
        result: Result<Vec<String>, ()>,
    }

    #[async_trait]
    impl RecommendationSource for FakeRecommendations {
        async fn recommendations(
            &self,
            _query: &LocationQuery,
            _user_stats: &BTreeMap<String, String>,
        ) -> Result<Vec<String>, SourceError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().map_err(|()| SourceError::Decode {
                message: "recommendation fetch failed".to_string(),
            })
        }
    }

    struct FakeStations {
        delay: Duration,
        result: Result<Vec<PoliceStation>, ()>,
        calls_completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StationSource for FakeStations {
        async fn stations_near(
            &self,
            _center: Coordinates,
        ) -> Result<Vec<PoliceStation>, SourceError> {
            tokio::time::sleep(self.delay).await;
            self.calls_completed.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(|()| SourceError::Decode {
                message: "station search failed".to_string(),
            })
        }
    }

    struct FakeEvents {
        delay: Duration,
        result: Result<Vec<RecentEvent>, ()>,
    }

    #[async_trait]
    impl EventSource for FakeEvents {
        async fn recent_events(
            &self,
            _neighborhood: &str,
        ) -> Result<Vec<RecentEvent>, SourceError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().map_err(|()| SourceError::Decode {
                message: "event fetch failed".to_string(),
            })
        }
    }

    fn station(distance_miles: f64) -> PoliceStation {
        PoliceStation {
            name: "Mission Police Station".to_string(),
            address: "630 Valencia St".to_string(),
            phone: None,
            location: Coordinates {
                lat: 37.762,
                lng: -122.422,
            },
            distance_miles,
        }
    }

    fn event(time: &str) -> RecentEvent {
        RecentEvent {
            date: "2025-10-24".to_string(),
            time: time.to_string(),
            incident_number: "250880000".to_string(),
            location: "MISSION ST".to_string(),
            district: "Mission".to_string(),
            category: "Larceny Theft".to_string(),
            description: String::new(),
            resolution: "Open or Active".to_string(),
        }
    }

    struct FakeSet {
        recommendations: (Duration, Result<Vec<String>, ()>),
        stations: (Duration, Result<Vec<PoliceStation>, ()>),
        events: (Duration, Result<Vec<RecentEvent>, ()>),
    }

    fn sources(config: FakeSet) -> (Arc<Sources>, Arc<AtomicUsize>) {
        let station_calls = Arc::new(AtomicUsize::new(0));
        let sources = Arc::new(Sources {
            recommendations: Arc::new(FakeRecommendations {
                delay: config.recommendations.0,
                result: config.recommendations.1,
            }),
            stations: Arc::new(FakeStations {
                delay: config.stations.0,
                result: config.stations.1,
                calls_completed: Arc::clone(&station_calls),
            }),
            events: Arc::new(FakeEvents {
                delay: config.events.0,
                result: config.events.1,
            }),
            profile: Arc::new(safety_watch_source::EmptyProfile),
        });
        (sources, station_calls)
    }

    const INSTANT: Duration = Duration::ZERO;

    async fn wait_scored(context: &LocationContext) -> RiskState {
        let mut risk_rx = context.subscribe_risk();
        loop {
            let current = *risk_rx.borrow_and_update();
            if current.score.is_some() {
                return current;
            }
            risk_rx.changed().await.expect("risk channel closed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_returns_immediately_and_slots_start_pending() {
        let (sources, _) = sources(FakeSet {
            recommendations: (Duration::from_secs(5), Ok(vec!["tip".to_string()])),
            stations: (Duration::from_secs(5), Ok(vec![station(0.8)])),
            events: (Duration::from_secs(5), Ok(vec![event("22:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let snapshot = context.snapshot();
        assert!(snapshot.recommendations.is_pending());
        assert!(snapshot.stations.is_pending());
        assert!(snapshot.events.is_pending());
        assert!(snapshot.analysis.is_none());
        assert_eq!(snapshot.risk, RiskState::loading());
    }

    #[tokio::test(start_paused = true)]
    async fn full_success_populates_all_slots_and_scores() {
        let (sources, _) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec!["Stay on lit streets".to_string()])),
            stations: (INSTANT, Ok(vec![station(0.8), station(1.5)])),
            events: (INSTANT, Ok(vec![event("22:00"), event("22:30"), event("09:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let risk = wait_scored(&context).await;

        assert!(risk.score.is_some());
        assert_ne!(risk.state, safety_watch_models::SafetyState::Loading);

        let snapshot = context.snapshot();
        assert_eq!(snapshot.recommendations.as_ready().map(Vec::len), Some(1));
        assert_eq!(snapshot.stations.as_ready().map(Vec::len), Some(2));
        assert_eq!(snapshot.events.as_ready().map(Vec::len), Some(3));
        let analysis = snapshot.analysis.expect("analysis computed from 3 events");
        assert_eq!(analysis.primary_category.as_deref(), Some("Larceny Theft"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recommendations_never_block_the_score() {
        let (sources, _) = sources(FakeSet {
            // Slower than the fetch timeout: this slot ends up Failed,
            // long after the score is already derived.
            recommendations: (Duration::from_secs(120), Ok(vec![])),
            stations: (INSTANT, Ok(vec![station(0.8)])),
            events: (INSTANT, Ok(vec![event("22:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let risk = wait_scored(&context).await;
        assert!(risk.score.is_some());

        // The recommendation slot is still pending at this point.
        assert!(context.snapshot().recommendations.is_pending());

        // After the timeout it resolves to Failed without touching the
        // already-derived score.
        let mut rec_rx = context.subscribe_recommendations();
        rec_rx.changed().await.expect("recommendation slot resolves");
        assert!(matches!(
            &*rec_rx.borrow(),
            FetchSlot::Failed(reason) if reason.contains("timed out")
        ));
        assert_eq!(context.snapshot().risk, risk);
    }

    #[tokio::test(start_paused = true)]
    async fn risk_stays_loading_until_both_prerequisites_resolve() {
        let (sources, _) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec![])),
            stations: (Duration::from_secs(2), Ok(vec![station(0.8)])),
            events: (Duration::from_secs(8), Ok(vec![event("22:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);

        // Stations resolve at t=2s; events are still in flight, so the
        // risk must still be loading.
        let mut stations_rx = context.subscribe_stations();
        stations_rx.changed().await.expect("stations resolve");
        assert!(!context.snapshot().stations.is_pending());
        assert_eq!(context.snapshot().risk, RiskState::loading());

        let risk = wait_scored(&context).await;
        assert!(risk.score.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_event_batch_scores_with_fallback_window() {
        let (sources, _) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec![])),
            stations: (INSTANT, Ok(vec![station(0.5), station(1.0), station(1.5)])),
            events: (INSTANT, Ok(vec![])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let risk = wait_scored(&context).await;

        // No analysis from an empty batch; the score still derives via
        // the fallback window and the 3-station count.
        assert!(context.snapshot().analysis.is_none());
        assert!(risk.score.is_some());
        assert_ne!(risk.state, safety_watch_models::SafetyState::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_stations_score_as_zero_stations() {
        let (sources, _) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec![])),
            stations: (INSTANT, Err(())),
            events: (INSTANT, Ok(vec![event("22:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let risk = wait_scored(&context).await;
        assert!(risk.score.is_some());
        assert!(matches!(
            context.snapshot().stations,
            FetchSlot::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn derivation_happens_exactly_once() {
        let (sources, _) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec![])),
            stations: (INSTANT, Ok(vec![station(0.8)])),
            events: (INSTANT, Ok(vec![event("22:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let mut risk_rx = context.subscribe_risk();
        let risk = wait_scored(&context).await;

        // Long after every slot is terminal, no re-derivation occurs:
        // the risk channel never changes again.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!risk_rx.has_changed().unwrap_or(true) || *risk_rx.borrow_and_update() == risk);
        assert_eq!(context.snapshot().risk, risk);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_context_cancels_in_flight_fetches() {
        let (sources, station_calls) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec![])),
            stations: (Duration::from_secs(10), Ok(vec![station(0.8)])),
            events: (INSTANT, Ok(vec![])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        // Supersede before the station fetch completes.
        drop(context);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(station_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_fetch_fails_its_slot_only() {
        let (sources, _) = sources(FakeSet {
            recommendations: (INSTANT, Ok(vec!["tip".to_string()])),
            stations: (INSTANT, Ok(vec![station(0.8)])),
            events: (Duration::from_secs(3600), Ok(vec![event("22:00")])),
        });

        let context = LocationContext::open(LocationQuery::new(37.76, -122.41, "Mission"), &sources);
        let risk = wait_scored(&context).await;

        // The event fetch timed out; the score derived from the station
        // count and the fallback window.
        assert!(matches!(
            context.snapshot().events,
            FetchSlot::Failed(ref reason) if reason.contains("timed out")
        ));
        assert!(context.snapshot().analysis.is_none());
        assert!(risk.score.is_some());
    }
}

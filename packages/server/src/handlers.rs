//! HTTP handler functions for the safety-watch API.

use actix_web::{HttpResponse, web};
use safety_watch_context::LocationContext;
use safety_watch_server_models::{ApiHealth, OpenLocationRequest, OpenLocationResponse};

use crate::{AppState, MAX_SESSIONS};

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/locations`
///
/// Opens a session for the given location: launches the concurrent
/// fetches and returns the session id immediately. When `supersedes`
/// names an existing session, that session is closed first and its
/// in-flight work cancelled.
pub async fn open_location(
    state: web::Data<AppState>,
    body: web::Json<OpenLocationRequest>,
) -> HttpResponse {
    if !(-90.0..=90.0).contains(&body.latitude) || !(-180.0..=180.0).contains(&body.longitude) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "coordinates out of range"
        }));
    }

    let query = body.to_query();
    let context = LocationContext::open(query, &state.sources);
    let id = uuid::Uuid::new_v4().to_string();

    let Ok(mut sessions) = state.sessions.write() else {
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "session store unavailable"
        }));
    };

    if let Some(previous) = &body.supersedes {
        // Removing the entry drops the old context, aborting its tasks.
        if sessions.remove(previous).is_some() {
            log::info!("session {previous} superseded");
        }
    }

    if sessions.len() >= MAX_SESSIONS {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "too many open sessions"
        }));
    }

    sessions.insert(id.clone(), context);
    HttpResponse::Ok().json(OpenLocationResponse { id })
}

/// `GET /api/locations/{id}`
///
/// Returns the current snapshot: each slot as
/// `pending`/`ready`/`failed`, the event analysis once computed, and
/// the risk state (`LOADING` until derivable).
pub async fn location_snapshot(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = path.into_inner();

    let Ok(sessions) = state.sessions.read() else {
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "session store unavailable"
        }));
    };

    sessions.get(&id).map_or_else(
        || {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "unknown session"
            }))
        },
        |context| HttpResponse::Ok().json(context.snapshot()),
    )
}

/// `DELETE /api/locations/{id}`
///
/// Closes a session, cancelling any in-flight fetches.
pub async fn close_location(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();

    let Ok(mut sessions) = state.sessions.write() else {
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "session store unavailable"
        }));
    };

    if sessions.remove(&id).is_some() {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(serde_json::json!({
            "error": "unknown session"
        }))
    }
}

//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::ApiState;
use crate::capabilities::DISPLAYS_MODALITY;

/// Service name reported by the liveness probe
pub const SERVICE_NAME: &str = "unison-experience-renderer";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// Seconds since startup
    pub uptime: f64,
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

/// Individual readiness checks
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub manifest_loaded: bool,
    pub manifest_version: u64,
    pub displays: usize,
    pub last_error: Option<String>,
}

/// Liveness probe - is the service running?
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// Readiness probe - loaded manifest with at least one display
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let amended = state.manifest.amend(|manifest| {
        (manifest.modality_count(DISPLAYS_MODALITY) == 0).then(|| manifest.with_fallback_display())
    });
    if let Some(version) = amended {
        tracing::info!(version, "no displays advertised, added fallback display");
    }
    let snapshot = state.manifest.get();

    let manifest_loaded = snapshot.is_loaded();
    let displays = snapshot.manifest().modality_count(DISPLAYS_MODALITY);
    let ready = manifest_loaded && displays > 0;

    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(ReadinessResponse {
            ready,
            checks: ReadinessChecks {
                manifest_loaded,
                manifest_version: snapshot.version(),
                displays,
                last_error: state.refresher.as_ref().and_then(|r| r.last_error()),
            },
        }),
    )
}

/// Build health and readiness router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/readyz", get(ready))
        .with_state(state)
}

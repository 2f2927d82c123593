//! Capability manifest and invocation endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;

use super::error::ApiError;
use super::{ApiState, auth};
use crate::capabilities::{CapabilityManifest, CapabilityRequest, DISPLAYS_MODALITY};

/// Headers passed through to the backend on invocation
pub const FORWARDED_HEADERS: &[&str] = &["x-context-baton", "x-test-role"];

/// Build capabilities router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/capabilities", get(list))
        .route("/capabilities/refresh", post(refresh))
        .route("/capabilities/{capability}", post(invoke))
        .with_state(state)
}

/// Manifest listing
#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub manifest: CapabilityManifest,
    pub displays: usize,
    pub version: u64,
}

async fn list(State(state): State<Arc<ApiState>>) -> Result<Json<ManifestResponse>, ApiError> {
    let snapshot = state.manifest.get();
    if !snapshot.is_loaded() {
        return Err(ApiError::NotReady("capability manifest not loaded"));
    }

    Ok(Json(ManifestResponse {
        manifest: snapshot.manifest().clone(),
        displays: snapshot.manifest().modality_count(DISPLAYS_MODALITY),
        version: snapshot.version(),
    }))
}

/// Refresh outcome
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
    pub version: u64,
}

async fn refresh(State(state): State<Arc<ApiState>>) -> Json<RefreshResponse> {
    let ok = match &state.refresher {
        Some(refresher) => refresher.refresh().await,
        None => {
            tracing::debug!("manifest refresh requested without a source");
            false
        }
    };

    Json(RefreshResponse {
        ok,
        version: state.manifest.get().version(),
    })
}

/// Invoke a capability; the backend payload is returned unchanged
async fn invoke(
    State(state): State<Arc<ApiState>>,
    Path(capability): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice(&body)
                .map_err(|e| ApiError::BadRequest(format!("invalid JSON payload: {e}")))?,
        )
    };

    let mut request = CapabilityRequest::new(capability.as_str(), payload);
    request.headers = auth::forwarded_headers(&headers, FORWARDED_HEADERS);

    let ctx = auth::context_for(&state, &headers, &capability);
    let response = state.router.route(&request, &ctx).await?;

    Ok(Json(response))
}

//! Speech and dashboard proxies
//!
//! Thin wrappers over the capability router for backend calls that have a
//! fixed route when the manifest does not name one.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::{ApiState, auth};
use crate::capabilities::{BackendKind, CapabilityRequest};

/// Capability id for speech-to-text
pub const STT_CAPABILITY: &str = "speech.stt";

/// Capability checked before fetching a dashboard
pub const DASHBOARD_CAPABILITY: &str = "context.dashboard";

const STT_FALLBACK_ROUTE: &str = "/speech/stt";
const DASHBOARD_ROUTE: &str = "/dashboard";

/// Build proxy router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/speech/stt", post(speech_to_text))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

/// Forward an STT request; the body must carry `audio`
async fn speech_to_text(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if body.get("audio").is_none_or(Value::is_null) {
        return Err(ApiError::BadRequest("missing audio".to_string()));
    }

    let mut request = CapabilityRequest::new(STT_CAPABILITY, Some(body));
    request.headers = auth::forwarded_headers(&headers, &["x-context-baton"]);
    let ctx = auth::context_for(&state, &headers, STT_CAPABILITY);

    let response = state
        .router
        .route_or(&request, &ctx, (BackendKind::Speech, STT_FALLBACK_ROUTE))
        .await?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub person_id: Option<String>,
}

/// Fetch a person's dashboard from the context backend
async fn dashboard(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DashboardQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let person_id = query
        .person_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("person_id is required".to_string()))?;

    let mut request = CapabilityRequest::new(DASHBOARD_CAPABILITY, None).with_subpath(person_id);
    request.headers = auth::forwarded_headers(&headers, &["x-test-role"]);
    let ctx = auth::context_for(&state, &headers, DASHBOARD_CAPABILITY);

    let response = state
        .router
        .route_to(BackendKind::Context, DASHBOARD_ROUTE, &request, &ctx)
        .await?;

    Ok(Json(response))
}

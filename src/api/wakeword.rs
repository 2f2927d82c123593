//! Wake word configuration endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;
use super::{ApiState, auth};
use crate::capabilities::{BackendKind, CapabilityRequest};
use crate::voice::{DetectorConfig, GateStats, LiveConfig};

/// Capability checked before reading a person's profile
pub const PROFILE_CAPABILITY: &str = "context.profile";

/// Capability checked before changing the detector config
pub const CONFIGURE_CAPABILITY: &str = "wakeword.configure";

/// Build wake word router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/wakeword", get(current).put(update))
        .route("/wakeword/stats", get(stats))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct WakewordQuery {
    pub person_id: Option<String>,
}

/// Where the reported wake word came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakewordSource {
    Profile,
    Default,
}

#[derive(Debug, Serialize)]
pub struct WakewordResponse {
    pub wakeword: String,
    pub person_id: Option<String>,
    pub source: WakewordSource,
}

/// Wake word for a person, falling back to the live keyword
async fn current(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<WakewordQuery>,
    headers: HeaderMap,
) -> Json<WakewordResponse> {
    let person_id = query
        .person_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    if let Some(id) = &person_id {
        if let Some(wakeword) = profile_wakeword(&state, &headers, id).await {
            return Json(WakewordResponse {
                wakeword,
                person_id,
                source: WakewordSource::Profile,
            });
        }
    }

    Json(WakewordResponse {
        wakeword: state.detector.snapshot().config.target_keyword().to_string(),
        person_id,
        source: WakewordSource::Default,
    })
}

async fn profile_wakeword(state: &ApiState, headers: &HeaderMap, person_id: &str) -> Option<String> {
    let request = CapabilityRequest::new(PROFILE_CAPABILITY, None).with_subpath(person_id);
    let ctx = auth::context_for(state, headers, PROFILE_CAPABILITY);

    match state
        .router
        .route_to(BackendKind::Context, "/profile", &request, &ctx)
        .await
    {
        Ok(body) => {
            let wakeword = extract_wakeword(&body);
            if wakeword.is_none() {
                tracing::debug!(person_id, "profile has no wake word");
            }
            wakeword
        }
        Err(e) => {
            tracing::debug!(person_id, error = %e, "profile lookup failed, using default wake word");
            None
        }
    }
}

/// `profile.voice.wakeword`, accepting a bare profile object too
fn extract_wakeword(body: &Value) -> Option<String> {
    let profile = body.get("profile").unwrap_or(body);
    profile
        .get("voice")
        .and_then(|v| v.get("wakeword"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
}

#[derive(Debug, Default, Deserialize)]
pub struct WakewordUpdate {
    pub keyword: Option<String>,
    pub threshold: Option<f32>,
    pub active: Option<bool>,
}

/// Swap in a new detector config derived from the current one
async fn update(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<WakewordUpdate>,
) -> Result<Json<LiveConfig>, ApiError> {
    let request = CapabilityRequest::new(CONFIGURE_CAPABILITY, None);
    let ctx = auth::context_for(&state, &headers, CONFIGURE_CAPABILITY);
    state.router.authorize(&request, &ctx)?;

    let live = state
        .detector
        .update(|current| {
            let keyword = body.keyword.as_deref().unwrap_or(current.target_keyword());
            let threshold = body.threshold.unwrap_or(current.threshold());
            let active = body.active.unwrap_or(current.active());
            DetectorConfig::new(keyword, threshold).map(|c| c.with_active(active))
        })
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(Json((*live).clone()))
}

async fn stats(State(state): State<Arc<ApiState>>) -> Result<Json<GateStats>, ApiError> {
    state
        .gate_monitor
        .as_ref()
        .map(|m| Json(m.stats()))
        .ok_or(ApiError::NotReady("wake word gate not running"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wakeword_from_profile_envelope() {
        let body = json!({"profile": {"voice": {"wakeword": "Computer"}}});
        assert_eq!(extract_wakeword(&body).as_deref(), Some("Computer"));
    }

    #[test]
    fn wakeword_from_bare_profile() {
        let body = json!({"voice": {"wakeword": "jarvis"}});
        assert_eq!(extract_wakeword(&body).as_deref(), Some("jarvis"));
    }

    #[test]
    fn missing_or_blank_wakeword() {
        assert_eq!(extract_wakeword(&json!({"profile": {}})), None);
        assert_eq!(extract_wakeword(&json!({"profile": {"voice": {"wakeword": "  "}}})), None);
        assert_eq!(extract_wakeword(&json!("not an object")), None);
    }
}

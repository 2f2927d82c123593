//! Rate limiting for capability invocation
//!
//! One process-wide token bucket; requests over quota are refused before
//! authorization or routing run, so they never reach a backend.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};

use super::ApiState;
use super::error::ApiError;

/// Bucket shared by every capability route
pub type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Allow `per_minute` invocations per minute, all of them as an initial burst
///
/// Zero is treated as one.
pub fn create_limiter(per_minute: u32) -> SharedLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Refuse capability requests over quota; a no-op without a limiter
pub async fn rate_limit_middleware(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let over_quota = state
        .rate_limiter
        .as_ref()
        .is_some_and(|limiter| limiter.check().is_err());

    if over_quota {
        tracing::warn!(path = %req.uri().path(), "capability rate limit exceeded");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}

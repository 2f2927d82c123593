//! HTTP API server for the experience renderer

pub mod audio;
mod auth;
pub mod capabilities;
pub mod error;
pub mod health;
pub mod proxy;
pub mod rate_limit;
pub mod ui;
pub mod wakeword;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use audio::{AudioIngress, IngressReceipt};
pub use error::ApiError;

use crate::Result;
use crate::capabilities::{CapabilityRouter, ManifestCache, ManifestRefresher};
use crate::security::{AuthMode, TokenDirectory};
use crate::voice::{DetectorHandle, GateMonitor};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub router: CapabilityRouter,
    pub manifest: Arc<ManifestCache>,
    pub refresher: Option<Arc<ManifestRefresher>>,
    pub detector: DetectorHandle,
    pub gate_monitor: Option<GateMonitor>,
    pub ingress: Option<Arc<AudioIngress>>,
    pub tokens: TokenDirectory,
    pub auth_mode: AuthMode,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
    pub started_at: Instant,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    router: CapabilityRouter,
    detector: DetectorHandle,
    port: u16,
    refresher: Option<Arc<ManifestRefresher>>,
    gate_monitor: Option<GateMonitor>,
    ingress: Option<Arc<AudioIngress>>,
    tokens: TokenDirectory,
    auth_mode: AuthMode,
    rate_limit_rpm: Option<u32>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(router: CapabilityRouter, detector: DetectorHandle, port: u16) -> Self {
        Self {
            router,
            detector,
            port,
            refresher: None,
            gate_monitor: None,
            ingress: None,
            tokens: TokenDirectory::default(),
            auth_mode: AuthMode::Enforce,
            rate_limit_rpm: None,
        }
    }

    /// Set the manifest refresher used by refresh and readiness
    #[must_use]
    pub fn refresher(mut self, refresher: Arc<ManifestRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Expose a running gate's counters
    #[must_use]
    pub fn gate_monitor(mut self, monitor: GateMonitor) -> Self {
        self.gate_monitor = Some(monitor);
        self
    }

    /// Accept audio uploads into the frame buffer
    #[must_use]
    pub fn ingress(mut self, ingress: Arc<AudioIngress>) -> Self {
        self.ingress = Some(ingress);
        self
    }

    /// Set the bearer token directory
    #[must_use]
    pub fn tokens(mut self, tokens: TokenDirectory) -> Self {
        self.tokens = tokens;
        self
    }

    /// Set the authorization mode
    #[must_use]
    pub const fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    /// Limit capability invocations per minute
    #[must_use]
    pub const fn rate_limit_rpm(mut self, rpm: Option<u32>) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let manifest = Arc::clone(self.router.manifest());
        let rate_limiter = self.rate_limit_rpm.map(rate_limit::create_limiter);

        let state = Arc::new(ApiState {
            router: self.router,
            manifest,
            refresher: self.refresher,
            detector: self.detector,
            gate_monitor: self.gate_monitor,
            ingress: self.ingress,
            tokens: self.tokens,
            auth_mode: self.auth_mode,
            rate_limiter,
            started_at: Instant::now(),
        });

        ApiServer {
            state,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub const fn state(&self) -> &Arc<ApiState> {
        &self.state
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        // Rate limiting applies to capability invocation only
        let capabilities = capabilities::router(self.state.clone()).layer(
            axum::middleware::from_fn_with_state(
                self.state.clone(),
                rate_limit::rate_limit_middleware,
            ),
        );

        let router = Router::new()
            .merge(capabilities)
            .merge(wakeword::router(self.state.clone()))
            .merge(proxy::router(self.state.clone()))
            .merge(audio::router(self.state.clone()))
            .merge(health::router(self.state.clone()))
            .merge(ui::router());

        // CORS layer for cross-origin requests from the display frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.auth_mode.is_bypass() {
            tracing::warn!("authorization bypass active for all API requests");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

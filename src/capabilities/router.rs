//! Capability router
//!
//! Resolves a capability request to one backend via the manifest, applies
//! the authorization gate, makes exactly one backend call and classifies
//! any failure. Successful payloads are returned untouched.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::cache::{ManifestCache, ManifestSnapshot};
use super::manifest::{BackendKind, BackendRoutes};
use super::transport::{Method, OutboundCall, Transport, TransportError};
use crate::security::{AuthorizationContext, AuthorizationGate};

/// Default per-call backend timeout
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// An inbound capability request
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRequest {
    pub capability: String,
    /// Sent as a JSON body (POST); `None` issues a GET
    pub payload: Option<Value>,
    /// Appended to the manifest route, e.g. a person id
    pub subpath: Option<String>,
    /// Headers forwarded to the backend as-is
    pub headers: Vec<(String, String)>,
}

impl CapabilityRequest {
    #[must_use]
    pub fn new(capability: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            capability: capability.into(),
            payload,
            subpath: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Classified routing failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// Authorization denied; no backend was called
    #[error("not authorized for capability {capability}")]
    Unauthorized { capability: String },

    /// Capability absent from the current manifest snapshot
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// No usable manifest (never loaded, or stale under fail-closed policy)
    #[error("capability manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// Subpath would not stay a single segment under the route
    #[error("invalid subpath: {0:?}")]
    InvalidSubpath(String),

    /// Backend could not be reached or did not answer in time
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: BackendKind,
        reason: String,
        timed_out: bool,
    },

    /// Backend answered with a failure status
    #[error("{backend} backend returned status {status}")]
    BackendError {
        backend: BackendKind,
        status: u16,
        body: Value,
    },
}

impl RouteError {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::UnknownCapability(_) => "unknown_capability",
            Self::ManifestUnavailable(_) => "manifest_unavailable",
            Self::InvalidSubpath(_) => "invalid_subpath",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendError { .. } => "backend_error",
        }
    }
}

/// What to do when the manifest snapshot is older than allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Route with the stale snapshot
    #[default]
    Serve,
    /// Refuse with `ManifestUnavailable`
    FailClosed,
}

/// Router tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    pub timeout: Duration,
    pub max_manifest_age: Option<Duration>,
    pub stale_policy: StalePolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BACKEND_TIMEOUT,
            max_manifest_age: None,
            stale_policy: StalePolicy::Serve,
        }
    }
}

/// Routes capability requests to backends
#[derive(Clone)]
pub struct CapabilityRouter {
    manifest: Arc<ManifestCache>,
    gate: AuthorizationGate,
    routes: BackendRoutes,
    transport: Arc<dyn Transport>,
    config: RouterConfig,
}

impl std::fmt::Debug for CapabilityRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRouter")
            .field("routes", &self.routes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CapabilityRouter {
    #[must_use]
    pub fn new(
        manifest: Arc<ManifestCache>,
        gate: AuthorizationGate,
        routes: BackendRoutes,
        transport: Arc<dyn Transport>,
        config: RouterConfig,
    ) -> Self {
        Self {
            manifest,
            gate,
            routes,
            transport,
            config,
        }
    }

    /// Route a request through the manifest
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`RouteError`]
    pub async fn route(
        &self,
        request: &CapabilityRequest,
        auth: &AuthorizationContext,
    ) -> Result<Value, RouteError> {
        self.authorize(request, auth)?;

        let snapshot = self.manifest.get();
        self.check_usable(&snapshot, &request.capability)?;

        let descriptor = snapshot
            .manifest()
            .get(&request.capability)
            .ok_or_else(|| RouteError::UnknownCapability(request.capability.clone()))?;

        self.dispatch(descriptor.kind, &descriptor.route, request).await
    }

    /// Route through the manifest, or to `fallback` when it has no entry
    ///
    /// The entry lookup and the route it yields come from one snapshot, so a
    /// concurrent manifest swap cannot turn a fallback into an unknown
    /// capability. A missing or never-loaded manifest takes the fallback.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`RouteError`]
    pub async fn route_or(
        &self,
        request: &CapabilityRequest,
        auth: &AuthorizationContext,
        fallback: (BackendKind, &str),
    ) -> Result<Value, RouteError> {
        self.authorize(request, auth)?;

        let snapshot = self.manifest.get();
        match snapshot.manifest().get(&request.capability) {
            Some(descriptor) => {
                self.check_usable(&snapshot, &request.capability)?;
                self.dispatch(descriptor.kind, &descriptor.route, request).await
            }
            None => {
                let (backend, route) = fallback;
                tracing::debug!(
                    capability = %request.capability,
                    %backend,
                    route,
                    "capability not in manifest, using fallback route"
                );
                self.dispatch(backend, route, request).await
            }
        }
    }

    fn check_usable(&self, snapshot: &ManifestSnapshot, capability: &str) -> Result<(), RouteError> {
        if !snapshot.is_loaded() {
            return Err(RouteError::ManifestUnavailable("not loaded".to_string()));
        }

        if let Some(max_age) = self.config.max_manifest_age {
            if snapshot.is_stale(max_age) {
                match self.config.stale_policy {
                    StalePolicy::FailClosed => {
                        tracing::warn!(
                            version = snapshot.version(),
                            capability,
                            "refusing to route with stale manifest"
                        );
                        return Err(RouteError::ManifestUnavailable("stale".to_string()));
                    }
                    StalePolicy::Serve => {
                        tracing::debug!(version = snapshot.version(), "routing with stale manifest");
                    }
                }
            }
        }
        Ok(())
    }

    /// Route to a fixed backend route, bypassing the manifest lookup
    ///
    /// Authorization still applies.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`RouteError`]
    pub async fn route_to(
        &self,
        backend: BackendKind,
        route: &str,
        request: &CapabilityRequest,
        auth: &AuthorizationContext,
    ) -> Result<Value, RouteError> {
        self.authorize(request, auth)?;
        self.dispatch(backend, route, request).await
    }

    /// The manifest cache this router reads
    #[must_use]
    pub const fn manifest(&self) -> &Arc<ManifestCache> {
        &self.manifest
    }

    #[must_use]
    pub const fn routes(&self) -> &BackendRoutes {
        &self.routes
    }

    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Apply the authorization gate alone
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Unauthorized`] when denied
    pub fn authorize(
        &self,
        request: &CapabilityRequest,
        auth: &AuthorizationContext,
    ) -> Result<(), RouteError> {
        if self.gate.decide(request, auth).is_allow() {
            Ok(())
        } else {
            Err(RouteError::Unauthorized {
                capability: request.capability.clone(),
            })
        }
    }

    async fn dispatch(
        &self,
        backend: BackendKind,
        route: &str,
        request: &CapabilityRequest,
    ) -> Result<Value, RouteError> {
        let unresolved = |reason: String| RouteError::BackendUnavailable {
            backend,
            reason,
            timed_out: false,
        };

        let mut url = self
            .routes
            .resolve(backend, route)
            .map_err(|e| unresolved(format!("invalid route {route}: {e}")))?;

        // The subpath is one encoded segment, so it can never leave the route
        if let Some(sub) = &request.subpath {
            let segment = sub.trim_matches('/');
            if matches!(segment, "" | "." | "..") {
                return Err(RouteError::InvalidSubpath(sub.clone()));
            }
            url.path_segments_mut()
                .map_err(|()| unresolved(format!("route {route} cannot take a subpath")))?
                .pop_if_empty()
                .push(segment);
        }

        let call = OutboundCall {
            request_id: Uuid::new_v4(),
            backend,
            method: if request.payload.is_some() {
                Method::Post
            } else {
                Method::Get
            },
            url,
            payload: request.payload.clone(),
            headers: request.headers.clone(),
        };
        let request_id = call.request_id;

        tracing::debug!(
            %request_id,
            capability = %request.capability,
            %backend,
            url = %call.url,
            "dispatching capability"
        );

        let response = match tokio::time::timeout(self.config.timeout, self.transport.send(call)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(TransportError::Timeout)) | Err(_) => {
                tracing::warn!(%request_id, %backend, timeout = ?self.config.timeout, "backend timed out");
                return Err(RouteError::BackendUnavailable {
                    backend,
                    reason: format!("no response within {:?}", self.config.timeout),
                    timed_out: true,
                });
            }
            Ok(Err(TransportError::Connect(reason))) => {
                tracing::warn!(%request_id, %backend, %reason, "backend unreachable");
                return Err(RouteError::BackendUnavailable {
                    backend,
                    reason,
                    timed_out: false,
                });
            }
        };

        if response.is_success() {
            Ok(response.body)
        } else {
            tracing::warn!(%request_id, %backend, status = response.status, "backend returned failure");
            Err(RouteError::BackendError {
                backend,
                status: response.status,
                body: response.body,
            })
        }
    }
}

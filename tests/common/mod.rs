//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use experience_renderer::capabilities::{
    BackendKind, BackendRoutes, CapabilityManifest, CapabilityRouter, ManifestCache, OutboundCall,
    RouterConfig, Transport, TransportError, TransportResponse,
};
use experience_renderer::security::{AllowAll, AuthorizationGate, AuthorizationPolicy};
use serde_json::{Value, json};
use url::Url;

/// How the fake backend answers a call
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(u16, Value),
    Refuse,
    /// Never answers
    Hang,
}

/// In-process backend that records every call
#[derive(Debug)]
pub struct FakeTransport {
    calls: Mutex<Vec<OutboundCall>>,
    replies: Mutex<HashMap<String, Reply>>,
    fallback: Reply,
}

impl FakeTransport {
    /// Answers every call with `200 {"ok": true}` unless overridden
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_fallback(Reply::Respond(200, json!({"ok": true})))
    }

    #[must_use]
    pub fn with_fallback(fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            fallback,
        })
    }

    /// Answer calls to `path` with `reply`
    pub fn reply(&self, path: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(path.to_string(), reply);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, call: OutboundCall) -> Result<TransportResponse, TransportError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(call.url.path())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        self.calls.lock().unwrap().push(call);

        match reply {
            Reply::Respond(status, body) => Ok(TransportResponse { status, body }),
            Reply::Refuse => Err(TransportError::Connect("connection refused".to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Timeout)
            }
        }
    }
}

/// Base addresses whose hosts name the backend
#[must_use]
pub fn test_routes() -> BackendRoutes {
    BackendRoutes::new(
        Url::parse("http://orchestrator.test").unwrap(),
        Url::parse("http://context.test").unwrap(),
        Url::parse("http://speech.test").unwrap(),
    )
}

/// A manifest with one capability per backend and one display
#[must_use]
pub fn test_manifest() -> CapabilityManifest {
    CapabilityManifest::new()
        .with_capability("intent.submit", BackendKind::Orchestrator, "/intent")
        .with_capability("profile.read", BackendKind::Context, "/profile")
        .with_capability("speech.tts", BackendKind::Speech, "/tts")
        .with_modality_entry("displays", json!({"id": "wall", "name": "Living room"}))
}

/// Router over `cache` and `transport` with the given policy
#[must_use]
pub fn test_router(
    cache: Arc<ManifestCache>,
    transport: Arc<FakeTransport>,
    policy: Arc<dyn AuthorizationPolicy>,
    config: RouterConfig,
) -> CapabilityRouter {
    CapabilityRouter::new(
        cache,
        AuthorizationGate::new(policy),
        test_routes(),
        transport,
        config,
    )
}

/// Router with a loaded manifest that allows everything
#[must_use]
pub fn open_router(transport: Arc<FakeTransport>) -> CapabilityRouter {
    test_router(
        Arc::new(ManifestCache::with_manifest(test_manifest())),
        transport,
        Arc::new(AllowAll),
        RouterConfig::default(),
    )
}

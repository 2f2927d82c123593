//! Experience renderer - wake word gate and capability proxy for Unison
//!
//! This library provides the core of the renderer service:
//! - Audio frame buffering with backpressure
//! - Edge-triggered wake word detection over a rolling window
//! - Capability manifest caching and proxy routing to backends
//! - Authorization of capability requests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      HTTP API                         │
//! │  /audio  │  /wakeword  │  /capabilities  │  /speech   │
//! └─────┬─────────────┬───────────────┬──────────────────┘
//!       │             │               │
//! ┌─────▼──────┐ ┌────▼─────┐ ┌──────▼──────────────────┐
//! │Frame Buffer├─►  Wake    │ │ Authorization Gate      │
//! │ (bounded)  │ │  Word    │ │ Capability Router       │
//! └────────────┘ │  Gate    │ │ Manifest Cache          │
//!                └──────────┘ └──────┬──────────────────┘
//!                                    │
//!                 orchestrator │ context │ speech
//! ```

pub mod api;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod renderer;
pub mod security;
pub mod voice;

pub use capabilities::{
    CapabilityManifest, CapabilityRequest, CapabilityRouter, ManifestCache, RouteError,
};
pub use config::Config;
pub use error::{Error, Result};
pub use renderer::Renderer;
pub use security::{AuthMode, AuthorizationContext, AuthorizationGate, Principal};
pub use voice::{ActivationEvent, AudioFrame, DetectorConfig, DetectorHandle, WakeWordGate};

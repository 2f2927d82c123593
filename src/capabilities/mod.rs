//! Capability manifest, cache, and proxy routing

mod cache;
mod manifest;
mod refresh;
mod router;
mod transport;

pub use cache::{ManifestCache, ManifestSnapshot};
pub use manifest::{
    BackendDescriptor, BackendKind, BackendRoutes, CapabilityManifest, DISPLAYS_MODALITY,
};
pub use refresh::{HttpManifestSource, ManifestRefresher, ManifestSource};
pub use router::{
    CapabilityRequest, CapabilityRouter, DEFAULT_BACKEND_TIMEOUT, RouteError, RouterConfig,
    StalePolicy,
};
pub use transport::{
    HttpTransport, Method, OutboundCall, Transport, TransportError, TransportResponse,
};

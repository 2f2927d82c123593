//! Capability manifest model
//!
//! The orchestrator publishes a manifest mapping capability ids to the
//! backend that implements them. Only the `capabilities` map is interpreted;
//! everything else (modalities, metadata) is carried through untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::{Error, Result};

/// Modality listing the renderer's display surfaces
pub const DISPLAYS_MODALITY: &str = "displays";

/// The closed set of backends a capability can route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Intent orchestration
    Orchestrator,
    /// Context and profile store
    Context,
    /// Speech (STT/TTS)
    Speech,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::Orchestrator, Self::Context, Self::Speech];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Context => "context",
            Self::Speech => "speech",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "orchestrator" => Ok(Self::Orchestrator),
            "context" => Ok(Self::Context),
            "speech" => Ok(Self::Speech),
            other => Err(Error::Manifest(format!("unknown backend kind: {other}"))),
        }
    }
}

/// Where a capability is served
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    #[serde(rename = "backend")]
    pub kind: BackendKind,
    /// Path on the backend, always starting with `/`
    pub route: String,
}

impl BackendDescriptor {
    #[must_use]
    pub fn new(kind: BackendKind, route: &str) -> Self {
        Self {
            kind,
            route: normalize_route(route),
        }
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    backend: String,
    route: String,
}

/// Capability id → backend mapping plus opaque manifest data
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityManifest {
    capabilities: BTreeMap<String, BackendDescriptor>,
    modalities: BTreeMap<String, Vec<Value>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl CapabilityManifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a capability entry
    #[must_use]
    pub fn with_capability(mut self, id: &str, kind: BackendKind, route: &str) -> Self {
        self.capabilities
            .insert(id.to_string(), BackendDescriptor::new(kind, route));
        self
    }

    /// Add an entry to a modality list
    #[must_use]
    pub fn with_modality_entry(mut self, modality: &str, entry: Value) -> Self {
        self.modalities
            .entry(modality.to_string())
            .or_default()
            .push(entry);
        self
    }

    /// Decode a manifest from JSON bytes
    ///
    /// Capability entries with an unknown backend or missing fields are
    /// skipped with a warning rather than rejecting the whole manifest.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a JSON object
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decode a manifest from a JSON value
    ///
    /// # Errors
    ///
    /// Returns error if the value is not a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(Error::Manifest("manifest must be a JSON object".to_string()));
        };

        let mut capabilities = BTreeMap::new();
        if let Some(raw) = root.remove("capabilities") {
            let Value::Object(entries) = raw else {
                return Err(Error::Manifest("`capabilities` must be an object".to_string()));
            };

            for (id, entry) in entries {
                match decode_entry(entry) {
                    Ok(descriptor) => {
                        capabilities.insert(id, descriptor);
                    }
                    Err(e) => {
                        tracing::warn!(capability = %id, error = %e, "skipping manifest entry");
                    }
                }
            }
        }

        let mut modalities = BTreeMap::new();
        if let Some(Value::Object(raw)) = root.remove("modalities") {
            for (name, entries) in raw {
                match entries {
                    Value::Array(list) => {
                        modalities.insert(name, list);
                    }
                    other => {
                        tracing::debug!(modality = %name, kind = ?other, "ignoring non-list modality");
                    }
                }
            }
        }

        Ok(Self {
            capabilities,
            modalities,
            extra: root,
        })
    }

    /// Look up a capability
    #[must_use]
    pub fn get(&self, capability: &str) -> Option<&BackendDescriptor> {
        self.capabilities.get(capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = (&str, &BackendDescriptor)> {
        self.capabilities.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Number of entries advertised for a modality
    #[must_use]
    pub fn modality_count(&self, modality: &str) -> usize {
        self.modalities.get(modality).map_or(0, Vec::len)
    }

    /// Copy of this manifest with a default display when none is advertised
    #[must_use]
    pub fn with_fallback_display(&self) -> Self {
        if self.modality_count(DISPLAYS_MODALITY) > 0 {
            return self.clone();
        }
        self.clone().with_modality_entry(
            DISPLAYS_MODALITY,
            serde_json::json!({ "id": "default", "name": "fallback" }),
        )
    }
}

fn decode_entry(entry: Value) -> Result<BackendDescriptor> {
    let raw: RawDescriptor = serde_json::from_value(entry)?;
    let kind = raw.backend.parse()?;
    Ok(BackendDescriptor::new(kind, &raw.route))
}

fn normalize_route(route: &str) -> String {
    let trimmed = route.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Base addresses of the three backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRoutes {
    orchestrator: Url,
    context: Url,
    speech: Url,
}

impl BackendRoutes {
    #[must_use]
    pub const fn new(orchestrator: Url, context: Url, speech: Url) -> Self {
        Self {
            orchestrator,
            context,
            speech,
        }
    }

    /// Base address for a backend
    #[must_use]
    pub const fn base(&self, kind: BackendKind) -> &Url {
        match kind {
            BackendKind::Orchestrator => &self.orchestrator,
            BackendKind::Context => &self.context,
            BackendKind::Speech => &self.speech,
        }
    }

    /// Append `route` to the backend's base address
    ///
    /// Unlike [`Url::join`], a leading `/` in `route` keeps the base path.
    ///
    /// # Errors
    ///
    /// Returns error if the combined address is not a valid URL
    pub fn resolve(&self, kind: BackendKind, route: &str) -> Result<Url> {
        let base = self.base(kind).as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{}", normalize_route(route)))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_capabilities_and_modalities() {
        let manifest = CapabilityManifest::from_slice(
            br#"{
                "capabilities": {
                    "intent.submit": {"backend": "orchestrator", "route": "/intent"},
                    "profile.read": {"backend": "context", "route": "profile"}
                },
                "modalities": {"displays": [{"id": "wall"}]},
                "version": "2"
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.get("intent.submit"),
            Some(&BackendDescriptor::new(BackendKind::Orchestrator, "/intent"))
        );
        assert_eq!(manifest.get("profile.read").unwrap().route, "/profile");
        assert_eq!(manifest.modality_count("displays"), 1);
        assert_eq!(manifest.modality_count("speakers"), 0);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let manifest = CapabilityManifest::from_slice(
            br#"{"capabilities": {
                "ok": {"backend": "speech", "route": "/tts"},
                "bad-kind": {"backend": "billing", "route": "/x"},
                "no-route": {"backend": "speech"}
            }}"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("bad-kind").is_none());
    }

    #[test]
    fn non_object_rejected() {
        assert!(CapabilityManifest::from_slice(b"[]").is_err());
        assert!(CapabilityManifest::from_slice(br#"{"capabilities": []}"#).is_err());
    }

    #[test]
    fn opaque_fields_survive_serialization() {
        let manifest = CapabilityManifest::from_slice(br#"{"owner": "orchestrator"}"#).unwrap();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["owner"], "orchestrator");
    }

    #[test]
    fn fallback_display_only_when_missing() {
        let empty = CapabilityManifest::new();
        assert_eq!(empty.with_fallback_display().modality_count(DISPLAYS_MODALITY), 1);

        let with_display = CapabilityManifest::new()
            .with_modality_entry(DISPLAYS_MODALITY, serde_json::json!({"id": "wall"}))
            .with_modality_entry(DISPLAYS_MODALITY, serde_json::json!({"id": "tv"}));
        assert_eq!(with_display.with_fallback_display().modality_count(DISPLAYS_MODALITY), 2);
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!("Speech".parse::<BackendKind>().unwrap(), BackendKind::Speech);
        assert!("storage".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Context.to_string(), "context");
    }

    #[test]
    fn resolve_keeps_base_path() {
        let routes = BackendRoutes::new(
            Url::parse("http://orchestrator:8080/api/").unwrap(),
            Url::parse("http://context:8081").unwrap(),
            Url::parse("http://speech:8084").unwrap(),
        );

        assert_eq!(
            routes.resolve(BackendKind::Orchestrator, "/intent").unwrap().as_str(),
            "http://orchestrator:8080/api/intent"
        );
        assert_eq!(
            routes.resolve(BackendKind::Context, "profile/p1").unwrap().as_str(),
            "http://context:8081/profile/p1"
        );
    }
}

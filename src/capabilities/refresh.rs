//! Manifest loading and periodic refresh
//!
//! A failed fetch keeps the previous snapshot in place and records the
//! error for the readiness report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use tokio::task::JoinHandle;
use url::Url;

use super::cache::ManifestCache;
use super::manifest::CapabilityManifest;
use crate::{Error, Result};

/// Where manifests come from
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch and decode the current manifest
    async fn fetch(&self) -> Result<CapabilityManifest>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Fetches the manifest over HTTP, or reads it from a `file://` URL
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    location: Location,
    client: Client,
}

#[derive(Debug, Clone)]
enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl HttpManifestSource {
    /// # Errors
    ///
    /// Returns error for unsupported schemes or if the HTTP client cannot
    /// be built
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let location = match url.scheme() {
            "http" | "https" => Location::Remote(url),
            "file" => Location::Local(
                url.to_file_path()
                    .map_err(|()| Error::Config(format!("invalid manifest file URL: {url}")))?,
            ),
            other => {
                return Err(Error::Config(format!(
                    "unsupported manifest URL scheme: {other}"
                )));
            }
        };

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { location, client })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self) -> Result<CapabilityManifest> {
        let bytes = match &self.location {
            Location::Remote(url) => {
                let response = self.client.get(url.clone()).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Manifest(format!(
                        "manifest fetch returned status {status}"
                    )));
                }
                response.bytes().await?.to_vec()
            }
            Location::Local(path) => tokio::fs::read(path).await?,
        };

        CapabilityManifest::from_slice(&bytes)
    }

    fn describe(&self) -> String {
        match &self.location {
            Location::Remote(url) => url.to_string(),
            Location::Local(path) => path.display().to_string(),
        }
    }
}

/// Pulls manifests from a source into the cache
pub struct ManifestRefresher {
    source: Arc<dyn ManifestSource>,
    cache: Arc<ManifestCache>,
    last_error: RwLock<Option<String>>,
}

impl std::fmt::Debug for ManifestRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestRefresher")
            .field("source", &self.source.describe())
            .field("last_error", &*self.last_error.read())
            .finish_non_exhaustive()
    }
}

impl ManifestRefresher {
    #[must_use]
    pub fn new(source: Arc<dyn ManifestSource>, cache: Arc<ManifestCache>) -> Self {
        Self {
            source,
            cache,
            last_error: RwLock::new(None),
        }
    }

    /// Fetch once and install the result
    ///
    /// Returns whether a new snapshot was installed. On failure the cache
    /// is untouched.
    pub async fn refresh(&self) -> bool {
        match self.source.fetch().await {
            Ok(manifest) => {
                let version = self.cache.replace(manifest);
                *self.last_error.write() = None;
                tracing::debug!(version, source = %self.source.describe(), "manifest refreshed");
                true
            }
            Err(e) => {
                tracing::warn!(source = %self.source.describe(), error = %e, "manifest refresh failed");
                *self.last_error.write() = Some(e.to_string());
                false
            }
        }
    }

    /// Error from the most recent refresh, if it failed
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<ManifestCache> {
        &self.cache
    }

    /// Refresh every `interval` until the task is aborted
    ///
    /// The first tick fires after one full interval.
    #[must_use]
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}

//! Latest-snapshot manifest cache
//!
//! Readers get an `Arc` to an immutable snapshot and never wait on a fetch.
//! Writers swap in a whole new snapshot. Staleness is reported, never
//! enforced here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::manifest::CapabilityManifest;

/// One immutable version of the manifest
#[derive(Debug, Clone)]
pub struct ManifestSnapshot {
    version: u64,
    manifest: Arc<CapabilityManifest>,
    loaded_at: Option<Instant>,
    fetched_at: Option<DateTime<Utc>>,
    invalidated: bool,
}

impl ManifestSnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            manifest: Arc::new(CapabilityManifest::default()),
            loaded_at: None,
            fetched_at: None,
            invalidated: false,
        }
    }

    /// Monotonic version; 0 means nothing has been loaded yet
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.version > 0
    }

    /// Wall-clock time the snapshot was installed
    #[must_use]
    pub const fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Time since the snapshot was installed
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.loaded_at.map(|t| t.elapsed())
    }

    #[must_use]
    pub const fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// True when never loaded, invalidated, or older than `max_age`
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        if self.invalidated {
            return true;
        }
        self.age().is_none_or(|age| age > max_age)
    }
}

/// Holds the most recent manifest snapshot
#[derive(Debug)]
pub struct ManifestCache {
    current: RwLock<Arc<ManifestSnapshot>>,
}

impl Default for ManifestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestCache {
    /// Create an empty cache (version 0, not loaded)
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ManifestSnapshot::empty())),
        }
    }

    /// Create a cache already holding `manifest`
    #[must_use]
    pub fn with_manifest(manifest: CapabilityManifest) -> Self {
        let cache = Self::new();
        cache.replace(manifest);
        cache
    }

    /// Latest snapshot, possibly stale
    #[must_use]
    pub fn get(&self) -> Arc<ManifestSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Install a new manifest, returning its version
    pub fn replace(&self, manifest: CapabilityManifest) -> u64 {
        let entries = manifest.len();
        let mut current = self.current.write();
        let version = current.version + 1;
        *current = Arc::new(ManifestSnapshot {
            version,
            manifest: Arc::new(manifest),
            loaded_at: Some(Instant::now()),
            fetched_at: Some(Utc::now()),
            invalidated: false,
        });
        drop(current);

        tracing::info!(version, entries, "capability manifest replaced");
        version
    }

    /// Derive a corrected manifest from the loaded one, in place
    ///
    /// `derive` runs under the write lock, so a concurrent
    /// [`replace`](Self::replace) is never overwritten with older entries.
    /// The version is bumped but load time, fetch time and invalidation are
    /// kept: an amendment is not a fetch and does not make the snapshot
    /// fresh. Returns the new version, or `None` when nothing was loaded or
    /// `derive` declined.
    pub fn amend<F>(&self, derive: F) -> Option<u64>
    where
        F: FnOnce(&CapabilityManifest) -> Option<CapabilityManifest>,
    {
        let mut current = self.current.write();
        if !current.is_loaded() {
            return None;
        }
        let manifest = derive(&current.manifest)?;

        let version = current.version + 1;
        *current = Arc::new(ManifestSnapshot {
            version,
            manifest: Arc::new(manifest),
            ..(**current).clone()
        });
        drop(current);

        tracing::debug!(version, "capability manifest amended");
        Some(version)
    }

    /// Mark the current snapshot stale without discarding it
    ///
    /// Routing keeps working from the old entries until the next
    /// [`replace`](Self::replace); only staleness checks change.
    pub fn invalidate(&self) {
        let mut current = self.current.write();
        if current.invalidated {
            return;
        }
        let mut next = (**current).clone();
        next.invalidated = true;
        *current = Arc::new(next);
        drop(current);

        tracing::debug!("capability manifest invalidated");
    }

    /// See [`ManifestSnapshot::is_stale`]
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.get().is_stale(max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::BackendKind;

    fn manifest(route: &str) -> CapabilityManifest {
        CapabilityManifest::new().with_capability("intent.submit", BackendKind::Orchestrator, route)
    }

    #[test]
    fn starts_unloaded_and_stale() {
        let cache = ManifestCache::new();
        let snapshot = cache.get();
        assert!(!snapshot.is_loaded());
        assert!(snapshot.manifest().is_empty());
        assert!(cache.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn replace_bumps_version_and_old_snapshots_stay_intact() {
        let cache = ManifestCache::with_manifest(manifest("/v1"));
        let before = cache.get();

        assert_eq!(cache.replace(manifest("/v2")), 2);

        assert_eq!(before.version(), 1);
        assert_eq!(before.manifest().get("intent.submit").unwrap().route, "/v1");
        assert_eq!(cache.get().manifest().get("intent.submit").unwrap().route, "/v2");
    }

    #[test]
    fn staleness_follows_age() {
        let cache = ManifestCache::with_manifest(manifest("/v1"));
        assert!(!cache.is_stale(Duration::from_secs(3600)));

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.is_stale(Duration::from_millis(1)));
    }

    #[test]
    fn invalidate_marks_stale_but_keeps_entries() {
        let cache = ManifestCache::with_manifest(manifest("/v1"));
        cache.invalidate();

        let snapshot = cache.get();
        assert!(snapshot.is_invalidated());
        assert!(cache.is_stale(Duration::from_secs(3600)));
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.manifest().get("intent.submit").is_some());

        cache.replace(manifest("/v2"));
        assert!(!cache.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn amend_keeps_staleness_and_load_time() {
        let cache = ManifestCache::with_manifest(manifest("/v1"));
        cache.invalidate();
        let before = cache.get();

        let version = cache.amend(|m| Some(m.clone().with_capability(
            "speech.tts",
            BackendKind::Speech,
            "/tts",
        )));

        let after = cache.get();
        assert_eq!(version, Some(2));
        assert_eq!(after.version(), 2);
        assert!(after.manifest().get("speech.tts").is_some());
        assert!(after.is_invalidated());
        assert_eq!(after.fetched_at(), before.fetched_at());
        assert!(cache.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn amend_needs_a_loaded_manifest_and_a_change() {
        let empty = ManifestCache::new();
        assert_eq!(empty.amend(|m| Some(m.clone())), None);
        assert_eq!(empty.get().version(), 0);

        let cache = ManifestCache::with_manifest(manifest("/v1"));
        assert_eq!(cache.amend(|_| None), None);
        assert_eq!(cache.get().version(), 1);
    }
}

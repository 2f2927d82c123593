//! Wake word gate
//!
//! Consumes audio frames, keeps a rolling window of frame features, scores
//! it with a pluggable [`Scorer`] and emits an [`ActivationEvent`] on each
//! rising edge of the score across the configured threshold.
//!
//! Configuration lives behind a [`DetectorHandle`] as an immutable snapshot
//! that is swapped whole. The gate reads one snapshot per frame, so a frame
//! is always evaluated entirely under either the old or the new config.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use super::buffer::FrameConsumer;
use super::frame::{AudioFrame, FrameFeatures};
use super::scoring::Scorer;
use crate::{Error, Result};

/// Default detection window length in frames (~0.8s at 512 samples/16kHz)
pub const DEFAULT_WINDOW_FRAMES: usize = 25;

/// Default activation threshold
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Live wake word configuration
///
/// Always replaced as a whole; see [`DetectorHandle`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    target_keyword: String,
    threshold: f32,
    active: bool,
}

impl DetectorConfig {
    /// Create an active configuration
    ///
    /// The keyword is lowercased with whitespace collapsed.
    ///
    /// # Errors
    ///
    /// Returns error if the keyword is blank or the threshold is outside `[0, 1]`
    pub fn new(keyword: &str, threshold: f32) -> Result<Self> {
        let target_keyword = normalize_keyword(keyword);
        if target_keyword.is_empty() {
            return Err(Error::WakeWord("keyword must not be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::WakeWord(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }

        Ok(Self {
            target_keyword,
            threshold,
            active: true,
        })
    }

    /// Copy of this config with the active flag set
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn target_keyword(&self) -> &str {
        &self.target_keyword
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    #[must_use]
    pub const fn active(&self) -> bool {
        self.active
    }
}

/// Lowercase and collapse internal whitespace
fn normalize_keyword(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A config snapshot tagged with the generation that installed it
#[derive(Debug, Clone, Serialize)]
pub struct LiveConfig {
    pub generation: u64,
    #[serde(flatten)]
    pub config: DetectorConfig,
}

/// Shared access to the live detector configuration
///
/// Cheap to clone. Readers get an `Arc` to an immutable snapshot; writers
/// install a new snapshot and bump the generation. The lock is only held
/// for the pointer copy, never across scoring.
#[derive(Debug, Clone)]
pub struct DetectorHandle {
    live: Arc<RwLock<Arc<LiveConfig>>>,
}

impl DetectorHandle {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            live: Arc::new(RwLock::new(Arc::new(LiveConfig {
                generation: 0,
                config,
            }))),
        }
    }

    /// Current configuration snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<LiveConfig> {
        Arc::clone(&self.live.read())
    }

    /// Replace the configuration; takes effect from the next processed frame
    pub fn set_config(&self, config: DetectorConfig) -> Arc<LiveConfig> {
        let mut live = self.live.write();
        let next = Arc::new(LiveConfig {
            generation: live.generation + 1,
            config,
        });
        *live = Arc::clone(&next);
        drop(live);

        tracing::info!(
            generation = next.generation,
            keyword = next.config.target_keyword(),
            threshold = next.config.threshold(),
            active = next.config.active(),
            "wake word config replaced"
        );
        next
    }

    /// Enable or suppress activations without touching keyword or threshold
    ///
    /// A no-op when the flag already has the requested value.
    pub fn set_active(&self, active: bool) -> Arc<LiveConfig> {
        self.update(|current| Ok(current.clone().with_active(active)))
            .unwrap_or_else(|_| self.snapshot())
    }

    /// Derive a new config from the current one and install it atomically
    ///
    /// No new generation is installed when the derived config is unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `derive`; the live config is untouched
    pub fn update<F>(&self, derive: F) -> Result<Arc<LiveConfig>>
    where
        F: FnOnce(&DetectorConfig) -> Result<DetectorConfig>,
    {
        let mut live = self.live.write();
        let config = derive(&live.config)?;
        if config == live.config {
            return Ok(Arc::clone(&live));
        }

        let next = Arc::new(LiveConfig {
            generation: live.generation + 1,
            config,
        });
        *live = Arc::clone(&next);
        drop(live);

        tracing::info!(
            generation = next.generation,
            keyword = next.config.target_keyword(),
            threshold = next.config.threshold(),
            active = next.config.active(),
            "wake word config updated"
        );
        Ok(next)
    }
}

/// Rolling window of the most recent frame features, oldest evicted first
#[derive(Debug, Clone)]
pub struct DetectionWindow {
    features: VecDeque<FrameFeatures>,
    capacity: usize,
}

impl DetectionWindow {
    /// Create an empty window; a zero capacity is raised to one
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            features: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append features, evicting the oldest entry when full
    pub fn push(&mut self, features: FrameFeatures) {
        if self.features.len() == self.capacity {
            self.features.pop_front();
        }
        self.features.push_back(features);
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &FrameFeatures> + ExactSizeIterator {
        self.features.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&FrameFeatures> {
        self.features.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.features.len() == self.capacity
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Emitted once per rising edge of detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationEvent {
    /// Sequence number of the frame that crossed the threshold
    pub at_sequence: u64,
    pub score: f32,
    pub keyword: String,
    /// Config generation the detection was made under
    pub generation: u64,
    pub detected_at: DateTime<Utc>,
}

/// Edge-tracking state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    /// Score below threshold; the next crossing fires
    Below,
    /// Score at or above threshold; already fired
    Above,
}

/// Gate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub frames_processed: u64,
    pub frames_unscoreable: u64,
    pub activations: u64,
}

#[derive(Debug, Default)]
struct GateCounters {
    frames_processed: AtomicU64,
    frames_unscoreable: AtomicU64,
    activations: AtomicU64,
}

/// Read-only view of a running gate's counters
#[derive(Debug, Clone)]
pub struct GateMonitor {
    counters: Arc<GateCounters>,
}

impl GateMonitor {
    #[must_use]
    pub fn stats(&self) -> GateStats {
        GateStats {
            frames_processed: self.counters.frames_processed.load(Ordering::Relaxed),
            frames_unscoreable: self.counters.frames_unscoreable.load(Ordering::Relaxed),
            activations: self.counters.activations.load(Ordering::Relaxed),
        }
    }
}

/// Edge-triggered wake word detector
pub struct WakeWordGate {
    handle: DetectorHandle,
    scorer: Arc<dyn Scorer>,
    window: DetectionWindow,
    edge: EdgeState,
    generation: u64,
    counters: Arc<GateCounters>,
}

impl std::fmt::Debug for WakeWordGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeWordGate")
            .field("window", &self.window.len())
            .field("edge", &self.edge)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl WakeWordGate {
    /// Create a gate reading config from `handle`
    #[must_use]
    pub fn new(handle: DetectorHandle, scorer: Arc<dyn Scorer>, window_frames: usize) -> Self {
        let generation = handle.snapshot().generation;

        tracing::debug!(window_frames, generation, "wake word gate initialized");

        Self {
            handle,
            scorer,
            window: DetectionWindow::new(window_frames),
            edge: EdgeState::Below,
            generation,
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Evaluate one frame
    ///
    /// Features are recorded even while inactive so detection resumes with
    /// full history. Never fails: an unscoreable frame scores 0.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> Option<ActivationEvent> {
        let live = self.handle.snapshot();

        let features = FrameFeatures::extract(frame);
        self.window.push(features);
        self.counters.frames_processed.fetch_add(1, Ordering::Relaxed);
        if !features.scoreable {
            self.counters.frames_unscoreable.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(sequence = frame.sequence(), "unscoreable frame");
        }

        if live.generation != self.generation {
            self.generation = live.generation;
            self.edge = EdgeState::Below;
            tracing::debug!(generation = live.generation, "gate re-armed after reconfiguration");
        }

        if !live.config.active() {
            return None;
        }

        let score = if features.scoreable {
            sanitize_score(self.scorer.score(&self.window, live.config.target_keyword()))
        } else {
            0.0
        };
        let above = score >= live.config.threshold();

        match (self.edge, above) {
            (EdgeState::Below, true) => {
                self.edge = EdgeState::Above;
                self.counters.activations.fetch_add(1, Ordering::Relaxed);

                tracing::info!(
                    sequence = frame.sequence(),
                    score,
                    keyword = live.config.target_keyword(),
                    "wake word activated"
                );

                Some(ActivationEvent {
                    at_sequence: frame.sequence(),
                    score,
                    keyword: live.config.target_keyword().to_string(),
                    generation: live.generation,
                    detected_at: Utc::now(),
                })
            }
            (EdgeState::Above, false) => {
                self.edge = EdgeState::Below;
                tracing::trace!(sequence = frame.sequence(), score, "gate re-armed");
                None
            }
            _ => None,
        }
    }

    /// Drain `frames` until the stream closes, forwarding activations
    ///
    /// Returns the final counters.
    pub async fn run(
        mut self,
        mut frames: FrameConsumer,
        events: mpsc::UnboundedSender<ActivationEvent>,
    ) -> GateStats {
        tracing::info!(window = self.window.capacity(), "wake word gate running");

        loop {
            match frames.pop().await {
                Ok(frame) => {
                    if let Some(event) = self.process_frame(&frame) {
                        if events.send(event).is_err() {
                            tracing::trace!("no activation listener");
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(reason = %e, "gate input ended");
                    break;
                }
            }
        }

        let stats = self.stats();
        tracing::info!(
            frames = stats.frames_processed,
            activations = stats.activations,
            "wake word gate stopped"
        );
        stats
    }

    /// Counter view that stays valid after the gate moves into a task
    #[must_use]
    pub fn monitor(&self) -> GateMonitor {
        GateMonitor {
            counters: Arc::clone(&self.counters),
        }
    }

    #[must_use]
    pub fn stats(&self) -> GateStats {
        self.monitor().stats()
    }

    #[must_use]
    pub const fn edge(&self) -> EdgeState {
        self.edge
    }

    #[must_use]
    pub const fn window(&self) -> &DetectionWindow {
        &self.window
    }

    #[must_use]
    pub const fn handle(&self) -> &DetectorHandle {
        &self.handle
    }
}

/// Clamp into `[0, 1]`, mapping NaN and infinities to 0
fn sanitize_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

//! Renderer runtime
//!
//! Wires the frame buffer, wake word gate, manifest refresh, and HTTP API
//! together and runs them until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{ApiServerBuilder, AudioIngress};
use crate::capabilities::{
    CapabilityRouter, HttpManifestSource, HttpTransport, ManifestCache, ManifestRefresher,
};
use crate::security::AuthorizationGate;
use crate::voice::{
    ActivationEvent, DecodedAudio, DetectorConfig, DetectorHandle, EnergyScorer, FrameError,
    GateStats, SAMPLE_RATE, Scorer, WakeWordGate, frame_buffer,
};
use crate::{Config, Error, Result};

/// The experience renderer service
pub struct Renderer {
    config: Config,
}

impl Renderer {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the capability router and its refresher from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP clients cannot be built or the manifest URL
    /// is unsupported
    pub fn build_router(config: &Config) -> Result<(CapabilityRouter, Arc<ManifestRefresher>)> {
        let cache = Arc::new(ManifestCache::new());
        let source = HttpManifestSource::new(config.manifest.url.clone(), config.backends.timeout)?;
        let refresher = Arc::new(ManifestRefresher::new(Arc::new(source), Arc::clone(&cache)));

        let transport = HttpTransport::new(config.backends.timeout)?;
        let gate = AuthorizationGate::new(Arc::new(config.policy()));
        let router = CapabilityRouter::new(
            cache,
            gate,
            config.routes(),
            Arc::new(transport),
            config.router_config(),
        );

        Ok((router, refresher))
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if startup fails
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        tracing::info!(
            port = config.api_server.port,
            manifest = %config.manifest.url,
            auth = %config.auth_mode,
            keyword = config.wakeword.detector.target_keyword(),
            "renderer starting"
        );

        let (router, refresher) = Self::build_router(&config)?;

        if refresher.refresh().await {
            tracing::info!(entries = router.manifest().get().manifest().len(), "initial manifest loaded");
        } else {
            tracing::warn!("initial manifest load failed, will retry on refresh");
        }

        let refresh_task = config
            .manifest
            .refresh_interval
            .map(|interval| Arc::clone(&refresher).spawn_periodic(interval));

        // Audio path
        let detector = DetectorHandle::new(config.wakeword.detector.clone());
        let (producer, consumer) =
            frame_buffer(config.audio.buffer_capacity, config.audio.frame_samples);
        let ingress = Arc::new(AudioIngress::new(producer));

        let gate = WakeWordGate::new(
            detector.clone(),
            Arc::new(EnergyScorer::default()),
            config.wakeword.window_frames,
        );
        let monitor = gate.monitor();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let gate_task = tokio::spawn(gate.run(consumer, events_tx));
        let activation_task = tokio::spawn(log_activations(events_rx));

        let server = ApiServerBuilder::new(router, detector, config.api_server.port)
            .refresher(refresher)
            .gate_monitor(monitor)
            .ingress(Arc::clone(&ingress))
            .tokens(config.token_directory())
            .auth_mode(config.auth_mode)
            .rate_limit_rpm(config.api_server.rate_limit_rpm)
            .build();
        let mut server_task = server.spawn();

        // Set up shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutdown requested");
                server_task.abort();
            }
            result = &mut server_task => {
                match result {
                    Ok(Ok(())) => tracing::info!("API server exited"),
                    Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                    Err(e) => tracing::error!(error = %e, "API server task panicked"),
                }
            }
        }

        if let Some(task) = refresh_task {
            task.abort();
        }

        // Closing the producer lets the gate drain queued frames and stop
        ingress.close();
        match gate_task.await {
            Ok(stats) => tracing::info!(
                frames = stats.frames_processed,
                unscoreable = stats.frames_unscoreable,
                activations = stats.activations,
                "wake word gate drained"
            ),
            Err(e) => tracing::error!(error = %e, "wake word gate task failed"),
        }
        let _ = activation_task.await;

        tracing::info!("renderer stopped");
        Ok(())
    }
}

async fn log_activations(mut events: mpsc::UnboundedReceiver<ActivationEvent>) {
    while let Some(event) = events.recv().await {
        tracing::info!(
            keyword = %event.keyword,
            score = event.score,
            sequence = event.at_sequence,
            generation = event.generation,
            "wake word activated"
        );
    }
}

/// Settings for an offline replay
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub detector: DetectorConfig,
    pub window_frames: usize,
    pub frame_samples: usize,
    pub buffer_capacity: usize,
}

/// Result of an offline replay
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub events: Vec<ActivationEvent>,
    pub stats: GateStats,
    /// Audio length in seconds
    pub duration: Duration,
}

/// Feed decoded audio through the frame buffer and gate
///
/// The producer waits for buffer space rather than dropping audio, so every
/// complete frame is evaluated. Trailing samples that do not fill a frame
/// are discarded.
///
/// # Errors
///
/// Returns error if the audio is not at [`SAMPLE_RATE`] or the gate task
/// fails
#[allow(clippy::cast_precision_loss)]
pub async fn replay(
    audio: &DecodedAudio,
    options: &ReplayOptions,
    scorer: Arc<dyn Scorer>,
) -> Result<ReplayOutcome> {
    // Frame sizes and window lengths are tuned for this rate
    if audio.sample_rate != SAMPLE_RATE {
        return Err(Error::Audio(format!(
            "replay needs {SAMPLE_RATE} Hz audio, got {} Hz",
            audio.sample_rate
        )));
    }

    let (mut producer, consumer) = frame_buffer(options.buffer_capacity, options.frame_samples);
    let gate = WakeWordGate::new(
        DetectorHandle::new(options.detector.clone()),
        scorer,
        options.window_frames,
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let gate_task = tokio::spawn(gate.run(consumer, events_tx));

    'feed: for chunk in audio.samples.chunks(producer.frame_samples()) {
        loop {
            match producer.push_samples(chunk) {
                Ok(_) => break,
                Err(FrameError::Backpressure { .. }) => tokio::task::yield_now().await,
                Err(e) => {
                    tracing::warn!(error = %e, "replay stream ended early");
                    break 'feed;
                }
            }
        }
    }
    producer.close();

    let stats = gate_task
        .await
        .map_err(|e| Error::Audio(format!("gate task failed: {e}")))?;

    let mut events = Vec::new();
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }

    let duration = Duration::from_secs_f64(
        audio.samples.len() as f64 / f64::from(audio.sample_rate.max(1)),
    );

    Ok(ReplayOutcome {
        events,
        stats,
        duration,
    })
}

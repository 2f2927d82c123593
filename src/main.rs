use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use experience_renderer::capabilities::{
    DISPLAYS_MODALITY, HttpManifestSource, ManifestSource,
};
use experience_renderer::renderer::{ReplayOptions, replay};
use experience_renderer::voice::{DetectorConfig, EnergyScorer, read_wav_file};
use experience_renderer::{Config, Renderer};

/// Experience renderer - wake word gate and capability proxy
#[derive(Parser)]
#[command(name = "renderer", version, about)]
struct Cli {
    /// Port to listen on (overrides `RENDERER_PORT`/`PORT` and the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the service (default)
    Serve,
    /// Run a WAV file through the wake word gate and print activations
    Replay {
        /// Mono WAV file, 16-bit integer or 32-bit float
        file: PathBuf,
        /// Keyword to report (defaults to the configured keyword)
        #[arg(short, long)]
        keyword: Option<String>,
        /// Activation threshold in [0, 1]
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Fetch the capability manifest once and print its entries
    CheckManifest,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,experience_renderer=info",
        1 => "info,experience_renderer=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            Renderer::new(config).run().await?;
            Ok(())
        }
        Command::Replay {
            file,
            keyword,
            threshold,
        } => cmd_replay(&config, &file, keyword.as_deref(), threshold).await,
        Command::CheckManifest => cmd_check_manifest(&config).await,
    }
}

async fn cmd_replay(
    config: &Config,
    file: &std::path::Path,
    keyword: Option<&str>,
    threshold: Option<f32>,
) -> anyhow::Result<()> {
    let base = &config.wakeword.detector;
    let detector = DetectorConfig::new(
        keyword.unwrap_or(base.target_keyword()),
        threshold.unwrap_or(base.threshold()),
    )?;

    let audio = read_wav_file(file).with_context(|| format!("failed to read {}", file.display()))?;
    println!(
        "Replaying {} ({} samples at {} Hz) for \"{}\" at threshold {}",
        file.display(),
        audio.samples.len(),
        audio.sample_rate,
        detector.target_keyword(),
        detector.threshold()
    );

    let options = ReplayOptions {
        detector,
        window_frames: config.wakeword.window_frames,
        frame_samples: config.audio.frame_samples,
        buffer_capacity: config.audio.buffer_capacity,
    };
    let outcome = replay(&audio, &options, Arc::new(EnergyScorer::default())).await?;

    for event in &outcome.events {
        println!(
            "  frame {:>6}  score {:.3}  \"{}\"",
            event.at_sequence, event.score, event.keyword
        );
    }

    println!(
        "{} activation(s) in {:.2}s; {} frames processed, {} unscoreable",
        outcome.events.len(),
        outcome.duration.as_secs_f64(),
        outcome.stats.frames_processed,
        outcome.stats.frames_unscoreable
    );
    Ok(())
}

async fn cmd_check_manifest(config: &Config) -> anyhow::Result<()> {
    let source = HttpManifestSource::new(config.manifest.url.clone(), config.backends.timeout)?;
    let manifest = source
        .fetch()
        .await
        .with_context(|| format!("failed to fetch manifest from {}", source.describe()))?;

    println!("Manifest from {}", source.describe());
    for (id, descriptor) in manifest.capabilities() {
        println!("  {id:<32} {:<13} {}", descriptor.kind.as_str(), descriptor.route);
    }
    println!(
        "{} capabilities, {} display(s)",
        manifest.len(),
        manifest.modality_count(DISPLAYS_MODALITY)
    );
    Ok(())
}

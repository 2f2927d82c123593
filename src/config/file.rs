//! TOML configuration file loading
//!
//! Supports `~/.config/unison/renderer/config.toml` (or `$RENDERER_CONFIG`)
//! as a persistent config source. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "RENDERER_CONFIG";

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RendererConfigFile {
    #[serde(default)]
    pub backends: BackendsFileConfig,

    #[serde(default)]
    pub manifest: ManifestFileConfig,

    #[serde(default)]
    pub wakeword: WakeWordFileConfig,

    #[serde(default)]
    pub audio: AudioFileConfig,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub authorization: AuthorizationFileConfig,
}

/// Backend base addresses
#[derive(Debug, Default, Deserialize)]
pub struct BackendsFileConfig {
    pub orchestrator: Option<String>,
    pub context: Option<String>,
    pub speech: Option<String>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Capability manifest source and freshness
#[derive(Debug, Default, Deserialize)]
pub struct ManifestFileConfig {
    pub url: Option<String>,
    pub refresh_secs: Option<u64>,
    pub max_age_secs: Option<u64>,
    pub fail_closed: Option<bool>,
}

/// Initial wake-word detector settings
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    pub keyword: Option<String>,
    pub threshold: Option<f32>,
    pub window_frames: Option<usize>,
}

/// Audio ingress framing
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub frame_samples: Option<usize>,
    pub buffer_capacity: Option<usize>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub rate_limit_rpm: Option<u32>,
}

/// Bearer tokens and capability grants
///
/// ```toml
/// [authorization.tokens]
/// "kiosk-secret" = "kiosk"
///
/// [authorization.grants]
/// kiosk = ["speech.*", "intent.submit"]
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuthorizationFileConfig {
    #[serde(default)]
    pub tokens: HashMap<String, String>,

    #[serde(default)]
    pub grants: HashMap<String, Vec<String>>,
}

/// Load the TOML config file from the standard path
///
/// A missing file yields `RendererConfigFile::default()`.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed
pub fn load_config_file() -> Result<RendererConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(RendererConfigFile::default());
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(RendererConfigFile::default());
    }

    load_from(&path)
}

/// Parse a specific config file
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_from(path: &Path) -> Result<RendererConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `$RENDERER_CONFIG`, else
/// `~/.config/unison/renderer/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("unison")
            .join("renderer")
            .join("config.toml")
    })
}

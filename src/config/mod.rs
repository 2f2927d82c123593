//! Configuration management for the experience renderer
//!
//! Priority: environment > TOML file > defaults.

pub mod file;

use std::time::Duration;

use url::Url;

use crate::capabilities::{BackendRoutes, RouterConfig, StalePolicy};
use crate::security::{AuthMode, BYPASS_ENV, StaticPolicy, TokenDirectory};
use crate::voice::{DEFAULT_FRAME_SAMPLES, DEFAULT_THRESHOLD, DEFAULT_WINDOW_FRAMES, DetectorConfig};
use crate::{Error, Result};

pub use file::{AuthorizationFileConfig, RendererConfigFile};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8092;

/// Default frame buffer capacity, in frames
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

const DEFAULT_ORCHESTRATOR_URL: &str = "http://orchestrator:8080";
const DEFAULT_CONTEXT_URL: &str = "http://context:8081";
const DEFAULT_SPEECH_URL: &str = "http://io-speech:8084";
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_KEYWORD: &str = "unison";

/// Experience renderer configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backends: BackendsConfig,
    pub manifest: ManifestConfig,
    pub wakeword: WakeWordConfig,
    pub audio: AudioConfig,
    pub api_server: ApiServerConfig,

    /// Authorization bypass; only settable from the environment
    pub auth_mode: AuthMode,

    /// Bearer tokens and grants from the config file
    pub authorization: AuthorizationFileConfig,
}

/// Backend base addresses
#[derive(Debug, Clone)]
pub struct BackendsConfig {
    pub orchestrator: Url,
    pub context: Url,
    pub speech: Url,

    /// Per-call timeout
    pub timeout: Duration,
}

/// Capability manifest source and freshness
#[derive(Debug, Clone)]
pub struct ManifestConfig {
    /// `http(s)://` or `file://`
    pub url: Url,

    /// `None` disables periodic refresh
    pub refresh_interval: Option<Duration>,

    /// Snapshots older than this are stale
    pub max_age: Option<Duration>,

    /// Refuse routing on a stale snapshot
    pub fail_closed: bool,
}

/// Initial wake word settings
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    pub detector: DetectorConfig,
    pub window_frames: usize,
}

/// Audio ingress framing
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub frame_samples: usize,
    pub buffer_capacity: usize,
}

/// HTTP API server configuration
#[derive(Debug, Clone, Copy)]
pub struct ApiServerConfig {
    pub port: u16,

    /// Requests per minute on capability invocation, if limited
    pub rate_limit_rpm: Option<u32>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file is malformed or a value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file()?;
        let config = Self::from_sources(fc, |key| std::env::var(key).ok())?;

        if config.auth_mode.is_bypass() {
            tracing::warn!(env = BYPASS_ENV, "authorization bypass enabled, all capabilities allowed");
        }

        Ok(config)
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn from_sources<F>(fc: RendererConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backends = BackendsConfig {
            orchestrator: parse_url(
                "UNISON_ORCHESTRATOR_URL",
                env("UNISON_ORCHESTRATOR_URL")
                    .or(fc.backends.orchestrator)
                    .as_deref()
                    .unwrap_or(DEFAULT_ORCHESTRATOR_URL),
            )?,
            context: parse_url(
                "UNISON_CONTEXT_URL",
                env("UNISON_CONTEXT_URL")
                    .or(fc.backends.context)
                    .as_deref()
                    .unwrap_or(DEFAULT_CONTEXT_URL),
            )?,
            speech: parse_url(
                "UNISON_SPEECH_URL",
                env("UNISON_SPEECH_URL")
                    .or(fc.backends.speech)
                    .as_deref()
                    .unwrap_or(DEFAULT_SPEECH_URL),
            )?,
            timeout: Duration::from_millis(
                parse_env(&env, "RENDERER_BACKEND_TIMEOUT_MS")?
                    .or(fc.backends.timeout_ms)
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        };

        let default_manifest_url = format!(
            "{}/capabilities",
            backends.orchestrator.as_str().trim_end_matches('/')
        );
        let refresh_secs = parse_env(&env, "RENDERER_MANIFEST_REFRESH_SECS")?
            .or(fc.manifest.refresh_secs)
            .unwrap_or(DEFAULT_REFRESH_SECS);
        let manifest = ManifestConfig {
            url: parse_url(
                "ORCHESTRATOR_CAPABILITIES_URL",
                &env("ORCHESTRATOR_CAPABILITIES_URL")
                    .or(fc.manifest.url)
                    .unwrap_or(default_manifest_url),
            )?,
            refresh_interval: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            max_age: parse_env(&env, "RENDERER_MANIFEST_MAX_AGE_SECS")?
                .or(fc.manifest.max_age_secs)
                .map(Duration::from_secs),
            fail_closed: env("RENDERER_MANIFEST_FAIL_CLOSED")
                .map(|v| parse_flag(&v))
                .or(fc.manifest.fail_closed)
                .unwrap_or(false),
        };

        let keyword = env("UNISON_WAKEWORD_DEFAULT")
            .or(fc.wakeword.keyword)
            .unwrap_or_else(|| DEFAULT_KEYWORD.to_string());
        let threshold = parse_env(&env, "RENDERER_WAKEWORD_THRESHOLD")?
            .or(fc.wakeword.threshold)
            .unwrap_or(DEFAULT_THRESHOLD);
        let wakeword = WakeWordConfig {
            detector: DetectorConfig::new(&keyword, threshold)
                .map_err(|e| Error::Config(format!("wake word: {e}")))?,
            window_frames: positive(
                "RENDERER_WINDOW_FRAMES",
                parse_env(&env, "RENDERER_WINDOW_FRAMES")?
                    .or(fc.wakeword.window_frames)
                    .unwrap_or(DEFAULT_WINDOW_FRAMES),
            )?,
        };

        let audio = AudioConfig {
            frame_samples: positive(
                "RENDERER_FRAME_SAMPLES",
                parse_env(&env, "RENDERER_FRAME_SAMPLES")?
                    .or(fc.audio.frame_samples)
                    .unwrap_or(DEFAULT_FRAME_SAMPLES),
            )?,
            buffer_capacity: positive(
                "RENDERER_BUFFER_CAPACITY",
                parse_env(&env, "RENDERER_BUFFER_CAPACITY")?
                    .or(fc.audio.buffer_capacity)
                    .unwrap_or(DEFAULT_BUFFER_CAPACITY),
            )?,
        };

        let port = match parse_env(&env, "RENDERER_PORT")? {
            Some(port) => Some(port),
            None => parse_env(&env, "PORT")?,
        };
        let api_server = ApiServerConfig {
            port: port.or(fc.server.port).unwrap_or(DEFAULT_PORT),
            rate_limit_rpm: parse_env(&env, "RENDERER_RATE_LIMIT_RPM")?
                .or(fc.server.rate_limit_rpm)
                .filter(|rpm| *rpm > 0),
        };

        let auth_mode = env(BYPASS_ENV).map_or(AuthMode::Enforce, |v| AuthMode::from_flag(&v));

        Ok(Self {
            backends,
            manifest,
            wakeword,
            audio,
            api_server,
            auth_mode,
            authorization: fc.authorization,
        })
    }

    /// Backend base addresses for routing
    #[must_use]
    pub fn routes(&self) -> BackendRoutes {
        BackendRoutes::new(
            self.backends.orchestrator.clone(),
            self.backends.context.clone(),
            self.backends.speech.clone(),
        )
    }

    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            timeout: self.backends.timeout,
            max_manifest_age: self.manifest.max_age,
            stale_policy: if self.manifest.fail_closed {
                StalePolicy::FailClosed
            } else {
                StalePolicy::Serve
            },
        }
    }

    #[must_use]
    pub fn token_directory(&self) -> TokenDirectory {
        TokenDirectory::new(self.authorization.tokens.clone())
    }

    #[must_use]
    pub fn policy(&self) -> StaticPolicy {
        StaticPolicy::from_grants(&self.authorization.grants)
    }
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| Error::Config(format!("{name}: invalid URL {raw:?}: {e}")))
}

fn parse_env<T, F>(env: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    env(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("{name}: invalid value {raw:?}: {e}")))
        })
        .transpose()
}

fn positive(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(Error::Config(format!("{name} must be greater than zero")));
    }
    Ok(value)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_sources(RendererConfigFile::default(), |_| None).unwrap();

        assert_eq!(config.backends.orchestrator.as_str(), "http://orchestrator:8080/");
        assert_eq!(
            config.manifest.url.as_str(),
            "http://orchestrator:8080/capabilities"
        );
        assert_eq!(config.manifest.refresh_interval, Some(Duration::from_secs(60)));
        assert!(config.manifest.max_age.is_none());
        assert_eq!(config.wakeword.detector.target_keyword(), "unison");
        assert_eq!(config.wakeword.window_frames, DEFAULT_WINDOW_FRAMES);
        assert_eq!(config.audio.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.api_server.port, DEFAULT_PORT);
        assert_eq!(config.auth_mode, AuthMode::Enforce);
        assert_eq!(config.router_config().stale_policy, StalePolicy::Serve);
    }

    #[test]
    fn env_beats_file() {
        let mut fc = RendererConfigFile::default();
        fc.wakeword.keyword = Some("computer".to_string());
        fc.server.port = Some(9000);

        let config = Config::from_sources(
            fc,
            env_of(&[("UNISON_WAKEWORD_DEFAULT", "Hey  Unison"), ("PORT", "9100")]),
        )
        .unwrap();

        assert_eq!(config.wakeword.detector.target_keyword(), "hey unison");
        assert_eq!(config.api_server.port, 9100);
    }

    #[test]
    fn file_beats_defaults() {
        let mut fc = RendererConfigFile::default();
        fc.manifest.max_age_secs = Some(300);
        fc.manifest.fail_closed = Some(true);
        fc.manifest.refresh_secs = Some(0);

        let config = Config::from_sources(fc, |_| None).unwrap();
        let router = config.router_config();

        assert_eq!(router.max_manifest_age, Some(Duration::from_secs(300)));
        assert_eq!(router.stale_policy, StalePolicy::FailClosed);
        assert!(config.manifest.refresh_interval.is_none());
    }

    #[test]
    fn invalid_values_fail() {
        for pairs in [
            [("RENDERER_WAKEWORD_THRESHOLD", "1.5")],
            [("UNISON_CONTEXT_URL", "not a url")],
            [("RENDERER_BUFFER_CAPACITY", "0")],
            [("RENDERER_PORT", "eighty")],
        ] {
            let result = Config::from_sources(RendererConfigFile::default(), env_of(&pairs));
            assert!(matches!(result, Err(Error::Config(_))), "{pairs:?}");
        }
    }

    #[test]
    fn bypass_only_from_env() {
        let config = Config::from_sources(
            RendererConfigFile::default(),
            env_of(&[(BYPASS_ENV, "true")]),
        )
        .unwrap();
        assert!(config.auth_mode.is_bypass());
    }
}

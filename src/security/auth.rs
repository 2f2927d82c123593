//! Authentication mode and principal resolution
//!
//! - `Enforce`: every capability request is checked against the policy
//! - `Bypass`: every request is allowed (test environments only)
//!
//! Bypass is a process-wide switch read from configuration. Nothing in a
//! request can turn it on.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Environment variable enabling authorization bypass
pub const BYPASS_ENV: &str = "DISABLE_AUTH_FOR_TESTS";

/// Policy name of [`Principal::Anonymous`]; no token may claim it
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Authorization mode for the whole process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Check every request against the policy
    #[default]
    Enforce,

    /// Allow everything
    Bypass,
}

impl AuthMode {
    /// Read the mode from [`BYPASS_ENV`]
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(BYPASS_ENV)
            .map(|v| Self::from_flag(&v))
            .unwrap_or_default()
    }

    /// Interpret a boolean-ish flag value
    #[must_use]
    pub fn from_flag(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Self::Bypass,
            _ => Self::Enforce,
        }
    }

    #[must_use]
    pub const fn is_bypass(self) -> bool {
        matches!(self, Self::Bypass)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforce => write!(f, "enforce"),
            Self::Bypass => write!(f, "bypass"),
        }
    }
}

/// The caller a request is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Principal {
    /// No or unrecognized credentials
    Anonymous,
    /// Identified by a known bearer token
    Named(String),
}

impl Principal {
    /// Name used for policy lookups
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Anonymous => ANONYMOUS_PRINCIPAL,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bearer token → principal lookup
///
/// Tokens naming the reserved anonymous principal are dropped, so a
/// credential can never pick up grants meant for unauthenticated callers.
#[derive(Debug, Clone, Default)]
pub struct TokenDirectory {
    tokens: HashMap<String, String>,
}

impl TokenDirectory {
    #[must_use]
    pub fn new(tokens: HashMap<String, String>) -> Self {
        tokens
            .into_iter()
            .fold(Self::default(), |directory, (token, principal)| {
                directory.with_token(&token, &principal)
            })
    }

    /// Register a token for a principal
    #[must_use]
    pub fn with_token(mut self, token: &str, principal: &str) -> Self {
        if is_reserved(principal) {
            tracing::warn!(principal, "ignoring token mapped to reserved principal name");
            return self;
        }
        self.tokens.insert(token.to_string(), principal.to_string());
        self
    }

    /// Resolve a bearer token (timing-safe comparison)
    ///
    /// Unknown or missing tokens resolve to [`Principal::Anonymous`].
    #[must_use]
    pub fn resolve(&self, token: Option<&str>) -> Principal {
        let Some(provided) = token else {
            return Principal::Anonymous;
        };

        self.tokens
            .iter()
            .find(|(known, _)| constant_time_eq(known.as_bytes(), provided.as_bytes()))
            .map_or(Principal::Anonymous, |(_, name)| Principal::Named(name.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn is_reserved(principal: &str) -> bool {
    principal.trim().eq_ignore_ascii_case(ANONYMOUS_PRINCIPAL)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_mode_parsing() {
        assert_eq!(AuthMode::from_flag("true"), AuthMode::Bypass);
        assert_eq!(AuthMode::from_flag("1"), AuthMode::Bypass);
        assert_eq!(AuthMode::from_flag(" YES "), AuthMode::Bypass);
        assert_eq!(AuthMode::from_flag("false"), AuthMode::Enforce);
        assert_eq!(AuthMode::from_flag(""), AuthMode::Enforce);
        assert_eq!(AuthMode::from_flag("bypass-please"), AuthMode::Enforce);
    }

    #[test]
    fn test_token_resolution() {
        let directory = TokenDirectory::default().with_token("secret-1", "kiosk");

        assert_eq!(directory.resolve(Some("secret-1")), Principal::Named("kiosk".to_string()));
        assert_eq!(directory.resolve(Some("secret-2")), Principal::Anonymous);
        assert_eq!(directory.resolve(None), Principal::Anonymous);
    }

    #[test]
    fn test_reserved_principal_cannot_be_claimed() {
        let directory = TokenDirectory::default()
            .with_token("forged", "anonymous")
            .with_token("shouty", " Anonymous ")
            .with_token("secret-1", "kiosk");

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.resolve(Some("forged")), Principal::Anonymous);
        assert_eq!(directory.resolve(Some("shouty")), Principal::Anonymous);

        let from_map = TokenDirectory::new(HashMap::from([
            ("forged".to_string(), "anonymous".to_string()),
            ("secret-1".to_string(), "kiosk".to_string()),
        ]));
        assert_eq!(from_map.len(), 1);
        assert_eq!(from_map.resolve(Some("forged")), Principal::Anonymous);
    }

    #[test]
    fn test_principal_names() {
        assert_eq!(Principal::Anonymous.name(), "anonymous");
        assert_eq!(Principal::Named("kiosk".to_string()).to_string(), "kiosk");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}

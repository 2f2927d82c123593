//! Authorization gate for capability requests
//!
//! A pure decision: bypass allows everything, otherwise the principal must
//! be granted the requested capability by the policy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::auth::{AuthMode, Principal};
use crate::capabilities::CapabilityRequest;

/// Who is asking for what, and whether checks are bypassed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    principal: Principal,
    requested_capability: String,
    bypass: bool,
}

impl AuthorizationContext {
    /// Context with checks enforced
    #[must_use]
    pub fn new(principal: Principal, requested_capability: impl Into<String>) -> Self {
        Self {
            principal,
            requested_capability: requested_capability.into(),
            bypass: false,
        }
    }

    /// Context whose bypass flag comes from the process-wide mode
    #[must_use]
    pub fn for_mode(
        principal: Principal,
        requested_capability: impl Into<String>,
        mode: AuthMode,
    ) -> Self {
        Self {
            bypass: mode.is_bypass(),
            ..Self::new(principal, requested_capability)
        }
    }

    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    #[must_use]
    pub fn requested_capability(&self) -> &str {
        &self.requested_capability
    }

    #[must_use]
    pub const fn bypass(&self) -> bool {
        self.bypass
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    #[must_use]
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Source of capability grants
pub trait AuthorizationPolicy: Send + Sync {
    /// Whether `principal` may use `capability`
    fn permits(&self, principal: &Principal, capability: &str) -> bool;
}

/// Grants everything to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationPolicy for AllowAll {
    fn permits(&self, _principal: &Principal, _capability: &str) -> bool {
        true
    }
}

/// A capability grant: exact id, `prefix.*`, or `*`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilityPattern {
    Any,
    Prefix(String),
    Exact(String),
}

impl CapabilityPattern {
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            Self::Any
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            Self::Prefix(format!("{prefix}."))
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    #[must_use]
    pub fn matches(&self, capability: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => capability.starts_with(prefix.as_str()),
            Self::Exact(id) => id == capability,
        }
    }
}

/// Grants configured up front, keyed by principal name
///
/// Grants to `anonymous` apply to unauthenticated callers only; no token
/// can resolve to that name.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    grants: HashMap<String, HashSet<CapabilityPattern>>,
}

impl StaticPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from principal → pattern lists
    #[must_use]
    pub fn from_grants(grants: &HashMap<String, Vec<String>>) -> Self {
        grants
            .iter()
            .flat_map(|(principal, patterns)| patterns.iter().map(move |p| (principal, p)))
            .fold(Self::new(), |policy, (principal, pattern)| policy.grant(principal, pattern))
    }

    /// Add a grant
    #[must_use]
    pub fn grant(mut self, principal: &str, pattern: &str) -> Self {
        self.grants
            .entry(principal.to_string())
            .or_default()
            .insert(CapabilityPattern::parse(pattern));
        self
    }

    /// Number of principals with at least one grant
    #[must_use]
    pub fn principals(&self) -> usize {
        self.grants.len()
    }
}

impl AuthorizationPolicy for StaticPolicy {
    fn permits(&self, principal: &Principal, capability: &str) -> bool {
        self.grants
            .get(principal.name())
            .is_some_and(|patterns| patterns.iter().any(|p| p.matches(capability)))
    }
}

/// Applies the bypass rule and the policy
#[derive(Clone)]
pub struct AuthorizationGate {
    policy: Arc<dyn AuthorizationPolicy>,
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate").finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(policy: Arc<dyn AuthorizationPolicy>) -> Self {
        Self { policy }
    }

    /// Decide whether `request` may proceed
    ///
    /// A context issued for a different capability than the request names
    /// is denied.
    #[must_use]
    pub fn decide(&self, request: &CapabilityRequest, ctx: &AuthorizationContext) -> Decision {
        if ctx.bypass() {
            tracing::debug!(
                capability = %request.capability,
                principal = %ctx.principal(),
                "authorization bypassed"
            );
            return Decision::Allow;
        }

        if ctx.requested_capability() != request.capability {
            tracing::warn!(
                capability = %request.capability,
                requested = ctx.requested_capability(),
                "authorization context does not match request"
            );
            return Decision::Deny;
        }

        if self.policy.permits(ctx.principal(), &request.capability) {
            Decision::Allow
        } else {
            tracing::debug!(
                capability = %request.capability,
                principal = %ctx.principal(),
                "capability not granted"
            );
            Decision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kiosk() -> Principal {
        Principal::Named("kiosk".to_string())
    }

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(Arc::new(
            StaticPolicy::new()
                .grant("kiosk", "speech.*")
                .grant("kiosk", "intent.submit")
                .grant("anonymous", "display.list"),
        ))
    }

    #[test]
    fn patterns_match() {
        assert!(CapabilityPattern::parse("*").matches("anything"));
        assert!(CapabilityPattern::parse("speech.*").matches("speech.stt"));
        assert!(!CapabilityPattern::parse("speech.*").matches("speechless"));
        assert!(CapabilityPattern::parse("intent.submit").matches("intent.submit"));
        assert!(!CapabilityPattern::parse("intent.submit").matches("intent.cancel"));
    }

    #[test]
    fn granted_capability_allowed() {
        let request = CapabilityRequest::new("speech.tts", None);
        let ctx = AuthorizationContext::new(kiosk(), "speech.tts");
        assert_eq!(gate().decide(&request, &ctx), Decision::Allow);
    }

    #[test]
    fn ungranted_capability_denied() {
        let request = CapabilityRequest::new("profile.write", None);
        let ctx = AuthorizationContext::new(kiosk(), "profile.write");
        assert_eq!(gate().decide(&request, &ctx), Decision::Deny);
    }

    #[test]
    fn anonymous_only_gets_anonymous_grants() {
        let allowed = CapabilityRequest::new("display.list", None);
        let denied = CapabilityRequest::new("speech.tts", None);
        let gate = gate();

        assert!(gate
            .decide(&allowed, &AuthorizationContext::new(Principal::Anonymous, "display.list"))
            .is_allow());
        assert!(!gate
            .decide(&denied, &AuthorizationContext::new(Principal::Anonymous, "speech.tts"))
            .is_allow());
    }

    #[test]
    fn bypass_allows_regardless_of_principal() {
        let request = CapabilityRequest::new("profile.write", None);
        for principal in [Principal::Anonymous, kiosk(), Principal::Named("nobody".to_string())] {
            let ctx = AuthorizationContext::for_mode(principal, "profile.write", AuthMode::Bypass);
            assert_eq!(gate().decide(&request, &ctx), Decision::Allow);
        }
    }

    #[test]
    fn enforce_mode_never_bypasses() {
        let ctx = AuthorizationContext::for_mode(kiosk(), "x", AuthMode::Enforce);
        assert!(!ctx.bypass());
    }

    #[test]
    fn mismatched_context_denied() {
        let request = CapabilityRequest::new("profile.write", None);
        let ctx = AuthorizationContext::new(kiosk(), "speech.tts");
        assert_eq!(gate().decide(&request, &ctx), Decision::Deny);
    }

    #[test]
    fn policy_from_grant_map() {
        let mut grants = HashMap::new();
        grants.insert("ops".to_string(), vec!["*".to_string()]);
        let policy = StaticPolicy::from_grants(&grants);

        assert_eq!(policy.principals(), 1);
        assert!(policy.permits(&Principal::Named("ops".to_string()), "anything.at.all"));
        assert!(!policy.permits(&Principal::Anonymous, "anything.at.all"));
    }
}

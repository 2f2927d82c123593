//! Authentication mode, principals, and capability authorization

pub mod auth;
pub mod authorization;

pub use auth::{ANONYMOUS_PRINCIPAL, AuthMode, BYPASS_ENV, Principal, TokenDirectory};
pub use authorization::{
    AllowAll, AuthorizationContext, AuthorizationGate, AuthorizationPolicy, CapabilityPattern,
    Decision, StaticPolicy,
};

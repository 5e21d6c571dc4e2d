//! An external authorization service brokering the OpenID Connect
//! Authorization Code flow on behalf of a proxy.
//!
//! The proxy delegates each inbound request over the Envoy ext-authz gRPC
//! contract; the filter chain decides whether to let it through with
//! identity headers attached, redirect the user agent to the identity
//! provider, or complete the provider callback by exchanging the
//! authorization code for tokens held in encrypted browser cookies.

pub mod client;
pub mod config;
pub mod filter;
pub mod http;
pub mod oidc;
pub mod random;
pub mod service;
pub mod session;
pub mod telemetry;

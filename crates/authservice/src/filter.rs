use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tracing::trace;

/// Canonical RPC codes surfaced to the ext-authz caller.
///
/// The transport maps these onto `google.rpc.Code` values; `Ok` is the only
/// code that results in the proxy letting the request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
	Ok,
	Unknown,
	InvalidArgument,
	PermissionDenied,
	Internal,
	Unauthenticated,
}

/// The HTTP portion of a check request, as decoded from the proxy's request
/// attributes. Header names arrive lower-cased, exactly as the proxy supplies
/// them.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
	pub scheme: String,
	pub host: String,
	pub path: String,
	pub headers: HashMap<String, String>,
}

/// Identity of one side of the proxied connection, used only for logging.
#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
	pub principal: String,
	pub address: String,
}

impl fmt::Display for PeerInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.principal, self.address)
	}
}

/// A check request decoded out of the transport. `http` is `None` when the
/// caller omitted the HTTP attributes, which filters must treat as a
/// malformed request.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
	pub http: Option<HttpRequest>,
	pub source: PeerInfo,
	pub destination: PeerInfo,
}

pub type Header = (String, String);

/// The decision a filter hands back to the proxy.
///
/// `Allow` headers are appended to the forwarded request; `Deny` headers are
/// set on the response returned to the user agent, optionally with an
/// explicit HTTP status (redirects use 302, everything else falls back to
/// the proxy's default denial status).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
	Allow {
		headers: Vec<Header>,
	},
	Deny {
		code: Code,
		http_status: Option<u16>,
		headers: Vec<Header>,
	},
}

impl CheckOutcome {
	pub fn code(&self) -> Code {
		match self {
			CheckOutcome::Allow { .. } => Code::Ok,
			CheckOutcome::Deny { code, .. } => *code,
		}
	}
}

/// A single request-processing stage.
///
/// Filters are composed into a [`Pipe`]; processing passes from one filter
/// to the next for as long as outcomes are `Allow`, and stops at the first
/// denial.
#[async_trait]
pub trait Filter: Send + Sync {
	async fn process(&self, request: &AuthRequest) -> CheckOutcome;

	/// Well-known name of the filter, for logging.
	fn name(&self) -> &'static str;
}

/// An ordered filter chain. `Allow` header additions accumulate across
/// filters; the first non-OK outcome is returned as-is.
#[derive(Default)]
pub struct Pipe {
	filters: Vec<Box<dyn Filter>>,
}

impl Pipe {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_filter(mut self, filter: Box<dyn Filter>) -> Self {
		self.filters.push(filter);
		self
	}
}

#[async_trait]
impl Filter for Pipe {
	async fn process(&self, request: &AuthRequest) -> CheckOutcome {
		let mut merged = Vec::new();
		for filter in &self.filters {
			trace!(filter = filter.name(), "running filter");
			match filter.process(request).await {
				CheckOutcome::Allow { headers } => merged.extend(headers),
				denied => return denied,
			}
		}
		CheckOutcome::Allow { headers: merged }
	}

	fn name(&self) -> &'static str {
		"pipe"
	}
}

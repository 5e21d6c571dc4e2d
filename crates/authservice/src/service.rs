use std::net::SocketAddr;

use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption, address};
use envoy_types::pb::envoy::r#type::v3::HttpStatus;
use envoy_types::pb::envoy::service::auth::v3::authorization_server::{
	Authorization, AuthorizationServer,
};
use envoy_types::pb::envoy::service::auth::v3::{
	CheckRequest, CheckResponse, DeniedHttpResponse, OkHttpResponse, attribute_context,
	check_response,
};
use envoy_types::pb::google::rpc;
use tonic::{Request, Response, Status};
use tracing::{info, trace};

use crate::config::{Config, FilterConfig};
use crate::filter::{AuthRequest, CheckOutcome, Code, Filter, Header, HttpRequest, PeerInfo, Pipe};
use crate::oidc::OidcFilter;

/// Assembles the configured filter chain with its concrete ports.
pub fn build_filter_chain(filters: Vec<FilterConfig>) -> anyhow::Result<Pipe> {
	let mut pipe = Pipe::new();
	for filter in filters {
		match filter {
			FilterConfig::Oidc(oidc) => {
				pipe = pipe.add_filter(Box::new(OidcFilter::from_config(oidc)?));
			},
		}
	}
	Ok(pipe)
}

/// gRPC surface of the service: decodes Envoy check requests, runs the
/// filter chain, and encodes the outcome back onto the wire.
pub struct AuthorizationService {
	pipe: Pipe,
}

impl AuthorizationService {
	pub fn new(pipe: Pipe) -> Self {
		Self { pipe }
	}
}

#[tonic::async_trait]
impl Authorization for AuthorizationService {
	async fn check(
		&self,
		request: Request<CheckRequest>,
	) -> Result<Response<CheckResponse>, Status> {
		trace!("check request received");
		let auth_request = decode_check_request(&request.into_inner());
		let outcome = self.pipe.process(&auth_request).await;
		Ok(Response::new(encode_outcome(outcome)))
	}
}

fn decode_check_request(request: &CheckRequest) -> AuthRequest {
	let attributes = request.attributes.as_ref();
	let http = attributes
		.and_then(|attributes| attributes.request.as_ref())
		.and_then(|request| request.http.as_ref())
		.map(|http| HttpRequest {
			scheme: http.scheme.clone(),
			host: http.host.clone(),
			path: http.path.clone(),
			headers: http.headers.clone(),
		});
	AuthRequest {
		http,
		source: peer_info(attributes.and_then(|attributes| attributes.source.as_ref())),
		destination: peer_info(attributes.and_then(|attributes| attributes.destination.as_ref())),
	}
}

fn peer_info(peer: Option<&attribute_context::Peer>) -> PeerInfo {
	let Some(peer) = peer else {
		return PeerInfo::default();
	};
	let address = peer
		.address
		.as_ref()
		.and_then(|outer| outer.address.as_ref())
		.map(|address| match address {
			address::Address::SocketAddress(socket) => socket.address.clone(),
			address::Address::Pipe(pipe) => pipe.path.clone(),
			address::Address::EnvoyInternalAddress(_) => "internal".to_string(),
		})
		.unwrap_or_default();
	PeerInfo {
		principal: peer.principal.clone(),
		address,
	}
}

// google.rpc.Code values.
fn rpc_code(code: Code) -> i32 {
	match code {
		Code::Ok => 0,
		Code::Unknown => 2,
		Code::InvalidArgument => 3,
		Code::PermissionDenied => 7,
		Code::Internal => 13,
		Code::Unauthenticated => 16,
	}
}

fn header_options(headers: Vec<Header>) -> Vec<HeaderValueOption> {
	headers
		.into_iter()
		.map(|(key, value)| HeaderValueOption {
			header: Some(HeaderValue {
				key,
				value,
				..Default::default()
			}),
			..Default::default()
		})
		.collect()
}

fn encode_outcome(outcome: CheckOutcome) -> CheckResponse {
	let status = rpc::Status {
		code: rpc_code(outcome.code()),
		..Default::default()
	};
	let http_response = match outcome {
		CheckOutcome::Allow { headers } => {
			check_response::HttpResponse::OkResponse(OkHttpResponse {
				headers: header_options(headers),
				..Default::default()
			})
		},
		CheckOutcome::Deny {
			http_status,
			headers,
			..
		} => check_response::HttpResponse::DeniedResponse(DeniedHttpResponse {
			status: http_status.map(|code| HttpStatus { code: code as i32 }),
			headers: header_options(headers),
			..Default::default()
		}),
	};
	CheckResponse {
		status: Some(status),
		http_response: Some(http_response),
		..Default::default()
	}
}

/// Runs the ext-authz server until interrupted.
pub async fn serve(config: Config) -> anyhow::Result<()> {
	let address: SocketAddr = format!("{}:{}", config.listen_address, config.listen_port).parse()?;
	let pipe = build_filter_chain(config.filters)?;
	info!(%address, "server listening");
	tonic::transport::Server::builder()
		.add_service(AuthorizationServer::new(AuthorizationService::new(pipe)))
		.serve_with_shutdown(address, shutdown_signal())
		.await?;
	info!("server shutting down");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		info!(error = %err, "failed to install shutdown handler");
	}
}

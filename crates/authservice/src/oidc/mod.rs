use std::sync::Arc;

use async_trait::async_trait;
use aws_lc_rs::constant_time::verify_slices_are_equal;
use secrecy::ExposeSecret;
use tracing::{debug, info, trace};

use crate::client::HttpClient;
use crate::config::OidcConfig;
use crate::filter::{AuthRequest, CheckOutcome, Code, Filter, Header, HttpRequest};
use crate::http;
use crate::random;
use crate::session::Cryptor;

pub mod state;
pub mod token;

use token::TokenResponseParser;

const FILTER_NAME: &str = "oidc";
const MANDATORY_SCOPE: &str = "openid";
const TOKEN_LENGTH: usize = 32;
const HTTP_FOUND: u16 = 302;

/// The OIDC relying-party filter.
///
/// Session continuity lives entirely in three encrypted browser cookies
/// (state, id-token, access-token); the filter itself holds no per-request
/// state and a single instance serves concurrent checks.
pub struct OidcFilter {
	config: OidcConfig,
	callback_host: String,
	callback_path: String,
	http_client: Arc<dyn HttpClient>,
	parser: Arc<dyn TokenResponseParser>,
	cryptor: Arc<dyn Cryptor>,
}

impl OidcFilter {
	pub fn new(
		config: OidcConfig,
		http_client: Arc<dyn HttpClient>,
		parser: Arc<dyn TokenResponseParser>,
		cryptor: Arc<dyn Cryptor>,
	) -> anyhow::Result<Self> {
		let callback_host = config
			.callback
			.host_str()
			.ok_or_else(|| anyhow::anyhow!("oidc callback must carry an explicit hostname"))?
			.to_string();
		let callback_path = config.callback.path().to_string();
		Ok(Self {
			config,
			callback_host,
			callback_path,
			http_client,
			parser,
			cryptor,
		})
	}

	/// Builds the concrete port implementations from the configuration:
	/// AES-256-GCM cookie crypto keyed off the client secret, a pooled HTTP
	/// client, and a JWKS-backed token response parser.
	pub fn from_config(config: OidcConfig) -> anyhow::Result<Self> {
		let parser = token::JwksTokenResponseParser::new(&config.jwks)?;
		let info = format!(
			"authservice|token={}|client_id={}",
			config.token_endpoint, config.client_id
		);
		let cryptor =
			crate::session::AesGcmCryptor::derive(config.client_secret.expose_secret().as_bytes(), &info)?;
		Self::new(
			config,
			Arc::new(crate::client::ReqwestHttpClient::new()?),
			Arc::new(parser),
			Arc::new(cryptor),
		)
	}

	fn cookie_name(&self, suffix: &str) -> String {
		if self.config.cookie_name_prefix.is_empty() {
			format!("__Host-authservice-{suffix}-cookie")
		} else {
			format!(
				"__Host-{}-authservice-{suffix}-cookie",
				self.config.cookie_name_prefix
			)
		}
	}

	fn state_cookie_name(&self) -> String {
		self.cookie_name("state")
	}

	fn id_token_cookie_name(&self) -> String {
		self.cookie_name("id-token")
	}

	fn access_token_cookie_name(&self) -> String {
		self.cookie_name("access-token")
	}

	fn encode_header_value(preamble: &str, value: &str) -> String {
		if preamble.is_empty() {
			value.to_string()
		} else {
			format!("{preamble} {value}")
		}
	}

	fn cookie_from_headers(&self, request: &HttpRequest, name: &str) -> Option<String> {
		let header_value = request.headers.get(http::COOKIE)?;
		let cookies = http::decode_cookies(header_value)?;
		cookies.get(name).cloned()
	}

	fn protocol_error(headers: Vec<Header>) -> CheckOutcome {
		CheckOutcome::Deny {
			code: Code::InvalidArgument,
			http_status: None,
			headers,
		}
	}

	fn internal_error(headers: Vec<Header>) -> CheckOutcome {
		CheckOutcome::Deny {
			code: Code::Internal,
			http_status: None,
			headers,
		}
	}

	fn redirect_to_idp(&self) -> CheckOutcome {
		let state = random::token(TOKEN_LENGTH);
		let nonce = random::token(TOKEN_LENGTH);

		let mut scopes = vec![MANDATORY_SCOPE.to_string()];
		for scope in &self.config.scopes {
			if !scopes.iter().any(|existing| existing == scope) {
				scopes.push(scope.clone());
			}
		}

		let mut authorization_url = self.config.authorization_endpoint.clone();
		authorization_url
			.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("scope", &scopes.join(" "))
			.append_pair("client_id", &self.config.client_id)
			.append_pair("nonce", &nonce)
			.append_pair("state", &state)
			.append_pair("redirect_uri", self.config.callback.as_str());

		let mut headers = http::standard_response_headers();
		headers.push((http::LOCATION.to_string(), authorization_url.to_string()));

		let Some(state_token) = self.cryptor.encrypt(&state::encode(&state, &nonce)) else {
			info!("failed to seal state cookie");
			return Self::internal_error(headers);
		};
		headers.push((
			http::SET_COOKIE.to_string(),
			http::encode_set_cookie(&self.state_cookie_name(), &state_token, self.config.timeout),
		));

		CheckOutcome::Deny {
			code: Code::Unauthenticated,
			http_status: Some(HTTP_FOUND),
			headers,
		}
	}

	async fn retrieve_token(&self, request: &HttpRequest, query: &str) -> CheckOutcome {
		trace!("retrieving token");
		let mut headers = http::standard_response_headers();
		// The browser must drop a consumed state cookie no matter how the
		// rest of the callback turns out.
		headers.push((
			http::SET_COOKIE.to_string(),
			http::encode_set_cookie(&self.state_cookie_name(), "deleted", 0),
		));

		let Some(encrypted_state) = self.cookie_from_headers(request, &self.state_cookie_name())
		else {
			info!("missing state cookie on callback");
			return Self::protocol_error(headers);
		};
		let Some(state_payload) = self.cryptor.decrypt(&encrypted_state) else {
			info!("state cookie failed to decrypt");
			return Self::protocol_error(headers);
		};
		let Some((state, nonce)) = state::decode(&state_payload) else {
			info!("state cookie encoding is invalid");
			return Self::protocol_error(headers);
		};

		let Some(query_data) = http::decode_query(query) else {
			info!("callback query string is invalid");
			return Self::protocol_error(headers);
		};
		let (Some(query_state), Some(code)) = (query_data.get("state"), query_data.get("code"))
		else {
			info!("callback query missing state or code");
			return Self::protocol_error(headers);
		};
		if verify_slices_are_equal(query_state.as_bytes(), state.as_bytes()).is_err() {
			info!("callback state does not match state cookie");
			return Self::protocol_error(headers);
		}

		let post_headers = vec![
			(
				http::CONTENT_TYPE.to_string(),
				http::FORM_URLENCODED.to_string(),
			),
			(
				http::AUTHORIZATION.to_string(),
				http::encode_basic_auth(
					&self.config.client_id,
					self.config.client_secret.expose_secret(),
				),
			),
		];
		let body = http::encode_form_data([
			("code", code.as_str()),
			("redirect_uri", self.config.callback.as_str()),
			("grant_type", "authorization_code"),
		]);

		let Some(response) = self
			.http_client
			.post(&self.config.token_endpoint, &post_headers, body)
			.await
		else {
			info!("no response from token endpoint");
			return Self::internal_error(headers);
		};
		if response.status != 200 {
			info!(status = response.status, "token endpoint returned an error");
			return CheckOutcome::Deny {
				code: Code::Unknown,
				http_status: None,
				headers,
			};
		}

		let Some(token) = self
			.parser
			.parse(&self.config.client_id, &nonce, &response.body)
		else {
			info!("invalid token response");
			return Self::protocol_error(headers);
		};
		let timeout = token.expiry.unwrap_or(i64::MAX);

		if self.config.access_token.is_some() {
			let Some(access_token) = &token.access_token else {
				info!("token response missing expected access_token");
				return Self::protocol_error(headers);
			};
			let Some(sealed) = self.cryptor.encrypt(access_token) else {
				info!("failed to seal access token cookie");
				return Self::internal_error(headers);
			};
			headers.push((
				http::SET_COOKIE.to_string(),
				http::encode_set_cookie(&self.access_token_cookie_name(), &sealed, timeout),
			));
		}

		let Some(sealed) = self.cryptor.encrypt(&token.id_token) else {
			info!("failed to seal id token cookie");
			return Self::internal_error(headers);
		};
		headers.push((
			http::LOCATION.to_string(),
			self.config.landing_page.to_string(),
		));
		headers.push((
			http::SET_COOKIE.to_string(),
			http::encode_set_cookie(&self.id_token_cookie_name(), &sealed, timeout),
		));

		CheckOutcome::Deny {
			code: Code::Unauthenticated,
			http_status: Some(HTTP_FOUND),
			headers,
		}
	}
}

#[async_trait]
impl Filter for OidcFilter {
	async fn process(&self, request: &AuthRequest) -> CheckOutcome {
		trace!("processing check request");
		debug!(source = %request.source, destination = %request.destination, "request origin");

		let Some(http_request) = &request.http else {
			info!("missing http attributes in check request");
			return Self::protocol_error(http::standard_response_headers());
		};

		// A pre-existing id-token header passes through untouched; the
		// upstream is responsible for validating it.
		if http_request.headers.contains_key(&self.config.id_token.header) {
			return CheckOutcome::Allow { headers: vec![] };
		}

		if let Some(id_token_cookie) =
			self.cookie_from_headers(http_request, &self.id_token_cookie_name())
		{
			if let Some(id_token) = self.cryptor.decrypt(&id_token_cookie) {
				let mut allow_headers = vec![(
					self.config.id_token.header.clone(),
					Self::encode_header_value(&self.config.id_token.preamble, &id_token),
				)];
				match &self.config.access_token {
					None => return CheckOutcome::Allow { headers: allow_headers },
					Some(forward) => {
						let access_token = self
							.cookie_from_headers(http_request, &self.access_token_cookie_name())
							.and_then(|cookie| self.cryptor.decrypt(&cookie));
						match access_token {
							Some(access_token) => {
								allow_headers.push((
									forward.header.clone(),
									Self::encode_header_value(&forward.preamble, &access_token),
								));
								return CheckOutcome::Allow { headers: allow_headers };
							},
							// Never grant partial access: without a usable
							// access token the user re-authenticates.
							None => info!("access token cookie missing or failed to decrypt"),
						}
					},
				}
			} else {
				info!("id token cookie failed to decrypt");
			}
		}

		let (path, query) = http::decode_path(&http_request.path);
		trace!(host = %http_request.host, path, "selecting handler");
		if http_request.host == self.callback_host && path == self.callback_path {
			return self.retrieve_token(http_request, query).await;
		}
		self.redirect_to_idp()
	}

	fn name(&self) -> &'static str {
		FILTER_NAME
	}
}

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::filter::Header;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpResponse {
	pub status: u16,
	pub body: String,
}

/// Outbound HTTP capability used for the token-endpoint exchange.
///
/// `None` covers every transport-level failure: connection errors, request
/// timeouts, and cancellation. The caller maps it to an internal error and
/// never retries.
#[async_trait]
pub trait HttpClient: Send + Sync {
	async fn post(&self, url: &Url, headers: &[Header], body: String) -> Option<HttpResponse>;
}

/// [`HttpClient`] backed by a pooled reqwest client with bounded connect and
/// total-request deadlines, so a slow identity provider cannot pin a worker.
pub struct ReqwestHttpClient {
	client: reqwest::Client,
}

impl ReqwestHttpClient {
	pub fn new() -> anyhow::Result<Self> {
		let client = reqwest::Client::builder()
			.connect_timeout(CONNECT_TIMEOUT)
			.timeout(REQUEST_TIMEOUT)
			.build()?;
		Ok(Self { client })
	}
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
	async fn post(&self, url: &Url, headers: &[Header], body: String) -> Option<HttpResponse> {
		let mut request = self.client.post(url.as_str()).body(body);
		for (name, value) in headers {
			request = request.header(name.as_str(), value.as_str());
		}

		let response = match request.send().await {
			Ok(response) => response,
			Err(err) => {
				info!(error = %err, "outbound POST failed");
				return None;
			},
		};
		let status = response.status().as_u16();
		let body = match response.text().await {
			Ok(body) => body,
			Err(err) => {
				info!(error = %err, "failed to read response body");
				return None;
			},
		};
		Some(HttpResponse { status, body })
	}
}

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level service configuration, loaded once at startup and read-only
/// afterwards.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default = "default_listen_address")]
	pub listen_address: String,
	#[serde(default = "default_listen_port")]
	pub listen_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default)]
	pub threads: Option<usize>,
	pub filters: Vec<FilterConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterConfig {
	Oidc(OidcConfig),
}

/// Configuration for one OIDC filter instance.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OidcConfig {
	pub authorization_endpoint: Url,
	pub token_endpoint: Url,
	/// Registered redirect URI; its host and path select the callback
	/// branch of the filter.
	pub callback: Url,
	/// Where the user agent is sent after a successful token exchange.
	pub landing_page: Url,
	pub client_id: String,
	pub client_secret: SecretString,
	#[serde(default)]
	pub scopes: Vec<String>,
	#[serde(default)]
	pub cookie_name_prefix: String,
	/// Lifetime in seconds of the state cookie set during the redirect to
	/// the identity provider.
	#[serde(default = "default_state_timeout")]
	pub timeout: i64,
	pub id_token: TokenForwardConfig,
	#[serde(default)]
	pub access_token: Option<TokenForwardConfig>,
	/// Inline JWKS document of the identity provider, used to validate ID
	/// token signatures.
	pub jwks: String,
}

/// How a token is surfaced to the upstream: which request header carries it
/// and an optional preamble (e.g. `Bearer`) prepended to the value.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenForwardConfig {
	pub header: String,
	#[serde(default)]
	pub preamble: String,
}

fn default_listen_address() -> String {
	"127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
	10003
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_state_timeout() -> i64 {
	300
}

impl Config {
	/// Parses a configuration document. YAML is a superset of JSON, so both
	/// config styles go through the same parser.
	pub fn parse(contents: &str) -> anyhow::Result<Self> {
		let config: Config = serde_yaml::from_str(contents)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> anyhow::Result<()> {
		if !LOG_LEVELS.contains(&self.log_level.as_str()) {
			anyhow::bail!(
				"unexpected log_level `{}`: must be one of {:?}",
				self.log_level,
				LOG_LEVELS
			);
		}
		if let Some(threads) = self.threads
			&& threads == 0
		{
			anyhow::bail!("threads must be > 0");
		}
		if self.filters.is_empty() {
			anyhow::bail!("config requires at least one filter");
		}
		for filter in &self.filters {
			let FilterConfig::Oidc(oidc) = filter;
			oidc.validate()?;
		}
		Ok(())
	}
}

impl OidcConfig {
	fn validate(&self) -> anyhow::Result<()> {
		if self.client_id.is_empty() {
			anyhow::bail!("oidc filter requires client_id");
		}
		if self.client_secret.expose_secret().is_empty() {
			anyhow::bail!("oidc filter requires client_secret");
		}
		if self.callback.host_str().is_none() {
			anyhow::bail!("oidc callback must carry an explicit hostname");
		}
		if self.id_token.header.is_empty() {
			anyhow::bail!("oidc id_token forwarding requires a header name");
		}
		if let Some(access_token) = &self.access_token
			&& access_token.header.is_empty()
		{
			anyhow::bail!("oidc access_token forwarding requires a header name");
		}
		if self.timeout <= 0 {
			anyhow::bail!("oidc timeout must be > 0");
		}
		serde_json::from_str::<jsonwebtoken::jwk::JwkSet>(&self.jwks)
			.map_err(|e| anyhow::anyhow!("oidc jwks is not a valid JWKS document: {e}"))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
{
  "listen_address": "0.0.0.0",
  "listen_port": 8443,
  "log_level": "debug",
  "filters": [
    {
      "oidc": {
        "authorization_endpoint": "https://idp.example/authorize",
        "token_endpoint": "https://idp.example/token",
        "callback": "https://app.example/oidc/callback",
        "landing_page": "https://app.example/",
        "client_id": "client-123",
        "client_secret": "secret-xyz",
        "scopes": ["email"],
        "cookie_name_prefix": "acme",
        "timeout": 600,
        "id_token": {"header": "authorization", "preamble": "Bearer"},
        "access_token": {"header": "x-access-token"},
        "jwks": "{\"keys\":[]}"
      }
    }
  ]
}
"#;

	fn parse_with<F>(mutate: F) -> anyhow::Result<Config>
	where
		F: FnOnce(&mut serde_json::Value),
	{
		let mut value: serde_json::Value = serde_json::from_str(SAMPLE).expect("sample is json");
		mutate(&mut value);
		Config::parse(&value.to_string())
	}

	#[test]
	fn sample_config_parses() {
		let config = Config::parse(SAMPLE).expect("sample config should parse");
		assert_eq!(config.listen_address, "0.0.0.0");
		assert_eq!(config.listen_port, 8443);
		let FilterConfig::Oidc(oidc) = &config.filters[0];
		assert_eq!(oidc.client_id, "client-123");
		assert_eq!(oidc.callback.host_str(), Some("app.example"));
		assert_eq!(oidc.callback.path(), "/oidc/callback");
		assert_eq!(oidc.id_token.preamble, "Bearer");
		assert_eq!(
			oidc.access_token.as_ref().map(|t| t.header.as_str()),
			Some("x-access-token")
		);
	}

	#[test]
	fn defaults_apply() {
		let config = parse_with(|v| {
			let obj = v.as_object_mut().unwrap();
			obj.remove("listen_address");
			obj.remove("listen_port");
			obj.remove("log_level");
		})
		.expect("config with defaults should parse");
		assert_eq!(config.listen_address, "127.0.0.1");
		assert_eq!(config.listen_port, 10003);
		assert_eq!(config.log_level, "info");
	}

	#[test]
	fn yaml_config_parses() {
		let yaml = r#"
listen_port: 9090
filters:
  - oidc:
      authorization_endpoint: https://idp.example/authorize
      token_endpoint: https://idp.example/token
      callback: https://app.example/cb
      landing_page: https://app.example/
      client_id: client
      client_secret: secret
      id_token:
        header: authorization
      jwks: '{"keys":[]}'
"#;
		let config = Config::parse(yaml).expect("yaml config should parse");
		assert_eq!(config.listen_port, 9090);
	}

	#[test]
	fn rejects_unknown_log_level() {
		let err = parse_with(|v| v["log_level"] = "verbose".into()).unwrap_err();
		assert!(err.to_string().contains("unexpected log_level"));
	}

	#[test]
	fn rejects_empty_filter_list() {
		let err = parse_with(|v| v["filters"] = serde_json::json!([])).unwrap_err();
		assert!(err.to_string().contains("at least one filter"));
	}

	#[test]
	fn rejects_missing_client_secret() {
		let err = parse_with(|v| v["filters"][0]["oidc"]["client_secret"] = "".into()).unwrap_err();
		assert!(err.to_string().contains("client_secret"));
	}

	#[test]
	fn rejects_invalid_jwks() {
		let err = parse_with(|v| v["filters"][0]["oidc"]["jwks"] = "not json".into()).unwrap_err();
		assert!(err.to_string().contains("JWKS"));
	}

	#[test]
	fn rejects_zero_timeout() {
		let err = parse_with(|v| v["filters"][0]["oidc"]["timeout"] = 0.into()).unwrap_err();
		assert!(err.to_string().contains("timeout"));
	}

	#[test]
	fn rejects_zero_threads() {
		let err = parse_with(|v| v["threads"] = 0.into()).unwrap_err();
		assert!(err.to_string().contains("threads"));
	}
}

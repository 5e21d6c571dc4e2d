use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cookie::{Cookie, SameSite};

use crate::filter::Header;

// Request header names arrive lower-cased from the proxy; response header
// names use their canonical spelling.
pub const COOKIE: &str = "cookie";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const LOCATION: &str = "Location";
pub const CACHE_CONTROL: &str = "Cache-Control";
pub const PRAGMA: &str = "Pragma";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const AUTHORIZATION: &str = "Authorization";

pub const NO_CACHE: &str = "no-cache";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Headers set on every denial so intermediaries never cache a redirect or
/// error that is specific to one authentication exchange.
pub fn standard_response_headers() -> Vec<Header> {
	vec![
		(CACHE_CONTROL.to_string(), NO_CACHE.to_string()),
		(PRAGMA.to_string(), NO_CACHE.to_string()),
	]
}

/// Renders a session cookie with the full mandatory directive set:
/// `HttpOnly; SameSite=Lax; Secure; Path=/; Max-Age=<t>`. The `__Host-`
/// naming convention the filter uses requires `Secure` and `Path=/`.
pub fn encode_set_cookie(name: &str, value: &str, max_age: i64) -> String {
	Cookie::build((name, value))
		.http_only(true)
		.same_site(SameSite::Lax)
		.secure(true)
		.path("/")
		.max_age(cookie::time::Duration::seconds(max_age))
		.build()
		.to_string()
}

/// Parses an HTTP `Cookie` header into a name → value map. Later duplicates
/// win. Returns `None` when any pair is malformed.
pub fn decode_cookies(header_value: &str) -> Option<HashMap<String, String>> {
	let mut cookies = HashMap::new();
	for parsed in Cookie::split_parse(header_value) {
		let cookie = parsed.ok()?;
		cookies.insert(cookie.name().to_string(), cookie.value().to_string());
	}
	Some(cookies)
}

/// Splits a request path into the path proper and the query-string tail.
/// The query is empty when there is no `?`.
pub fn decode_path(path: &str) -> (&str, &str) {
	match path.split_once('?') {
		Some((path, query)) => (path, query),
		None => (path, ""),
	}
}

/// Parses a URL-encoded key/value sequence. Later duplicates win. Returns
/// `None` on malformed percent-escapes or non-UTF-8 decoded bytes.
pub fn decode_query(query: &str) -> Option<HashMap<String, String>> {
	let mut data = HashMap::new();
	for pair in query.split('&') {
		if pair.is_empty() {
			continue;
		}
		let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
		data.insert(percent_decode(key)?, percent_decode(value)?);
	}
	Some(data)
}

fn percent_decode(input: &str) -> Option<String> {
	let bytes = input.as_bytes();
	let mut decoded = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		match bytes[i] {
			b'%' => {
				let hi = hex_value(*bytes.get(i + 1)?)?;
				let lo = hex_value(*bytes.get(i + 2)?)?;
				decoded.push(hi << 4 | lo);
				i += 3;
			},
			b'+' => {
				decoded.push(b' ');
				i += 1;
			},
			byte => {
				decoded.push(byte);
				i += 1;
			},
		}
	}
	String::from_utf8(decoded).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
	(byte as char).to_digit(16).map(|v| v as u8)
}

/// URL-encodes the given pairs into `k=v&k=v` form data. Repeated keys are
/// preserved in order.
pub fn encode_form_data<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
	let mut serializer = url::form_urlencoded::Serializer::new(String::new());
	for (key, value) in pairs {
		serializer.append_pair(key, value);
	}
	serializer.finish()
}

pub fn encode_basic_auth(client_id: &str, client_secret: &str) -> String {
	format!(
		"Basic {}",
		STANDARD.encode(format!("{client_id}:{client_secret}"))
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn set_cookie_carries_mandatory_directives() {
		let header = encode_set_cookie("__Host-authservice-state-cookie", "opaque", 600);
		assert!(header.starts_with("__Host-authservice-state-cookie=opaque"));
		for directive in ["HttpOnly", "SameSite=Lax", "Secure", "Path=/", "Max-Age=600"] {
			assert!(header.contains(directive), "missing {directive} in {header}");
		}
	}

	#[test]
	fn deletion_cookie_has_zero_max_age() {
		let header = encode_set_cookie("__Host-authservice-state-cookie", "deleted", 0);
		assert!(header.starts_with("__Host-authservice-state-cookie=deleted"));
		assert!(header.contains("Max-Age=0"));
	}

	#[test]
	fn decode_cookies_trims_and_last_duplicate_wins() {
		let cookies = decode_cookies("a=1; b = 2 ; a=3").expect("valid cookie header");
		assert_eq!(cookies.get("a").map(String::as_str), Some("3"));
		assert_eq!(cookies.get("b").map(String::as_str), Some("2"));
	}

	#[test]
	fn decode_cookies_rejects_malformed_pairs() {
		assert!(decode_cookies("missing-equals").is_none());
	}

	#[test]
	fn decode_path_splits_on_first_question_mark() {
		assert_eq!(decode_path("/cb?code=x&state=y"), ("/cb", "code=x&state=y"));
		assert_eq!(decode_path("/cb?a=b?c"), ("/cb", "a=b?c"));
		assert_eq!(decode_path("/plain"), ("/plain", ""));
	}

	#[test]
	fn decode_query_percent_and_plus() {
		let data = decode_query("state=%41bc&msg=hello+world&flag").expect("valid query");
		assert_eq!(data.get("state").map(String::as_str), Some("Abc"));
		assert_eq!(data.get("msg").map(String::as_str), Some("hello world"));
		assert_eq!(data.get("flag").map(String::as_str), Some(""));
	}

	#[test]
	fn decode_query_last_duplicate_wins() {
		let data = decode_query("k=1&k=2").expect("valid query");
		assert_eq!(data.get("k").map(String::as_str), Some("2"));
	}

	#[test]
	fn decode_query_rejects_bad_escapes() {
		assert!(decode_query("state=%zz").is_none());
		assert!(decode_query("state=%4").is_none());
		assert!(decode_query("state=%").is_none());
	}

	#[test]
	fn encode_form_data_escapes_and_preserves_repeats() {
		let body = encode_form_data([
			("code", "a b&c"),
			("grant_type", "authorization_code"),
			("code", "again"),
		]);
		assert_eq!(body, "code=a+b%26c&grant_type=authorization_code&code=again");
	}

	#[test]
	fn basic_auth_is_base64_of_id_and_secret() {
		assert_eq!(
			encode_basic_auth("client", "secret"),
			"Basic Y2xpZW50OnNlY3JldA=="
		);
	}

	#[test]
	fn form_round_trip() {
		let body = encode_form_data([("redirect_uri", "https://app.example/cb?x=1")]);
		let decoded = decode_query(&body).expect("own encoding must decode");
		assert_eq!(
			decoded.get("redirect_uri").map(String::as_str),
			Some("https://app.example/cb?x=1")
		);
	}
}

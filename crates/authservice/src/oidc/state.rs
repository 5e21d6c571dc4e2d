//! Framing for the `(state, nonce)` pair carried in the state cookie.
//!
//! The pair is joined with `;`, a byte outside the random-token alphabet,
//! then encrypted before it is placed in the cookie. Decoding is strict: the
//! payload must split into exactly two non-empty parts.

const SEPARATOR: char = ';';

pub fn encode(state: &str, nonce: &str) -> String {
	format!("{state}{SEPARATOR}{nonce}")
}

pub fn decode(value: &str) -> Option<(String, String)> {
	let (state, nonce) = value.split_once(SEPARATOR)?;
	if state.is_empty() || nonce.is_empty() || nonce.contains(SEPARATOR) {
		return None;
	}
	Some((state.to_string(), nonce.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::random;

	#[test]
	fn round_trip() {
		let state = random::token(32);
		let nonce = random::token(32);
		let encoded = encode(&state, &nonce);
		assert_eq!(decode(&encoded), Some((state, nonce)));
	}

	#[test]
	fn rejects_missing_separator() {
		assert_eq!(decode("stateandnonce"), None);
	}

	#[test]
	fn rejects_empty_parts() {
		assert_eq!(decode(";nonce"), None);
		assert_eq!(decode("state;"), None);
		assert_eq!(decode(";"), None);
	}

	#[test]
	fn rejects_extra_separators() {
		assert_eq!(decode("state;nonce;extra"), None);
	}
}

use rand::Rng;
use rand::distr::Alphanumeric;

/// Draws a token of `len` characters from the OS-seeded CSPRNG.
///
/// The alphanumeric alphabet is URL-safe and disjoint from the `;` framing
/// byte used by the state cookie codec, so tokens never need escaping and
/// can never be confused with codec framing.
pub fn token(len: usize) -> String {
	rand::rng()
		.sample_iter(Alphanumeric)
		.take(len)
		.map(char::from)
		.collect()
}

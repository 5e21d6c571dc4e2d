use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use aws_lc_rs::hkdf;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use tracing::debug;

const NONCE_LEN: usize = 12;
const COOKIE_AAD: &[u8] = b"authservice_session_cookie";

/// Symmetric cryptor for cookie payloads.
///
/// Decrypt success is treated as proof the cookie was minted by this
/// service, so implementations must use authenticated encryption: tampered
/// ciphertext has to come back as `None`, never as garbage plaintext.
pub trait Cryptor: Send + Sync {
	fn encrypt(&self, plaintext: &str) -> Option<String>;
	fn decrypt(&self, ciphertext: &str) -> Option<String>;
}

/// AES-256-GCM [`Cryptor`] with a random 96-bit nonce prefixed to each
/// ciphertext and URL-safe base64 output.
pub struct AesGcmCryptor {
	key: LessSafeKey,
}

impl AesGcmCryptor {
	/// Derives the AES key from the configured client secret with
	/// HKDF-SHA256. `info` binds the key to one filter instance (issuer,
	/// client id), so two filters sharing a secret still use distinct keys.
	pub fn derive(secret: &[u8], info: &str) -> anyhow::Result<Self> {
		let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
		let prk = salt.extract(secret);
		let info_binding = [info.as_bytes()];
		let okm = prk
			.expand(&info_binding, hkdf::HKDF_SHA256)
			.map_err(|_| anyhow::anyhow!("HKDF expansion failed"))?;
		let mut key_bytes = [0u8; 32];
		okm
			.fill(&mut key_bytes)
			.map_err(|_| anyhow::anyhow!("HKDF fill failed"))?;
		let unbound =
			UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| anyhow::anyhow!("invalid key"))?;
		Ok(Self {
			key: LessSafeKey::new(unbound),
		})
	}
}

impl Cryptor for AesGcmCryptor {
	fn encrypt(&self, plaintext: &str) -> Option<String> {
		let mut nonce_bytes = [0u8; NONCE_LEN];
		rand::rng().fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::assume_unique_for_key(nonce_bytes);

		let mut in_out = Vec::with_capacity(plaintext.len() + AES_256_GCM.tag_len());
		in_out.extend_from_slice(plaintext.as_bytes());
		self
			.key
			.seal_in_place_append_tag(nonce, Aad::from(COOKIE_AAD), &mut in_out)
			.ok()?;

		// Prefix the nonce so decryption can reconstruct the AEAD input.
		let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
		sealed.extend_from_slice(&nonce_bytes);
		sealed.extend_from_slice(&in_out);
		Some(URL_SAFE_NO_PAD.encode(sealed))
	}

	fn decrypt(&self, ciphertext: &str) -> Option<String> {
		let mut data = URL_SAFE_NO_PAD.decode(ciphertext).ok()?;
		if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
			debug!("ciphertext shorter than nonce plus tag");
			return None;
		}

		let nonce = Nonce::try_assume_unique_for_key(&data[..NONCE_LEN]).ok()?;
		let plaintext_len = {
			let in_out = &mut data[NONCE_LEN..];
			let plaintext = self
				.key
				.open_in_place(nonce, Aad::from(COOKIE_AAD), in_out)
				.ok()?;
			plaintext.len()
		};

		data.copy_within(NONCE_LEN..NONCE_LEN + plaintext_len, 0);
		data.truncate(plaintext_len);
		String::from_utf8(data).ok()
	}
}

//! Symmetric encryption of note bodies.
//!
//! Bodies are sealed with AES-256-GCM. The 256-bit cipher key is derived
//! from the caller's key with HKDF-SHA256 and a random per-call salt, so the
//! same key never reuses a (key, nonce) pair. The returned blob is base64 text
//! that embeds everything needed to decrypt except the key:
//!
//! ```text
//! base64( "NKC1" | salt (16) | nonce (12) | ciphertext + tag (16) )
//! ```
//!
//! The codec is stateless and never stores the key.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CodecError;

/// Placeholder returned in place of a body that cannot be decrypted.
pub const DECRYPTION_PLACEHOLDER: &str = "[Encrypted content - unable to decrypt]";

const MAGIC: &[u8; 4] = b"NKC1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;
const HKDF_INFO: &[u8] = b"notekeep note body v1";

/// Caller-supplied key held for the duration of a session.
///
/// Zeroized on drop and redacted from debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wraps a key, rejecting the empty string.
    pub fn new(key: impl Into<String>) -> Result<Self, CodecError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        Ok(Self(key))
    }

    /// Returns the raw key.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionKey").field(&"[REDACTED]").finish()
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn derive_cipher(key: &str, salt: &[u8]) -> Result<Aes256Gcm, CodecError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), key.as_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(HKDF_INFO, &mut okm[..])
        .map_err(|e| CodecError::Encryption(e.to_string()))?;

    Aes256Gcm::new_from_slice(&okm[..]).map_err(|e| CodecError::Encryption(e.to_string()))
}

/// Encrypts `plaintext` under `key`.
///
/// Two calls with the same input produce different blobs.
///
/// # Errors
///
/// Returns [`CodecError::EmptyKey`] if `key` is empty.
///
/// # Examples
///
/// ```
/// use notekeep::codec::{decrypt, encrypt};
///
/// let blob = encrypt("meet at noon", "hunter2").unwrap();
/// assert_ne!(blob, "meet at noon");
/// assert_eq!(decrypt(&blob, "hunter2").unwrap(), "meet at noon");
/// ```
pub fn encrypt(plaintext: &str, key: &str) -> Result<String, CodecError> {
    if key.is_empty() {
        return Err(CodecError::EmptyKey);
    }

    let salt: [u8; SALT_LEN] = random_bytes();
    let nonce: [u8; NONCE_LEN] = random_bytes();
    let cipher = derive_cipher(key, &salt)?;

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| CodecError::Encryption("AES-GCM encryption failed".to_string()))?;

    let mut blob = Vec::with_capacity(HEADER_LEN + sealed.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);

    Ok(base64::engine::general_purpose::STANDARD.encode(blob))
}

/// Decrypts a blob produced by [`encrypt`].
///
/// # Errors
///
/// - [`CodecError::EmptyKey`] if `key` is empty.
/// - [`CodecError::Malformed`] if the blob is not base64, is truncated or
///   lacks the format marker.
/// - [`CodecError::Decryption`] if the key does not match.
pub fn decrypt(blob: &str, key: &str) -> Result<String, CodecError> {
    if key.is_empty() {
        return Err(CodecError::EmptyKey);
    }

    let raw = base64::engine::general_purpose::STANDARD
        .decode(blob.trim())
        .map_err(|e| CodecError::Malformed(format!("invalid base64: {e}")))?;

    if raw.len() < HEADER_LEN + TAG_LEN {
        return Err(CodecError::Malformed(format!(
            "blob is {} bytes, expected at least {}",
            raw.len(),
            HEADER_LEN + TAG_LEN
        )));
    }
    if &raw[..MAGIC.len()] != MAGIC {
        return Err(CodecError::Malformed("missing format marker".to_string()));
    }

    let salt = &raw[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let nonce = &raw[MAGIC.len() + SALT_LEN..HEADER_LEN];
    let sealed = &raw[HEADER_LEN..];

    let cipher = derive_cipher(key, salt)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Decryption)?,
    );

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CodecError::Malformed("plaintext is not UTF-8".to_string()))
}

/// Returns true if `text` has the shape of an encrypted blob.
///
/// Import keeps bodies that are already sealed instead of sealing them twice.
pub fn looks_encrypted(text: &str) -> bool {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map(|raw| raw.len() >= HEADER_LEN + TAG_LEN && &raw[..MAGIC.len()] == MAGIC)
        .unwrap_or(false)
}

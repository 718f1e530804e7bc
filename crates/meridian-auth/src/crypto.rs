//! Access token encryption at rest.
//!
//! Encrypted tokens have the form `base64(nonce):base64(ciphertext)` under
//! XChaCha20-Poly1305 with the 32-byte shared secret key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::error::AuthError;

const NONCE_LEN: usize = 24;

fn cipher(key: &str) -> Result<XChaCha20Poly1305, AuthError> {
  let bytes: [u8; 32] = key.as_bytes().try_into().map_err(|_| AuthError::InvalidKey {
    message: format!("expected a 32-byte key, got {} bytes", key.len()),
  })?;
  Ok(XChaCha20Poly1305::new(Key::from_slice(&bytes)))
}

/// Decrypt an access token of the form `nonce:ciphertext` (both base64).
pub fn decrypt_access_token(token: &str, key: &str) -> Result<String, AuthError> {
  let cipher = cipher(key)?;
  let (nonce_b64, ciphertext_b64) = token.split_once(':').ok_or_else(|| AuthError::Decrypt {
    message: "token is not in nonce:ciphertext form".to_string(),
  })?;

  let nonce = BASE64.decode(nonce_b64).map_err(|e| AuthError::Decrypt {
    message: format!("nonce is not valid base64: {e}"),
  })?;
  if nonce.len() != NONCE_LEN {
    return Err(AuthError::Decrypt {
      message: format!("nonce must be {NONCE_LEN} bytes, got {}", nonce.len()),
    });
  }
  let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| AuthError::Decrypt {
    message: format!("ciphertext is not valid base64: {e}"),
  })?;

  let plaintext = cipher
    .decrypt(XNonce::from_slice(&nonce), ciphertext.as_ref())
    .map_err(|_| AuthError::Decrypt {
      message: "ciphertext does not authenticate under the configured key".to_string(),
    })?;
  String::from_utf8(plaintext).map_err(|_| AuthError::Decrypt {
    message: "decrypted token is not valid UTF-8".to_string(),
  })
}

/// Encrypt a token the way the platform does. Used by local test drivers to
/// build realistic operation messages.
pub fn encrypt_access_token(plaintext: &str, key: &str) -> Result<String, AuthError> {
  let cipher = cipher(key)?;
  let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
  let ciphertext = cipher
    .encrypt(&nonce, plaintext.as_bytes())
    .map_err(|_| AuthError::InvalidKey {
      message: "encryption failed".to_string(),
    })?;
  Ok(format!(
    "{}:{}",
    BASE64.encode(nonce),
    BASE64.encode(ciphertext)
  ))
}

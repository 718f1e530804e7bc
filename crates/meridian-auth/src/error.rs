#[derive(Debug, thiserror::Error)]
pub enum AuthError {
  /// The shared secret key is missing or the wrong size for the cipher.
  #[error("invalid shared secret key: {message}")]
  InvalidKey { message: String },

  /// The access token could not be decrypted with the configured key.
  #[error("could not decrypt access token: {message}")]
  Decrypt { message: String },

  /// The federated token exchange was rejected or unreachable.
  #[error("token exchange failed: {message}")]
  Exchange { message: String },

  /// No credential path produced a usable credential.
  #[error("no usable credential: {message}")]
  Unauthenticated { message: String },
}

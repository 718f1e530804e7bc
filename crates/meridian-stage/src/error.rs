#[derive(Debug, thiserror::Error)]
pub enum StageError {
  /// The staging destination supplied by the caller is not an object URL.
  #[error("invalid staging destination {url}")]
  InvalidDestination { url: String },

  /// No staging destination is configured and the message supplied none.
  #[error("staging is not configured: {message}")]
  NotConfigured { message: String },

  #[error("object store failure: {0}")]
  Store(#[from] object_store::Error),

  #[error("i/o failure while staging: {0}")]
  Io(#[from] std::io::Error),
}

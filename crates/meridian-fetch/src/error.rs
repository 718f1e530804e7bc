#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  /// 401/403 from the data source. Not retried.
  #[error("{message}")]
  Forbidden { message: String },

  /// 404 from the data source. Not retried; usually means no data matched.
  #[error("no data found at {url}")]
  NotFound { url: String },

  /// A failure that persisted through every retry, or a status we cannot
  /// classify as the caller's fault.
  #[error("unable to download after {attempts} attempt(s): {message}")]
  Server { message: String, attempts: u32 },

  #[error("invalid download url {url}: {message}")]
  InvalidUrl { url: String, message: String },

  #[error("i/o error while writing download: {0}")]
  Io(#[from] std::io::Error),
}

//! Meridian Fetch
//!
//! Downloads the artifacts an operation references. Transient failures are
//! retried with exponential backoff; access and not-found failures fail
//! fast. Redirect handling is manual so the user's bearer credential never
//! leaks to a host outside the configured auth domain.

mod download;
mod error;
mod retry;

pub use download::Fetcher;
pub use error::FetchError;
pub use retry::RetryPolicy;

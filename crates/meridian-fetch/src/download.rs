//! The download loop.
//!
//! Redirects are followed manually. The Authorization header is attached to
//! the origin host and to hosts under the configured auth domain; any other
//! redirect target gets an anonymous request, with cookies carrying whatever
//! session the auth handshake established.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use meridian_auth::Credential;
use meridian_config::Config;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Method, Response, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::retry::RetryPolicy;

/// Query parameter correlating outbound requests with the inbound request.
const REQUEST_ID_PARAM: &str = "A-api-request-uuid";
const MAX_REDIRECT_HOPS: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Fetcher {
  client: reqwest::Client,
  credential: Option<Credential>,
  policy: RetryPolicy,
  post_url_length: usize,
  auth_domain: Option<String>,
}

enum Attempt {
  Done,
  Transient(String),
  Fatal(FetchError),
}

impl Fetcher {
  pub fn new(config: &Config, credential: Option<Credential>) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .redirect(redirect::Policy::none())
      .cookie_store(true)
      .timeout(REQUEST_TIMEOUT)
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| FetchError::Server {
        message: format!("cannot build http client: {e}"),
        attempts: 0,
      })?;
    Ok(Fetcher {
      client,
      credential,
      policy: RetryPolicy::with_max_retries(config.max_download_retries),
      post_url_length: config.post_url_length,
      auth_domain: config.auth_domain.clone(),
    })
  }

  /// Override the retry schedule. Test drivers use this to avoid real backoff.
  pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Download `url` into `dir`, naming the file after the URL digest so
  /// repeated fetches of the same artifact can be skipped. `file://` URLs
  /// resolve to their local path without copying.
  pub async fn fetch_to_dir(
    &self,
    url: &str,
    request_id: Option<&str>,
    dir: &Path,
  ) -> Result<PathBuf, FetchError> {
    if let Some(path) = url.strip_prefix("file://") {
      return Ok(PathBuf::from(path));
    }

    let destination = dir.join(destination_filename(url));
    if destination.exists() {
      debug!(url, destination = %destination.display(), "artifact_already_downloaded");
      return Ok(destination);
    }
    self.fetch_to_file(url, request_id, &destination).await?;
    Ok(destination)
  }

  /// Download `url` to an exact path. The file exists and is fully written
  /// when this returns `Ok`; partial writes are removed on failure.
  pub async fn fetch_to_file(
    &self,
    url: &str,
    request_id: Option<&str>,
    destination: &Path,
  ) -> Result<(), FetchError> {
    let mut target = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
      url: url.to_string(),
      message: e.to_string(),
    })?;
    if let Some(id) = request_id {
      target.query_pairs_mut().append_pair(REQUEST_ID_PARAM, id);
    }

    // Long query strings get moved into a POST body so intermediaries with
    // URL length limits do not truncate them.
    let (method, body) = if target.as_str().len() > self.post_url_length && target.query().is_some()
    {
      let body = target.query().unwrap_or_default().to_string();
      target.set_query(None);
      (Method::POST, Some(body))
    } else {
      (Method::GET, None)
    };

    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
      attempts += 1;
      match self
        .attempt(&target, &method, body.as_deref(), destination, attempts)
        .await
      {
        Attempt::Done => {
          info!(
            url,
            attempts,
            duration_ms = started.elapsed().as_millis() as u64,
            "download_completed"
          );
          return Ok(());
        }
        Attempt::Fatal(error) => return Err(error),
        Attempt::Transient(message) => {
          if attempts > self.policy.max_retries {
            warn!(url, attempts, "download_retries_exhausted");
            return Err(FetchError::Server { message, attempts });
          }
          let delay = self.policy.delay_for(attempts - 1);
          warn!(
            url,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "retrying_failed_download"
          );
          tokio::time::sleep(delay).await;
        }
      }
    }
  }

  async fn attempt(
    &self,
    origin: &Url,
    method: &Method,
    body: Option<&str>,
    destination: &Path,
    attempts: u32,
  ) -> Attempt {
    let mut current = origin.clone();
    let mut current_method = method.clone();
    let mut current_body = body.map(str::to_string);

    for _ in 0..MAX_REDIRECT_HOPS {
      let mut request = self.client.request(current_method.clone(), current.clone());
      if let Some(credential) = &self.credential
        && self.may_authenticate(origin, &current)
      {
        request = request.header(AUTHORIZATION, credential.authorization_header());
      }
      if let Some(payload) = &current_body {
        request = request
          .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
          .body(payload.clone());
      }

      let response = match request.send().await {
        Ok(response) => response,
        Err(error) => return Attempt::Transient(error.to_string()),
      };

      let status = response.status();
      if status.is_redirection() {
        let location = response
          .headers()
          .get(LOCATION)
          .and_then(|v| v.to_str().ok())
          .map(str::to_string);
        let Some(location) = location else {
          return Attempt::Transient(format!("{status} redirect without a location header"));
        };
        current = match current.join(&location) {
          Ok(next) => next,
          Err(error) => {
            return Attempt::Fatal(FetchError::InvalidUrl {
              url: location,
              message: error.to_string(),
            });
          }
        };
        // Only 307/308 preserve the method and body across a redirect.
        if !matches!(
          status,
          StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
        ) {
          current_method = Method::GET;
          current_body = None;
        }
        continue;
      }

      return self.finish(origin, response, destination, attempts).await;
    }

    Attempt::Fatal(FetchError::Server {
      message: format!("{origin} redirected more than {MAX_REDIRECT_HOPS} times"),
      attempts,
    })
  }

  async fn finish(
    &self,
    origin: &Url,
    response: Response,
    destination: &Path,
    attempts: u32,
  ) -> Attempt {
    let status = response.status();

    if status.is_success() {
      return match write_body(response, destination).await {
        Ok(()) => Attempt::Done,
        Err(WriteFailure::Io(error)) => Attempt::Fatal(FetchError::Io(error)),
        Err(WriteFailure::Body(message)) => Attempt::Transient(message),
      };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
      let body = response.text().await.unwrap_or_default();
      let message = eula_message(&body)
        .unwrap_or_else(|| format!("Forbidden: unable to download {origin}"));
      return Attempt::Fatal(FetchError::Forbidden { message });
    }

    if status == StatusCode::NOT_FOUND {
      return Attempt::Fatal(FetchError::NotFound {
        url: origin.to_string(),
      });
    }

    if status.is_server_error() {
      return Attempt::Transient(format!("{origin} returned {status}"));
    }

    Attempt::Fatal(FetchError::Server {
      message: format!("{origin} returned {status}"),
      attempts,
    })
  }

  /// The credential goes to the origin host and to hosts under the
  /// configured auth domain. Everything else is anonymous.
  fn may_authenticate(&self, origin: &Url, target: &Url) -> bool {
    let (Some(origin_host), Some(target_host)) = (origin.host_str(), target.host_str()) else {
      return false;
    };
    if origin_host == target_host {
      return true;
    }
    match &self.auth_domain {
      Some(domain) => {
        target_host == domain || target_host.ends_with(&format!(".{domain}"))
      }
      None => false,
    }
  }
}

enum WriteFailure {
  Io(std::io::Error),
  Body(String),
}

async fn write_body(response: Response, destination: &Path) -> Result<(), WriteFailure> {
  let partial = destination.with_extension("part");
  let written = write_partial(response, &partial, destination).await;
  if written.is_err() {
    let _ = tokio::fs::remove_file(&partial).await;
  }
  written
}

async fn write_partial(
  mut response: Response,
  partial: &Path,
  destination: &Path,
) -> Result<(), WriteFailure> {
  let mut file = tokio::fs::File::create(partial).await.map_err(WriteFailure::Io)?;

  loop {
    match response.chunk().await {
      Ok(Some(chunk)) => file.write_all(&chunk).await.map_err(WriteFailure::Io)?,
      Ok(None) => break,
      Err(error) => return Err(WriteFailure::Body(format!("body read failed: {error}"))),
    }
  }

  file.flush().await.map_err(WriteFailure::Io)?;
  drop(file);
  tokio::fs::rename(partial, destination)
    .await
    .map_err(WriteFailure::Io)
}

/// Names a downloaded artifact after the digest of its URL, keeping the
/// source extension so media types remain guessable.
fn destination_filename(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  let digest = hex::encode(hasher.finalize());

  let path = url.split('?').next().unwrap_or_default();
  let basename = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
  match basename.rfind('.') {
    Some(index) if index > 0 => format!("{digest}{}", &basename[index..]),
    _ => digest,
  }
}

/// A 403 whose body names an end-user license agreement gets a message
/// pointing at the page where the user can accept it.
fn eula_message(body: &str) -> Option<String> {
  let value: serde_json::Value = serde_json::from_str(body).ok()?;
  value.get("error_description")?;
  let resolution = value.get("resolution_url")?.as_str()?;
  Some(format!(
    "Request could not be completed because you need to agree to the EULA at {resolution}"
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filenames_keep_the_source_extension() {
    let name = destination_filename("https://example.com/granules/abc.nc4?subset=true");
    assert!(name.ends_with(".nc4"));
    assert_eq!(name.len(), 64 + 4);
  }

  #[test]
  fn filenames_differ_when_queries_differ() {
    let a = destination_filename("https://example.com/g.nc?v=1");
    let b = destination_filename("https://example.com/g.nc?v=2");
    assert_ne!(a, b);
  }

  #[test]
  fn extensionless_urls_get_a_bare_digest() {
    let name = destination_filename("https://example.com/granules/abc");
    assert_eq!(name.len(), 64);
  }

  #[test]
  fn eula_bodies_produce_a_resolution_message() {
    let body = r#"{"status_code": 403, "error_description": "EULA Acceptance Failure",
      "resolution_url": "https://example.com/approve_app?client_id=foo"}"#;
    let message = eula_message(body).unwrap();
    assert!(message.contains("https://example.com/approve_app?client_id=foo"));
  }

  #[test]
  fn ordinary_bodies_are_not_eula_errors() {
    assert!(eula_message("denied").is_none());
    assert!(eula_message(r#"{"error_description": "nope"}"#).is_none());
  }
}

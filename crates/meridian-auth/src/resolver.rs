//! Credential resolution.
//!
//! Resolution happens once per invocation, ahead of per-item work, and the
//! result is cached for the process lifetime. The chain is:
//!
//! 1. decrypt the message's access token when a shared secret key is
//!    configured (absent key means the token is already plaintext),
//! 2. exchange it for a federated token when an identity provider is
//!    configured,
//! 3. fall back to static application credentials only when fallback
//!    authentication is explicitly enabled.
//!
//! An operation with no token and no fallback resolves to no credential,
//! which is fine for public data.

use std::sync::Arc;
use std::time::Duration;

use meridian_config::Config;
use meridian_message::AccessToken;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::credential::{Credential, Provenance};
use crate::crypto::decrypt_access_token;
use crate::error::AuthError;

pub struct CredentialResolver {
  config: Arc<Config>,
  client: reqwest::Client,
  token: Option<AccessToken>,
  cache: OnceCell<Option<Credential>>,
}

#[derive(Deserialize)]
struct ExchangeResponse {
  access_token: String,
  #[serde(default)]
  expires_in: Option<u64>,
}

impl CredentialResolver {
  pub fn new(config: Arc<Config>, token: Option<AccessToken>) -> Self {
    let client = reqwest::Client::builder()
      .user_agent(config.user_agent.clone())
      .timeout(Duration::from_secs(30))
      .build()
      .unwrap_or_default();
    CredentialResolver {
      config,
      client,
      token,
      cache: OnceCell::new(),
    }
  }

  /// Resolve the credential for this invocation, caching the outcome.
  pub async fn resolve(&self) -> Result<Option<Credential>, AuthError> {
    self
      .cache
      .get_or_try_init(|| self.acquire())
      .await
      .map(|credential| credential.clone())
  }

  async fn acquire(&self) -> Result<Option<Credential>, AuthError> {
    let user_token = match &self.token {
      Some(token) => Some(self.user_token(token)?),
      None => None,
    };

    if let Some(user_token) = user_token {
      if let Some(oauth) = &self.config.oauth {
        match self.exchange(oauth, &user_token).await {
          Ok(credential) => {
            debug!(provenance = %credential.provenance, "credential_resolved");
            return Ok(Some(credential));
          }
          Err(error) if self.config.fallback_auth.enabled => {
            warn!(error = %error, "token exchange failed, trying fallback credentials");
          }
          Err(error) => return Err(error),
        }
      } else {
        debug!(provenance = %Provenance::SharedToken, "credential_resolved");
        return Ok(Some(Credential::bearer(user_token, Provenance::SharedToken)));
      }
    }

    if self.config.fallback_auth.enabled {
      return self.fallback().map(Some);
    }

    debug!("no credential configured, downloads will be unauthenticated");
    Ok(None)
  }

  fn user_token(&self, token: &AccessToken) -> Result<String, AuthError> {
    match &self.config.shared_secret_key {
      Some(key) => decrypt_access_token(token.as_str(), key),
      None => Ok(token.as_str().to_string()),
    }
  }

  async fn exchange(
    &self,
    oauth: &meridian_config::OauthConfig,
    user_token: &str,
  ) -> Result<Credential, AuthError> {
    let url = format!("{}/oauth/token", oauth.host.trim_end_matches('/'));
    let response = self
      .client
      .post(&url)
      .basic_auth(&oauth.uid, Some(&oauth.password))
      .form(&[
        ("grant_type", "token_exchange"),
        ("subject_token", user_token),
        ("client_id", oauth.client_id.as_str()),
      ])
      .send()
      .await
      .map_err(|e| AuthError::Exchange {
        message: e.to_string(),
      })?;

    let status = response.status();
    if !status.is_success() {
      return Err(AuthError::Exchange {
        message: format!("token endpoint returned {status}"),
      });
    }
    let body: ExchangeResponse = response.json().await.map_err(|e| AuthError::Exchange {
      message: format!("token endpoint returned an unreadable body: {e}"),
    })?;

    let mut credential = Credential::bearer(body.access_token, Provenance::Federated);
    credential.expires_in = body.expires_in;
    Ok(credential)
  }

  fn fallback(&self) -> Result<Credential, AuthError> {
    let auth = &self.config.fallback_auth;
    match (&auth.username, &auth.password) {
      (Some(username), Some(password)) => {
        // Authenticates as the application, not the user. Keep it loud.
        warn!(provenance = %Provenance::Fallback, "credential_fallback_used");
        Ok(Credential::basic(username, password))
      }
      _ => Err(AuthError::Unauthenticated {
        message: "fallback authentication is enabled but credentials are not configured"
          .to_string(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::credential::CredentialKind;
  use crate::crypto::encrypt_access_token;
  use std::collections::HashMap;

  const KEY: &str = "_THIS_IS_MY_32_CHARS_SECRET_KEY_";

  fn config(vars: HashMap<&str, &str>) -> Arc<Config> {
    let mut vars = vars;
    vars.insert("ENV", "dev");
    Arc::new(Config::from_map(&vars).unwrap())
  }

  #[tokio::test]
  async fn plain_token_without_a_key_becomes_a_shared_bearer() {
    let resolver = CredentialResolver::new(
      config(HashMap::new()),
      Some(AccessToken::new("plain-token")),
    );
    let credential = resolver.resolve().await.unwrap().unwrap();
    assert_eq!(credential.provenance, Provenance::SharedToken);
    assert_eq!(credential.authorization_header(), "Bearer plain-token");
  }

  #[tokio::test]
  async fn encrypted_token_is_decrypted_with_the_configured_key() {
    let encrypted = encrypt_access_token("the-user-token", KEY).unwrap();
    let resolver = CredentialResolver::new(
      config(HashMap::from([("SHARED_SECRET_KEY", KEY)])),
      Some(AccessToken::new(encrypted)),
    );
    let credential = resolver.resolve().await.unwrap().unwrap();
    assert_eq!(credential.authorization_header(), "Bearer the-user-token");
  }

  #[tokio::test]
  async fn garbled_token_fails_resolution() {
    let resolver = CredentialResolver::new(
      config(HashMap::from([("SHARED_SECRET_KEY", KEY)])),
      Some(AccessToken::new("not:encrypted-properly")),
    );
    let err = resolver.resolve().await.unwrap_err();
    assert!(matches!(err, AuthError::Decrypt { .. }));
  }

  #[tokio::test]
  async fn no_token_and_no_fallback_resolves_to_no_credential() {
    let resolver = CredentialResolver::new(config(HashMap::new()), None);
    assert!(resolver.resolve().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn no_token_with_fallback_uses_application_credentials() {
    let resolver = CredentialResolver::new(
      config(HashMap::from([
        ("FALLBACK_AUTHN_ENABLED", "true"),
        ("EDL_USERNAME", "svc"),
        ("EDL_PASSWORD", "hunter2"),
      ])),
      None,
    );
    let credential = resolver.resolve().await.unwrap().unwrap();
    assert_eq!(credential.provenance, Provenance::Fallback);
    assert!(matches!(credential.kind, CredentialKind::Basic { .. }));
  }

  #[tokio::test]
  async fn fallback_without_credentials_is_an_error() {
    let resolver = CredentialResolver::new(
      config(HashMap::from([("FALLBACK_AUTHN_ENABLED", "true")])),
      None,
    );
    let err = resolver.resolve().await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthenticated { .. }));
  }

  #[tokio::test]
  async fn unreachable_exchange_without_fallback_is_an_error() {
    // Port 9 is unassigned locally, so the exchange fails to connect.
    let resolver = CredentialResolver::new(
      config(HashMap::from([
        ("OAUTH_HOST", "http://127.0.0.1:9"),
        ("OAUTH_CLIENT_ID", "client-1"),
        ("OAUTH_UID", "app"),
        ("OAUTH_PASSWORD", "secret"),
      ])),
      Some(AccessToken::new("plain-token")),
    );
    let err = resolver.resolve().await.unwrap_err();
    assert!(matches!(err, AuthError::Exchange { .. }));
  }

  #[tokio::test]
  async fn failed_exchange_with_fallback_uses_application_credentials() {
    let resolver = CredentialResolver::new(
      config(HashMap::from([
        ("OAUTH_HOST", "http://127.0.0.1:9"),
        ("OAUTH_CLIENT_ID", "client-1"),
        ("OAUTH_UID", "app"),
        ("OAUTH_PASSWORD", "secret"),
        ("FALLBACK_AUTHN_ENABLED", "true"),
        ("EDL_USERNAME", "svc"),
        ("EDL_PASSWORD", "hunter2"),
      ])),
      Some(AccessToken::new("plain-token")),
    );
    let credential = resolver.resolve().await.unwrap().unwrap();
    assert_eq!(credential.provenance, Provenance::Fallback);
  }

  #[tokio::test]
  async fn resolution_is_cached_for_the_process_lifetime() {
    let resolver = CredentialResolver::new(
      config(HashMap::new()),
      Some(AccessToken::new("plain-token")),
    );
    let first = resolver.resolve().await.unwrap().unwrap();
    let second = resolver.resolve().await.unwrap().unwrap();
    assert_eq!(first.authorization_header(), second.authorization_header());
  }
}

//! The [`Config`] struct and its environment-variable parsing.
//!
//! All values come from the process environment. Tests construct a `Config`
//! through [`Config::from_lookup`] with an explicit map so they never touch
//! process-global state.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::environment::Environment;

/// Errors raised while reading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// One or more required environment variables are unset.
  #[error("required environment variables are not set: {names}")]
  MissingRequired { names: String },

  /// A variable was present but could not be parsed into its expected type.
  #[error("invalid value for {name}: {message}")]
  InvalidValue { name: String, message: String },
}

/// OAuth client parameters for the federated token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OauthConfig {
  /// Base URL of the identity provider, e.g. `https://auth.example.com`.
  pub host: String,
  pub client_id: String,
  /// Application credentials presented as Basic auth on the token endpoint.
  pub uid: String,
  pub password: String,
}

/// Statically configured application credentials used when federated
/// authentication is unavailable and fallback is explicitly enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackAuth {
  pub enabled: bool,
  pub username: Option<String>,
  pub password: Option<String>,
}

/// Runtime configuration for a single service invocation.
#[derive(Debug, Clone)]
pub struct Config {
  pub app_name: String,
  pub environment: Environment,
  pub use_localstack: bool,
  pub localstack_host: String,
  pub aws_region: String,
  pub staging_bucket: Option<String>,
  pub staging_path: Option<String>,
  /// 32-byte symmetric key used to decrypt the operation access token.
  pub shared_secret_key: Option<String>,
  pub oauth: Option<OauthConfig>,
  /// Hosts under this domain keep the Authorization header across redirects.
  pub auth_domain: Option<String>,
  pub fallback_auth: FallbackAuth,
  pub max_download_retries: u32,
  /// URLs whose query string exceeds this length are fetched via POST.
  pub post_url_length: usize,
  pub max_concurrency: usize,
  pub user_agent: String,
  pub text_logger: bool,
  pub health_check_path: PathBuf,
}

impl Config {
  /// Read configuration from the process environment and validate it.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Read configuration from an explicit lookup function.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let str_var = |name: &str| lookup(name).map(|v| v.trim_matches('"').to_string());
    let bool_var = |name: &str, default: bool| {
      lookup(name)
        .map(|v| v.to_ascii_lowercase() == "true")
        .unwrap_or(default)
    };

    let environment = Environment::parse(&str_var("ENV").unwrap_or_default());
    let localstack_host = str_var("LOCALSTACK_HOST").unwrap_or_else(|| "localhost".to_string());

    let oauth = match (str_var("OAUTH_HOST"), str_var("OAUTH_CLIENT_ID")) {
      (Some(host), Some(client_id)) => Some(OauthConfig {
        host,
        client_id,
        uid: str_var("OAUTH_UID").unwrap_or_default(),
        password: str_var("OAUTH_PASSWORD").unwrap_or_default(),
      }),
      _ => None,
    };

    let fallback_auth = FallbackAuth {
      enabled: bool_var("FALLBACK_AUTHN_ENABLED", false),
      username: str_var("EDL_USERNAME"),
      password: str_var("EDL_PASSWORD"),
    };

    let config = Config {
      app_name: str_var("APP_NAME").unwrap_or_else(|| "meridian-service".to_string()),
      environment,
      use_localstack: bool_var("USE_LOCALSTACK", false),
      localstack_host,
      aws_region: str_var("AWS_DEFAULT_REGION").unwrap_or_else(|| "us-west-2".to_string()),
      staging_bucket: str_var("STAGING_BUCKET"),
      staging_path: str_var("STAGING_PATH"),
      shared_secret_key: str_var("SHARED_SECRET_KEY"),
      oauth,
      auth_domain: str_var("AUTH_DOMAIN"),
      fallback_auth,
      max_download_retries: parse_var(&lookup, "MAX_DOWNLOAD_RETRIES", 3)?,
      post_url_length: parse_var(&lookup, "POST_URL_LENGTH", 2000)?,
      max_concurrency: parse_var(&lookup, "MAX_CONCURRENCY", 4)?,
      user_agent: str_var("USER_AGENT").unwrap_or_else(|| "meridian (unknown version)".to_string()),
      text_logger: bool_var("TEXT_LOGGER", false),
      health_check_path: PathBuf::from(
        str_var("HEALTH_CHECK_PATH").unwrap_or_else(|| "/tmp/health.txt".to_string()),
      ),
    };

    config.validate()?;
    Ok(config)
  }

  /// Convenience for tests: build from a plain map without validation skips.
  pub fn from_map(vars: &HashMap<&str, &str>) -> Result<Self, ConfigError> {
    Self::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
  }

  /// True when staging uploads and platform callbacks must be suppressed
  /// and replaced with local echo behavior.
  pub fn is_offline(&self) -> bool {
    self.environment.is_local() && !self.use_localstack
  }

  fn validate(&self) -> Result<(), ConfigError> {
    // Staging destination is required in deployed environments; local
    // runs fall back to echo locations so they may omit it.
    let mut unset = Vec::new();
    if !self.environment.is_local() {
      if self.staging_bucket.is_none() {
        unset.push("STAGING_BUCKET");
      }
      if self.staging_path.is_none() {
        unset.push("STAGING_PATH");
      }
    }
    if !unset.is_empty() {
      return Err(ConfigError::MissingRequired {
        names: unset.join(", "),
      });
    }

    if let Some(key) = &self.shared_secret_key
      && key.len() != 32
    {
      return Err(ConfigError::InvalidValue {
        name: "SHARED_SECRET_KEY".to_string(),
        message: format!("expected a 32-byte key, got {} bytes", key.len()),
      });
    }

    if self.fallback_auth.enabled {
      warn!("fallback authentication is enabled; downloads may authenticate as the application");
    }

    Ok(())
  }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
  F: Fn(&str) -> Option<String>,
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  match lookup(name) {
    Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
      name: name.to_string(),
      message: e.to_string(),
    }),
    None => Ok(default),
  }
}

//! The failure taxonomy.
//!
//! Every failure a service can hit is classified here before it reaches the
//! manifest or the status callback. Messages on these variants are shown to
//! end users, so constructors must keep internal detail out of them.

use meridian_auth::AuthError;
use meridian_catalog::CatalogError;
use meridian_config::ConfigError;
use meridian_fetch::FetchError;
use meridian_message::MessageError;
use meridian_stage::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
  Error,
  Warning,
}

impl std::fmt::Display for ErrorLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ErrorLevel::Error => f.write_str("error"),
      ErrorLevel::Warning => f.write_str("warning"),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  /// The platform canceled the operation.
  #[error("the operation was canceled")]
  Canceled,

  /// Access to an artifact was denied. Not retried.
  #[error("{message}")]
  Forbidden { message: String },

  /// Infrastructure failure, ours or a data source's.
  #[error("{message}")]
  Server { message: String },

  /// Nothing matched the request. Warning level by default.
  #[error("{message}")]
  NoData { message: String },

  /// Credential resolution failed.
  #[error("{message}")]
  Authentication { message: String },

  /// Required settings are missing or malformed. Fatal at startup.
  #[error("{message}")]
  Configuration { message: String },

  /// The operation message or input catalog is unusable.
  #[error("{message}")]
  Invalid { message: String },

  /// A service-specific failure carrying a safe, user-facing message.
  #[error("{message}")]
  User {
    message: String,
    category: String,
    level: ErrorLevel,
  },
}

impl ServiceError {
  /// A service-defined error shown to the user as-is.
  pub fn user(message: impl Into<String>, category: impl Into<String>) -> Self {
    ServiceError::User {
      message: message.into(),
      category: category.into(),
      level: ErrorLevel::Error,
    }
  }

  /// A service-defined warning. Does not prevent a job from completing.
  pub fn user_warning(message: impl Into<String>, category: impl Into<String>) -> Self {
    ServiceError::User {
      message: message.into(),
      category: category.into(),
      level: ErrorLevel::Warning,
    }
  }

  pub fn server(message: impl Into<String>) -> Self {
    ServiceError::Server {
      message: message.into(),
    }
  }

  pub fn no_data(message: impl Into<String>) -> Self {
    ServiceError::NoData {
      message: message.into(),
    }
  }

  pub fn level(&self) -> ErrorLevel {
    match self {
      ServiceError::NoData { .. } => ErrorLevel::Warning,
      ServiceError::User { level, .. } => *level,
      _ => ErrorLevel::Error,
    }
  }

  pub fn category(&self) -> &str {
    match self {
      ServiceError::Canceled => "Canceled",
      ServiceError::Forbidden { .. } => "Forbidden",
      ServiceError::Server { .. } => "Server",
      ServiceError::NoData { .. } => "No Data",
      ServiceError::Authentication { .. } => "Authentication",
      ServiceError::Configuration { .. } => "Configuration",
      ServiceError::Invalid { .. } => "Invalid",
      ServiceError::User { category, .. } => category,
    }
  }
}

impl From<FetchError> for ServiceError {
  fn from(error: FetchError) -> Self {
    match error {
      FetchError::Forbidden { message } => ServiceError::Forbidden { message },
      FetchError::NotFound { url } => ServiceError::NoData {
        message: format!("no data found at {url}"),
      },
      FetchError::InvalidUrl { url, message } => ServiceError::Invalid {
        message: format!("invalid download url {url}: {message}"),
      },
      FetchError::Server { message, attempts } => ServiceError::Server {
        message: format!("unable to download after {attempts} attempt(s): {message}"),
      },
      FetchError::Io(error) => ServiceError::Server {
        message: format!("i/o failure during download: {error}"),
      },
    }
  }
}

impl From<AuthError> for ServiceError {
  fn from(error: AuthError) -> Self {
    match error {
      AuthError::InvalidKey { message } => ServiceError::Configuration { message },
      other => ServiceError::Authentication {
        message: other.to_string(),
      },
    }
  }
}

impl From<StageError> for ServiceError {
  fn from(error: StageError) -> Self {
    match error {
      StageError::InvalidDestination { url } => ServiceError::Invalid {
        message: format!("invalid staging destination {url}"),
      },
      StageError::NotConfigured { message } => ServiceError::Configuration { message },
      other => ServiceError::Server {
        message: other.to_string(),
      },
    }
  }
}

impl From<ConfigError> for ServiceError {
  fn from(error: ConfigError) -> Self {
    ServiceError::Configuration {
      message: error.to_string(),
    }
  }
}

impl From<MessageError> for ServiceError {
  fn from(error: MessageError) -> Self {
    ServiceError::Invalid {
      message: error.to_string(),
    }
  }
}

impl From<CatalogError> for ServiceError {
  fn from(error: CatalogError) -> Self {
    ServiceError::Server {
      message: error.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_data_is_a_warning_by_default() {
    assert_eq!(ServiceError::no_data("empty granule").level(), ErrorLevel::Warning);
    assert_eq!(ServiceError::server("boom").level(), ErrorLevel::Error);
  }

  #[test]
  fn user_errors_keep_their_category() {
    let err = ServiceError::user("bad pixels", "Quality");
    assert_eq!(err.category(), "Quality");
    assert_eq!(err.level(), ErrorLevel::Error);
  }

  #[test]
  fn fetch_failures_map_into_the_taxonomy() {
    let forbidden: ServiceError = FetchError::Forbidden {
      message: "denied".to_string(),
    }
    .into();
    assert_eq!(forbidden.category(), "Forbidden");

    let missing: ServiceError = FetchError::NotFound {
      url: "http://e.com/g.nc".to_string(),
    }
    .into();
    assert_eq!(missing.category(), "No Data");
    assert_eq!(missing.level(), ErrorLevel::Warning);
  }
}

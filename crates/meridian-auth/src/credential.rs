use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Where a credential came from. Fallback use is always distinguishable in
/// logs because it authenticates as the application, not the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
  /// The platform-issued user token, used directly.
  SharedToken,
  /// A short-lived token obtained from the identity provider's exchange.
  Federated,
  /// Statically configured application credentials.
  Fallback,
}

impl std::fmt::Display for Provenance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Provenance::SharedToken => "shared_token",
      Provenance::Federated => "federated",
      Provenance::Fallback => "fallback",
    };
    f.write_str(name)
  }
}

#[derive(Clone)]
pub enum CredentialKind {
  Bearer(String),
  Basic { username: String, password: String },
}

/// A resolved download credential. `Debug` shows provenance only.
#[derive(Clone)]
pub struct Credential {
  pub kind: CredentialKind,
  pub provenance: Provenance,
  /// Seconds until expiry, when the issuer reported one.
  pub expires_in: Option<u64>,
}

impl Credential {
  pub fn bearer(token: impl Into<String>, provenance: Provenance) -> Self {
    Credential {
      kind: CredentialKind::Bearer(token.into()),
      provenance,
      expires_in: None,
    }
  }

  pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
    Credential {
      kind: CredentialKind::Basic {
        username: username.into(),
        password: password.into(),
      },
      provenance: Provenance::Fallback,
      expires_in: None,
    }
  }

  /// Value for the `Authorization` request header.
  pub fn authorization_header(&self) -> String {
    match &self.kind {
      CredentialKind::Bearer(token) => format!("Bearer {token}"),
      CredentialKind::Basic { username, password } => {
        format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
      }
    }
  }
}

impl std::fmt::Debug for Credential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credential")
      .field("provenance", &self.provenance)
      .field("expires_in", &self.expires_in)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bearer_header() {
    let cred = Credential::bearer("abc123", Provenance::SharedToken);
    assert_eq!(cred.authorization_header(), "Bearer abc123");
  }

  #[test]
  fn basic_header_is_base64_of_the_pair() {
    let cred = Credential::basic("user", "pass");
    assert_eq!(cred.authorization_header(), "Basic dXNlcjpwYXNz");
  }

  #[test]
  fn debug_never_prints_secret_material() {
    let cred = Credential::bearer("abc123", Provenance::Federated);
    let rendered = format!("{cred:?}");
    assert!(!rendered.contains("abc123"));
    assert!(rendered.contains("Federated"));
  }
}

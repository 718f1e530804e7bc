use serde::{Deserialize, Serialize};

/// An opaque end-user access token carried by the operation message.
///
/// The token may be encrypted (`nonce:ciphertext`, both base64) or plain
/// depending on deployment. Either way it is a credential, so `Debug`
/// redacts it and nothing in this crate interprets it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl std::fmt::Debug for AccessToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("AccessToken(<redacted>)")
  }
}

impl From<&str> for AccessToken {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

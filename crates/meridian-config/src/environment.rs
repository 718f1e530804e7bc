/// The application environment, as reported by the `ENV` variable.
///
/// Anything other than `dev` or `test` is treated as a deployed environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
  #[default]
  Production,
  Development,
  Test,
}

impl Environment {
  pub fn parse(value: &str) -> Self {
    match value.to_ascii_lowercase().as_str() {
      "dev" | "development" => Environment::Development,
      "test" => Environment::Test,
      _ => Environment::Production,
    }
  }

  /// True for local development / test environments where staging uploads
  /// and platform callbacks must be suppressed.
  pub fn is_local(&self) -> bool {
    matches!(self, Environment::Development | Environment::Test)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_environments() {
    assert_eq!(Environment::parse("dev"), Environment::Development);
    assert_eq!(Environment::parse("TEST"), Environment::Test);
    assert_eq!(Environment::parse("prod"), Environment::Production);
    assert_eq!(Environment::parse(""), Environment::Production);
  }

  #[test]
  fn local_environments() {
    assert!(Environment::Development.is_local());
    assert!(Environment::Test.is_local());
    assert!(!Environment::Production.is_local());
  }
}

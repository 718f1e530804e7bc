//! Terminal artifacts: the output catalog and the error document.

use std::path::Path;

use crate::error::ServiceError;
use crate::result::RecordedError;

pub const ERROR_DOCUMENT_NAME: &str = "error.json";

/// Write the error document the platform reads when an invocation ends in
/// failure or cancellation.
pub fn write_error_document(dir: &Path, error: &RecordedError) -> Result<(), ServiceError> {
  let document = serde_json::json!({
    "error": error.message,
    "category": error.category,
    "level": error.level.to_string(),
  });
  let text = serde_json::to_string_pretty(&document).map_err(|e| ServiceError::Server {
    message: format!("cannot serialize error document: {e}"),
  })?;
  std::fs::write(dir.join(ERROR_DOCUMENT_NAME), text).map_err(|e| ServiceError::Server {
    message: format!("cannot write error document: {e}"),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorLevel;

  #[test]
  fn error_documents_carry_message_category_and_level() {
    let dir = tempfile::tempdir().unwrap();
    write_error_document(
      dir.path(),
      &RecordedError {
        message: "no data found".to_string(),
        category: "No Data".to_string(),
        level: ErrorLevel::Warning,
      },
    )
    .unwrap();

    let text = std::fs::read_to_string(dir.path().join(ERROR_DOCUMENT_NAME)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["error"], "no data found");
    assert_eq!(value["category"], "No Data");
    assert_eq!(value["level"], "warning");
  }
}

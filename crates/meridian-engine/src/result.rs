use meridian_catalog::{Catalog, Item};

use crate::error::{ErrorLevel, ServiceError};

/// Lifecycle of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
  Parsed,
  Running,
  Completed,
  CompletedWithErrors,
  Failed,
  Canceled,
}

impl JobState {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, JobState::Parsed | JobState::Running)
  }

  /// Process exit code for the state. Partial success still exits zero so
  /// the platform delivers whatever outputs were produced.
  pub fn exit_code(&self) -> i32 {
    match self {
      JobState::Completed | JobState::CompletedWithErrors => 0,
      _ => 1,
    }
  }
}

impl std::fmt::Display for JobState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      JobState::Parsed => "parsed",
      JobState::Running => "running",
      JobState::Completed => "completed",
      JobState::CompletedWithErrors => "completed_with_errors",
      JobState::Failed => "failed",
      JobState::Canceled => "canceled",
    };
    f.write_str(name)
  }
}

/// One item's terminal outcome.
#[derive(Debug)]
pub enum ProcessingResult {
  Success { items: Vec<Item> },
  Warning { message: String, items: Vec<Item> },
  Failure(ServiceError),
}

/// A failure as it appears in the error document and callback payloads.
#[derive(Debug, Clone)]
pub struct RecordedError {
  pub message: String,
  pub category: String,
  pub level: ErrorLevel,
}

impl RecordedError {
  pub fn from_error(error: &ServiceError) -> Self {
    RecordedError {
      message: error.to_string(),
      category: error.category().to_string(),
      level: error.level(),
    }
  }
}

/// What an invocation produced: final state, the output catalog, and every
/// error recorded along the way.
#[derive(Debug)]
pub struct JobOutcome {
  pub state: JobState,
  pub catalog: Catalog,
  pub errors: Vec<RecordedError>,
  pub succeeded: usize,
  pub failed: usize,
  pub warned: usize,
}

impl JobOutcome {
  pub fn exit_code(&self) -> i32 {
    self.state.exit_code()
  }

  /// The first error-level failure, used for the error document.
  pub fn primary_error(&self) -> Option<&RecordedError> {
    self
      .errors
      .iter()
      .find(|e| e.level == ErrorLevel::Error)
      .or_else(|| self.errors.first())
  }
}

/// Terminal state selection. Warnings never downgrade a completed job;
/// error-level failures split it between partial success and failure based
/// on whether anything succeeded.
pub(crate) fn terminal_state(succeeded: usize, error_failures: usize, canceled: bool) -> JobState {
  if canceled {
    JobState::Canceled
  } else if error_failures == 0 {
    JobState::Completed
  } else if succeeded > 0 {
    JobState::CompletedWithErrors
  } else {
    JobState::Failed
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn terminal_state_selection() {
    assert_eq!(terminal_state(3, 0, false), JobState::Completed);
    assert_eq!(terminal_state(2, 1, false), JobState::CompletedWithErrors);
    assert_eq!(terminal_state(0, 3, false), JobState::Failed);
    assert_eq!(terminal_state(0, 0, false), JobState::Completed);
    assert_eq!(terminal_state(3, 0, true), JobState::Canceled);
  }

  #[test]
  fn exit_codes_follow_the_terminal_state() {
    assert_eq!(JobState::Completed.exit_code(), 0);
    assert_eq!(JobState::CompletedWithErrors.exit_code(), 0);
    assert_eq!(JobState::Failed.exit_code(), 1);
    assert_eq!(JobState::Canceled.exit_code(), 1);
  }

  #[test]
  fn primary_error_prefers_error_level() {
    let outcome = JobOutcome {
      state: JobState::CompletedWithErrors,
      catalog: Catalog::new("c", ""),
      errors: vec![
        RecordedError {
          message: "empty granule".to_string(),
          category: "No Data".to_string(),
          level: ErrorLevel::Warning,
        },
        RecordedError {
          message: "boom".to_string(),
          category: "Server".to_string(),
          level: ErrorLevel::Error,
        },
      ],
      succeeded: 1,
      failed: 1,
      warned: 1,
    };
    assert_eq!(outcome.primary_error().unwrap().message, "boom");
  }
}

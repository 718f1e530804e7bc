//! Meridian Engine
//!
//! The orchestration core: takes a parsed operation message and an input
//! catalog, runs the service's processing logic over every item with bounded
//! concurrency, and folds the per-item outcomes into an output catalog, an
//! error report, and a process exit code.

mod adapter;
mod callback;
mod engine;
mod error;
mod manifest;
mod result;

pub use adapter::{
  ItemProcessor, OperationProcessor, ProcessContext, ProcessedItems, ServiceAdapter,
};
pub use callback::{CallbackRejection, HttpStatusNotifier, NoopNotifier, StatusNotifier, StatusUpdate};
pub use engine::ExecutionEngine;
pub use error::{ErrorLevel, ServiceError};
pub use manifest::{write_error_document, ERROR_DOCUMENT_NAME};
pub use result::{JobOutcome, JobState, ProcessingResult, RecordedError};

//! The execution state machine.
//!
//! `Parsed -> Running -> {Completed, CompletedWithErrors, Failed, Canceled}`.
//! Items run under bounded concurrency; the credential is resolved once
//! before any item starts. Whatever the terminal state, the output catalog
//! is written before the final status is reported so partial results are
//! never dropped silently.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use meridian_auth::CredentialResolver;
use meridian_catalog::{ensure_geometry, write_catalog, Catalog, Item};
use meridian_config::Config;
use meridian_fetch::Fetcher;
use meridian_message::OperationMessage;
use meridian_stage::StagingWriter;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::adapter::{item_source, ItemProcessor, OperationProcessor, ProcessContext, ServiceAdapter};
use crate::callback::{HttpStatusNotifier, NoopNotifier, StatusNotifier, StatusUpdate};
use crate::error::{ErrorLevel, ServiceError};
use crate::manifest::write_error_document;
use crate::result::{terminal_state, JobOutcome, JobState, ProcessingResult, RecordedError};

pub struct ExecutionEngine {
  config: Arc<Config>,
  message: Arc<OperationMessage>,
  adapter: ServiceAdapter,
  notifier: Arc<dyn StatusNotifier>,
  cancel: CancellationToken,
}

impl ExecutionEngine {
  pub fn new(config: Arc<Config>, message: OperationMessage, adapter: ServiceAdapter) -> Self {
    let notifier: Arc<dyn StatusNotifier> = match (&message.callback, config.is_offline()) {
      (Some(callback), false) => Arc::new(HttpStatusNotifier::new(callback, &config.user_agent)),
      _ => Arc::new(NoopNotifier),
    };
    ExecutionEngine {
      config,
      message: Arc::new(message),
      adapter,
      notifier,
      cancel: CancellationToken::new(),
    }
  }

  /// Replace the status notifier. Test drivers use this to observe updates.
  pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Drive the run loop from an external cancellation token, e.g. one wired
  /// to a termination signal.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  /// Token observed by the run loop; cancel it to stop starting new items.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Run the operation over `catalog`, writing the output catalog (and an
  /// error document on failure) into `output_dir`.
  #[instrument(skip_all, fields(request_id = self.message.request_id.as_deref().unwrap_or("")))]
  pub async fn run(&self, catalog: Catalog, output_dir: &Path) -> Result<JobOutcome, ServiceError> {
    info!(
      items = catalog.items.len(),
      state = %JobState::Running,
      "operation_started"
    );

    // One credential for the whole run; items never re-acquire.
    let resolver = CredentialResolver::new(self.config.clone(), self.message.access_token.clone());
    let credential = match resolver.resolve().await {
      Ok(credential) => credential,
      Err(auth_error) => {
        return self.fail_before_start(auth_error.into(), output_dir).await;
      }
    };
    let fetcher = match Fetcher::new(&self.config, credential) {
      Ok(fetcher) => Arc::new(fetcher),
      Err(fetch_error) => {
        return self.fail_before_start(fetch_error.into(), output_dir).await;
      }
    };
    let stager = Arc::new(StagingWriter::new(self.config.clone()));

    let results = match &self.adapter {
      ServiceAdapter::PerItem(processor) => {
        self
          .run_items(processor.clone(), catalog, fetcher, stager)
          .await
      }
      ServiceAdapter::WholeOperation(processor) => {
        vec![Some(
          self
            .run_operation(processor.clone(), &catalog, fetcher, stager)
            .await,
        )]
      }
    };

    self.finish(results, output_dir).await
  }

  async fn run_items(
    &self,
    processor: Arc<dyn ItemProcessor>,
    catalog: Catalog,
    fetcher: Arc<Fetcher>,
    stager: Arc<StagingWriter>,
  ) -> Vec<Option<ProcessingResult>> {
    let total = catalog.items.len().max(1);
    let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(catalog.items.len());
    for item in catalog.items {
      let processor = processor.clone();
      let message = self.message.clone();
      let config = self.config.clone();
      let fetcher = fetcher.clone();
      let stager = stager.clone();
      let semaphore = semaphore.clone();
      let cancel = self.cancel.clone();
      let notifier = self.notifier.clone();
      let completed = completed.clone();

      handles.push(tokio::spawn(async move {
        let Ok(_permit) = semaphore.acquire().await else {
          return None;
        };
        // Cooperative cancellation: items that have not started, do not.
        if cancel.is_cancelled() {
          return None;
        }

        let result = process_one(processor, message, config, fetcher, stager, item).await;

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        let percent = ((done * 100) / total).min(100) as u8;
        if let Err(rejection) = notifier.notify(StatusUpdate::Progress { percent }).await {
          if rejection.canceled {
            warn!("operation canceled by the platform");
            cancel.cancel();
          } else {
            warn!(error = %rejection, "progress update rejected");
          }
        }
        Some(result)
      }));
    }

    // join_all preserves spawn order, so results line up with input items.
    join_all(handles)
      .await
      .into_iter()
      .map(|joined| match joined {
        Ok(result) => result,
        Err(join_error) => Some(ProcessingResult::Failure(ServiceError::server(format!(
          "item task failed: {join_error}"
        )))),
      })
      .collect()
  }

  async fn run_operation(
    &self,
    processor: Arc<dyn OperationProcessor>,
    catalog: &Catalog,
    fetcher: Arc<Fetcher>,
    stager: Arc<StagingWriter>,
  ) -> ProcessingResult {
    let scratch = match tempfile::tempdir() {
      Ok(dir) => dir,
      Err(e) => {
        return ProcessingResult::Failure(ServiceError::server(format!(
          "cannot create scratch directory: {e}"
        )));
      }
    };
    let ctx = ProcessContext {
      message: self.message.clone(),
      config: self.config.clone(),
      fetcher,
      stager,
      workdir: scratch.path().to_path_buf(),
      request_id: self.message.request_id.clone(),
    };

    match processor.process_operation(catalog, &ctx).await {
      Ok(processed) => {
        info!(outputs = processed.items.len(), "operation_processed");
        match processed.warning {
          Some(message) => ProcessingResult::Warning {
            message,
            items: processed.items,
          },
          None => ProcessingResult::Success {
            items: processed.items,
          },
        }
      }
      Err(service_error) => {
        error!(
          error = %service_error,
          category = service_error.category(),
          "operation_failed"
        );
        ProcessingResult::Failure(service_error)
      }
    }
  }

  async fn finish(
    &self,
    results: Vec<Option<ProcessingResult>>,
    output_dir: &Path,
  ) -> Result<JobOutcome, ServiceError> {
    let canceled = self.cancel.is_cancelled();

    let mut errors: Vec<RecordedError> = Vec::new();
    let mut items: Vec<Item> = Vec::new();
    let (mut succeeded, mut failed, mut warned) = (0usize, 0usize, 0usize);

    for result in results.into_iter().flatten() {
      match result {
        ProcessingResult::Success { items: mut produced } => {
          succeeded += 1;
          items.append(&mut produced);
        }
        ProcessingResult::Warning {
          message,
          items: mut produced,
        } => {
          succeeded += 1;
          warned += 1;
          errors.push(RecordedError {
            message,
            category: "Warning".to_string(),
            level: ErrorLevel::Warning,
          });
          items.append(&mut produced);
        }
        ProcessingResult::Failure(service_error) => {
          match service_error.level() {
            ErrorLevel::Error => failed += 1,
            ErrorLevel::Warning => warned += 1,
          }
          errors.push(RecordedError::from_error(&service_error));
        }
      }
    }

    if canceled {
      // Finished items are discarded from the manifest once canceled.
      items.clear();
      errors.push(RecordedError::from_error(&ServiceError::Canceled));
    }

    let state = terminal_state(succeeded, failed, canceled);
    let mut catalog = Catalog::new(self.message.correlation_id(), "service output");
    catalog.items = items;

    // The manifest is written before the final status in every case.
    write_catalog(output_dir, &catalog)?;

    let outcome = JobOutcome {
      state,
      catalog,
      errors,
      succeeded,
      failed,
      warned,
    };

    match state {
      JobState::Completed | JobState::CompletedWithErrors => {
        if let Err(rejection) = self
          .notifier
          .notify(StatusUpdate::Progress { percent: 100 })
          .await
        {
          warn!(error = %rejection, "final progress update rejected");
        }
      }
      _ => {
        if let Some(primary) = outcome.primary_error() {
          write_error_document(output_dir, primary)?;
          if let Err(rejection) = self
            .notifier
            .notify(StatusUpdate::Error {
              message: primary.message.clone(),
              level: primary.level,
            })
            .await
          {
            warn!(error = %rejection, "final error update rejected");
          }
        }
      }
    }

    info!(
      state = %state,
      succeeded,
      failed,
      warned,
      outputs = outcome.catalog.items.len(),
      "operation_finished"
    );
    Ok(outcome)
  }

  async fn fail_before_start(
    &self,
    service_error: ServiceError,
    output_dir: &Path,
  ) -> Result<JobOutcome, ServiceError> {
    error!(
      error = %service_error,
      category = service_error.category(),
      "operation_failed_to_start"
    );
    let recorded = RecordedError::from_error(&service_error);
    let catalog = Catalog::new(self.message.correlation_id(), "service output");
    write_catalog(output_dir, &catalog)?;
    write_error_document(output_dir, &recorded)?;
    if let Err(rejection) = self
      .notifier
      .notify(StatusUpdate::Error {
        message: recorded.message.clone(),
        level: ErrorLevel::Error,
      })
      .await
    {
      warn!(error = %rejection, "startup failure report rejected");
    }
    Ok(JobOutcome {
      state: JobState::Failed,
      catalog,
      errors: vec![recorded],
      succeeded: 0,
      failed: 1,
      warned: 0,
    })
  }
}

/// Process one item inside its own scratch directory. The directory is
/// removed when this returns, whatever the outcome.
async fn process_one(
  processor: Arc<dyn ItemProcessor>,
  message: Arc<OperationMessage>,
  config: Arc<Config>,
  fetcher: Arc<Fetcher>,
  stager: Arc<StagingWriter>,
  mut item: Item,
) -> ProcessingResult {
  let scratch = match tempfile::tempdir() {
    Ok(dir) => dir,
    Err(e) => {
      return ProcessingResult::Failure(ServiceError::server(format!(
        "cannot create scratch directory: {e}"
      )));
    }
  };

  ensure_geometry(&mut item);
  let source = match item_source(&message, &item) {
    Ok(source) => source,
    Err(service_error) => return ProcessingResult::Failure(service_error),
  };

  let ctx = ProcessContext {
    message: message.clone(),
    config,
    fetcher,
    stager,
    workdir: scratch.path().to_path_buf(),
    request_id: message.request_id.clone(),
  };

  let item_id = item.id.clone();
  match processor.process_item(item, source, &ctx).await {
    Ok(processed) => {
      info!(item = %item_id, outputs = processed.items.len(), "item_processed");
      match processed.warning {
        Some(warning) => ProcessingResult::Warning {
          message: warning,
          items: processed.items,
        },
        None => ProcessingResult::Success {
          items: processed.items,
        },
      }
    }
    Err(service_error) => {
      error!(
        item = %item_id,
        error = %service_error,
        category = service_error.category(),
        "item_failed"
      );
      ProcessingResult::Failure(service_error)
    }
  }
}

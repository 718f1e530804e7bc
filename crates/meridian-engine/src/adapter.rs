//! The extension points a service implements, and the context handed to
//! them for retrieval and staging.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use meridian_catalog::{Catalog, Item};
use meridian_config::Config;
use meridian_fetch::Fetcher;
use meridian_message::{OperationMessage, SourceCollection};
use meridian_stage::StagingWriter;

use crate::error::ServiceError;

/// Everything an adapter needs while processing: the operation, transport,
/// staging, and a scratch directory scoped to the current unit of work.
pub struct ProcessContext {
  pub message: Arc<OperationMessage>,
  pub config: Arc<Config>,
  pub fetcher: Arc<Fetcher>,
  pub stager: Arc<StagingWriter>,
  /// Per-item scratch space. Deleted when the item finishes, pass or fail.
  pub workdir: PathBuf,
  pub request_id: Option<String>,
}

impl ProcessContext {
  /// Fetch an artifact into the scratch directory, dispatching on scheme:
  /// object URLs go through the staging store, http(s) through the fetcher,
  /// and `file://` URLs resolve in place.
  pub async fn fetch(&self, url: &str) -> Result<PathBuf, ServiceError> {
    if url.starts_with("s3://") {
      return Ok(self.stager.download_object(url, &self.workdir).await?);
    }
    Ok(
      self
        .fetcher
        .fetch_to_dir(url, self.request_id.as_deref(), &self.workdir)
        .await?,
    )
  }

  /// Stage a local output under the operation's staging location and return
  /// its dereferenceable URI.
  pub async fn stage(
    &self,
    local: &Path,
    remote_filename: &str,
    media_type: Option<&str>,
  ) -> Result<String, ServiceError> {
    Ok(
      self
        .stager
        .stage(
          local,
          remote_filename,
          media_type,
          self.message.staging_location.as_deref(),
        )
        .await?,
    )
  }
}

/// Output of one processing call: zero or more items, optionally flagged
/// with a warning that should surface in the job report.
pub struct ProcessedItems {
  pub items: Vec<Item>,
  pub warning: Option<String>,
}

impl ProcessedItems {
  pub fn none() -> Self {
    ProcessedItems {
      items: Vec::new(),
      warning: None,
    }
  }

  pub fn with_warning(mut self, message: impl Into<String>) -> Self {
    self.warning = Some(message.into());
    self
  }
}

impl From<Item> for ProcessedItems {
  fn from(item: Item) -> Self {
    ProcessedItems {
      items: vec![item],
      warning: None,
    }
  }
}

impl From<Vec<Item>> for ProcessedItems {
  fn from(items: Vec<Item>) -> Self {
    ProcessedItems {
      items,
      warning: None,
    }
  }
}

/// Per-item processing. Most services implement this.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
  async fn process_item(
    &self,
    item: Item,
    source: Option<&SourceCollection>,
    ctx: &ProcessContext,
  ) -> Result<ProcessedItems, ServiceError>;
}

/// Whole-catalog processing for aggregating services (concatenation,
/// mosaicking) where item-level correspondence does not hold.
#[async_trait]
pub trait OperationProcessor: Send + Sync {
  async fn process_operation(
    &self,
    catalog: &Catalog,
    ctx: &ProcessContext,
  ) -> Result<ProcessedItems, ServiceError>;
}

/// How the engine drives a service.
#[derive(Clone)]
pub enum ServiceAdapter {
  PerItem(Arc<dyn ItemProcessor>),
  WholeOperation(Arc<dyn OperationProcessor>),
}

/// Match an input item to the message source that produced it. Items carry
/// a `source` link whose href ends in the collection id; a message with a
/// single source matches unconditionally.
pub(crate) fn item_source<'a>(
  message: &'a OperationMessage,
  item: &Item,
) -> Result<Option<&'a SourceCollection>, ServiceError> {
  if let Some(link) = item.link("source") {
    let collection = link.href.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    return match message.sources.iter().find(|s| s.collection == collection) {
      Some(source) => Ok(Some(source)),
      None => Err(ServiceError::Invalid {
        message: format!("item {} names unknown source collection {collection}", item.id),
      }),
    };
  }
  match message.sources.as_slice() {
    [] => Ok(None),
    [only] => Ok(Some(only)),
    _ => Err(ServiceError::Invalid {
      message: format!(
        "cannot match item {} to one of {} message sources",
        item.id,
        message.sources.len()
      ),
    }),
  }
}

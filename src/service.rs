//! A reference adapter showing the shape of a real service: fetch the
//! item's data, transform it, stage the result, and describe it with a
//! derived output item. Real services swap the summary step for actual
//! science processing.

use async_trait::async_trait;
use meridian_catalog::{derive_item, record_history, Asset, Item, OutputFilename};
use meridian_engine::{ItemProcessor, ProcessContext, ProcessedItems, ServiceError};
use meridian_message::SourceCollection;

pub struct SummaryAdapter;

#[async_trait]
impl ItemProcessor for SummaryAdapter {
  async fn process_item(
    &self,
    item: Item,
    source: Option<&SourceCollection>,
    ctx: &ProcessContext,
  ) -> Result<ProcessedItems, ServiceError> {
    let Some((_, asset)) = item.data_asset() else {
      return Err(ServiceError::user(
        format!("item {} carries no data asset", item.id),
        "Invalid",
      ));
    };
    let href = asset.href.clone();

    let local = ctx.fetch(&href).await?;
    let size = tokio::fs::metadata(&local)
      .await
      .map(|m| m.len())
      .map_err(|e| ServiceError::server(format!("cannot stat downloaded file: {e}")))?;

    let collection = source.map(|s| s.collection.as_str()).unwrap_or("unknown");
    let summary = format!("granule {} from {collection}: {size} bytes\n", item.id);
    let output_path = ctx.workdir.join("summary.txt");
    tokio::fs::write(&output_path, summary)
      .await
      .map_err(|e| ServiceError::server(format!("cannot write output file: {e}")))?;

    let variables: Vec<&str> = source
      .map(|s| s.variables.iter().map(|v| v.name.as_str()).collect())
      .unwrap_or_default();
    let filename = OutputFilename::for_source(&href)
      .variables(variables)
      .reformatted(true)
      .ext("txt")
      .build();
    let staged = ctx.stage(&output_path, &filename, Some("text/plain")).await?;

    let mut output = derive_item(&item);
    record_history(&mut output, &ctx.config.app_name, env!("CARGO_PKG_VERSION"));
    output.assets.insert(
      "data".to_string(),
      Asset::data(staged, Some(filename), Some("text/plain".to_string())),
    );
    Ok(output.into())
  }
}

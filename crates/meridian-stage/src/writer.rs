//! Object storage access.
//!
//! All S3 traffic goes through one store builder so localstack runs hit the
//! local endpoint with static credentials and deployed runs pick up the
//! ambient AWS credential chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use meridian_config::Config;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::{info, warn};

use crate::error::StageError;

pub struct StagingWriter {
  config: Arc<Config>,
}

impl StagingWriter {
  pub fn new(config: Arc<Config>) -> Self {
    StagingWriter { config }
  }

  /// Upload a local file under the staging location and return its object
  /// URI. `location` overrides the configured staging destination; the
  /// operation message's staging location is passed through here.
  ///
  /// Offline environments skip the upload and return an echo URL.
  pub async fn stage(
    &self,
    local: &Path,
    remote_filename: &str,
    media_type: Option<&str>,
    location: Option<&str>,
  ) -> Result<String, StageError> {
    if self.config.is_offline() {
      warn!(
        remote_filename,
        "staging suppressed in local environment, returning echo location"
      );
      return Ok(format!("http://example.com/{remote_filename}"));
    }

    let destination = self.destination(location, remote_filename)?;
    let (bucket, key) = split_object_url(&destination)?;
    let body = tokio::fs::read(local).await?;

    let store = self.store(&bucket)?;
    let path = object_store::path::Path::from(key.as_str());
    let mut attributes = Attributes::new();
    if let Some(media_type) = media_type {
      attributes.insert(Attribute::ContentType, media_type.to_string().into());
    }
    store
      .put_opts(
        &path,
        PutPayload::from(Bytes::from(body)),
        PutOptions {
          attributes,
          ..Default::default()
        },
      )
      .await?;
    info!(destination = %destination, "output_staged");
    Ok(destination)
  }

  /// Stage a file and return a pre-signed, time-limited HTTP URL instead of
  /// the raw object URI.
  pub async fn stage_signed(
    &self,
    local: &Path,
    remote_filename: &str,
    media_type: Option<&str>,
    location: Option<&str>,
    expires_in: Duration,
  ) -> Result<String, StageError> {
    let destination = self.stage(local, remote_filename, media_type, location).await?;
    if self.config.is_offline() {
      return Ok(destination);
    }
    let (bucket, key) = split_object_url(&destination)?;
    let store = self.store(&bucket)?;
    let path = object_store::path::Path::from(key.as_str());
    let url = store.signed_url(http::Method::GET, &path, expires_in).await?;
    Ok(url.to_string())
  }

  /// Write a small text document to either an object URL or a local path.
  /// Used for manifests and error documents.
  pub async fn write_text(&self, destination: &str, text: &str) -> Result<(), StageError> {
    if destination.starts_with("s3://") {
      if self.config.is_offline() {
        warn!(destination, "text write suppressed in local environment");
        return Ok(());
      }
      let (bucket, key) = split_object_url(destination)?;
      let store = self.store(&bucket)?;
      let path = object_store::path::Path::from(key.as_str());
      store.put(&path, PutPayload::from(text.to_string())).await?;
      return Ok(());
    }
    tokio::fs::write(destination, text).await?;
    Ok(())
  }

  /// Read a small text document back from an object URL or a local path.
  /// The counterpart to [`write_text`](Self::write_text); offline runs that
  /// suppressed the write read back an empty document.
  pub async fn read_text(&self, source: &str) -> Result<String, StageError> {
    if source.starts_with("s3://") {
      if self.config.is_offline() {
        warn!(source, "text read suppressed in local environment");
        return Ok(String::new());
      }
      let (bucket, key) = split_object_url(source)?;
      let store = self.store(&bucket)?;
      let path = object_store::path::Path::from(key.as_str());
      let body = store.get(&path).await?.bytes().await?;
      return String::from_utf8(body.to_vec()).map_err(|e| {
        StageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
      });
    }
    Ok(tokio::fs::read_to_string(source).await?)
  }

  /// Fetch an object URL into `dir`, named after the final key segment.
  pub async fn download_object(&self, url: &str, dir: &Path) -> Result<PathBuf, StageError> {
    let (bucket, key) = split_object_url(url)?;
    let filename = key.rsplit('/').next().unwrap_or(key.as_str());
    let destination = dir.join(filename);

    let store = self.store(&bucket)?;
    let path = object_store::path::Path::from(key.as_str());
    let body = store.get(&path).await?.bytes().await?;
    tokio::fs::write(&destination, body).await?;
    Ok(destination)
  }

  fn destination(&self, location: Option<&str>, filename: &str) -> Result<String, StageError> {
    if let Some(location) = location {
      let base = location.trim_end_matches('/');
      return Ok(format!("{base}/{filename}"));
    }
    let bucket = self
      .config
      .staging_bucket
      .as_deref()
      .ok_or_else(|| StageError::NotConfigured {
        message: "no staging bucket configured and the message named no location".to_string(),
      })?;
    let prefix = self
      .config
      .staging_path
      .as_deref()
      .map(|p| p.trim_matches('/'))
      .unwrap_or_default();
    if prefix.is_empty() {
      Ok(format!("s3://{bucket}/{filename}"))
    } else {
      Ok(format!("s3://{bucket}/{prefix}/{filename}"))
    }
  }

  fn store(&self, bucket: &str) -> Result<AmazonS3, StageError> {
    let mut builder = AmazonS3Builder::from_env()
      .with_bucket_name(bucket)
      .with_region(&self.config.aws_region);
    if self.config.use_localstack {
      builder = builder
        .with_endpoint(format!("http://{}:4566", self.config.localstack_host))
        .with_allow_http(true)
        .with_access_key_id("localstack")
        .with_secret_access_key("localstack");
    }
    Ok(builder.build()?)
  }
}

/// Split an `s3://bucket/key` URL into its bucket and key.
pub fn split_object_url(url: &str) -> Result<(String, String), StageError> {
  let rest = url
    .strip_prefix("s3://")
    .ok_or_else(|| StageError::InvalidDestination {
      url: url.to_string(),
    })?;
  match rest.split_once('/') {
    Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
      Ok((bucket.to_string(), key.to_string()))
    }
    _ => Err(StageError::InvalidDestination {
      url: url.to_string(),
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn offline_writer() -> StagingWriter {
    let vars = HashMap::from([("ENV", "test")]);
    StagingWriter::new(Arc::new(Config::from_map(&vars).unwrap()))
  }

  fn deployed_writer() -> StagingWriter {
    let vars = HashMap::from([
      ("ENV", "prod"),
      ("STAGING_BUCKET", "outputs"),
      ("STAGING_PATH", "public/run-1"),
    ]);
    StagingWriter::new(Arc::new(Config::from_map(&vars).unwrap()))
  }

  #[test]
  fn splits_bucket_and_key() {
    let (bucket, key) = split_object_url("s3://outputs/public/run-1/out.nc").unwrap();
    assert_eq!(bucket, "outputs");
    assert_eq!(key, "public/run-1/out.nc");
  }

  #[test]
  fn rejects_non_object_urls() {
    assert!(matches!(
      split_object_url("https://example.com/out.nc"),
      Err(StageError::InvalidDestination { .. })
    ));
    assert!(matches!(
      split_object_url("s3://bucket-only"),
      Err(StageError::InvalidDestination { .. })
    ));
  }

  #[test]
  fn builds_destinations_from_config_or_message() {
    let writer = deployed_writer();
    assert_eq!(
      writer.destination(None, "out.nc").unwrap(),
      "s3://outputs/public/run-1/out.nc"
    );
    assert_eq!(
      writer
        .destination(Some("s3://other/prefix/"), "out.nc")
        .unwrap(),
      "s3://other/prefix/out.nc"
    );
  }

  #[tokio::test]
  async fn offline_staging_returns_an_echo_location() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("out.nc");
    std::fs::write(&local, "output").unwrap();

    let staged = offline_writer()
      .stage(&local, "out.nc", Some("application/x-netcdf"), None)
      .await
      .unwrap();
    assert_eq!(staged, "http://example.com/out.nc");
  }

  #[tokio::test]
  async fn offline_text_writes_to_object_urls_are_suppressed() {
    offline_writer()
      .write_text("s3://outputs/errors/error.json", "{}")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn text_writes_to_local_paths_always_happen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    offline_writer()
      .write_text(path.to_str().unwrap(), "{\"id\": \"c\"}")
      .await
      .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"id\": \"c\"}");
  }

  #[tokio::test]
  async fn local_text_documents_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("error.json");
    let writer = offline_writer();
    writer
      .write_text(path.to_str().unwrap(), "{\"error\": \"boom\"}")
      .await
      .unwrap();
    let text = writer.read_text(path.to_str().unwrap()).await.unwrap();
    assert_eq!(text, "{\"error\": \"boom\"}");
  }

  #[tokio::test]
  async fn offline_text_reads_from_object_urls_are_empty() {
    let text = offline_writer()
      .read_text("s3://outputs/errors/error.json")
      .await
      .unwrap();
    assert!(text.is_empty());
  }
}

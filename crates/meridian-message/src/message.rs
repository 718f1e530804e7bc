//! Typed view of the platform's operation message.
//!
//! Field names on the wire are camelCase. Every struct flattens unrecognized
//! fields into a map so a message can round-trip through a service built
//! against an older schema revision.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::token::AccessToken;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
  #[error("operation message is not valid JSON: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("operation message is missing required field {name}")]
  MissingField { name: &'static str },
}

/// A single operation request, as passed on `--input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMessage {
  /// Schema version of the message, e.g. `0.22.0`.
  pub version: String,
  /// URL the service reports progress and errors to.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub callback: Option<String>,
  /// Destination prefix for staged outputs, e.g. `s3://bucket/prefix/`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub staging_location: Option<String>,
  #[serde(default)]
  pub is_synchronous: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub access_token: Option<AccessToken>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,
  #[serde(default)]
  pub sources: Vec<SourceCollection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<Format>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subset: Option<Subset>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temporal: Option<Temporal>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub concatenate: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extra_args: Option<ExtraArgs>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One collection the operation applies to, with any variable selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCollection {
  /// Concept id of the collection, e.g. `C1234-PROV`.
  pub collection: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub short_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version_id: Option<String>,
  #[serde(default)]
  pub variables: Vec<VariableRef>,
  #[serde(default)]
  pub coordinate_variables: Vec<VariableRef>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRef {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub full_path: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Temporal {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end: Option<String>,
}

/// Requested output format and grid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mime: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub crs: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub width: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub height: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interpolation: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subset {
  /// `[west, south, east, north]` in degrees.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bbox: Option<Vec<f64>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shape: Option<ShapeRef>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dimensions: Vec<DimensionSubset>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Reference to a staged shapefile used for spatial subsetting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeRef {
  pub href: String,
  #[serde(rename = "type")]
  pub media_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionSubset {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max: Option<f64>,
}

/// Service-specific arguments the platform forwards verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraArgs(pub Map<String, Value>);

impl OperationMessage {
  /// Parse an operation message from its JSON text.
  pub fn from_json(text: &str) -> Result<Self, MessageError> {
    let message: OperationMessage = serde_json::from_str(text)?;
    if message.version.is_empty() {
      return Err(MessageError::MissingField { name: "version" });
    }
    Ok(message)
  }

  pub fn from_value(value: Value) -> Result<Self, MessageError> {
    Ok(serde_json::from_value(value)?)
  }

  /// Stable hex digest of the message contents, used to correlate log lines
  /// when no request id is present.
  pub fn digest(&self) -> String {
    let canonical = serde_json::to_string(self).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// The request id if present, otherwise the message digest.
  pub fn correlation_id(&self) -> String {
    self
      .request_id
      .clone()
      .unwrap_or_else(|| self.digest())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> &'static str {
    r#"{
      "version": "0.22.0",
      "callback": "http://localhost/response",
      "stagingLocation": "s3://outputs/public/abc/",
      "isSynchronous": false,
      "user": "jdoe",
      "accessToken": "nonce:cipher",
      "client": "meridian-test",
      "requestId": "00001111-2222-3333-4444-555566667777",
      "sources": [
        {
          "collection": "C1234-PROV",
          "shortName": "example",
          "versionId": "1",
          "variables": [{"id": "V1-PROV", "name": "red_var"}],
          "futureField": true
        }
      ],
      "format": {"mime": "image/tiff", "crs": "EPSG:4326"},
      "subset": {"bbox": [-91.1, -45.0, 91.1, 45.0]},
      "temporal": {"start": "2020-01-01T00:00:00Z", "end": "2020-01-02T00:00:00Z"},
      "concatenate": false,
      "extraArgs": {"cut": true}
    }"#
  }

  #[test]
  fn parses_a_full_message() {
    let message = OperationMessage::from_json(sample()).unwrap();
    assert_eq!(message.version, "0.22.0");
    assert_eq!(message.sources.len(), 1);
    assert_eq!(message.sources[0].collection, "C1234-PROV");
    assert_eq!(message.sources[0].variables[0].name, "red_var");
    assert_eq!(message.format.as_ref().unwrap().mime.as_deref(), Some("image/tiff"));
    assert_eq!(message.subset.as_ref().unwrap().bbox.as_ref().unwrap().len(), 4);
    assert!(message.access_token.is_some());
  }

  #[test]
  fn preserves_unknown_fields_across_a_round_trip() {
    let message = OperationMessage::from_json(sample()).unwrap();
    let rendered = serde_json::to_value(&message).unwrap();
    assert_eq!(rendered["sources"][0]["futureField"], Value::Bool(true));
  }

  #[test]
  fn digest_is_stable_across_reparses() {
    let first = OperationMessage::from_json(sample()).unwrap();
    let second =
      OperationMessage::from_value(serde_json::to_value(&first).unwrap()).unwrap();
    assert_eq!(first.digest(), second.digest());
  }

  #[test]
  fn correlation_id_prefers_the_request_id() {
    let message = OperationMessage::from_json(sample()).unwrap();
    assert_eq!(
      message.correlation_id(),
      "00001111-2222-3333-4444-555566667777"
    );
  }

  #[test]
  fn rejects_a_message_without_a_version() {
    let err = OperationMessage::from_json(r#"{"version": "", "sources": []}"#).unwrap_err();
    assert!(matches!(err, MessageError::MissingField { name: "version" }));
  }

  #[test]
  fn subset_components_are_nameable_from_the_crate_root() {
    let subset = crate::Subset {
      bbox: None,
      shape: Some(crate::ShapeRef {
        href: "s3://shapes/area.geojson".to_string(),
        media_type: "application/geo+json".to_string(),
      }),
      dimensions: vec![crate::DimensionSubset {
        name: "lev".to_string(),
        min: Some(10.0),
        max: None,
      }],
      extra: Map::new(),
    };
    assert_eq!(subset.dimensions[0].name, "lev");
  }

  #[test]
  fn minimal_message_defaults_optional_sections() {
    let message = OperationMessage::from_json(r#"{"version": "0.22.0"}"#).unwrap();
    assert!(message.sources.is_empty());
    assert!(message.format.is_none());
    assert!(message.callback.is_none());
  }
}

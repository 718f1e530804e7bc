use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STAC_VERSION: &str = "1.0.0";

/// A STAC item: one granule in, or one output file out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
  #[serde(rename = "type", default = "feature_type")]
  pub item_type: String,
  #[serde(default = "stac_version")]
  pub stac_version: String,
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bbox: Option<Vec<f64>>,
  pub geometry: Option<Value>,
  #[serde(default)]
  pub properties: Map<String, Value>,
  #[serde(default)]
  pub assets: BTreeMap<String, Asset>,
  #[serde(default)]
  pub links: Vec<Link>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

fn feature_type() -> String {
  "Feature".to_string()
}

fn stac_version() -> String {
  STAC_VERSION.to_string()
}

impl Item {
  pub fn new(id: impl Into<String>) -> Self {
    Item {
      item_type: feature_type(),
      stac_version: stac_version(),
      id: id.into(),
      bbox: None,
      geometry: None,
      properties: Map::new(),
      assets: BTreeMap::new(),
      links: Vec::new(),
      extra: Map::new(),
    }
  }

  /// Assets carrying the given role, in asset-key order.
  pub fn assets_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = (&'a str, &'a Asset)> {
    self
      .assets
      .iter()
      .filter(move |(_, asset)| asset.roles.iter().any(|r| r == role))
      .map(|(key, asset)| (key.as_str(), asset))
  }

  /// The asset a service should operate on: the first `data` role asset,
  /// or the only asset when none is marked.
  pub fn data_asset(&self) -> Option<(&str, &Asset)> {
    self
      .assets_with_role("data")
      .next()
      .or_else(|| match self.assets.len() {
        1 => self.assets.iter().next().map(|(k, a)| (k.as_str(), a)),
        _ => None,
      })
  }

  pub fn link(&self, rel: &str) -> Option<&Link> {
    self.links.iter().find(|l| l.rel == rel)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
  pub href: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub media_type: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub roles: Vec<String>,
}

impl Asset {
  pub fn data(href: impl Into<String>, title: Option<String>, media_type: Option<String>) -> Self {
    Asset {
      href: href.into(),
      title,
      description: None,
      media_type,
      roles: vec!["data".to_string()],
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
  pub rel: String,
  pub href: String,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub media_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
}

impl Link {
  pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
    Link {
      rel: rel.into(),
      href: href.into(),
      media_type: None,
      title: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item_with_assets(entries: &[(&str, &str, &[&str])]) -> Item {
    let mut item = Item::new("G1");
    for (key, href, roles) in entries {
      item.assets.insert(
        key.to_string(),
        Asset {
          href: href.to_string(),
          title: None,
          description: None,
          media_type: None,
          roles: roles.iter().map(|r| r.to_string()).collect(),
        },
      );
    }
    item
  }

  #[test]
  fn data_asset_prefers_the_data_role() {
    let item = item_with_assets(&[
      ("browse", "http://e.com/b.png", &["browse"]),
      ("granule", "http://e.com/g.nc", &["data"]),
    ]);
    assert_eq!(item.data_asset().unwrap().0, "granule");
  }

  #[test]
  fn data_asset_falls_back_to_a_sole_asset() {
    let item = item_with_assets(&[("only", "http://e.com/g.nc", &[])]);
    assert_eq!(item.data_asset().unwrap().0, "only");
  }

  #[test]
  fn data_asset_is_none_when_ambiguous() {
    let item = item_with_assets(&[
      ("a", "http://e.com/a.nc", &[]),
      ("b", "http://e.com/b.nc", &[]),
    ]);
    assert!(item.data_asset().is_none());
  }

  #[test]
  fn deserializes_a_minimal_item() {
    let item: Item = serde_json::from_str(
      r#"{"id": "G1", "geometry": null, "assets": {"data": {"href": "s3://in/g.nc"}}}"#,
    )
    .unwrap();
    assert_eq!(item.item_type, "Feature");
    assert_eq!(item.stac_version, STAC_VERSION);
    assert_eq!(item.assets["data"].href, "s3://in/g.nc");
  }
}

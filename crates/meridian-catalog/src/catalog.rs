//! Reading and writing catalog files.
//!
//! On disk a catalog is a `catalog.json` whose `item` links point at
//! sibling item files. Long inputs are split across several catalogs
//! chained by `next` links; reading follows the whole chain.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::item::{Item, Link, STAC_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
  #[error("cannot read catalog file {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("cannot write catalog file {path}: {source}")]
  Write {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("catalog file {path} is not valid JSON: {source}")]
  Malformed {
    path: PathBuf,
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
  #[serde(rename = "type", default = "catalog_type")]
  pub catalog_type: String,
  #[serde(default = "version")]
  pub stac_version: String,
  pub id: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub links: Vec<Link>,
  #[serde(flatten)]
  pub extra: Map<String, serde_json::Value>,
  /// Items resolved from `item` links. Populated by [`read_catalog`],
  /// never serialized into the catalog file itself.
  #[serde(skip)]
  pub items: Vec<Item>,
}

fn catalog_type() -> String {
  "Catalog".to_string()
}

fn version() -> String {
  STAC_VERSION.to_string()
}

impl Catalog {
  pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
    Catalog {
      catalog_type: catalog_type(),
      stac_version: version(),
      id: id.into(),
      description: description.into(),
      links: Vec::new(),
      extra: Map::new(),
      items: Vec::new(),
    }
  }
}

/// Read a catalog and every item it links, following `next` links so a
/// chained catalog reads as one flat item list.
pub fn read_catalog(path: &Path) -> Result<Catalog, CatalogError> {
  let mut catalog = read_single(path)?;
  let mut next = next_href(&catalog, path);
  while let Some(next_path) = next {
    let chained = read_single(&next_path)?;
    next = next_href(&chained, &next_path);
    catalog.items.extend(chained.items);
  }
  Ok(catalog)
}

fn read_single(path: &Path) -> Result<Catalog, CatalogError> {
  let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let mut catalog: Catalog =
    serde_json::from_str(&text).map_err(|source| CatalogError::Malformed {
      path: path.to_path_buf(),
      source,
    })?;

  let base = path.parent().unwrap_or(Path::new("."));
  for link in catalog.links.iter().filter(|l| l.rel == "item") {
    let item_path = base.join(&link.href);
    let item_text = std::fs::read_to_string(&item_path).map_err(|source| CatalogError::Read {
      path: item_path.clone(),
      source,
    })?;
    let item: Item = serde_json::from_str(&item_text).map_err(|source| CatalogError::Malformed {
      path: item_path,
      source,
    })?;
    catalog.items.push(item);
  }
  Ok(catalog)
}

fn next_href(catalog: &Catalog, path: &Path) -> Option<PathBuf> {
  let base = path.parent().unwrap_or(Path::new("."));
  catalog
    .links
    .iter()
    .find(|l| l.rel == "next")
    .map(|l| base.join(&l.href))
}

/// Write a catalog and its items under `dir` as `catalog.json` plus one
/// `item_N.json` per item. Returns the catalog file path.
pub fn write_catalog(dir: &Path, catalog: &Catalog) -> Result<PathBuf, CatalogError> {
  let mut on_disk = catalog.clone();
  on_disk.links.retain(|l| l.rel != "item");
  on_disk
    .links
    .insert(0, Link::new("root", "./catalog.json"));

  for (index, item) in catalog.items.iter().enumerate() {
    let name = format!("item_{index}.json");
    write_json(&dir.join(&name), item)?;
    on_disk.links.push(Link::new("item", format!("./{name}")));
  }

  let path = dir.join("catalog.json");
  write_json(&path, &on_disk)?;
  Ok(path)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CatalogError> {
  let text = serde_json::to_string_pretty(value).map_err(|source| CatalogError::Malformed {
    path: path.to_path_buf(),
    source,
  })?;
  std::fs::write(path, text).map_err(|source| CatalogError::Write {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::item::Asset;

  fn sample_item(id: &str) -> Item {
    let mut item = Item::new(id);
    item.assets.insert(
      "data".to_string(),
      Asset::data(format!("http://e.com/{id}.nc"), None, None),
    );
    item
  }

  #[test]
  fn round_trips_a_catalog_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = Catalog::new("cat-1", "inputs");
    catalog.items.push(sample_item("G1"));
    catalog.items.push(sample_item("G2"));

    let path = write_catalog(dir.path(), &catalog).unwrap();
    let read = read_catalog(&path).unwrap();

    assert_eq!(read.id, "cat-1");
    assert_eq!(read.items.len(), 2);
    assert_eq!(read.items[0].id, "G1");
    assert_eq!(read.items[1].assets["data"].href, "http://e.com/G2.nc");
  }

  #[test]
  fn follows_next_links_across_catalog_files() {
    let dir = tempfile::tempdir().unwrap();
    let first_dir = dir.path().join("first");
    let second_dir = dir.path().join("second");
    std::fs::create_dir_all(&first_dir).unwrap();
    std::fs::create_dir_all(&second_dir).unwrap();

    let mut second = Catalog::new("cat-2", "page two");
    second.items.push(sample_item("G2"));
    write_catalog(&second_dir, &second).unwrap();

    let mut first = Catalog::new("cat-1", "page one");
    first.items.push(sample_item("G1"));
    let first_path = write_catalog(&first_dir, &first).unwrap();

    // Append the next link after writing so it survives in catalog.json.
    let mut on_disk: Catalog =
      serde_json::from_str(&std::fs::read_to_string(&first_path).unwrap()).unwrap();
    on_disk
      .links
      .push(Link::new("next", "../second/catalog.json"));
    let text = serde_json::to_string(&on_disk).unwrap();
    std::fs::write(&first_path, text).unwrap();

    let read = read_catalog(&first_path).unwrap();
    let ids: Vec<_> = read.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["G1", "G2"]);
  }

  #[test]
  fn missing_catalog_file_is_a_read_error() {
    let err = read_catalog(Path::new("/nonexistent/catalog.json")).unwrap_err();
    assert!(matches!(err, CatalogError::Read { .. }));
  }
}

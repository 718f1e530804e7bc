//! Item transformations shared by services.
//!
//! Output filenames follow the platform convention
//! `{input stem}(_{var})?(_regridded)?(_subsetted)?(_reformatted)?.{ext}`
//! and are stable under chaining: a suffix already present on the input
//! is not applied twice.

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::item::{Item, Link};

static SLASH_OR_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/:]").unwrap());
static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());
static EDGE_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_+|_+$").unwrap());
static DOT_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_*\._*").unwrap());

/// Builder for an output filename derived from a source URL.
#[derive(Debug, Clone)]
pub struct OutputFilename<'a> {
  url: &'a str,
  ext: Option<&'a str>,
  variables: Vec<&'a str>,
  regridded: bool,
  subsetted: bool,
  reformatted: bool,
}

impl<'a> OutputFilename<'a> {
  pub fn for_source(url: &'a str) -> Self {
    OutputFilename {
      url,
      ext: None,
      variables: Vec::new(),
      regridded: false,
      subsetted: false,
      reformatted: false,
    }
  }

  /// Replace the source extension. Defaults to keeping it.
  pub fn ext(mut self, ext: &'a str) -> Self {
    self.ext = Some(ext);
    self
  }

  /// Variables that were subset. The name appears in the filename only
  /// when exactly one variable was requested.
  pub fn variables(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
    self.variables = names.into_iter().collect();
    self
  }

  pub fn regridded(mut self, yes: bool) -> Self {
    self.regridded = yes;
    self
  }

  pub fn subsetted(mut self, yes: bool) -> Self {
    self.subsetted = yes;
    self
  }

  pub fn reformatted(mut self, yes: bool) -> Self {
    self.reformatted = yes;
    self
  }

  pub fn build(&self) -> String {
    // Take everything after the last non-trailing '/' before the query.
    // No URL parser here so relative paths keep working in local runs.
    let trimmed = self
      .url
      .split('?')
      .next()
      .unwrap_or_default()
      .trim_end_matches('/');
    let basename = trimmed.rsplit('/').next().unwrap_or_default();
    let decoded = percent_decode_str(basename).decode_utf8_lossy();

    let (stem, original_ext) = split_ext(&decoded);
    let ext = match self.ext {
      Some(e) if e.starts_with('.') => e.to_string(),
      Some(e) => format!(".{e}"),
      None => original_ext.to_string(),
    };

    let mut suffixes = Vec::new();
    if let [only] = self.variables.as_slice() {
      suffixes.push(format!("_{only}"));
    }
    if self.regridded {
      suffixes.push("_regridded".to_string());
    }
    if self.subsetted {
      suffixes.push("_subsetted".to_string());
    }
    if self.reformatted {
      suffixes.push("_reformatted".to_string());
    }
    suffixes.push(ext);

    // Strip suffixes already present so chained services do not stack them.
    let mut result = stem.to_string();
    for suffix in suffixes.iter().rev() {
      if let Some(shorter) = result.strip_suffix(suffix.as_str()) {
        result = shorter.to_string();
      }
    }
    result.push_str(&suffixes.concat());

    let result = SLASH_OR_COLON.replace_all(&result, "_");
    let result = UNDERSCORE_RUNS.replace_all(&result, "_");
    let result = EDGE_UNDERSCORES.replace_all(&result, "");
    DOT_UNDERSCORES.replace_all(&result, ".").into_owned()
  }
}

fn split_ext(name: &str) -> (&str, &str) {
  match name.rfind('.') {
    Some(index) if index > 0 => name.split_at(index),
    _ => (name, ""),
  }
}

/// GeoJSON geometry for a `[west, south, east, north]` bbox, split into a
/// MultiPolygon when it crosses the antimeridian.
pub fn bbox_to_geometry(bbox: &[f64]) -> Option<Value> {
  let [west, south, east, north] = *bbox.first_chunk::<4>()?;
  if west > east {
    return Some(json!({
      "type": "MultiPolygon",
      "coordinates": [
        [[
          [-180.0, south],
          [-180.0, north],
          [east, north],
          [east, south],
          [-180.0, south]
        ]],
        [[
          [west, south],
          [west, north],
          [180.0, north],
          [180.0, south],
          [west, south]
        ]]
      ]
    }));
  }
  Some(json!({
    "type": "Polygon",
    "coordinates": [[
      [west, south],
      [west, north],
      [east, north],
      [east, south],
      [west, south]
    ]]
  }))
}

/// Fill in a geometry from the bbox when an input item carries only a bbox.
pub fn ensure_geometry(item: &mut Item) {
  if item.geometry.is_none()
    && let Some(bbox) = &item.bbox
  {
    item.geometry = bbox_to_geometry(bbox);
  }
}

/// A fresh output item derived from an input: new id, same spatial and
/// temporal metadata, a `derived_from` link back to the input, no assets.
pub fn derive_item(parent: &Item) -> Item {
  let mut item = Item::new(Uuid::new_v4().to_string());
  item.bbox = parent.bbox.clone();
  item.geometry = parent.geometry.clone();
  item.properties = parent.properties.clone();
  let href = parent
    .link("self")
    .map(|l| l.href.clone())
    .unwrap_or_else(|| parent.id.clone());
  item.links.push(Link::new("derived_from", href));
  item
}

/// Append a `{timestamp} {service} {version}` line to an existing history
/// string, keeping the lines earlier services in the chain recorded.
pub fn updated_history(
  service_name: &str,
  service_version: &str,
  existing: Option<&str>,
) -> String {
  let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
  let line = format!("{timestamp} {service_name} {service_version}");
  match existing.filter(|h| !h.is_empty()) {
    Some(history) => format!("{history}\n{line}"),
    None => line,
  }
}

/// Record this processing step in the item's `history` property.
pub fn record_history(item: &mut Item, service_name: &str, service_version: &str) {
  let existing = item
    .properties
    .get("history")
    .and_then(Value::as_str)
    .map(str::to_string);
  let history = updated_history(service_name, service_version, existing.as_deref());
  item
    .properties
    .insert("history".to_string(), Value::String(history));
}

#[cfg(test)]
mod tests {
  use super::*;

  const URL: &str = "https://example.com/fake-path/abc.123.nc?query=true";

  #[test]
  fn keeps_the_original_extension_by_default() {
    assert_eq!(OutputFilename::for_source(URL).build(), "abc.123.nc");
  }

  #[test]
  fn applies_operation_suffixes_in_order() {
    let name = OutputFilename::for_source(URL)
      .regridded(true)
      .subsetted(true)
      .reformatted(true)
      .ext("zarr")
      .build();
    assert_eq!(name, "abc.123_regridded_subsetted_reformatted.zarr");
  }

  #[test]
  fn single_variable_appears_in_the_name() {
    let name = OutputFilename::for_source(URL)
      .variables(["red_var"])
      .subsetted(true)
      .build();
    assert_eq!(name, "abc.123_red_var_subsetted.nc");
  }

  #[test]
  fn multiple_variables_are_omitted() {
    let name = OutputFilename::for_source(URL)
      .variables(["red_var", "green_var"])
      .build();
    assert_eq!(name, "abc.123.nc");
  }

  #[test]
  fn chained_services_do_not_stack_suffixes() {
    let name = OutputFilename::for_source("https://example.com/abc.123_subsetted.nc")
      .subsetted(true)
      .build();
    assert_eq!(name, "abc.123_subsetted.nc");
  }

  #[test]
  fn grouped_variable_paths_become_underscores() {
    let name = OutputFilename::for_source(URL)
      .variables(["/group/sub/var"])
      .build();
    assert_eq!(name, "abc.123_group_sub_var.nc");
  }

  #[test]
  fn percent_encoding_and_colons_are_normalized() {
    let name = OutputFilename::for_source("https://example.com/gran%3Aule.nc").build();
    assert_eq!(name, "gran_ule.nc");
  }

  #[test]
  fn trailing_slash_and_query_are_ignored() {
    let name = OutputFilename::for_source("https://example.com/path/abc.nc/?a=1").build();
    assert_eq!(name, "abc.nc");
  }

  #[test]
  fn simple_bbox_becomes_a_polygon() {
    let geometry = bbox_to_geometry(&[-10.0, -5.0, 10.0, 5.0]).unwrap();
    assert_eq!(geometry["type"], "Polygon");
    assert_eq!(geometry["coordinates"][0][0], json!([-10.0, -5.0]));
  }

  #[test]
  fn antimeridian_bbox_becomes_a_multipolygon() {
    let geometry = bbox_to_geometry(&[170.0, -5.0, -170.0, 5.0]).unwrap();
    assert_eq!(geometry["type"], "MultiPolygon");
    assert_eq!(geometry["coordinates"].as_array().unwrap().len(), 2);
  }

  #[test]
  fn short_bbox_yields_no_geometry() {
    assert!(bbox_to_geometry(&[1.0, 2.0]).is_none());
  }

  #[test]
  fn derived_items_get_new_ids_and_provenance() {
    let mut parent = Item::new("G1");
    parent.bbox = Some(vec![-1.0, -1.0, 1.0, 1.0]);
    let child = derive_item(&parent);
    assert_ne!(child.id, parent.id);
    assert_eq!(child.bbox, parent.bbox);
    assert_eq!(child.link("derived_from").unwrap().href, "G1");
    assert!(child.assets.is_empty());
  }

  #[test]
  fn history_lines_accumulate_oldest_first() {
    let first = updated_history("swath-subsetter", "1.2.0", None);
    assert!(first.ends_with(" swath-subsetter 1.2.0"));
    assert_eq!(first.lines().count(), 1);

    let second = updated_history("reprojector", "0.9.1", Some(&first));
    let mut lines = second.lines();
    assert_eq!(lines.next(), Some(first.as_str()));
    assert!(lines.next().unwrap().ends_with(" reprojector 0.9.1"));
  }

  #[test]
  fn recorded_history_lands_in_the_item_properties() {
    let mut item = Item::new("G1");
    record_history(&mut item, "swath-subsetter", "1.2.0");
    record_history(&mut item, "reprojector", "0.9.1");
    let history = item.properties["history"].as_str().unwrap();
    assert_eq!(history.lines().count(), 2);
    assert!(history.lines().next().unwrap().contains("swath-subsetter"));
  }

  #[test]
  fn ensure_geometry_fills_from_bbox_only_when_absent() {
    let mut item = Item::new("G1");
    item.bbox = Some(vec![-1.0, -1.0, 1.0, 1.0]);
    ensure_geometry(&mut item);
    assert_eq!(item.geometry.as_ref().unwrap()["type"], "Polygon");

    let marker = json!({"type": "Point", "coordinates": [0.0, 0.0]});
    item.geometry = Some(marker.clone());
    ensure_geometry(&mut item);
    assert_eq!(item.geometry.unwrap(), marker);
  }
}

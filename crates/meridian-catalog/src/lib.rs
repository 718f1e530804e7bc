//! Meridian Catalog
//!
//! Input and output catalogs for an operation. The platform hands services
//! one or more STAC catalog files naming the granules to process; services
//! hand back a catalog of output items. This crate reads and writes those
//! files and carries the item transformations shared by all services.

mod catalog;
mod item;
mod transform;

pub use catalog::{read_catalog, write_catalog, Catalog, CatalogError};
pub use item::{Asset, Item, Link};
pub use transform::{
  bbox_to_geometry, derive_item, ensure_geometry, record_history, updated_history,
  OutputFilename,
};

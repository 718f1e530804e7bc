//! Meridian Stage
//!
//! Persists service outputs to the operation's staging location and hands
//! back dereferenceable URIs. Local development and test environments
//! suppress uploads entirely and return echo locations so a service can run
//! fully offline.

mod error;
mod writer;

pub use error::StageError;
pub use writer::{split_object_url, StagingWriter};

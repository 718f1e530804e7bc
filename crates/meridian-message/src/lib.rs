//! Meridian Message
//!
//! The operation message a service receives when the platform invokes it.
//! Messages arrive as camelCase JSON on the command line; this crate parses
//! them into typed structs and keeps unknown fields intact so newer platform
//! versions do not break older services.

mod message;
mod token;

pub use message::{
  DimensionSubset, ExtraArgs, Format, MessageError, OperationMessage, ShapeRef,
  SourceCollection, Subset, Temporal, VariableRef,
};
pub use token::AccessToken;

//! Meridian Config
//!
//! Runtime configuration for meridian services, derived from the process
//! environment. The platform launches services with a fixed set of
//! environment variables; this crate turns them into a validated [`Config`]
//! that the rest of the library consumes.

mod config;
mod environment;
mod health;

pub use config::{Config, ConfigError, FallbackAuth, OauthConfig};
pub use environment::Environment;
pub use health::touch_health_marker;

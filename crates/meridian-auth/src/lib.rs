//! Meridian Auth
//!
//! Turns the opaque access token on an operation message into a usable
//! download credential. Tokens may arrive encrypted with a pre-shared key;
//! deployments with an identity provider exchange the user token for a
//! short-lived federated token, and explicitly enabled fallbacks let a
//! service authenticate as the application itself.

mod credential;
mod crypto;
mod error;
mod resolver;

pub use credential::{Credential, CredentialKind, Provenance};
pub use crypto::{decrypt_access_token, encrypt_access_token};
pub use error::AuthError;
pub use resolver::CredentialResolver;

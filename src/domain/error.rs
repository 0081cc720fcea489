//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to
//! `anyhow::Error` via the `?` operator.

use thiserror::Error;

/// Errors deriving an application name from its repository URL.
#[derive(Debug, Error)]
pub enum AppNameError {
    #[error("cannot derive an application name from '{url}'")]
    Empty { url: String },
}

/// Errors related to registry lifecycle and identity.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("application '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no application named '{0}'")]
    NotFound(String),
}

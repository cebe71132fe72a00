//! Error types for lockbox operations.
//!
//! The collapsed surface (`Lockbox::get`, `Lockbox::set` and the typed
//! accessors) never returns these. They are only visible through
//! `try_get` / `try_set` and the configuration helpers.

use thiserror::Error;

use crate::vault::VaultStatus;

/// Result type alias for lockbox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the vault or loading configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// The vault rejected the call with the given status.
    #[error("Vault error: {0}")]
    Vault(#[from] VaultStatus),

    /// The serial keychain queue stopped, or dropped the job without replying.
    #[error("Keychain queue closed")]
    QueueClosed,

    /// A blocking call was made from a current-thread async runtime.
    #[error("Blocking lockbox call inside a current-thread runtime; use the async variant")]
    BlockingInRuntime,

    /// A typed value or configuration file could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

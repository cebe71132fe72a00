//! The vault seam.
//!
//! [`Vault`] stands in front of the four credential-store primitives so
//! the facade never calls the OS directly. [`KeyringVault`] talks to the
//! real store; [`MemoryVault`] is an in-process fake for tests and for
//! hosts without a credential store.

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "windows",
    target_os = "linux"
))]
mod native;
mod memory;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "windows",
    target_os = "linux"
))]
pub use native::KeyringVault;
pub use memory::{MemoryVault, Primitive};

use serde::Serialize;
use thiserror::Error;

use crate::models::{Attributes, Query};

/// Vendor status for an item that already exists.
pub const ERR_DUPLICATE_ITEM: i32 = -25299;

/// Vendor status for an item that could not be found.
pub const ERR_ITEM_NOT_FOUND: i32 = -25300;

/// Vendor status for an invalid parameter or attribute combination.
pub const ERR_PARAM: i32 = -50;

/// Non-success status returned by a vault primitive.
///
/// Success is `Ok(..)`; everything else is one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultStatus {
    /// An insert collided with an existing record.
    #[error("Item already exists")]
    DuplicateItem,

    /// No record matched the query.
    #[error("Item not found")]
    ItemNotFound,

    /// Any other failure reported by the store.
    #[error("Vault failure ({code}): {message}")]
    Failure { code: i32, message: String },
}

impl VaultStatus {
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
        }
    }

    /// The vendor numeric status code.
    pub fn code(&self) -> i32 {
        match self {
            Self::DuplicateItem => ERR_DUPLICATE_ITEM,
            Self::ItemNotFound => ERR_ITEM_NOT_FOUND,
            Self::Failure { code, .. } => *code,
        }
    }

    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        match code {
            ERR_DUPLICATE_ITEM => Self::DuplicateItem,
            ERR_ITEM_NOT_FOUND => Self::ItemNotFound,
            _ => Self::failure(code, message),
        }
    }
}

impl Serialize for VaultStatus {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultStatus", 2)?;
        state.serialize_field("code", &self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result of a single vault primitive.
pub type VaultResult<T> = std::result::Result<T, VaultStatus>;

/// The four primitives of the platform credential store.
///
/// Each call is made once and its status interpreted once. Implementations
/// must not retry.
pub trait Vault: Send + Sync {
    /// Look up the payload of the single record matching `query`.
    fn copy_matching(&self, query: &Query) -> VaultResult<Vec<u8>>;

    /// Insert a new record. Fails with [`VaultStatus::DuplicateItem`] when
    /// one already exists in the same scope.
    fn add(&self, attributes: &Attributes) -> VaultResult<()>;

    /// Replace payload and accessibility of the record matching `query`.
    fn update(&self, query: &Query, attributes: &Attributes) -> VaultResult<()>;

    /// Remove the record matching `query`.
    fn delete(&self, query: &Query) -> VaultResult<()>;
}

//! Vault backed by the OS credential store.
//!
//! - **macOS / iOS**: Keychain
//! - **Windows**: Credential Manager
//! - **Linux**: kernel keyring
//!
//! The service identifier becomes the keyring service. The keyring has no
//! access groups, so the group (or [`DEFAULT_ACCOUNT`]) becomes the entry's
//! user. Accessibility and the sync flag have no keyring equivalent and are
//! not forwarded.
//!
//! Group matching is exact here. A query without an access group only sees
//! records written without one, where the vendor store (and
//! [`MemoryVault`](super::MemoryVault)) would match records in any group.

use keyring::Entry;
use tracing::{debug, error};

use super::{Vault, VaultResult, VaultStatus, ERR_ITEM_NOT_FOUND, ERR_PARAM};
use crate::models::{Attributes, Query};

/// Keyring user for records without an access group.
pub const DEFAULT_ACCOUNT: &str = "lockbox";

const ERR_INTERACTION_NOT_ALLOWED: i32 = -25308;
const ERR_DECODE: i32 = -26275;
const ERR_INTERNAL_COMPONENT: i32 = -2070;

/// Vault that forwards every primitive to the `keyring` crate.
#[derive(Debug, Default, Clone)]
pub struct KeyringVault {
    _private: (),
}

impl KeyringVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(query: &Query) -> VaultResult<Entry> {
        let account = query.access_group.as_deref().unwrap_or(DEFAULT_ACCOUNT);
        Entry::new(&query.service, account).map_err(|e| {
            error!("Failed to create keyring entry for {}: {}", query.service, e);
            Self::map_keyring_error(e)
        })
    }

    /// Whether a record already exists for this scope.
    fn exists(entry: &Entry) -> VaultResult<bool> {
        match entry.get_secret() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn note_unforwarded(attributes: &Attributes) {
        if attributes.scope.synchronizable.is_some() {
            debug!(
                "Keyring ignores the sync flag for {}",
                attributes.scope.service
            );
        }
        debug!(
            "Keyring ignores accessibility {} for {}",
            attributes.accessibility, attributes.scope.service
        );
    }

    /// Map keyring errors to vault status codes.
    fn map_keyring_error(err: keyring::Error) -> VaultStatus {
        let (code, message) = match &err {
            keyring::Error::NoEntry => (ERR_ITEM_NOT_FOUND, err.to_string()),
            keyring::Error::NoStorageAccess(e) => (
                ERR_INTERACTION_NOT_ALLOWED,
                format!("Keyring access denied: {:?}", e),
            ),
            keyring::Error::BadEncoding(_) => (ERR_DECODE, "Keyring encoding error".to_string()),
            keyring::Error::TooLong(attr, limit) => (
                ERR_PARAM,
                format!("Keyring attribute {} longer than {}", attr, limit),
            ),
            keyring::Error::Invalid(attr, reason) => (
                ERR_PARAM,
                format!("Keyring attribute {} invalid: {}", attr, reason),
            ),
            keyring::Error::Ambiguous(_) => {
                (ERR_PARAM, "Multiple keyring entries found".to_string())
            }
            _ => (ERR_INTERNAL_COMPONENT, format!("Keyring error: {}", err)),
        };
        VaultStatus::from_code(code, message)
    }
}

impl Vault for KeyringVault {
    fn copy_matching(&self, query: &Query) -> VaultResult<Vec<u8>> {
        Self::entry(query)?
            .get_secret()
            .map_err(Self::map_keyring_error)
    }

    fn add(&self, attributes: &Attributes) -> VaultResult<()> {
        Self::note_unforwarded(attributes);
        let entry = Self::entry(&attributes.scope)?;
        if Self::exists(&entry)? {
            return Err(VaultStatus::DuplicateItem);
        }
        entry
            .set_secret(&attributes.data)
            .map_err(Self::map_keyring_error)
    }

    fn update(&self, query: &Query, attributes: &Attributes) -> VaultResult<()> {
        Self::note_unforwarded(attributes);
        let entry = Self::entry(query)?;
        if !Self::exists(&entry)? {
            return Err(VaultStatus::ItemNotFound);
        }
        entry
            .set_secret(&attributes.data)
            .map_err(Self::map_keyring_error)
    }

    fn delete(&self, query: &Query) -> VaultResult<()> {
        Self::entry(query)?
            .delete_credential()
            .map_err(Self::map_keyring_error)
    }
}

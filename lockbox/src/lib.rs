//! Lockbox: a thread-safe get/set/delete facade over the platform credential
//! store.
//!
//! Values are opaque byte blobs stored under string keys. A [`Lockbox`]
//! prefixes every key with its namespace, scopes records to an optional
//! access group and sync flag, and tags them with an accessibility policy.
//! All storage, encryption and access control stay with the vault; this
//! crate only shapes the queries and serializes the calls.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lockbox::{KeychainQueue, Lockbox, LockboxConfig, MemoryVault};
//!
//! let lockbox = Lockbox::new(
//!     LockboxConfig::default().with_namespace("com.example.app"),
//!     Arc::new(MemoryVault::new()),
//!     KeychainQueue::shared()?,
//! )?;
//!
//! lockbox.set("token", Some(&[0xDE, 0xAD][..]));
//! assert_eq!(lockbox.get("token"), Some(vec![0xDE, 0xAD]));
//!
//! // Drain in-flight writes before exiting
//! lockbox.queue().barrier()?;
//! # Ok::<(), lockbox::Error>(())
//! ```

mod config;
mod error;
mod lockbox;
pub mod logging;
mod models;
mod queue;
mod typed;
pub mod vault;

pub use config::{default_namespace, LockboxConfig};
pub use error::{Error, Result};
pub use lockbox::Lockbox;
pub use models::{keys, Accessibility, AttrValue, Attributes, Dictionary, ItemClass, Query};
pub use queue::{KeychainQueue, SHARED_QUEUE_NAME};
pub use vault::{MemoryVault, Primitive, Vault, VaultResult, VaultStatus};

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "windows",
    target_os = "linux"
))]
pub use vault::KeyringVault;

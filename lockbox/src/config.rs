use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::models::Accessibility;

static DEFAULT_NAMESPACE: OnceLock<String> = OnceLock::new();

/// The namespace used when none is configured: the running executable's
/// name, or the crate name when that can't be determined.
pub fn default_namespace() -> &'static str {
    DEFAULT_NAMESPACE.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
    })
}

fn default_namespace_setting() -> Option<String> {
    Some(default_namespace().to_string())
}

/// Settings a [`Lockbox`](crate::Lockbox) is built from. Immutable once the
/// lockbox exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockboxConfig {
    /// Prefix joined to every key with `.`; `None` stores keys as-is.
    #[serde(default = "default_namespace_setting")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub access_group: Option<String>,
    /// `None` leaves the sync attribute out of every query.
    #[serde(default)]
    pub synchronizable: Option<bool>,
    /// Remember values (and misses) per key to skip repeated lookups.
    #[serde(default)]
    pub cache_values: bool,
}

impl Default for LockboxConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace_setting(),
            accessibility: Accessibility::default(),
            access_group: None,
            synchronizable: None,
            cache_values: false,
        }
    }
}

impl LockboxConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn without_namespace(mut self) -> Self {
        self.namespace = None;
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn with_access_group(mut self, access_group: impl Into<String>) -> Self {
        self.access_group = Some(access_group.into());
        self
    }

    pub fn with_synchronizable(mut self, synchronizable: bool) -> Self {
        self.synchronizable = Some(synchronizable);
        self
    }

    pub fn with_cache(mut self, cache_values: bool) -> Self {
        self.cache_values = cache_values;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.namespace.as_deref(), Some("")) {
            return Err(Error::Config(
                "Namespace must not be empty; use None for no namespace".into(),
            ));
        }
        if matches!(self.access_group.as_deref(), Some("")) {
            return Err(Error::Config("Access group must not be empty".into()));
        }
        Ok(())
    }

    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: LockboxConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = LockboxConfig::default();
        assert_eq!(config.namespace.as_deref(), Some(default_namespace()));
        assert_eq!(config.accessibility, Accessibility::AfterFirstUnlock);
        assert!(config.access_group.is_none());
        assert!(config.synchronizable.is_none());
        assert!(!config.cache_values);
        assert!(!default_namespace().is_empty());
    }

    #[test]
    fn test_validate_rejects_empty_strings() {
        assert!(LockboxConfig::default().with_namespace("").validate().is_err());
        assert!(LockboxConfig::default().with_access_group("").validate().is_err());
        assert!(LockboxConfig::default().without_namespace().validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockbox.json");

        let config = LockboxConfig::default()
            .with_namespace("com.example.app")
            .with_accessibility(Accessibility::WhenUnlockedThisDeviceOnly)
            .with_access_group("TEAM.shared")
            .with_synchronizable(true);
        config.save(&path).unwrap();

        assert_eq!(LockboxConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = LockboxConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, LockboxConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockbox.json");
        std::fs::write(&path, r#"{ "namespace": null, "accessibility": "always" }"#).unwrap();

        let config = LockboxConfig::load(&path).unwrap();
        assert!(config.namespace.is_none());
        assert_eq!(config.accessibility, Accessibility::Always);
        assert!(!config.cache_values);
    }
}

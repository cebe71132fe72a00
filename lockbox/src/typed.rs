//! Typed accessors layered on [`Lockbox::get`] and [`Lockbox::set`].
//!
//! Passing `None` to a setter deletes the record, same as the byte API.
//! Values that fail to decode read as `None`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::lockbox::Lockbox;

impl Lockbox {
    pub fn get_string(&self, key: &str) -> Option<String> {
        let bytes = self.get(key)?;
        String::from_utf8(bytes)
            .map_err(|e| debug!("{} is not UTF-8: {}", self.service_for(key), e))
            .ok()
    }

    pub fn set_string(&self, key: &str, value: Option<&str>) -> bool {
        self.set(key, value.map(str::as_bytes))
    }

    /// Dates are stored as RFC 3339 text.
    pub fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        let text = self.get_string(key)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| debug!("{} is not a date: {}", self.service_for(key), e))
            .ok()
    }

    pub fn set_date(&self, key: &str, value: Option<DateTime<Utc>>) -> bool {
        let text = value.map(|dt| dt.to_rfc3339());
        self.set_string(key, text.as_deref())
    }

    pub fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        self.get_value(key)
    }

    pub fn set_json(&self, key: &str, value: Option<&serde_json::Value>) -> bool {
        self.set_value(key, value)
    }

    /// Any serde type, encoded as JSON.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| debug!("Failed to decode {}: {}", self.service_for(key), e))
            .ok()
    }

    pub fn set_value<T: Serialize + ?Sized>(&self, key: &str, value: Option<&T>) -> bool {
        let Some(value) = value else {
            return self.set(key, None);
        };
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, Some(bytes.as_slice())),
            Err(e) => {
                debug!("Failed to encode {}: {}", self.service_for(key), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    use crate::config::LockboxConfig;
    use crate::lockbox::Lockbox;
    use crate::queue::KeychainQueue;
    use crate::vault::MemoryVault;

    fn lockbox() -> Lockbox {
        Lockbox::new(
            LockboxConfig::default().with_namespace("typed"),
            Arc::new(MemoryVault::new()),
            Arc::new(KeychainQueue::new("typed-test").unwrap()),
        )
        .unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        scopes: Vec<String>,
    }

    #[test]
    fn test_string() {
        let lb = lockbox();
        assert!(lb.set_string("name", Some("ryan")));
        assert_eq!(lb.get_string("name").as_deref(), Some("ryan"));

        assert!(lb.set("binary", Some(&[0xFF, 0xFE][..])));
        assert_eq!(lb.get_string("binary"), None);

        assert!(lb.set_string("name", None));
        assert_eq!(lb.get_string("name"), None);
    }

    #[test]
    fn test_date() {
        let lb = lockbox();
        let when = Utc.with_ymd_and_hms(2016, 1, 27, 12, 30, 0).unwrap();

        assert!(lb.set_date("expires", Some(when)));
        assert_eq!(lb.get_date("expires"), Some(when));

        assert!(lb.set_string("expires", Some("tomorrow")));
        assert_eq!(lb.get_date("expires"), None);
    }

    #[test]
    fn test_json() {
        let lb = lockbox();
        let value = serde_json::json!({ "a": 1, "b": [true, null] });

        assert!(lb.set_json("blob", Some(&value)));
        assert_eq!(lb.get_json("blob"), Some(value));
    }

    #[test]
    fn test_serde_value() {
        let lb = lockbox();
        let session = Session {
            user: "ryan".into(),
            scopes: vec!["read".into(), "write".into()],
        };

        assert!(lb.set_value("session", Some(&session)));
        assert_eq!(lb.get_value::<Session>("session"), Some(session));

        // Wrong shape decodes to None
        assert_eq!(lb.get_value::<BTreeMap<String, u32>>("session"), None);

        assert!(lb.set_value::<Session>("session", None));
        assert_eq!(lb.get_value::<Session>("session"), None);
    }
}

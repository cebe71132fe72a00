//! Query and attribute shapes handed to the vault.
//!
//! A [`Query`] scopes an operation to one record (item class, service
//! identifier, optional access group, optional sync flag). [`Attributes`]
//! is the write shape: a scope plus the payload and its accessibility tag.
//! Both render to the vault's native key/value dictionary with
//! [`Query::to_dictionary`] and [`Attributes::to_dictionary`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Native dictionary keys and constant values used by the vault.
pub mod keys {
    pub const CLASS: &str = "class";
    pub const SERVICE: &str = "svce";
    pub const ACCESS_GROUP: &str = "agrp";
    pub const SYNCHRONIZABLE: &str = "sync";
    pub const RETURN_DATA: &str = "r_Data";
    pub const MATCH_LIMIT: &str = "m_Limit";
    pub const VALUE_DATA: &str = "v_Data";
    pub const ACCESSIBLE: &str = "pdmn";

    pub const CLASS_GENERIC_PASSWORD: &str = "genp";
    pub const MATCH_LIMIT_ONE: &str = "m_LimitOne";
}

/// A value in a native vault dictionary.
#[derive(Clone, PartialEq, Eq)]
pub enum AttrValue {
    String(String),
    Bool(bool),
    Data(Vec<u8>),
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s),
            Self::Bool(b) => write!(f, "{}", b),
            // Never log payload bytes
            Self::Data(d) => write!(f, "<{} bytes>", d.len()),
        }
    }
}

/// The vault's native query/attribute dictionary.
pub type Dictionary = BTreeMap<&'static str, AttrValue>;

/// Vault item class. Lockbox only stores generic passwords.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    #[default]
    GenericPassword,
}

impl ItemClass {
    pub fn as_native(&self) -> &'static str {
        match self {
            Self::GenericPassword => keys::CLASS_GENERIC_PASSWORD,
        }
    }
}

/// When a stored record becomes readable relative to device lock state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    WhenUnlocked,
    #[default]
    AfterFirstUnlock,
    Always,
    WhenPasscodeSetThisDeviceOnly,
    WhenUnlockedThisDeviceOnly,
    AfterFirstUnlockThisDeviceOnly,
    AlwaysThisDeviceOnly,
}

impl Accessibility {
    pub const ALL: [Accessibility; 7] = [
        Self::WhenUnlocked,
        Self::AfterFirstUnlock,
        Self::Always,
        Self::WhenPasscodeSetThisDeviceOnly,
        Self::WhenUnlockedThisDeviceOnly,
        Self::AfterFirstUnlockThisDeviceOnly,
        Self::AlwaysThisDeviceOnly,
    ];

    /// The vendor constant for this policy.
    pub fn as_native(&self) -> &'static str {
        match self {
            Self::WhenUnlocked => "ak",
            Self::AfterFirstUnlock => "ck",
            Self::Always => "dk",
            Self::WhenPasscodeSetThisDeviceOnly => "akpu",
            Self::WhenUnlockedThisDeviceOnly => "aku",
            Self::AfterFirstUnlockThisDeviceOnly => "cku",
            Self::AlwaysThisDeviceOnly => "dku",
        }
    }

    /// Whether records with this policy may never leave the device.
    pub fn is_this_device_only(&self) -> bool {
        matches!(
            self,
            Self::WhenPasscodeSetThisDeviceOnly
                | Self::WhenUnlockedThisDeviceOnly
                | Self::AfterFirstUnlockThisDeviceOnly
                | Self::AlwaysThisDeviceOnly
        )
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_native())
    }
}

impl FromStr for Accessibility {
    type Err = Error;

    /// Accepts either the vendor constant (`"ck"`) or the snake_case name
    /// (`"after_first_unlock"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let snake = serde_json::Value::String(s.to_string());
        if let Ok(parsed) = serde_json::from_value::<Accessibility>(snake) {
            return Ok(parsed);
        }
        Self::ALL
            .into_iter()
            .find(|a| a.as_native() == s)
            .ok_or_else(|| Error::Config(format!("Unknown accessibility: {}", s)))
    }
}

/// Scope of a vault operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub class: ItemClass,
    /// Service identifier: `namespace.key`, or just `key`.
    pub service: String,
    pub access_group: Option<String>,
    /// `None` leaves the sync attribute out of the query entirely.
    pub synchronizable: Option<bool>,
    /// Lookups set this to ask for the payload (with match limit one).
    pub return_data: bool,
}

impl Query {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            class: ItemClass::GenericPassword,
            service: service.into(),
            access_group: None,
            synchronizable: None,
            return_data: false,
        }
    }

    pub fn with_access_group(mut self, access_group: Option<String>) -> Self {
        self.access_group = access_group;
        self
    }

    pub fn with_synchronizable(mut self, synchronizable: Option<bool>) -> Self {
        self.synchronizable = synchronizable;
        self
    }

    pub fn returning_data(mut self) -> Self {
        self.return_data = true;
        self
    }

    /// The same scope without the return-data request, as used for
    /// update and delete.
    pub fn scope(&self) -> Query {
        Query {
            return_data: false,
            ..self.clone()
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert(keys::CLASS, AttrValue::String(self.class.as_native().into()));
        dict.insert(keys::SERVICE, AttrValue::String(self.service.clone()));
        if let Some(group) = &self.access_group {
            dict.insert(keys::ACCESS_GROUP, AttrValue::String(group.clone()));
        }
        if let Some(sync) = self.synchronizable {
            dict.insert(keys::SYNCHRONIZABLE, AttrValue::Bool(sync));
        }
        if self.return_data {
            dict.insert(keys::RETURN_DATA, AttrValue::Bool(true));
            dict.insert(
                keys::MATCH_LIMIT,
                AttrValue::String(keys::MATCH_LIMIT_ONE.into()),
            );
        }
        dict
    }
}

/// Write shape: the record scope plus payload and accessibility.
#[derive(Clone, PartialEq, Eq)]
pub struct Attributes {
    pub scope: Query,
    pub data: Vec<u8>,
    pub accessibility: Accessibility,
}

impl Attributes {
    pub fn new(scope: Query, data: Vec<u8>, accessibility: Accessibility) -> Self {
        Self {
            scope: scope.scope(),
            data,
            accessibility,
        }
    }

    /// Full dictionary for an insert.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = self.scope.to_dictionary();
        dict.extend(self.update_dictionary());
        dict
    }

    /// Only the fields an update changes on an existing record.
    pub fn update_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert(keys::VALUE_DATA, AttrValue::Data(self.data.clone()));
        dict.insert(
            keys::ACCESSIBLE,
            AttrValue::String(self.accessibility.as_native().into()),
        );
        dict
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attributes")
            .field("scope", &self.scope)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .field("accessibility", &self.accessibility)
            .finish()
    }
}

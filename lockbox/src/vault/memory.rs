//! In-process vault with the credential store's matching rules.
//!
//! Records are unique per (class, service, access group, sync flag). A
//! query without an access group matches every group; a query without a
//! sync flag only matches records that are not synchronized. Writing a
//! synchronized record with a this-device-only accessibility fails with
//! [`ERR_PARAM`], as on the vendor store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use super::{Vault, VaultResult, VaultStatus, ERR_PARAM};
use crate::models::{Accessibility, Attributes, ItemClass, Query};

/// One of the four vault primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    CopyMatching,
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RecordKey {
    class: ItemClass,
    service: String,
    access_group: Option<String>,
    synchronizable: bool,
}

impl RecordKey {
    fn for_write(scope: &Query) -> Self {
        Self {
            class: scope.class,
            service: scope.service.clone(),
            access_group: scope.access_group.clone(),
            synchronizable: scope.synchronizable.unwrap_or(false),
        }
    }

    fn matches(&self, query: &Query) -> bool {
        self.class == query.class
            && self.service == query.service
            && query
                .access_group
                .as_ref()
                .map_or(true, |group| self.access_group.as_ref() == Some(group))
            && self.synchronizable == query.synchronizable.unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
struct Record {
    data: Vec<u8>,
    accessibility: Accessibility,
}

#[derive(Default)]
struct State {
    records: BTreeMap<RecordKey, Record>,
    calls: Vec<Primitive>,
    failures: HashMap<Primitive, VaultStatus>,
}

/// Synchronized records must be allowed to leave the device.
fn check_sync_policy(scope: &Query, accessibility: Accessibility) -> VaultResult<()> {
    if scope.synchronizable == Some(true) && accessibility.is_this_device_only() {
        return Err(VaultStatus::failure(
            ERR_PARAM,
            format!(
                "{} cannot be synchronized with accessibility {}",
                scope.service, accessibility
            ),
        ));
    }
    Ok(())
}

impl State {
    /// Record the call and hand back an injected failure, if any.
    fn enter(&mut self, primitive: Primitive) -> VaultResult<()> {
        self.calls.push(primitive);
        match self.failures.remove(&primitive) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

/// Vault fake backed by an in-memory map.
#[derive(Default)]
pub struct MemoryVault {
    state: Mutex<State>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call to `primitive` fail with `status`.
    pub fn fail_next(&self, primitive: Primitive, status: VaultStatus) {
        self.state().failures.insert(primitive, status);
    }

    /// Primitives called so far, in order.
    pub fn calls(&self) -> Vec<Primitive> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accessibility of the first record matching `query`.
    pub fn accessibility_of(&self, query: &Query) -> Option<Accessibility> {
        self.state()
            .records
            .iter()
            .find(|(key, _)| key.matches(query))
            .map(|(_, record)| record.accessibility)
    }
}

impl Vault for MemoryVault {
    fn copy_matching(&self, query: &Query) -> VaultResult<Vec<u8>> {
        let mut state = self.state();
        state.enter(Primitive::CopyMatching)?;
        trace!("memory copy_matching {}", query.service);

        state
            .records
            .iter()
            .find(|(key, _)| key.matches(query))
            .map(|(_, record)| record.data.clone())
            .ok_or(VaultStatus::ItemNotFound)
    }

    fn add(&self, attributes: &Attributes) -> VaultResult<()> {
        let mut state = self.state();
        state.enter(Primitive::Add)?;
        trace!("memory add {}", attributes.scope.service);
        check_sync_policy(&attributes.scope, attributes.accessibility)?;

        let key = RecordKey::for_write(&attributes.scope);
        if state.records.contains_key(&key) {
            return Err(VaultStatus::DuplicateItem);
        }
        state.records.insert(
            key,
            Record {
                data: attributes.data.clone(),
                accessibility: attributes.accessibility,
            },
        );
        Ok(())
    }

    fn update(&self, query: &Query, attributes: &Attributes) -> VaultResult<()> {
        let mut state = self.state();
        state.enter(Primitive::Update)?;
        trace!("memory update {}", query.service);
        check_sync_policy(&attributes.scope, attributes.accessibility)?;

        let mut updated = 0;
        for (_, record) in state.records.iter_mut().filter(|(key, _)| key.matches(query)) {
            record.data = attributes.data.clone();
            record.accessibility = attributes.accessibility;
            updated += 1;
        }

        if updated == 0 {
            return Err(VaultStatus::ItemNotFound);
        }
        Ok(())
    }

    fn delete(&self, query: &Query) -> VaultResult<()> {
        let mut state = self.state();
        state.enter(Primitive::Delete)?;
        trace!("memory delete {}", query.service);

        let before = state.records.len();
        state.records.retain(|key, _| !key.matches(query));

        if state.records.len() == before {
            return Err(VaultStatus::ItemNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(service: &str, data: &[u8]) -> Attributes {
        Attributes::new(Query::new(service), data.to_vec(), Accessibility::default())
    }

    #[test]
    fn test_add_then_copy() {
        let vault = MemoryVault::new();
        vault.add(&attrs("svc", b"secret")).unwrap();

        let found = vault.copy_matching(&Query::new("svc").returning_data()).unwrap();
        assert_eq!(found, b"secret");
        assert_eq!(vault.calls(), vec![Primitive::Add, Primitive::CopyMatching]);
    }

    #[test]
    fn test_add_duplicate() {
        let vault = MemoryVault::new();
        vault.add(&attrs("svc", b"one")).unwrap();

        assert_eq!(vault.add(&attrs("svc", b"two")), Err(VaultStatus::DuplicateItem));
    }

    #[test]
    fn test_update_and_delete_missing() {
        let vault = MemoryVault::new();
        let query = Query::new("svc");

        assert_eq!(
            vault.update(&query, &attrs("svc", b"x")),
            Err(VaultStatus::ItemNotFound)
        );
        assert_eq!(vault.delete(&query), Err(VaultStatus::ItemNotFound));
    }

    #[test]
    fn test_access_group_scoping() {
        let vault = MemoryVault::new();
        let scoped = Query::new("svc").with_access_group(Some("TEAM.a".into()));
        vault
            .add(&Attributes::new(scoped, b"a".to_vec(), Accessibility::Always))
            .unwrap();

        let other = Query::new("svc").with_access_group(Some("TEAM.b".into()));
        assert_eq!(vault.copy_matching(&other), Err(VaultStatus::ItemNotFound));

        // No group in the query matches any group
        assert_eq!(vault.copy_matching(&Query::new("svc")).unwrap(), b"a");
    }

    #[test]
    fn test_sync_flag_scoping() {
        let vault = MemoryVault::new();
        let synced = Query::new("svc").with_synchronizable(Some(true));
        vault
            .add(&Attributes::new(synced.clone(), b"s".to_vec(), Accessibility::default()))
            .unwrap();

        assert_eq!(vault.copy_matching(&Query::new("svc")), Err(VaultStatus::ItemNotFound));
        assert_eq!(vault.copy_matching(&synced).unwrap(), b"s");
    }

    #[test]
    fn test_synced_device_only_record_rejected() {
        let vault = MemoryVault::new();
        let synced = Query::new("svc").with_synchronizable(Some(true));

        let status = vault
            .add(&Attributes::new(
                synced.clone(),
                b"s".to_vec(),
                Accessibility::AfterFirstUnlockThisDeviceOnly,
            ))
            .unwrap_err();
        assert_eq!(status.code(), ERR_PARAM);
        assert!(vault.is_empty());

        vault
            .add(&Attributes::new(synced, b"s".to_vec(), Accessibility::AfterFirstUnlock))
            .unwrap();
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let vault = MemoryVault::new();
        vault.fail_next(Primitive::Add, VaultStatus::failure(-34018, "no entitlement"));

        assert_eq!(vault.add(&attrs("svc", b"x")).unwrap_err().code(), -34018);
        assert!(vault.add(&attrs("svc", b"x")).is_ok());
        assert_eq!(vault.len(), 1);
    }
}

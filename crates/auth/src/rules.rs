//! Rule store: roles, business elements and the permission rule for each
//! (role, element) pair.
//!
//! Readers work on an immutable, versioned [`RuleSnapshot`]. Administrative
//! mutations are persisted first and then published by swapping in a new
//! snapshot, so a decision never observes a half-applied change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::{BusinessElement, ElementCode};
use crate::permissions::PermissionRule;
use crate::roles::{Role, RoleDefinition};

// ─────────────────────────────────────────────────────────────────────────────
// Persistence boundary
// ─────────────────────────────────────────────────────────────────────────────

/// One stored permission rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub role: Role,
    pub element: ElementCode,
    #[serde(flatten)]
    pub rule: PermissionRule,
}

/// Everything the rule store loads at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
    #[serde(default)]
    pub elements: Vec<BusinessElement>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self, RuleStoreError> {
        serde_json::from_str(json).map_err(|e| RuleStoreError::InvalidRuleSet(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, RuleStoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RuleStoreError::InvalidRuleSet(e.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rule persistence failed: {0}")]
pub struct PersistenceError(pub String);

/// Storage behind the rule store. Only the store calls this.
pub trait RulePersistence: Send + Sync {
    fn load_all(&self) -> Result<RuleSet, PersistenceError>;

    fn put_role(&self, role: &RoleDefinition) -> Result<(), PersistenceError>;

    /// Remove a role and every rule that references it.
    fn remove_role(&self, role: &Role) -> Result<(), PersistenceError>;

    fn put_element(&self, element: &BusinessElement) -> Result<(), PersistenceError>;

    /// Remove an element and every rule that references it.
    fn remove_element(&self, code: &ElementCode) -> Result<(), PersistenceError>;

    fn put_rule(&self, entry: &RuleEntry) -> Result<(), PersistenceError>;

    fn remove_rule(&self, role: &Role, element: &ElementCode) -> Result<(), PersistenceError>;
}

impl<P> RulePersistence for Arc<P>
where
    P: RulePersistence + ?Sized,
{
    fn load_all(&self) -> Result<RuleSet, PersistenceError> {
        (**self).load_all()
    }

    fn put_role(&self, role: &RoleDefinition) -> Result<(), PersistenceError> {
        (**self).put_role(role)
    }

    fn remove_role(&self, role: &Role) -> Result<(), PersistenceError> {
        (**self).remove_role(role)
    }

    fn put_element(&self, element: &BusinessElement) -> Result<(), PersistenceError> {
        (**self).put_element(element)
    }

    fn remove_element(&self, code: &ElementCode) -> Result<(), PersistenceError> {
        (**self).remove_element(code)
    }

    fn put_rule(&self, entry: &RuleEntry) -> Result<(), PersistenceError> {
        (**self).put_rule(entry)
    }

    fn remove_rule(&self, role: &Role, element: &ElementCode) -> Result<(), PersistenceError> {
        (**self).remove_rule(role, element)
    }
}

/// In-memory rule persistence for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRulePersistence {
    inner: RwLock<RuleSet>,
}

impl InMemoryRulePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule_set(set: RuleSet) -> Self {
        Self {
            inner: RwLock::new(set),
        }
    }

    fn write<F>(&self, f: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut RuleSet),
    {
        let mut set = self
            .inner
            .write()
            .map_err(|_| PersistenceError("rule set lock poisoned".to_string()))?;
        f(&mut set);
        Ok(())
    }
}

impl RulePersistence for InMemoryRulePersistence {
    fn load_all(&self) -> Result<RuleSet, PersistenceError> {
        self.inner
            .read()
            .map(|set| set.clone())
            .map_err(|_| PersistenceError("rule set lock poisoned".to_string()))
    }

    fn put_role(&self, role: &RoleDefinition) -> Result<(), PersistenceError> {
        self.write(|set| {
            set.roles.retain(|r| r.role != role.role);
            set.roles.push(role.clone());
        })
    }

    fn remove_role(&self, role: &Role) -> Result<(), PersistenceError> {
        self.write(|set| {
            set.roles.retain(|r| &r.role != role);
            set.rules.retain(|e| &e.role != role);
        })
    }

    fn put_element(&self, element: &BusinessElement) -> Result<(), PersistenceError> {
        self.write(|set| {
            set.elements.retain(|e| e.code != element.code);
            set.elements.push(element.clone());
        })
    }

    fn remove_element(&self, code: &ElementCode) -> Result<(), PersistenceError> {
        self.write(|set| {
            set.elements.retain(|e| &e.code != code);
            set.rules.retain(|e| &e.element != code);
        })
    }

    fn put_rule(&self, entry: &RuleEntry) -> Result<(), PersistenceError> {
        self.write(|set| {
            set.rules
                .retain(|e| !(e.role == entry.role && e.element == entry.element));
            set.rules.push(entry.clone());
        })
    }

    fn remove_rule(&self, role: &Role, element: &ElementCode) -> Result<(), PersistenceError> {
        self.write(|set| {
            set.rules.retain(|e| !(&e.role == role && &e.element == element));
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable view of all rule data at one version.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    version: u64,
    roles: HashMap<Role, RoleDefinition>,
    elements: HashMap<ElementCode, BusinessElement>,
    rules: HashMap<Role, HashMap<ElementCode, PermissionRule>>,
}

impl RuleSnapshot {
    /// Build a snapshot, rejecting dangling or duplicate rules.
    pub fn from_rule_set(set: RuleSet, version: u64) -> Result<Self, RuleStoreError> {
        let mut snapshot = Self {
            version,
            ..Self::default()
        };
        for role in set.roles {
            snapshot.roles.insert(role.role.clone(), role);
        }
        for element in set.elements {
            snapshot.elements.insert(element.code.clone(), element);
        }
        for entry in set.rules {
            snapshot.ensure_pair_exists(&entry.role, &entry.element)?;
            let previous = snapshot
                .rules
                .entry(entry.role.clone())
                .or_default()
                .insert(entry.element.clone(), entry.rule);
            if previous.is_some() {
                return Err(RuleStoreError::DuplicateRule {
                    role: entry.role,
                    element: entry.element,
                });
            }
        }
        Ok(snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The rule for `(role, element)`, or the all-false default. Total.
    pub fn lookup(&self, role: &Role, element: &ElementCode) -> PermissionRule {
        self.get(role, element).unwrap_or_default()
    }

    /// The stored rule, if one exists.
    pub fn get(&self, role: &Role, element: &ElementCode) -> Option<PermissionRule> {
        self.rules
            .get(role)
            .and_then(|by_element| by_element.get(element))
            .copied()
    }

    pub fn has_element(&self, code: &ElementCode) -> bool {
        self.elements.contains_key(code)
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains_key(role)
    }

    pub fn role(&self, role: &Role) -> Option<&RoleDefinition> {
        self.roles.get(role)
    }

    pub fn element(&self, code: &ElementCode) -> Option<&BusinessElement> {
        self.elements.get(code)
    }

    /// Roles sorted by name.
    pub fn roles(&self) -> Vec<RoleDefinition> {
        let mut roles: Vec<RoleDefinition> = self.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.role.cmp(&b.role));
        roles
    }

    /// Elements sorted by code.
    pub fn elements(&self) -> Vec<BusinessElement> {
        let mut elements: Vec<BusinessElement> = self.elements.values().cloned().collect();
        elements.sort_by(|a, b| a.code.cmp(&b.code));
        elements
    }

    /// Stored rules, optionally filtered by role and/or element, sorted by
    /// (role, element).
    pub fn list_rules(&self, role: Option<&Role>, element: Option<&ElementCode>) -> Vec<RuleEntry> {
        let mut entries: Vec<RuleEntry> = self
            .rules
            .iter()
            .filter(|(r, _)| role.is_none_or(|want| want == *r))
            .flat_map(|(r, by_element)| {
                by_element
                    .iter()
                    .filter(|(e, _)| element.is_none_or(|want| want == *e))
                    .map(move |(e, rule)| RuleEntry {
                        role: r.clone(),
                        element: e.clone(),
                        rule: *rule,
                    })
            })
            .collect();
        entries.sort_by(|a, b| (&a.role, &a.element).cmp(&(&b.role, &b.element)));
        entries
    }

    /// Export as a persistable rule set.
    pub fn to_rule_set(&self) -> RuleSet {
        RuleSet {
            roles: self.roles(),
            elements: self.elements(),
            rules: self.list_rules(None, None),
        }
    }

    fn ensure_pair_exists(&self, role: &Role, element: &ElementCode) -> Result<(), RuleStoreError> {
        if !self.has_role(role) {
            return Err(RuleStoreError::UnknownRole(role.clone()));
        }
        if !self.has_element(element) {
            return Err(RuleStoreError::UnknownElement(element.clone()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleStoreError {
    #[error("unknown role '{0}'")]
    UnknownRole(Role),

    #[error("unknown business element '{0}'")]
    UnknownElement(ElementCode),

    #[error("duplicate rule for role '{role}' on element '{element}'")]
    DuplicateRule { role: Role, element: ElementCode },

    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Shared, read-mostly rule store.
pub struct RuleStore {
    persistence: Arc<dyn RulePersistence>,
    current: RwLock<Arc<RuleSnapshot>>,
    writer: Mutex<()>,
}

impl core::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuleStore")
            .field("version", &self.snapshot().version())
            .finish_non_exhaustive()
    }
}

impl RuleStore {
    /// Load all rule data from `persistence`.
    pub fn load(persistence: Arc<dyn RulePersistence>) -> Result<Self, RuleStoreError> {
        let snapshot = RuleSnapshot::from_rule_set(persistence.load_all()?, 1)?;
        tracing::info!(
            roles = snapshot.roles.len(),
            elements = snapshot.elements.len(),
            "rule store loaded"
        );
        Ok(Self {
            persistence,
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    /// A store backed by in-memory persistence seeded with `set`.
    pub fn in_memory(set: RuleSet) -> Result<Self, RuleStoreError> {
        Self::load(Arc::new(InMemoryRulePersistence::with_rule_set(set)))
    }

    /// The current snapshot. Cheap; holds the read lock only for an `Arc` clone.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        // The guarded value is replaced wholesale, so a poisoned lock still
        // holds a complete snapshot.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    pub fn lookup(&self, role: &Role, element: &ElementCode) -> PermissionRule {
        self.snapshot().lookup(role, element)
    }

    pub fn list_rules(&self, role: Option<&Role>, element: Option<&ElementCode>) -> Vec<RuleEntry> {
        self.snapshot().list_rules(role, element)
    }

    pub fn roles(&self) -> Vec<RoleDefinition> {
        self.snapshot().roles()
    }

    pub fn elements(&self) -> Vec<BusinessElement> {
        self.snapshot().elements()
    }

    /// Re-read everything from persistence (e.g. after an out-of-band change).
    pub fn reload(&self) -> Result<u64, RuleStoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let next_version = self.version() + 1;
        let snapshot = RuleSnapshot::from_rule_set(self.persistence.load_all()?, next_version)?;
        self.publish(snapshot);
        tracing::info!(version = next_version, "rule store reloaded");
        Ok(next_version)
    }

    pub fn upsert_role(&self, role: RoleDefinition) -> Result<u64, RuleStoreError> {
        self.mutate(|persistence, next| {
            persistence.put_role(&role)?;
            tracing::info!(role = %role.role, "role upserted");
            next.roles.insert(role.role.clone(), role);
            Ok(())
        })
    }

    /// Delete a role and, by cascade, all of its rules.
    pub fn delete_role(&self, role: &Role) -> Result<u64, RuleStoreError> {
        self.mutate(|persistence, next| {
            if !next.has_role(role) {
                return Err(RuleStoreError::UnknownRole(role.clone()));
            }
            persistence.remove_role(role)?;
            tracing::info!(role = %role, "role deleted");
            next.roles.remove(role);
            next.rules.remove(role);
            Ok(())
        })
    }

    pub fn upsert_element(&self, element: BusinessElement) -> Result<u64, RuleStoreError> {
        self.mutate(|persistence, next| {
            persistence.put_element(&element)?;
            tracing::info!(element = %element.code, "business element upserted");
            next.elements.insert(element.code.clone(), element);
            Ok(())
        })
    }

    /// Delete a business element and, by cascade, all rules on it.
    pub fn delete_element(&self, code: &ElementCode) -> Result<u64, RuleStoreError> {
        self.mutate(|persistence, next| {
            if !next.has_element(code) {
                return Err(RuleStoreError::UnknownElement(code.clone()));
            }
            persistence.remove_element(code)?;
            tracing::info!(element = %code, "business element deleted");
            next.elements.remove(code);
            for by_element in next.rules.values_mut() {
                by_element.remove(code);
            }
            Ok(())
        })
    }

    /// Create or replace the rule for `(role, element)`. Both must exist.
    pub fn upsert_rule(
        &self,
        role: &Role,
        element: &ElementCode,
        rule: PermissionRule,
    ) -> Result<u64, RuleStoreError> {
        self.mutate(|persistence, next| {
            next.ensure_pair_exists(role, element)?;
            persistence.put_rule(&RuleEntry {
                role: role.clone(),
                element: element.clone(),
                rule,
            })?;
            tracing::info!(role = %role, element = %element, ?rule, "permission rule upserted");
            next.rules
                .entry(role.clone())
                .or_default()
                .insert(element.clone(), rule);
            Ok(())
        })
    }

    /// Remove the rule for `(role, element)`; the pair falls back to no grants.
    pub fn delete_rule(&self, role: &Role, element: &ElementCode) -> Result<u64, RuleStoreError> {
        self.mutate(|persistence, next| {
            persistence.remove_rule(role, element)?;
            tracing::info!(role = %role, element = %element, "permission rule deleted");
            if let Some(by_element) = next.rules.get_mut(role) {
                by_element.remove(element);
            }
            Ok(())
        })
    }

    /// Copy the current snapshot, apply `f`, and publish the copy at the next
    /// version. Nothing is published if `f` fails.
    fn mutate<F>(&self, f: F) -> Result<u64, RuleStoreError>
    where
        F: FnOnce(&dyn RulePersistence, &mut RuleSnapshot) -> Result<(), RuleStoreError>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*self.snapshot()).clone();
        next.version += 1;
        f(&*self.persistence, &mut next)?;
        let version = next.version;
        self.publish(next);
        Ok(version)
    }

    fn publish(&self, snapshot: RuleSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

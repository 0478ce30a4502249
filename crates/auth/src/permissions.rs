use serde::{Deserialize, Serialize};

/// Operation a principal attempts on a business element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which grant family applies to a check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Applies only to resources owned by the acting subject.
    Own,
    /// Applies regardless of ownership.
    All,
}

/// The seven independent grants one role holds on one business element.
///
/// Every grant defaults to `false`; a missing rule is equivalent to
/// `PermissionRule::default()`. Creation has no "all" variant: a subject
/// always creates as itself.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionRule {
    pub read_own: bool,
    pub read_all: bool,
    pub create_own: bool,
    pub update_own: bool,
    pub update_all: bool,
    pub delete_own: bool,
    pub delete_all: bool,
}

impl PermissionRule {
    /// A rule with every grant set.
    pub fn full() -> Self {
        Self {
            read_own: true,
            read_all: true,
            create_own: true,
            update_own: true,
            update_all: true,
            delete_own: true,
            delete_all: true,
        }
    }

    /// Look up a single grant. `(Create, All)` does not exist and is always `false`.
    pub fn grants(&self, action: Action, scope: Scope) -> bool {
        match (action, scope) {
            (Action::Create, Scope::Own) => self.create_own,
            (Action::Create, Scope::All) => false,
            (Action::Read, Scope::Own) => self.read_own,
            (Action::Read, Scope::All) => self.read_all,
            (Action::Update, Scope::Own) => self.update_own,
            (Action::Update, Scope::All) => self.update_all,
            (Action::Delete, Scope::Own) => self.delete_own,
            (Action::Delete, Scope::All) => self.delete_all,
        }
    }

    /// Whether either scope of `action` is granted.
    pub fn grants_any(&self, action: Action) -> bool {
        self.grants(action, Scope::Own) || self.grants(action, Scope::All)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_grants_nothing() {
        let rule = PermissionRule::default();
        assert!(rule.is_empty());
        for action in Action::ALL {
            assert!(!rule.grants_any(action));
        }
    }

    #[test]
    fn create_has_no_all_scope() {
        let rule = PermissionRule::full();
        assert!(rule.grants(Action::Create, Scope::Own));
        assert!(!rule.grants(Action::Create, Scope::All));
    }

    #[test]
    fn missing_fields_deserialize_as_false() {
        let rule: PermissionRule = serde_json::from_str(r#"{"read_all": true}"#).unwrap();
        assert_eq!(
            rule,
            PermissionRule {
                read_all: true,
                ..PermissionRule::default()
            }
        );
    }
}

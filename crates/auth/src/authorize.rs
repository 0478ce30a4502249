//! Authorization decision engine.
//!
//! - No IO
//! - No panics
//! - Stateless per call: the only input besides the arguments is the current
//!   rule snapshot

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use rolegate_core::{OwnedResource, SubjectId};

use crate::element::ElementCode;
use crate::permissions::{Action, PermissionRule, Scope};
use crate::principal::Principal;
use crate::rules::{RuleSnapshot, RuleStore};

/// Why a request was denied.
///
/// Only for operators and logs; callers answer end users with a generic
/// "unauthorized"/"forbidden" via [`AuthzError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The principal is anonymous.
    Unauthenticated,
    /// The subject holds no role.
    NoRole,
    /// The role's rule does not grant the action.
    NotGranted,
    /// The element code is not configured. This is a configuration defect,
    /// not an access decision.
    UnknownElement,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }

    fn into_result(self, element: &ElementCode) -> Result<(), AuthzError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::Unauthenticated) => Err(AuthzError::Unauthenticated),
            Decision::Deny(DenyReason::UnknownElement) => {
                Err(AuthzError::UnknownElement(element.clone()))
            }
            Decision::Deny(DenyReason::NoRole | DenyReason::NotGranted) => {
                Err(AuthzError::Forbidden)
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthorized")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("unknown business element '{0}'")]
    UnknownElement(ElementCode),
}

/// Result of the coarse check made before the concrete resource is loaded.
///
/// It can only reject. Passing it means "worth loading the resource", never
/// "allowed": follow up with [`Authorizer::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCheck {
    decision: Decision,
    element: ElementCode,
}

impl PreCheck {
    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn rejects(&self) -> bool {
        !self.decision.is_allowed()
    }

    /// `Err` if the caller can be turned away right now.
    pub fn reject_early(&self) -> Result<(), AuthzError> {
        self.decision.into_result(&self.element)
    }
}

/// Authoritative decision.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCheck {
    decision: Decision,
    element: ElementCode,
}

impl FinalCheck {
    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    pub fn into_result(self) -> Result<(), AuthzError> {
        self.decision.into_result(&self.element)
    }
}

/// Actions whose decision is authoritative without a concrete resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CollectionAction {
    /// Create a new resource (always owned by the caller).
    Create,
    /// See the collection at all. Which rows are visible is decided per item.
    List,
}

impl From<CollectionAction> for Action {
    fn from(value: CollectionAction) -> Self {
        match value {
            CollectionAction::Create => Action::Create,
            CollectionAction::List => Action::Read,
        }
    }
}

/// Whether the principal may use the administrative surface (role `admin`).
pub fn is_admin(principal: &Principal) -> bool {
    principal.role().is_some_and(|role| role.is_admin())
}

/// Decide against a given snapshot. See [`Authorizer::decide`].
pub fn decide(
    snapshot: &RuleSnapshot,
    principal: &Principal,
    element: &ElementCode,
    action: Action,
    resource: Option<&dyn OwnedResource>,
) -> Decision {
    let decision = evaluate(snapshot, principal, element, action, resource).decision;
    match decision {
        Decision::Allow => {
            tracing::trace!(%element, %action, "authorization allowed");
        }
        Decision::Deny(DenyReason::UnknownElement) => {
            tracing::error!(%element, %action, "authorization against unknown business element");
        }
        Decision::Deny(reason) => {
            tracing::debug!(%element, %action, ?reason, "authorization denied");
        }
    }
    decision
}

struct Evaluation {
    decision: Decision,
    rule: Option<PermissionRule>,
    is_owner: Option<bool>,
}

impl Evaluation {
    fn deny(reason: DenyReason) -> Self {
        Self {
            decision: Decision::Deny(reason),
            rule: None,
            is_owner: None,
        }
    }
}

fn evaluate(
    snapshot: &RuleSnapshot,
    principal: &Principal,
    element: &ElementCode,
    action: Action,
    resource: Option<&dyn OwnedResource>,
) -> Evaluation {
    let (subject_id, role) = match principal {
        Principal::Anonymous => return Evaluation::deny(DenyReason::Unauthenticated),
        Principal::Authenticated { role: None, .. } => return Evaluation::deny(DenyReason::NoRole),
        Principal::Authenticated {
            subject_id,
            role: Some(role),
        } => (*subject_id, role),
    };

    if !snapshot.has_element(element) {
        return Evaluation::deny(DenyReason::UnknownElement);
    }

    let rule = snapshot.lookup(role, element);
    let is_owner = resource.map(|r| owns(subject_id, r));
    let granted = grants(&rule, action, is_owner);

    Evaluation {
        decision: if granted {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotGranted)
        },
        rule: Some(rule),
        is_owner,
    }
}

fn owns(subject_id: SubjectId, resource: &dyn OwnedResource) -> bool {
    resource.owner_id() == Some(subject_id)
}

/// `is_owner` is `None` when no resource was supplied.
fn grants(rule: &PermissionRule, action: Action, is_owner: Option<bool>) -> bool {
    match (action, is_owner) {
        (Action::Create, _) => rule.create_own,
        (Action::Read, None) => rule.grants_any(Action::Read),
        // Coarse gate: any update or delete grant lets the caller go on to
        // load the resource.
        (Action::Update | Action::Delete, None) => {
            rule.grants_any(Action::Update) || rule.grants_any(Action::Delete)
        }
        (action, Some(true)) => rule.grants_any(action),
        (action, Some(false)) => rule.grants(action, Scope::All),
    }
}

/// Decision engine over a shared [`RuleStore`].
#[derive(Debug, Clone)]
pub struct Authorizer {
    rules: Arc<RuleStore>,
}

impl Authorizer {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    /// Raw decision for `action` on `element`.
    ///
    /// With `resource`, ownership decides whether "own" grants count. Without
    /// it, `Create` and `Read` are collection-level gates and `Update`/`Delete`
    /// are a coarse pre-check only; prefer [`precheck`](Self::precheck),
    /// [`check`](Self::check) and [`check_collection`](Self::check_collection),
    /// which keep those phases apart.
    pub fn decide(
        &self,
        principal: &Principal,
        element: &ElementCode,
        action: Action,
        resource: Option<&dyn OwnedResource>,
    ) -> Decision {
        decide(&self.rules.snapshot(), principal, element, action, resource)
    }

    /// Cheap early rejection before the resource is loaded.
    pub fn precheck(
        &self,
        principal: &Principal,
        element: &ElementCode,
        action: Action,
    ) -> PreCheck {
        PreCheck {
            decision: self.decide(principal, element, action, None),
            element: element.clone(),
        }
    }

    /// Object-level decision on a loaded resource.
    pub fn check(
        &self,
        principal: &Principal,
        element: &ElementCode,
        action: Action,
        resource: &dyn OwnedResource,
    ) -> FinalCheck {
        FinalCheck {
            decision: self.decide(principal, element, action, Some(resource)),
            element: element.clone(),
        }
    }

    /// Collection-level decision (create, or list at all).
    pub fn check_collection(
        &self,
        principal: &Principal,
        element: &ElementCode,
        action: CollectionAction,
    ) -> FinalCheck {
        FinalCheck {
            decision: self.decide(principal, element, action.into(), None),
            element: element.clone(),
        }
    }

    /// Keep only the items the principal may read.
    pub fn retain_visible<R: OwnedResource>(
        &self,
        principal: &Principal,
        element: &ElementCode,
        items: Vec<R>,
    ) -> Vec<R> {
        let snapshot = self.rules.snapshot();
        items
            .into_iter()
            .filter(|item| {
                evaluate(&snapshot, principal, element, Action::Read, Some(item))
                    .decision
                    .is_allowed()
            })
            .collect()
    }

    /// Audit record of the decision for `action` on `element`.
    pub fn explain(
        &self,
        principal: &Principal,
        element: &ElementCode,
        action: Action,
        resource: Option<&dyn OwnedResource>,
    ) -> AuthorizationExplanation {
        let snapshot = self.rules.snapshot();
        let evaluation = evaluate(&snapshot, principal, element, action, resource);
        AuthorizationExplanation::new(
            principal,
            element,
            action,
            resource.is_some(),
            evaluation,
            snapshot.version(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Meant for operators: it exposes rule structure and must not be sent to
/// the requesting client.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub element: ElementCode,
    pub action: Action,
    /// `"object"` when a resource was supplied, else `"collection"`.
    pub level: &'static str,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    /// Rule the decision used (the all-false default when none is stored).
    pub rule: Option<PermissionRule>,
    pub is_owner: Option<bool>,
    pub denial: Option<DenyReason>,
    pub rules_version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub authenticated: bool,
    pub subject_id: Option<SubjectId>,
    pub role: Option<String>,
}

impl AuthorizationExplanation {
    fn new(
        principal: &Principal,
        element: &ElementCode,
        action: Action,
        object_level: bool,
        evaluation: Evaluation,
        rules_version: u64,
    ) -> Self {
        let denial = evaluation.decision.deny_reason();
        let reason = match denial {
            None if evaluation.is_owner == Some(true) => {
                format!("role grants {action} on own '{element}' resources")
            }
            None if evaluation.is_owner == Some(false) => {
                format!("role grants {action} on all '{element}' resources")
            }
            None => format!("role grants {action} on '{element}'"),
            Some(DenyReason::Unauthenticated) => "principal is not authenticated".to_string(),
            Some(DenyReason::NoRole) => "subject has no role assigned".to_string(),
            Some(DenyReason::UnknownElement) => {
                format!("business element '{element}' is not configured")
            }
            Some(DenyReason::NotGranted) if evaluation.is_owner == Some(false) => {
                format!("role lacks {action}_all on '{element}'; subject is not the owner")
            }
            Some(DenyReason::NotGranted) => format!("role does not grant {action} on '{element}'"),
        };

        Self {
            element: element.clone(),
            action,
            level: if object_level { "object" } else { "collection" },
            granted: denial.is_none(),
            reason,
            principal: PrincipalState {
                authenticated: principal.is_authenticated(),
                subject_id: principal.subject_id(),
                role: principal.role().map(|r| r.as_str().to_string()),
            },
            rule: evaluation.rule,
            is_owner: evaluation.is_owner,
            denial,
            rules_version,
        }
    }
}

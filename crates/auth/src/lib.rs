//! `rolegate-auth`: bearer-token identity and ownership-scoped RBAC decisions.
//!
//! This crate is intentionally decoupled from HTTP and storage: subjects come
//! from a [`SubjectDirectory`], rules from a [`RulePersistence`].

pub mod authorize;
pub mod claims;
pub mod config;
pub mod directory;
pub mod element;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod rules;
pub mod session;
pub mod token;

pub use authorize::{
    AuthorizationExplanation, Authorizer, AuthzError, CollectionAction, Decision, DenyReason,
    FinalCheck, PreCheck, is_admin,
};
pub use claims::{TokenClaims, TokenError, TokenKind, validate_claims};
pub use config::{AuthConfig, ConfigError};
pub use directory::{
    Credentials, DirectoryError, InMemorySubjectDirectory, Registration, Subject, SubjectDirectory,
};
pub use element::{BusinessElement, ElementCode};
pub use permissions::{Action, PermissionRule, Scope};
pub use principal::{Principal, PrincipalResolver, extract_bearer};
pub use roles::{Role, RoleDefinition};
pub use rules::{
    InMemoryRulePersistence, PersistenceError, RuleEntry, RulePersistence, RuleSet, RuleSnapshot,
    RuleStore, RuleStoreError,
};
pub use session::{AuthError, SessionManager};
pub use token::{SignedToken, TokenCodec, TokenPair};

pub use rolegate_core::{OwnedResource, SubjectId};

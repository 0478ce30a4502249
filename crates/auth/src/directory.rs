//! Subject directory boundary.
//!
//! The engine never stores subjects itself; it asks a directory whether a
//! subject exists, is active, and which role it holds. `InMemorySubjectDirectory`
//! is the development/test implementation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_core::{DomainError, DomainResult, SubjectId};

use crate::Role;

pub const MIN_PASSWORD_LEN: usize = 8;

/// A subject as seen by the authorization core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub role: Option<Role>,
    pub is_active: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Self-registration request.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub patronymic: String,
}

impl core::fmt::Debug for Registration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("patronymic", &self.patronymic)
            .finish_non_exhaustive()
    }
}

impl Registration {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            email: email.into(),
            password_confirm: password.clone(),
            password,
            ..Default::default()
        }
    }

    /// Check the request shape before it reaches a directory.
    pub fn validate(&self) -> DomainResult<()> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(DomainError::validation("email: required"));
        }
        match email.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(DomainError::validation("email: not a valid address")),
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN
            || self.password_confirm.chars().count() < MIN_PASSWORD_LEN
        {
            return Err(DomainError::validation(format!(
                "password: must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.password != self.password_confirm {
            return Err(DomainError::validation("password_confirm: passwords do not match"));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not answer (backend down, timeout, poisoned state).
    #[error("subject directory unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// External collaborator that owns subject records.
///
/// Implementations may block on IO; callers treat any `Err` as a rejection.
pub trait SubjectDirectory: Send + Sync {
    /// Return the subject if it exists and is active.
    fn find_active(&self, id: SubjectId) -> Result<Option<Subject>, DirectoryError>;

    /// Return the active subject matching these credentials, if any.
    fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Subject>, DirectoryError>;

    /// Create a subject from an already validated registration.
    fn register(&self, registration: &Registration) -> Result<Subject, DirectoryError>;
}

impl<S> SubjectDirectory for Arc<S>
where
    S: SubjectDirectory + ?Sized,
{
    fn find_active(&self, id: SubjectId) -> Result<Option<Subject>, DirectoryError> {
        (**self).find_active(id)
    }

    fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Subject>, DirectoryError> {
        (**self).verify_credentials(credentials)
    }

    fn register(&self, registration: &Registration) -> Result<Subject, DirectoryError> {
        (**self).register(registration)
    }
}

#[derive(Debug, Clone)]
struct Account {
    subject: Subject,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    patronymic: String,
}

#[derive(Debug, Default)]
struct Accounts {
    by_id: HashMap<SubjectId, Account>,
    by_email: HashMap<String, SubjectId>,
}

/// In-memory subject directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubjectDirectory {
    inner: RwLock<Accounts>,
}

impl InMemorySubjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active subject directly (bypassing registration validation).
    pub fn insert(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<SubjectId, DirectoryError> {
        let subject = self.create(&Registration::new(email, password), role)?;
        Ok(subject.id)
    }

    /// Set or clear a subject's role.
    pub fn assign_role(&self, id: SubjectId, role: Option<Role>) -> Result<(), DirectoryError> {
        self.update(id, |account| account.subject.role = role)
    }

    /// Activate or deactivate a subject. Deactivation takes effect on the
    /// subject's very next request.
    pub fn set_active(&self, id: SubjectId, active: bool) -> Result<(), DirectoryError> {
        self.update(id, |account| account.subject.is_active = active)
    }

    /// Look up a subject regardless of its active flag.
    pub fn get(&self, id: SubjectId) -> Result<Option<Subject>, DirectoryError> {
        let accounts = self.inner.read().map_err(|_| poisoned())?;
        Ok(accounts.by_id.get(&id).map(|a| a.subject.clone()))
    }

    /// Display name assembled the way the profile is shown to people.
    pub fn full_name(&self, id: SubjectId) -> Result<Option<String>, DirectoryError> {
        let accounts = self.inner.read().map_err(|_| poisoned())?;
        Ok(accounts.by_id.get(&id).map(|a| {
            let parts: Vec<&str> = [
                a.last_name.as_str(),
                a.first_name.as_str(),
                a.patronymic.as_str(),
            ]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
            if parts.is_empty() {
                a.email.clone()
            } else {
                parts.join(" ")
            }
        }))
    }

    fn update<F>(&self, id: SubjectId, f: F) -> Result<(), DirectoryError>
    where
        F: FnOnce(&mut Account),
    {
        let mut accounts = self.inner.write().map_err(|_| poisoned())?;
        let account = accounts
            .by_id
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("subject {id}")))?;
        f(account);
        Ok(())
    }

    fn create(
        &self,
        registration: &Registration,
        role: Option<Role>,
    ) -> Result<Subject, DirectoryError> {
        let email = normalize_email(&registration.email);
        // Hash outside the lock.
        let password_hash = hash_password(&registration.password)?;

        let mut accounts = self.inner.write().map_err(|_| poisoned())?;
        if accounts.by_email.contains_key(&email) {
            let reason = format!("email {email} is already registered");
            return Err(DomainError::conflict(reason).into());
        }

        let subject = Subject {
            id: SubjectId::new(),
            role,
            is_active: true,
        };
        accounts.by_email.insert(email.clone(), subject.id);
        accounts.by_id.insert(
            subject.id,
            Account {
                subject: subject.clone(),
                email,
                password_hash,
                first_name: registration.first_name.clone(),
                last_name: registration.last_name.clone(),
                patronymic: registration.patronymic.clone(),
            },
        );
        Ok(subject)
    }
}

impl SubjectDirectory for InMemorySubjectDirectory {
    fn find_active(&self, id: SubjectId) -> Result<Option<Subject>, DirectoryError> {
        Ok(self.get(id)?.filter(|s| s.is_active))
    }

    fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<Subject>, DirectoryError> {
        let email = normalize_email(&credentials.email);
        let account = {
            let accounts = self.inner.read().map_err(|_| poisoned())?;
            accounts
                .by_email
                .get(&email)
                .and_then(|id| accounts.by_id.get(id))
                .cloned()
        };

        match account {
            Some(account) if account.subject.is_active => {
                Ok(verify_password(&credentials.password, &account.password_hash)
                    .then_some(account.subject))
            }
            _ => {
                // Unknown and inactive accounts cost as much as a wrong password.
                if let Some(hash) = dummy_hash() {
                    verify_password(&credentials.password, hash);
                }
                Ok(None)
            }
        }
    }

    fn register(&self, registration: &Registration) -> Result<Subject, DirectoryError> {
        self.create(registration, None)
    }
}

/// Lower-case the domain part; the local part is case-sensitive.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn hash_password(password: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| DirectoryError::Unavailable(format!("hash error: {err}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Hash that no account uses, verified against when there is no real one.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("rolegate-no-such-account").ok())
        .as_deref()
}

fn poisoned() -> DirectoryError {
    DirectoryError::Unavailable("directory lock poisoned".to_string())
}

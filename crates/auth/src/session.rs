//! Session/token lifecycle: login, registration, refresh, logout.
//!
//! Sessions are stateless. Nothing is stored server-side, so logout cannot
//! invalidate anything: a leaked access token stays usable until it expires
//! (at most the access TTL), and a refresh token is reused, not rotated,
//! until its own expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use rolegate_core::DomainError;

use crate::claims::{TokenError, TokenKind};
use crate::directory::{Credentials, DirectoryError, Registration, Subject, SubjectDirectory};
use crate::token::{SignedToken, TokenCodec, TokenPair};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login or refresh failed. Does not say which check failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("registration rejected: {0}")]
    Registration(DomainError),

    /// The subject directory could not complete a registration.
    #[error("identity service unavailable")]
    Unavailable,

    #[error("token issuance failed: {0}")]
    Issuance(#[from] TokenError),
}

#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    directory: Arc<dyn SubjectDirectory>,
}

impl SessionManager {
    pub fn new(codec: Arc<TokenCodec>, directory: Arc<dyn SubjectDirectory>) -> Self {
        Self { codec, directory }
    }

    /// Verify credentials with the directory and issue an access + refresh pair.
    pub fn login(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let subject = match self.directory.verify_credentials(credentials) {
            Ok(Some(subject)) if subject.is_active => subject,
            Ok(_) => {
                tracing::debug!("login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => {
                tracing::warn!(error = %err, "subject directory failed during login");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let pair = self.codec.issue_pair(subject.id, now)?;
        tracing::info!(subject_id = %subject.id, "login succeeded");
        Ok(pair)
    }

    /// Create a subject and log it in.
    pub fn register(
        &self,
        registration: &Registration,
        now: DateTime<Utc>,
    ) -> Result<(Subject, TokenPair), AuthError> {
        registration.validate().map_err(AuthError::Registration)?;

        let subject = self.directory.register(registration).map_err(|err| match err {
            DirectoryError::Domain(domain) => AuthError::Registration(domain),
            DirectoryError::Unavailable(reason) => {
                tracing::warn!(%reason, "subject directory failed during registration");
                AuthError::Unavailable
            }
        })?;

        let pair = self.codec.issue_pair(subject.id, now)?;
        tracing::info!(subject_id = %subject.id, "subject registered");
        Ok((subject, pair))
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The subject must still be active. The refresh token itself is not
    /// rotated.
    pub fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, AuthError> {
        let claims = self
            .codec
            .verify_kind(refresh_token, TokenKind::Refresh, now)
            .map_err(|err| {
                tracing::debug!(error = %err, "refresh token rejected");
                AuthError::InvalidCredentials
            })?;

        match self.directory.find_active(claims.subject_id) {
            Ok(Some(subject)) if subject.is_active && subject.id == claims.subject_id => {}
            Ok(_) => {
                tracing::debug!(
                    subject_id = %claims.subject_id,
                    "refresh for unknown or inactive subject"
                );
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => {
                tracing::warn!(
                    subject_id = %claims.subject_id,
                    error = %err,
                    "subject directory failed during refresh"
                );
                return Err(AuthError::InvalidCredentials);
            }
        }

        Ok(self.codec.issue(claims.subject_id, TokenKind::Access, now)?)
    }

    /// No-op: there is no server-side session to end. Clients discard their
    /// tokens; outstanding tokens remain valid until they expire.
    pub fn logout(&self) {
        tracing::debug!("logout requested; stateless tokens are not revoked");
    }
}

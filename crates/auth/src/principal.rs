use std::sync::Arc;

use chrono::{DateTime, Utc};

use rolegate_core::SubjectId;

use crate::claims::TokenKind;
use crate::directory::SubjectDirectory;
use crate::token::TokenCodec;
use crate::Role;

/// The resolved identity of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// No usable credentials. Malformed credentials resolve here too.
    Anonymous,

    /// A verified, active subject. `role: None` means zero capability.
    Authenticated {
        subject_id: SubjectId,
        role: Option<Role>,
    },
}

impl Principal {
    pub fn authenticated(subject_id: SubjectId, role: Option<Role>) -> Self {
        Self::Authenticated { subject_id, role }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn subject_id(&self) -> Option<SubjectId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { subject_id, .. } => Some(*subject_id),
        }
    }

    pub fn role(&self) -> Option<&Role> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { role, .. } => role.as_ref(),
        }
    }
}

const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization` header value.
///
/// Accepts exactly `"Bearer <token>"`: the literal scheme, one space, and a
/// single non-empty token with no further space-separated parts.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    if parts.next() != Some(BEARER_SCHEME) {
        return None;
    }
    let token = parts.next().filter(|t| !t.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(token)
}

/// Resolve an `Authorization` header into a [`Principal`].
///
/// Never fails: every credential problem (missing or malformed header, bad
/// signature, expiry, refresh token, unknown or inactive subject, directory
/// failure) degrades to [`Principal::Anonymous`].
pub fn resolve<D>(
    codec: &TokenCodec,
    directory: &D,
    authorization: Option<&str>,
    now: DateTime<Utc>,
) -> Principal
where
    D: SubjectDirectory + ?Sized,
{
    let Some(token) = authorization.and_then(extract_bearer) else {
        return Principal::Anonymous;
    };

    let claims = match codec.verify_kind(token, TokenKind::Access, now) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(error = %err, "bearer token rejected");
            return Principal::Anonymous;
        }
    };

    match directory.find_active(claims.subject_id) {
        Ok(Some(subject)) if subject.is_active && subject.id == claims.subject_id => {
            Principal::authenticated(subject.id, subject.role)
        }
        Ok(_) => {
            tracing::debug!(subject_id = %claims.subject_id, "token subject unknown or inactive");
            Principal::Anonymous
        }
        Err(err) => {
            tracing::warn!(
                subject_id = %claims.subject_id,
                error = %err,
                "subject directory lookup failed"
            );
            Principal::Anonymous
        }
    }
}

/// Stateless resolver bundling a codec with a subject directory.
#[derive(Clone)]
pub struct PrincipalResolver {
    codec: Arc<TokenCodec>,
    directory: Arc<dyn SubjectDirectory>,
}

impl PrincipalResolver {
    pub fn new(codec: Arc<TokenCodec>, directory: Arc<dyn SubjectDirectory>) -> Self {
        Self { codec, directory }
    }

    pub fn resolve(&self, authorization: Option<&str>, now: DateTime<Utc>) -> Principal {
        resolve(&*self.codec, &*self.directory, authorization, now)
    }
}

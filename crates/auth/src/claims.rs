use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_core::SubjectId;

/// Purpose of a token. Access and refresh tokens are never interchangeable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Signed claim set carried by every token.
///
/// Timestamps are encoded as Unix nanoseconds so the validity window is
/// exactly the one issued. No other claims are defined, and tokens carrying
/// extra claims are rejected on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    pub subject_id: SubjectId,

    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub expires_at: DateTime<Utc>,

    pub kind: TokenKind,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("wrong token kind (expected {expected}, got {actual})")]
    WrongKind { expected: TokenKind, actual: TokenKind },

    #[error("failed to sign token: {0}")]
    Encoding(String),
}

/// Deterministically validate the time window of decoded claims.
///
/// Signature verification happens before this, in the codec.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenError::Malformed);
    }
    if now >= claims.expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}

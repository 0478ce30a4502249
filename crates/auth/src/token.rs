//! Token codec: issue and verify signed, time-bound identity tokens.
//!
//! Tokens use compact JWS framing (`header.payload.signature`) with an HMAC
//! over the claim set. Only the configured algorithm is accepted on decode.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use rolegate_core::SubjectId;

use crate::claims::{TokenClaims, TokenError, TokenKind, validate_claims};
use crate::config::AuthConfig;

/// A signed token together with the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub token: String,
    pub claims: TokenClaims,
}

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

/// Access + refresh tokens issued together on login/registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: SignedToken,
    pub refresh: SignedToken,
}

pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        // Expiry is checked against the caller-supplied `now` in
        // `validate_claims`, never against the wall clock.
        let mut validation = Validation::new(config.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            algorithm: config.algorithm,
            encoding: EncodingKey::from_secret(&config.secret),
            decoding: DecodingKey::from_secret(&config.secret),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a new token of `kind` for `subject_id`, valid from `now` for the
    /// kind's configured TTL.
    pub fn issue(
        &self,
        subject_id: SubjectId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(self.ttl(kind))
            .ok_or_else(|| TokenError::Encoding(format!("{kind} token expiry out of range")))?;
        let claims = TokenClaims {
            subject_id,
            issued_at: now,
            expires_at,
            kind,
        };
        let token = jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(SignedToken { token, claims })
    }

    pub fn issue_pair(
        &self,
        subject_id: SubjectId,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue(subject_id, TokenKind::Access, now)?,
            refresh: self.issue(subject_id, TokenKind::Refresh, now)?,
        })
    }

    /// Verify signature, algorithm and expiry; return the decoded claims.
    pub fn verify(&self, raw: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(raw, &self.decoding, &self.validation)
            .map_err(|e| map_decode_error(e.kind()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }

    /// [`verify`](Self::verify), then require the token to be of `expected` kind.
    pub fn verify_kind(
        &self,
        raw: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(raw, now)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        Ok(claims)
    }
}

fn map_decode_error(kind: &ErrorKind) -> TokenError {
    match kind {
        // A token signed under another algorithm is not one of ours.
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    }
}

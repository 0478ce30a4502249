//! Token configuration.
//!
//! Values come from the process environment in deployments; tests build the
//! config directly or through [`AuthConfig::from_lookup`].

use chrono::Duration;
use jsonwebtoken::Algorithm;
use thiserror::Error;

pub const SECRET_VAR: &str = "JWT_SECRET_KEY";
pub const ALGORITHM_VAR: &str = "JWT_ALGORITHM";
pub const ACCESS_TTL_VAR: &str = "JWT_ACCESS_TOKEN_EXPIRE_MINUTES";
pub const REFRESH_TTL_VAR: &str = "JWT_REFRESH_TOKEN_EXPIRE_DAYS";

pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

/// One year.
pub const MAX_ACCESS_TTL_MINUTES: i64 = 60 * 24 * 365;
/// Ten years.
pub const MAX_REFRESH_TTL_DAYS: i64 = 365 * 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Settings for the token codec.
#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Vec<u8>,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl AuthConfig {
    /// Defaults (HS256, 30 minute access tokens, 7 day refresh tokens).
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(SECRET_VAR)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing(SECRET_VAR))?;

        let algorithm = match lookup(ALGORITHM_VAR) {
            Some(raw) => parse_algorithm(&raw)?,
            None => Algorithm::HS256,
        };

        let access_ttl = parse_ttl(
            &lookup,
            ACCESS_TTL_VAR,
            DEFAULT_ACCESS_TTL_MINUTES,
            MAX_ACCESS_TTL_MINUTES,
            Duration::try_minutes,
        )?;
        let refresh_ttl = parse_ttl(
            &lookup,
            REFRESH_TTL_VAR,
            DEFAULT_REFRESH_TTL_DAYS,
            MAX_REFRESH_TTL_DAYS,
            Duration::try_days,
        )?;

        Ok(Self {
            secret: secret.into_bytes(),
            algorithm,
            access_ttl,
            refresh_ttl,
        })
    }
}

/// Only symmetric MAC algorithms are accepted.
fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match raw.trim() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::Invalid {
            key: ALGORITHM_VAR,
            reason: format!("unsupported algorithm '{other}' (expected HS256, HS384 or HS512)"),
        }),
    }
}

/// A TTL in whole units, within `1..=max`.
fn parse_ttl<F>(
    lookup: &F,
    key: &'static str,
    default: i64,
    max: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(key) {
        Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("{e}"),
        })?,
        None => default,
    };
    if value <= 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    if value > max {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("must be at most {max}"),
        });
    }
    to_duration(value).ok_or_else(|| ConfigError::Invalid {
        key,
        reason: "out of range".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = AuthConfig::from_lookup(lookup(&[(SECRET_VAR, "s3cret")])).unwrap();
        assert_eq!(config.secret, b"s3cret");
        assert_eq!(config.algorithm, Algorithm::HS256);
        assert_eq!(config.access_ttl, Duration::minutes(30));
        assert_eq!(config.refresh_ttl, Duration::days(7));
    }

    #[test]
    fn secret_is_required() {
        let err = AuthConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(SECRET_VAR));

        let err = AuthConfig::from_lookup(lookup(&[(SECRET_VAR, "")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(SECRET_VAR));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AuthConfig::from_lookup(lookup(&[
            (SECRET_VAR, "k"),
            (ALGORITHM_VAR, "HS512"),
            (ACCESS_TTL_VAR, "5"),
            (REFRESH_TTL_VAR, "1"),
        ]))
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::HS512);
        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_ttl, Duration::days(1));
    }

    #[test]
    fn asymmetric_and_unknown_algorithms_are_rejected() {
        for alg in ["RS256", "none", "ES256"] {
            let err = AuthConfig::from_lookup(lookup(&[(SECRET_VAR, "k"), (ALGORITHM_VAR, alg)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: ALGORITHM_VAR, .. }));
        }
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let err = AuthConfig::from_lookup(lookup(&[(SECRET_VAR, "k"), (ACCESS_TTL_VAR, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ACCESS_TTL_VAR, .. }));

        let err = AuthConfig::from_lookup(lookup(&[(SECRET_VAR, "k"), (REFRESH_TTL_VAR, "x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: REFRESH_TTL_VAR, .. }));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let err = AuthConfig::from_lookup(lookup(&[
            (SECRET_VAR, "k"),
            (ACCESS_TTL_VAR, "9223372036854775807"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ACCESS_TTL_VAR, .. }));

        let err = AuthConfig::from_lookup(lookup(&[
            (SECRET_VAR, "k"),
            (REFRESH_TTL_VAR, "100000000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: REFRESH_TTL_VAR, .. }));
    }

    #[test]
    fn largest_ttls_still_issue_tokens() {
        let max_access = MAX_ACCESS_TTL_MINUTES.to_string();
        let max_refresh = MAX_REFRESH_TTL_DAYS.to_string();
        let config = AuthConfig::from_lookup(lookup(&[
            (SECRET_VAR, "k"),
            (ACCESS_TTL_VAR, max_access.as_str()),
            (REFRESH_TTL_VAR, max_refresh.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.access_ttl, Duration::days(365));
        assert_eq!(config.refresh_ttl, Duration::days(3650));

        let codec = crate::token::TokenCodec::new(&config);
        let subject = rolegate_core::SubjectId::new();
        assert!(codec.issue_pair(subject, chrono::Utc::now()).is_ok());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", AuthConfig::new("top-secret"));
        assert!(!rendered.contains("top-secret"));
    }
}

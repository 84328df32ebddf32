//! Bearer token validation and issuance.
//!
//! Tokens are HS256 JWTs signed with the configured secret. Validation
//! distinguishes three failures: a token that cannot be decoded at all
//! (malformed), one whose signature or issuer does not check out (invalid)
//! and one that verified but is past its expiry (expired).

use std::collections::BTreeSet;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::IdentityClaims;
use crate::config::AuthConfig;
use crate::error::AdmissionError;

/// Pull the token out of an `Authorization` header value.
///
/// Accepts `Bearer <token>` or the bare token. Missing or blank headers mean
/// no credential was supplied, which is not the same as a bad one.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Validates and mints console tokens.
#[derive(Clone)]
pub struct CredentialValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for CredentialValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialValidator")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CredentialValidator {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.issuer.clone(),
            Duration::from_secs(config.token_ttl_secs),
        )
    }

    /// Verify signature, issuer and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<IdentityClaims, AdmissionError> {
        let data = decode::<IdentityClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AdmissionError::CredentialExpired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::MissingRequiredClaim(_) => AdmissionError::CredentialInvalid(e.to_string()),
                _ => AdmissionError::CredentialMalformed(e.to_string()),
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(AdmissionError::CredentialInvalid("empty subject".to_string()));
        }

        Ok(data.claims)
    }

    /// Mint a token for `subject` expiring after the configured TTL.
    pub fn issue(
        &self,
        subject: &str,
        email: &str,
        roles: &BTreeSet<String>,
    ) -> Result<(String, IdentityClaims), jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.issue_at(subject, email, roles, now, now.saturating_add(ttl))
    }

    /// Mint a token with explicit `iat` and `exp` (Unix seconds).
    pub fn issue_at(
        &self,
        subject: &str,
        email: &str,
        roles: &BTreeSet<String>,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<(String, IdentityClaims), jsonwebtoken::errors::Error> {
        let claims = IdentityClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            roles: roles.clone(),
            iat: issued_at,
            exp: expires_at,
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn validator() -> CredentialValidator {
        CredentialValidator::new(SECRET, "proxy-console", Duration::from_secs(3600))
    }

    fn roles(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_bearer_or_raw_token() {
        assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(extract_bearer(Some("abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(extract_bearer(Some("  Bearer   abc ")), Some("abc"));
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[test]
    fn issued_token_validates() {
        let v = validator();
        let (token, issued) = v.issue("42", "a@example.com", &roles(&["admin"])).unwrap();

        let claims = v.validate(&token).unwrap();
        assert_eq!(claims, issued);
        assert!(claims.has_role("admin"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let other = CredentialValidator::new("another-secret-another-secret-xx", "proxy-console", Duration::from_secs(60));
        let (token, _) = other.issue("42", "", &roles(&[])).unwrap();

        assert!(matches!(validator().validate(&token), Err(AdmissionError::CredentialInvalid(_))));
    }

    #[test]
    fn wrong_issuer_is_invalid() {
        let other = CredentialValidator::new(SECRET, "someone-else", Duration::from_secs(60));
        let (token, _) = other.issue("42", "", &roles(&[])).unwrap();

        assert!(matches!(validator().validate(&token), Err(AdmissionError::CredentialInvalid(_))));
    }

    #[test]
    fn expired_token_is_expired() {
        let v = validator();
        let now = chrono::Utc::now().timestamp();
        let (token, _) = v.issue_at("42", "", &roles(&[]), now - 120, now - 60).unwrap();

        assert!(matches!(v.validate(&token), Err(AdmissionError::CredentialExpired)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            validator().validate("not-a-token"),
            Err(AdmissionError::CredentialMalformed(_))
        ));
    }
}

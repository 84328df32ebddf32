//! Admission error taxonomy and the JSON error body.
//!
//! Every failing check maps to exactly one variant. The variant decides the
//! status code; 403 responses share one generic message so callers cannot
//! tell which authorization check failed.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::tiers::RateLimitTier;

#[derive(Debug, Clone, Error)]
pub enum AdmissionError {
    #[error("rate limit exceeded on {tier} tier")]
    RateLimitExceeded {
        tier: RateLimitTier,
        retry_after: Duration,
    },

    #[error("no credential supplied")]
    CredentialMissing,

    #[error("invalid credential: {0}")]
    CredentialInvalid(String),

    #[error("credential expired")]
    CredentialExpired,

    #[error("malformed credential: {0}")]
    CredentialMalformed(String),

    #[error("insufficient role")]
    InsufficientRole,

    #[error("missing permission `{0}`")]
    MissingPermission(String),

    #[error("not the resource owner")]
    NotResourceOwner,

    #[error("denied by access list {0}")]
    AccessListDenied(i64),

    #[error("malformed client address `{0}`")]
    MalformedAddress(String),
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CredentialMissing
            | Self::CredentialInvalid(_)
            | Self::CredentialExpired
            | Self::CredentialMalformed(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientRole
            | Self::MissingPermission(_)
            | Self::NotResourceOwner
            | Self::AccessListDenied(_) => StatusCode::FORBIDDEN,
            Self::MalformedAddress(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable reason label for logs and metrics. Never sent to callers for 403s.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::CredentialMissing => "credential_missing",
            Self::CredentialInvalid(_) => "credential_invalid",
            Self::CredentialExpired => "credential_expired",
            Self::CredentialMalformed(_) => "credential_malformed",
            Self::InsufficientRole => "insufficient_role",
            Self::MissingPermission(_) => "missing_permission",
            Self::NotResourceOwner => "not_resource_owner",
            Self::AccessListDenied(_) => "access_list_denied",
            Self::MalformedAddress(_) => "malformed_address",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "Too many requests, please slow down",
            Self::CredentialMissing => "Authentication required",
            Self::CredentialInvalid(_) | Self::CredentialMalformed(_) => "Invalid credentials",
            Self::CredentialExpired => "Token has expired",
            Self::MalformedAddress(_) => "Client address could not be determined",
            _ => "Forbidden",
        }
    }

    fn public_kind(&self) -> Option<&'static str> {
        match self.status() {
            StatusCode::FORBIDDEN => None,
            // Malformed tokens are reported the same way as forged ones.
            _ if matches!(self, Self::CredentialMalformed(_)) => Some("credential_invalid"),
            _ => Some(self.reason()),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>, error: Option<&str>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            error: error.map(str::to_string),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Emit an error response with the standard body.
pub fn error_response(status: StatusCode, message: impl Into<String>, error: Option<&str>) -> Response {
    (status, Json(ErrorBody::new(status, message, error))).into_response()
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let mut response = error_response(self.status(), self.public_message(), self.public_kind());

        if let Self::RateLimitExceeded { retry_after, .. } = &self {
            let secs = (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

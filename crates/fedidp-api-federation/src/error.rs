//! Error types for the federated IDP.
//!
//! Every failure is rendered as
//! `{error, error_description, gematik_timestamp, gematik_uuid, gematik_code}`.

use axum::{
    extract::rejection::{FormRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use fedidp_auth::AuthError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Upstream bodies are cut to this many characters before they are reported.
const MAX_UPSTREAM_BODY: usize = 512;

/// OAuth2 error codes (RFC 6749).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        };
        write!(f, "{s}")
    }
}

/// Federation error types.
#[derive(Debug, Error)]
pub enum FederationError {
    // Request validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid claims parameter: {0}")]
    InvalidClaimsStructure(String),

    #[error("Claim is not supported: {0}")]
    UnsupportedClaim(String),

    #[error("Claim must not carry a value constraint: {0}")]
    UnexpectedValueConstraint(String),

    #[error("Invalid acr value: {0}")]
    InvalidAcrValue(String),

    #[error("Invalid amr value: {0}")]
    InvalidAmrValue(String),

    #[error("acr and amr values do not fit together: {0}")]
    InvalidAcrAmrCombination(String),

    #[error("Authentication does not meet the requested assurance: {0}")]
    AssuranceNotMet(String),

    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Scope is not supported: {0}")]
    UnsupportedScope(String),

    #[error("Client certificate is missing")]
    MissingCertificate,

    // Client and grant
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Trust chain
    #[error("Signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("Entity statement expired: {0}")]
    StatementExpired(String),

    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    #[error("Malformed entity statement: {0}")]
    MalformedStatement(String),

    #[error("Invalid claim in entity statement: {0}")]
    InvalidStatementClaim(String),

    #[error("Unusable key: {0}")]
    InvalidKey(String),

    #[error("Upstream request to {url} failed")]
    UpstreamUnavailable {
        url: String,
        status: Option<u16>,
        body: String,
    },

    // Certificates
    #[error("Client certificate does not match: {0}")]
    CertificateMismatch(String),

    // Internal
    #[error("Failed to issue token: {0}")]
    TokenIssueFailed(String),

    #[error("No authorization session for request_uri")]
    UnknownRequestUri,

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: OAuthErrorCode,
    pub error_description: String,
    pub gematik_timestamp: i64,
    pub gematik_uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gematik_code: Option<String>,
}

impl FederationError {
    /// Build an upstream failure from a non-success response.
    pub fn upstream(url: impl Into<String>, status: Option<u16>, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.chars().count() > MAX_UPSTREAM_BODY {
            body = body.chars().take(MAX_UPSTREAM_BODY).collect();
        }
        Self::UpstreamUnavailable {
            url: url.into(),
            status,
            body,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CertificateMismatch(_) => StatusCode::UNAUTHORIZED,
            Self::TokenIssueFailed(_) | Self::UnknownRequestUri | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the OAuth2 error code for this error.
    pub fn error_code(&self) -> OAuthErrorCode {
        match self {
            Self::UnsupportedResponseType(_) => OAuthErrorCode::UnsupportedResponseType,
            Self::UnsupportedGrantType(_) => OAuthErrorCode::UnsupportedGrantType,
            Self::UnsupportedScope(_) => OAuthErrorCode::InvalidScope,
            Self::UnknownClient(_) | Self::CertificateMismatch(_) | Self::MissingCertificate => {
                OAuthErrorCode::InvalidClient
            }
            Self::InvalidGrant(_) => OAuthErrorCode::InvalidGrant,
            Self::TokenIssueFailed(_) | Self::UnknownRequestUri | Self::Internal(_) => {
                OAuthErrorCode::ServerError
            }
            _ => OAuthErrorCode::InvalidRequest,
        }
    }

    /// Category code: 1xxx validation, 2xxx trust, 3xxx upstream,
    /// 4xxx certificate, 5xxx internal.
    pub fn gematik_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "1000",
            Self::InvalidClaimsStructure(_) => "1001",
            Self::UnsupportedClaim(_) => "1002",
            Self::UnexpectedValueConstraint(_) => "1003",
            Self::InvalidAcrValue(_) => "1004",
            Self::InvalidAmrValue(_) => "1005",
            Self::InvalidAcrAmrCombination(_) => "1006",
            Self::UnsupportedResponseType(_) => "1007",
            Self::UnsupportedGrantType(_) => "1008",
            Self::UnsupportedScope(_) => "1009",
            Self::InvalidGrant(_) => "1010",
            Self::NotFound(_) => "1011",
            Self::AssuranceNotMet(_) => "1012",
            Self::UnknownClient(_) => "2000",
            Self::InvalidSignature(_) => "2001",
            Self::StatementExpired(_) => "2002",
            Self::MissingClaim(_) => "2003",
            Self::MalformedStatement(_) => "2004",
            Self::InvalidStatementClaim(_) => "2005",
            Self::InvalidKey(_) => "2006",
            Self::UpstreamUnavailable { .. } => "3000",
            Self::MissingCertificate => "4000",
            Self::CertificateMismatch(_) => "4001",
            Self::Internal(_) => "5000",
            Self::TokenIssueFailed(_) => "5001",
            Self::UnknownRequestUri => "5002",
        }
    }

    /// Text placed in `error_description`; internal details stay in the log.
    fn description(&self) -> String {
        match self {
            Self::UpstreamUnavailable { url, status, body } => {
                tracing::warn!(url = %url, status = ?status, body = %body, "Upstream request failed");
                match status {
                    Some(status) => format!("{url} answered with status {status}: {body}"),
                    None => format!("{url} could not be reached"),
                }
            }
            Self::TokenIssueFailed(msg) => {
                tracing::error!("Token issue failed: {}", msg);
                "Failed to issue token".to_string()
            }
            Self::UnknownRequestUri => {
                tracing::error!("request_uri does not resolve to an authorization session");
                "Internal server error".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            Self::InvalidSignature(msg) => {
                tracing::warn!("Signature verification failed: {}", msg);
                self.to_string()
            }
            Self::CertificateMismatch(msg) => {
                tracing::warn!("Client certificate rejected: {}", msg);
                self.to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Convert to the response body.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code(),
            error_description: self.description(),
            gematik_timestamp: Utc::now().timestamp(),
            gematik_uuid: Uuid::new_v4(),
            gematik_code: Some(self.gematik_code().to_string()),
        }
    }
}

impl IntoResponse for FederationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match serde_json::to_string(&self.to_response()) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to serialize error response: {}", e);
                String::from(r#"{"error":"server_error","error_description":"Internal server error"}"#)
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

impl From<AuthError> for FederationError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => FederationError::StatementExpired(err.to_string()),
            AuthError::InvalidSignature => FederationError::InvalidSignature(err.to_string()),
            AuthError::MissingClaim(claim) => FederationError::MissingClaim(claim),
            AuthError::MalformedToken(msg) => FederationError::MalformedStatement(msg),
            AuthError::InvalidAlgorithm(alg) => {
                FederationError::MalformedStatement(format!("unsupported algorithm {alg}"))
            }
            AuthError::InvalidClaim { claim, reason } => {
                FederationError::InvalidStatementClaim(format!("{claim}: {reason}"))
            }
            AuthError::InvalidKey(msg) => FederationError::InvalidKey(msg),
            AuthError::KeyNotFound(kid) => FederationError::InvalidKey(format!("no key {kid}")),
            AuthError::SigningFailed(msg) => FederationError::TokenIssueFailed(msg),
        }
    }
}

impl From<FormRejection> for FederationError {
    fn from(rejection: FormRejection) -> Self {
        FederationError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for FederationError {
    fn from(rejection: QueryRejection) -> Self {
        FederationError::InvalidRequest(rejection.body_text())
    }
}

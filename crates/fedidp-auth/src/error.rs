//! Error types for entity statement and key operations.
//!
//! Provides explicit error variants for all parsing, verification and
//! signing failures of the JOSE layer.

use thiserror::Error;

/// JOSE error types.
///
/// Each variant maps to a specific failure mode when handling entity
/// statements, signed key sets or issued tokens.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // Statement errors
    /// Statement has expired (exp claim is not in the future).
    #[error("Statement has expired")]
    Expired,

    /// Statement signature does not match the supplied key.
    #[error("Invalid statement signature")]
    InvalidSignature,

    /// Compact token is malformed.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Token uses an algorithm outside the supported set.
    #[error("Unsupported algorithm: {0}")]
    InvalidAlgorithm(String),

    /// Required claim or metadata entry is missing.
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// Claim is present but has the wrong shape.
    #[error("Invalid claim {claim}: {reason}")]
    InvalidClaim { claim: String, reason: String },

    // Key errors
    /// Key material is invalid or incomplete.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No key suitable for the requested purpose.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Signing a token failed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl AuthError {
    /// Check if this error indicates an expired statement.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::Expired)
    }

    /// Check if this error indicates a signature mismatch.
    #[must_use]
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, AuthError::InvalidSignature)
    }

    /// Check if this error stems from the shape of the statement rather than
    /// from key material.
    #[must_use]
    pub fn is_statement_error(&self) -> bool {
        matches!(
            self,
            AuthError::Expired
                | AuthError::InvalidSignature
                | AuthError::MalformedToken(_)
                | AuthError::InvalidAlgorithm(_)
                | AuthError::MissingClaim(_)
                | AuthError::InvalidClaim { .. }
        )
    }
}

//! Response models of the federated IDP endpoints.

use serde::{Deserialize, Serialize};

/// Answer to a pushed authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParResponse {
    /// Capability token of the form `urn:<client_id>:<32 hex>`.
    pub request_uri: String,
    pub expires_in: i64,
}

/// Successful token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,
    /// Opaque; no resource server accepts it.
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

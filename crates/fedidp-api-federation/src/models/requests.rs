//! Form and query models of the inbound endpoints.
//!
//! Every field defaults to empty so that missing parameters surface as
//! `invalid_request` from the services instead of as extractor rejections.

use serde::{Deserialize, Serialize};

/// Pushed authorization request (`POST /PAR_Auth`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushedAuthorizationRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub code_challenge: String,
    #[serde(default)]
    pub code_challenge_method: String,
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub acr_values: Option<String>,
    /// JSON `claims` request parameter.
    #[serde(default)]
    pub claims: Option<String>,
}

/// Query of `GET /auth`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub request_uri: Option<String>,
}

/// Token request (`POST /token`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub code_verifier: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub client_assertion_type: Option<String>,
    #[serde(default)]
    pub client_assertion: Option<String>,
}

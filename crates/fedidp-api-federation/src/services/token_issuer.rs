//! ID token issuance.
//!
//! Assembles the ID token from the negotiated session claims and the
//! authenticated user, and signs it with the IDP signing key.

use crate::error::{FederationError, FederationResult};
use crate::services::authenticator::AuthenticatedUser;
use crate::services::clock::SharedClock;
use crate::services::session_store::AuthSession;
use fedidp_auth::{StatementSigner, TYP_JWT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Default ID token lifetime (5 minutes).
pub const DEFAULT_ID_TOKEN_TTL_SECS: i64 = 300;

/// Claims of an issued ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub nonce: String,
    pub acr: String,
    pub amr: Vec<String>,
    /// Negotiated user claims.
    #[serde(flatten)]
    pub user_claims: Map<String, Value>,
}

/// A signed ID token together with its claims.
#[derive(Debug, Clone)]
pub struct IssuedIdToken {
    pub id_token: String,
    pub claims: IdTokenClaims,
    pub expires_in: i64,
}

/// Builds and signs ID tokens.
#[derive(Clone)]
pub struct IdTokenBuilder {
    issuer: String,
    signer: Arc<StatementSigner>,
    ttl_secs: i64,
    clock: SharedClock,
}

impl IdTokenBuilder {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        signer: Arc<StatementSigner>,
        ttl_secs: i64,
        clock: SharedClock,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            signer,
            ttl_secs,
            clock,
        }
    }

    /// The claims of the token for `user` in `session`.
    ///
    /// Only claims requested in the session and known for the user are
    /// copied into the token.
    pub fn build_claims(&self, session: &AuthSession, user: &AuthenticatedUser) -> IdTokenClaims {
        let now = self.clock.now();

        let user_claims = session
            .claims_info
            .requested_claims()
            .filter_map(|name| {
                user.claims
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        IdTokenClaims {
            iss: self.issuer.clone(),
            sub: format!("{}-{}", user.user_id, session.client_id),
            aud: session.client_id.clone(),
            iat: now,
            exp: now + self.ttl_secs,
            nonce: session.nonce.clone(),
            acr: user.acr.clone(),
            amr: user.amr.clone(),
            user_claims,
        }
    }

    /// Build and sign the ID token.
    ///
    /// Fails with `AssuranceNotMet` when the user's `acr`/`amr` fall outside
    /// what the session negotiated.
    #[instrument(skip(self, session, user), fields(client_id = %session.client_id))]
    pub fn issue(
        &self,
        session: &AuthSession,
        user: &AuthenticatedUser,
    ) -> FederationResult<IssuedIdToken> {
        if !session.claims_info.is_satisfied_by(&user.acr, &user.amr) {
            warn!(acr = %user.acr, amr = ?user.amr, "Authentication below negotiated assurance");
            return Err(FederationError::AssuranceNotMet(format!(
                "authenticated at {} by {}",
                user.acr,
                user.amr.join(" ")
            )));
        }

        let claims = self.build_claims(session, user);
        let id_token = self
            .signer
            .sign(TYP_JWT, &claims, true)
            .map_err(|e| FederationError::TokenIssueFailed(e.to_string()))?;

        info!(
            client_id = %session.client_id,
            claim_count = claims.user_claims.len(),
            "ID token issued"
        );

        Ok(IssuedIdToken {
            id_token,
            claims,
            expires_in: self.ttl_secs,
        })
    }
}

//! End-user authentication seam.
//!
//! The broker never authenticates users itself; it asks an authenticator for
//! the identity and claims of the user behind an authorization session.

use crate::error::FederationResult;
use crate::services::claims::amr_for_acr;
use crate::services::session_store::AuthSession;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// An authenticated end user.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    /// Stable identifier, combined with the client id into the token `sub`.
    pub user_id: String,
    pub acr: String,
    pub amr: Vec<String>,
    /// Every claim value known for the user, keyed by claim name.
    pub claims: Map<String, Value>,
}

#[async_trait]
pub trait UserAuthenticator: Send + Sync {
    async fn authenticate(&self, session: &AuthSession) -> FederationResult<AuthenticatedUser>;
}

/// Returns the same insured person for every session.
///
/// The person authenticates at the preferred acceptable `acr`, by a
/// requested `amr` when one fits that level.
#[derive(Debug, Clone, Default)]
pub struct StubAuthenticator;

#[async_trait]
impl UserAuthenticator for StubAuthenticator {
    async fn authenticate(&self, session: &AuthSession) -> FederationResult<AuthenticatedUser> {
        let acr = session.claims_info.preferred_acr();
        let compatible = amr_for_acr(acr);
        let amr = session
            .claims_info
            .amr_values
            .iter()
            .find(|m| compatible.contains(&m.as_str()))
            .cloned()
            .or_else(|| compatible.first().map(|m| (*m).to_string()));

        tracing::debug!(state = %session.state, acr, amr = ?amr, "Using stub authenticator");

        let claims = json!({
            "urn:telematik:claims:profession": "1.2.276.0.76.4.49",
            "urn:telematik:claims:given_name": "Darius Michael Brian Ubbo",
            "urn:telematik:claims:family_name": "Cördes",
            "urn:telematik:claims:organization": "109500969",
            "urn:telematik:claims:id": "X110411675",
            "urn:telematik:claims:display_name": "Darius Michael Brian Ubbo Cördes",
            "urn:telematik:claims:email": "darius.coerdes@example.org",
            "urn:telematik:claims:alter": "47",
            "urn:telematik:claims:geschlecht": "M",
            "birthdate": "1977-06-15",
        });

        Ok(AuthenticatedUser {
            user_id: "X110411675".to_string(),
            acr: acr.to_string(),
            amr: amr.into_iter().collect(),
            claims: match claims {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        })
    }
}

//! The IDP's own federation documents.
//!
//! The self-signed entity statement served under
//! `/.well-known/openid-federation` and the signed JWKS served at
//! `/jws.json`.

use crate::error::{FederationError, FederationResult};
use crate::services::claims::{ACR_HIGH, ACR_SUBSTANTIAL};
use crate::services::clock::SharedClock;
use fedidp_auth::{
    EntityMetadata, EntityStatementClaims, FederationEntityMetadata, OpenidProviderMetadata,
    SignedJwksClaims, StatementSigner, TYP_ENTITY_STATEMENT, TYP_JWK_SET,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Lifetime of the self-signed entity statement (24 hours).
pub const ENTITY_STATEMENT_TTL_SECS: i64 = 86_400;

pub const PAR_PATH: &str = "/PAR_Auth";
pub const AUTHORIZATION_PATH: &str = "/auth";
pub const TOKEN_PATH: &str = "/token";
pub const SIGNED_JWKS_PATH: &str = "/jws.json";

/// Descriptive data published in the `federation_entity` metadata.
#[derive(Debug, Clone, Default)]
pub struct EntityInfo {
    pub name: String,
    pub contacts: Vec<String>,
}

/// Signs the IDP's entity statement and JWKS.
#[derive(Clone)]
pub struct EntityStatementService {
    issuer: String,
    trust_anchor: String,
    signer: Arc<StatementSigner>,
    scopes_supported: Vec<String>,
    entity: EntityInfo,
    clock: SharedClock,
}

impl EntityStatementService {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        trust_anchor: impl Into<String>,
        signer: Arc<StatementSigner>,
        scopes_supported: Vec<String>,
        entity: EntityInfo,
        clock: SharedClock,
    ) -> Self {
        Self {
            issuer: issuer.into().trim_end_matches('/').to_string(),
            trust_anchor: trust_anchor.into(),
            signer,
            scopes_supported,
            entity,
            clock,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.issuer)
    }

    /// Metadata of this IDP in its `openid_provider` role.
    #[must_use]
    pub fn provider_metadata(&self) -> OpenidProviderMetadata {
        let signing_alg = format!("{:?}", self.signer.algorithm());

        OpenidProviderMetadata {
            issuer: self.issuer.clone(),
            pushed_authorization_request_endpoint: self.endpoint(PAR_PATH),
            authorization_endpoint: self.endpoint(AUTHORIZATION_PATH),
            token_endpoint: self.endpoint(TOKEN_PATH),
            signed_jwks_uri: Some(self.endpoint(SIGNED_JWKS_PATH)),
            scopes_supported: self.scopes_supported.clone(),
            acr_values_supported: vec![ACR_HIGH.to_string(), ACR_SUBSTANTIAL.to_string()],
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec!["authorization_code".to_string()],
            require_pushed_authorization_requests: true,
            token_endpoint_auth_methods_supported: vec![
                "self_signed_tls_client_auth".to_string(),
            ],
            id_token_signing_alg_values_supported: vec![signing_alg],
            user_type_supported: Some("IP".to_string()),
        }
    }

    /// Claims of the self-signed entity statement at the current time.
    pub fn statement_claims(&self) -> FederationResult<EntityStatementClaims> {
        let now = self.clock.now();
        let metadata = EntityMetadata::to_claim(&[
            EntityMetadata::OpenidProvider(self.provider_metadata()),
            EntityMetadata::FederationEntity(FederationEntityMetadata {
                federation_fetch_endpoint: None,
                name: Some(self.entity.name.clone()),
                contacts: self.entity.contacts.clone(),
                homepage_uri: Some(self.issuer.clone()),
            }),
        ])
        .map_err(|e| FederationError::Internal(format!("Failed to encode metadata: {e}")))?;

        Ok(EntityStatementClaims {
            iss: self.issuer.clone(),
            sub: self.issuer.clone(),
            iat: now,
            exp: now + ENTITY_STATEMENT_TTL_SECS,
            jwks: self.signer.public_jwks(),
            authority_hints: vec![self.trust_anchor.clone()],
            metadata: Some(metadata),
        })
    }

    /// The signed entity statement.
    #[instrument(skip(self))]
    pub fn entity_statement(&self) -> FederationResult<String> {
        let claims = self.statement_claims()?;
        debug!(issuer = %claims.iss, exp = claims.exp, "Signing entity statement");
        self.signer
            .sign(TYP_ENTITY_STATEMENT, &claims, true)
            .map_err(|e| FederationError::Internal(format!("Failed to sign entity statement: {e}")))
    }

    /// The signed JWKS.
    #[instrument(skip(self))]
    pub fn signed_jwks(&self) -> FederationResult<String> {
        let body = SignedJwksClaims {
            iss: Some(self.issuer.clone()),
            iat: Some(self.clock.now()),
            keys: self.signer.public_jwks().keys,
        };
        self.signer
            .sign(TYP_JWK_SET, &body, true)
            .map_err(|e| FederationError::Internal(format!("Failed to sign JWKS: {e}")))
    }
}

//! Router of the federated IDP.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use fedidp_auth::StatementSigner;

use crate::error::FederationResult;
use crate::handlers::{authorization, federation};
use crate::services::entity_statement::{
    AUTHORIZATION_PATH, PAR_PATH, SIGNED_JWKS_PATH, TOKEN_PATH,
};
use crate::services::trust_chain::ENTITY_STATEMENT_PATH;
use crate::services::{
    AuthFlowService, AuthSessionStore, EntityInfo, EntityStatementService, IdTokenBuilder,
    SharedClock, StubAuthenticator, SystemClock, TrustAnchor, TrustChainResolver,
    UserAuthenticator,
};

/// Shared state for federation handlers.
///
/// The statement caches and the session store live inside the services and
/// are shared by handle across all clones.
#[derive(Clone)]
pub struct FederationState {
    /// PAR, redemption and code exchange.
    pub auth_flow: AuthFlowService,
    /// The IDP's own entity statement and signed JWKS.
    pub entity_statement: EntityStatementService,
}

/// Configuration for the federation router.
#[derive(Clone)]
pub struct FederationConfig {
    /// Issuer URL of this IDP (e.g., "<https://idp.example.com>").
    pub issuer: String,
    pub trust_anchor: TrustAnchor,
    /// Federation signing key, used for the entity statement, JWKS and ID tokens.
    pub signer: StatementSigner,
    pub scopes_supported: Vec<String>,
    /// Timeout of every outbound federation request.
    pub upstream_timeout: Duration,
    pub id_token_ttl_secs: i64,
    /// Reject code exchanges that present no client certificate.
    pub require_client_cert: bool,
    pub entity_name: String,
    pub contacts: Vec<String>,
}

impl FederationState {
    /// Create the state with the system clock and the stub authenticator.
    pub fn new(config: FederationConfig) -> FederationResult<Self> {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(StubAuthenticator))
    }

    /// Create the state with an explicit clock and authenticator.
    pub fn with_parts(
        config: FederationConfig,
        clock: SharedClock,
        authenticator: Arc<dyn UserAuthenticator>,
    ) -> FederationResult<Self> {
        let issuer = config.issuer.trim_end_matches('/').to_string();
        let signer = Arc::new(config.signer);

        let resolver = TrustChainResolver::new(
            config.trust_anchor.clone(),
            config.upstream_timeout,
            Arc::clone(&clock),
        )?;
        let id_tokens = IdTokenBuilder::new(
            issuer.clone(),
            Arc::clone(&signer),
            config.id_token_ttl_secs,
            Arc::clone(&clock),
        );
        let auth_flow = AuthFlowService::new(
            resolver,
            AuthSessionStore::new(Arc::clone(&clock)),
            id_tokens,
            authenticator,
            config.scopes_supported.clone(),
            config.require_client_cert,
            Arc::clone(&clock),
        );
        let entity_statement = EntityStatementService::new(
            issuer,
            config.trust_anchor.issuer,
            signer,
            config.scopes_supported,
            EntityInfo {
                name: config.entity_name,
                contacts: config.contacts,
            },
            clock,
        );

        Ok(Self {
            auth_flow,
            entity_statement,
        })
    }
}

/// Create the federation routes.
///
/// Routes:
/// - GET /.well-known/openid-federation - Self-signed entity statement
/// - GET /jws.json - Signed JWKS
/// - POST /PAR_Auth - Pushed authorization request
/// - GET /auth - Redeem a `request_uri`
/// - POST /token - Exchange an authorization code
pub fn federation_routes() -> Router<FederationState> {
    Router::new()
        .route(ENTITY_STATEMENT_PATH, get(federation::entity_statement))
        .route(SIGNED_JWKS_PATH, get(federation::signed_jwks))
        .route(PAR_PATH, post(authorization::pushed_authorization))
        .route(AUTHORIZATION_PATH, get(authorization::authorize))
        .route(TOKEN_PATH, post(authorization::token))
}

/// Create the full federation router.
pub fn create_federation_router(config: FederationConfig) -> FederationResult<Router> {
    let state = FederationState::new(config)?;
    Ok(router_with_state(state))
}

/// Create the router over an already built state.
pub fn router_with_state(state: FederationState) -> Router {
    federation_routes().with_state(state)
}

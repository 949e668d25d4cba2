//! Authorization flow of the federated IDP.
//!
//! Pushed authorization request, redemption of the returned `request_uri`,
//! and the authorization-code exchange with PKCE and mTLS client binding.
//! Sessions move PAR_ACCEPTED -> REDEEMED -> EXCHANGED without a stored
//! status; a session stays retrievable until it expires or is evicted.

use crate::error::{FederationError, FederationResult};
use crate::models::{ParResponse, PushedAuthorizationRequest, TokenRequest, TokenResponse};
use crate::services::authenticator::UserAuthenticator;
use crate::services::claims::{validate_acr_values, ClaimsInfo, SCOPE_OPENID};
use crate::services::client_cert::{matches_any, parse_client_cert_header};
use crate::services::clock::SharedClock;
use crate::services::session_store::{AuthSession, AuthSessionStore, SESSION_TTL_SECS};
use crate::services::token_issuer::IdTokenBuilder;
use crate::services::trust_chain::TrustChainResolver;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

/// Random bytes in authorization codes and request URIs.
const TOKEN_BYTES: usize = 16;

/// Random bytes in the opaque access token.
const ACCESS_TOKEN_BYTES: usize = 32;

const MIN_CODE_CHALLENGE_LEN: usize = 43;
const MAX_CODE_CHALLENGE_LEN: usize = 128;

/// Runs the authorization flow.
#[derive(Clone)]
pub struct AuthFlowService {
    resolver: TrustChainResolver,
    sessions: AuthSessionStore,
    id_tokens: IdTokenBuilder,
    authenticator: Arc<dyn UserAuthenticator>,
    scopes_supported: Arc<BTreeSet<String>>,
    require_client_cert: bool,
    clock: SharedClock,
}

impl AuthFlowService {
    #[must_use]
    pub fn new(
        resolver: TrustChainResolver,
        sessions: AuthSessionStore,
        id_tokens: IdTokenBuilder,
        authenticator: Arc<dyn UserAuthenticator>,
        scopes_supported: impl IntoIterator<Item = String>,
        require_client_cert: bool,
        clock: SharedClock,
    ) -> Self {
        Self {
            resolver,
            sessions,
            id_tokens,
            authenticator,
            scopes_supported: Arc::new(scopes_supported.into_iter().collect()),
            require_client_cert,
            clock,
        }
    }

    /// Generate a PKCE code challenge from a verifier using S256.
    #[must_use]
    pub fn generate_code_challenge(code_verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let hash = hasher.finalize();
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// Verify a PKCE code verifier against a code challenge.
    #[must_use]
    pub fn verify_code_verifier(code_verifier: &str, code_challenge: &str) -> bool {
        let computed_challenge = Self::generate_code_challenge(code_verifier);
        subtle::ConstantTimeEq::ct_eq(computed_challenge.as_bytes(), code_challenge.as_bytes())
            .into()
    }

    /// Validate the pushed authorization request parameters.
    pub fn validate_par_request(request: &PushedAuthorizationRequest) -> FederationResult<()> {
        if request.response_type != "code" {
            return Err(FederationError::UnsupportedResponseType(
                request.response_type.clone(),
            ));
        }

        for (name, value) in [
            ("client_id", &request.client_id),
            ("state", &request.state),
            ("redirect_uri", &request.redirect_uri),
            ("nonce", &request.nonce),
            ("scope", &request.scope),
        ] {
            if value.trim().is_empty() {
                return Err(FederationError::InvalidRequest(format!("{name} is required")));
            }
        }

        if request.code_challenge_method != "S256" {
            return Err(FederationError::InvalidRequest(
                "code_challenge_method must be S256".to_string(),
            ));
        }

        let challenge = &request.code_challenge;
        if challenge.len() < MIN_CODE_CHALLENGE_LEN
            || challenge.len() > MAX_CODE_CHALLENGE_LEN
            || !challenge
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FederationError::InvalidRequest(format!(
                "code_challenge must be {MIN_CODE_CHALLENGE_LEN}-{MAX_CODE_CHALLENGE_LEN} base64url characters"
            )));
        }

        if !request.scope.split_whitespace().any(|s| s == SCOPE_OPENID) {
            return Err(FederationError::InvalidRequest(
                "scope must contain openid".to_string(),
            ));
        }

        if let Some(acr_values) = &request.acr_values {
            validate_acr_values(acr_values)?;
        }
        Ok(())
    }

    /// Accept a pushed authorization request and open a session.
    #[instrument(skip(self, request), fields(client_id = %request.client_id, state = %request.state))]
    pub async fn pushed_authorization(
        &self,
        request: PushedAuthorizationRequest,
    ) -> FederationResult<ParResponse> {
        Self::validate_par_request(&request)?;

        let chain = self.resolver.resolve(&request.client_id).await?;
        let rp = chain.relying_party_metadata()?;

        if !rp.allows_redirect_uri(&request.redirect_uri) {
            warn!(redirect_uri = %request.redirect_uri, "redirect_uri not registered by relying party");
            return Err(FederationError::InvalidRequest(
                "redirect_uri is not registered for this client".to_string(),
            ));
        }

        let declared: BTreeSet<&str> = rp.scopes().collect();
        let requested_scopes: Vec<String> =
            request.scope.split_whitespace().map(str::to_string).collect();
        for scope in &requested_scopes {
            if !declared.contains(scope.as_str()) || !self.scopes_supported.contains(scope) {
                return Err(FederationError::UnsupportedScope(scope.clone()));
            }
        }

        let mut claims_info = ClaimsInfo::parse(request.claims.as_deref())?;
        claims_info.add_claims_from_scopes(&request.scope);
        if let Some(acr_values) = &request.acr_values {
            claims_info.merge_acr_values(&validate_acr_values(acr_values)?)?;
        }

        let authorization_code = random_hex(TOKEN_BYTES);
        let request_uri = format!("urn:{}:{}", request.client_id, random_hex(TOKEN_BYTES));

        let session = AuthSession {
            state: request.state,
            client_id: request.client_id,
            code_challenge: request.code_challenge,
            code_challenge_method: request.code_challenge_method,
            nonce: request.nonce,
            requested_scopes,
            claims_info,
            redirect_uri: request.redirect_uri,
            authorization_code,
            request_uri: request_uri.clone(),
            expires_at: self.clock.now() + SESSION_TTL_SECS,
        };
        let client_id = session.client_id.clone();
        if let Some(evicted) = self.sessions.insert(session).await {
            warn!(evicted_state = %evicted.state, "Session store full, evicted oldest session");
        }

        info!(client_id = %client_id, "Pushed authorization request accepted");

        Ok(ParResponse {
            request_uri,
            expires_in: SESSION_TTL_SECS,
        })
    }

    /// Resolve a `request_uri` into the redirect back to the relying party.
    #[instrument(skip(self))]
    pub async fn redeem(&self, request_uri: &str) -> FederationResult<Url> {
        let session = self
            .sessions
            .find_by_request_uri(request_uri)
            .await
            .ok_or(FederationError::UnknownRequestUri)?;

        let mut location = Url::parse(&session.redirect_uri).map_err(|e| {
            FederationError::Internal(format!("Stored redirect_uri is not a URL: {e}"))
        })?;
        location
            .query_pairs_mut()
            .append_pair("code", &session.authorization_code)
            .append_pair("state", &session.state);

        info!(client_id = %session.client_id, state = %session.state, "Authorization request redeemed");
        Ok(location)
    }

    /// Exchange an authorization code for an ID token.
    ///
    /// `client_cert` is the forwarded mTLS certificate header, if any.
    #[instrument(skip(self, request, client_cert), fields(client_id = %request.client_id))]
    pub async fn exchange_code(
        &self,
        request: TokenRequest,
        client_cert: Option<&str>,
    ) -> FederationResult<TokenResponse> {
        if request.grant_type != "authorization_code" {
            return Err(FederationError::UnsupportedGrantType(request.grant_type));
        }

        let session = self
            .sessions
            .find_by_code(&request.code)
            .await
            .ok_or_else(|| {
                FederationError::InvalidGrant("unknown or expired authorization code".to_string())
            })?;

        if !Self::verify_code_verifier(&request.code_verifier, &session.code_challenge) {
            warn!(state = %session.state, "PKCE verification failed");
            return Err(FederationError::InvalidGrant(
                "code_verifier does not match code_challenge".to_string(),
            ));
        }
        if request.redirect_uri != session.redirect_uri {
            return Err(FederationError::InvalidGrant(
                "redirect_uri does not match the authorization request".to_string(),
            ));
        }
        if request.client_id != session.client_id {
            return Err(FederationError::InvalidGrant(
                "client_id does not match the authorization request".to_string(),
            ));
        }

        self.check_client_certificate(&session.client_id, client_cert)
            .await?;

        let user = self.authenticator.authenticate(&session).await?;
        let issued = self.id_tokens.issue(&session, &user)?;

        info!(client_id = %session.client_id, state = %session.state, "Authorization code exchanged");

        Ok(TokenResponse {
            id_token: issued.id_token,
            access_token: random_hex(ACCESS_TOKEN_BYTES),
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
        })
    }

    async fn check_client_certificate(
        &self,
        client_id: &str,
        client_cert: Option<&str>,
    ) -> FederationResult<()> {
        let Some(header) = client_cert.filter(|c| !c.trim().is_empty()) else {
            if self.require_client_cert {
                return Err(FederationError::MissingCertificate);
            }
            return Ok(());
        };

        let presented = parse_client_cert_header(header)?;
        let chain = self.resolver.resolve(client_id).await?;
        let published = match self.resolver.tls_client_certs(&chain).await {
            Ok(certs) => certs,
            Err(FederationError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        if !matches_any(&presented, &published) {
            return Err(FederationError::CertificateMismatch(format!(
                "client certificate does not match any certificate published by {client_id}"
            )));
        }
        Ok(())
    }
}

fn random_hex(len: usize) -> String {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

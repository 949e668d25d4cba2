//! Trust chain resolution for relying parties.
//!
//! A relying party is trusted once two statements verify: the trust anchor's
//! statement about it (signed by the pinned trust-anchor key) and its own
//! self-issued statement (signed by the key the first statement publishes).

use crate::error::{FederationError, FederationResult};
use crate::services::clock::SharedClock;
use crate::services::statement_cache::{AnchorIssued, SelfIssued, StatementCache};
use fedidp_auth::{AuthError, EntityStatement, Jwk, JwkSet, RelyingPartyMetadata, SignedJwks};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default timeout of outbound federation requests.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Path under which every entity publishes its self-issued statement.
pub const ENTITY_STATEMENT_PATH: &str = "/.well-known/openid-federation";

/// The federation master every trust chain ends in.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub issuer: String,
    /// Endpoint answering `?iss=<anchor>&sub=<entity>`.
    pub fetch_endpoint: String,
    /// Pinned key the anchor signs its statements with.
    pub public_key: Jwk,
}

/// Both verified statements of a relying party.
#[derive(Debug, Clone)]
pub struct TrustChain {
    pub statement_about_rp: EntityStatement,
    pub rp_statement: EntityStatement,
}

impl TrustChain {
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.rp_statement.issuer()
    }

    pub fn relying_party_metadata(&self) -> FederationResult<RelyingPartyMetadata> {
        Ok(self.rp_statement.relying_party_metadata()?)
    }

    /// The relying party's federation key as vouched for by the trust anchor.
    pub fn federation_key(&self) -> FederationResult<&Jwk> {
        first_signing_key(&self.statement_about_rp)
    }
}

/// Resolves and caches trust chains.
#[derive(Clone)]
pub struct TrustChainResolver {
    trust_anchor: Arc<TrustAnchor>,
    statements_about_rp: StatementCache<AnchorIssued>,
    rp_statements: StatementCache<SelfIssued>,
    http_client: reqwest::Client,
    clock: SharedClock,
}

impl TrustChainResolver {
    /// Create a resolver whose outbound requests time out after `timeout`.
    pub fn new(
        trust_anchor: TrustAnchor,
        timeout: Duration,
        clock: SharedClock,
    ) -> FederationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FederationError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(trust_anchor, http_client, clock))
    }

    /// Create a resolver with a custom HTTP client.
    pub fn with_client(
        trust_anchor: TrustAnchor,
        http_client: reqwest::Client,
        clock: SharedClock,
    ) -> Self {
        Self {
            trust_anchor: Arc::new(trust_anchor),
            statements_about_rp: StatementCache::new(Arc::clone(&clock)),
            rp_statements: StatementCache::new(Arc::clone(&clock)),
            http_client,
            clock,
        }
    }

    #[must_use]
    pub fn trust_anchor(&self) -> &TrustAnchor {
        &self.trust_anchor
    }

    /// Resolve both statements of `client_id`, the anchor's statement first.
    #[instrument(skip(self))]
    pub async fn resolve(&self, client_id: &str) -> FederationResult<TrustChain> {
        Url::parse(client_id)
            .map_err(|_| FederationError::UnknownClient(client_id.to_string()))?;

        let statement_about_rp = self.statement_about_rp(client_id).await?;
        let rp_statement = self.statement_of_rp(client_id).await?;

        Ok(TrustChain {
            statement_about_rp,
            rp_statement,
        })
    }

    /// The trust anchor's statement about `sub`, verified with the pinned key.
    #[instrument(skip(self))]
    pub async fn statement_about_rp(&self, sub: &str) -> FederationResult<EntityStatement> {
        self.statements_about_rp
            .get_or_refresh(sub, || async move {
                let mut url = Url::parse(&self.trust_anchor.fetch_endpoint).map_err(|e| {
                    FederationError::Internal(format!("Invalid fetch endpoint: {e}"))
                })?;
                url.query_pairs_mut()
                    .append_pair("iss", &self.trust_anchor.issuer)
                    .append_pair("sub", sub);

                let body = self.fetch(url).await?;
                let statement = EntityStatement::parse(body.trim())?;
                if statement.subject() != sub {
                    warn!(sub = %sub, returned = %statement.subject(), "Trust anchor answered for another subject");
                    return Err(FederationError::UnknownClient(sub.to_string()));
                }

                statement
                    .verify_at(&self.trust_anchor.public_key, self.clock.now())
                    .map_err(|e| {
                        trust_failure(e, "statement of the federation master about the relying party")
                    })?;

                info!(sub = %sub, exp = statement.expires_at(), "Verified statement about relying party");
                Ok(statement)
            })
            .await
    }

    /// The relying party's self-issued statement, verified with the key the
    /// trust anchor publishes for it.
    #[instrument(skip(self))]
    pub async fn statement_of_rp(&self, issuer: &str) -> FederationResult<EntityStatement> {
        self.rp_statements
            .get_or_refresh(issuer, || async move {
                let url = entity_statement_url(issuer)?;
                let body = self.fetch(url).await?;
                let statement = EntityStatement::parse(body.trim())?;
                if statement.issuer() != issuer {
                    warn!(issuer = %issuer, returned = %statement.issuer(), "Entity statement names another issuer");
                    return Err(FederationError::UnknownClient(issuer.to_string()));
                }

                let about = self.statement_about_rp(issuer).await?;
                let key = first_signing_key(&about)?;
                statement
                    .verify_at(key, self.clock.now())
                    .map_err(|e| trust_failure(e, "entity statement of the relying party"))?;

                info!(issuer = %issuer, exp = statement.expires_at(), "Verified entity statement of relying party");
                Ok(statement)
            })
            .await
    }

    /// The relying party's encryption key.
    #[instrument(skip(self, chain), fields(client_id = %chain.client_id()))]
    pub async fn encryption_key(&self, chain: &TrustChain) -> FederationResult<Jwk> {
        self.find_keys(chain, |set| set.encryption_key().cloned().into_iter().collect())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FederationError::NotFound("encryption key of the relying party".to_string()))
    }

    /// The relying party's TLS client certificates.
    #[instrument(skip(self, chain), fields(client_id = %chain.client_id()))]
    pub async fn tls_client_certs(&self, chain: &TrustChain) -> FederationResult<Vec<Jwk>> {
        let certs = self
            .find_keys(chain, |set| {
                set.tls_client_certs().into_iter().cloned().collect()
            })
            .await?;
        if certs.is_empty() {
            return Err(FederationError::NotFound(
                "TLS client certificates of the relying party".to_string(),
            ));
        }
        Ok(certs)
    }

    /// Search the statement's own key sets, then the signed JWKS.
    async fn find_keys<F>(&self, chain: &TrustChain, select: F) -> FederationResult<Vec<Jwk>>
    where
        F: Fn(&JwkSet) -> Vec<Jwk>,
    {
        let metadata = chain.relying_party_metadata()?;

        for set in [metadata.jwks.as_ref(), Some(chain.rp_statement.jwks())]
            .into_iter()
            .flatten()
        {
            let found = select(set);
            if !found.is_empty() {
                return Ok(found);
            }
        }

        let Some(uri) = metadata.signed_jwks_uri.as_deref() else {
            return Ok(Vec::new());
        };
        let signed = self.signed_jwks(chain, uri).await?;
        Ok(select(&signed))
    }

    async fn signed_jwks(&self, chain: &TrustChain, uri: &str) -> FederationResult<JwkSet> {
        let url = Url::parse(uri)
            .map_err(|e| FederationError::InvalidRequest(format!("Invalid signed_jwks_uri: {e}")))?;
        let body = self.fetch(url).await?;
        let signed = SignedJwks::parse(body.trim())?;
        signed
            .verify(chain.federation_key()?)
            .map_err(|e| trust_failure(e, "signed JWKS of the relying party"))?;

        debug!(uri = %uri, "Verified signed JWKS");
        Ok(signed.key_set())
    }

    async fn fetch(&self, url: Url) -> FederationResult<String> {
        debug!(url = %url, "Fetching federation document");
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FederationError::upstream(url.as_str(), None, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FederationError::upstream(url.as_str(), Some(status.as_u16()), e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            return Err(FederationError::upstream(
                url.as_str(),
                Some(status.as_u16()),
                body,
            ));
        }
        Ok(body)
    }
}

/// `<issuer>/.well-known/openid-federation`
pub fn entity_statement_url(issuer: &str) -> FederationResult<Url> {
    Url::parse(&format!(
        "{}{ENTITY_STATEMENT_PATH}",
        issuer.trim_end_matches('/')
    ))
    .map_err(|_| FederationError::UnknownClient(issuer.to_string()))
}

fn first_signing_key(statement: &EntityStatement) -> FederationResult<&Jwk> {
    statement.jwks().first_signing_key().ok_or_else(|| {
        FederationError::InvalidSignature(format!(
            "statement about {} publishes no signing key",
            statement.subject()
        ))
    })
}

fn trust_failure(err: AuthError, what: &str) -> FederationError {
    match err {
        AuthError::InvalidSignature => {
            warn!(statement = what, "Signature verification failed");
            FederationError::InvalidSignature(format!("signature of the {what} does not verify"))
        }
        AuthError::Expired => FederationError::StatementExpired(what.to_string()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::FixedClock;
    use crate::test_fixtures::{
        anchor_statement_claims, other_jwk, public_jwk, rp_statement_claims, sign_statement,
        statement_signer, NOW,
    };
    use fedidp_auth::TYP_JWK_SET;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ANCHOR: &str = "https://fedmaster.example";

    fn resolver(server: &MockServer, pinned: Jwk, clock: FixedClock) -> TrustChainResolver {
        TrustChainResolver::new(
            TrustAnchor {
                issuer: ANCHOR.to_string(),
                fetch_endpoint: format!("{}/federation/fetch", server.uri()),
                public_key: pinned,
            },
            Duration::from_millis(500),
            Arc::new(clock),
        )
        .unwrap()
    }

    fn rp_metadata(server: &MockServer) -> Value {
        json!({
            "redirect_uris": [format!("{}/cb", server.uri())],
            "scope": "openid urn:telematik:versicherter",
            "signed_jwks_uri": format!("{}/jws.json", server.uri()),
        })
    }

    async fn mount_anchor(server: &MockServer, rp_key: &Jwk, exp: i64, expected: u64) {
        let rp = server.uri();
        Mock::given(method("GET"))
            .and(path("/federation/fetch"))
            .and(query_param("iss", ANCHOR))
            .and(query_param("sub", rp.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(sign_statement(
                &anchor_statement_claims(ANCHOR, &rp, rp_key, exp),
            )))
            .expect(expected)
            .mount(server)
            .await;
    }

    async fn mount_rp(server: &MockServer, metadata: Value, exp: i64, expected: u64) {
        Mock::given(method("GET"))
            .and(path(ENTITY_STATEMENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(sign_statement(
                &rp_statement_claims(&server.uri(), ANCHOR, metadata, exp),
            )))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_resolve_and_cache() {
        let server = MockServer::start().await;
        mount_anchor(&server, &public_jwk("puk_fd_sig"), NOW + 3600, 1).await;
        mount_rp(&server, rp_metadata(&server), NOW + 3600, 1).await;

        let resolver = resolver(&server, public_jwk("puk_fedmaster_sig"), FixedClock::new(NOW));

        let chain = resolver.resolve(&server.uri()).await.unwrap();
        assert_eq!(chain.client_id(), server.uri());
        assert_eq!(chain.statement_about_rp.issuer(), ANCHOR);

        let again = resolver.resolve(&server.uri()).await.unwrap();
        assert_eq!(again.rp_statement.raw(), chain.rp_statement.raw());
    }

    #[tokio::test]
    async fn test_stale_statement_is_refetched() {
        let server = MockServer::start().await;
        mount_anchor(&server, &public_jwk("puk_fd_sig"), NOW + 60, 2).await;
        mount_rp(&server, rp_metadata(&server), NOW + 3600, 1).await;

        let clock = FixedClock::new(NOW);
        let resolver = resolver(&server, public_jwk("ta"), clock.clone());

        resolver.resolve(&server.uri()).await.unwrap();
        clock.advance(60);
        // Only the anchor's statement went stale; the RP statement stays cached.
        let result = resolver.resolve(&server.uri()).await;

        // Re-fetched anchor statement carries the same exp and is still expired.
        assert!(matches!(result, Err(FederationError::StatementExpired(_))));
    }

    #[tokio::test]
    async fn test_anchor_error_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/federation/fetch"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unknown entity"))
            .mount(&server)
            .await;

        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        let err = resolver.resolve(&server.uri()).await.unwrap_err();

        match err {
            FederationError::UpstreamUnavailable { status, body, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(body, "unknown entity");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/federation/fetch"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        let err = resolver.statement_about_rp(&server.uri()).await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::UpstreamUnavailable { status: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_wrong_pinned_key_rejected() {
        let server = MockServer::start().await;
        mount_anchor(&server, &public_jwk("puk_fd_sig"), NOW + 3600, 1).await;

        let resolver = resolver(&server, other_jwk(), FixedClock::new(NOW));
        let err = resolver.resolve(&server.uri()).await.unwrap_err();

        assert!(matches!(err, FederationError::InvalidSignature(ref m) if m.contains("about the relying party")));
    }

    #[tokio::test]
    async fn test_rp_statement_must_match_anchor_key() {
        let server = MockServer::start().await;
        mount_anchor(&server, &other_jwk(), NOW + 3600, 1).await;
        mount_rp(&server, rp_metadata(&server), NOW + 3600, 1).await;

        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        let err = resolver.resolve(&server.uri()).await.unwrap_err();

        assert!(matches!(err, FederationError::InvalidSignature(ref m) if m.contains("of the relying party")));
    }

    #[tokio::test]
    async fn test_non_url_client_id_is_unknown() {
        let server = MockServer::start().await;
        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        assert!(matches!(
            resolver.resolve("not a url").await,
            Err(FederationError::UnknownClient(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_from_signed_jwks() {
        let server = MockServer::start().await;
        mount_anchor(&server, &public_jwk("puk_fd_sig"), NOW + 3600, 1).await;
        mount_rp(&server, rp_metadata(&server), NOW + 3600, 1).await;

        let tls = public_jwk("puk_tls_sig").with_x5c(vec!["AQID".to_string()]);
        let enc = public_jwk("puk_fd_enc").with_use("enc");
        let signed = statement_signer()
            .sign(
                TYP_JWK_SET,
                &json!({ "iss": server.uri(), "iat": NOW, "keys": [tls, enc] }),
                false,
            )
            .unwrap();
        Mock::given(method("GET"))
            .and(path("/jws.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(signed))
            .mount(&server)
            .await;

        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        let chain = resolver.resolve(&server.uri()).await.unwrap();

        let key = resolver.encryption_key(&chain).await.unwrap();
        assert_eq!(key.kid.as_deref(), Some("puk_fd_enc"));

        let certs = resolver.tls_client_certs(&chain).await.unwrap();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].leaf_certificate(), Some("AQID"));
    }

    #[tokio::test]
    async fn test_keys_from_metadata_skip_signed_jwks() {
        let server = MockServer::start().await;
        let tls = public_jwk("puk_tls_sig").with_x5c(vec!["AQID".to_string()]);
        let metadata = json!({
            "redirect_uris": [format!("{}/cb", server.uri())],
            "scope": "openid",
            "jwks": { "keys": [tls] },
            "signed_jwks_uri": format!("{}/jws.json", server.uri()),
        });
        mount_anchor(&server, &public_jwk("puk_fd_sig"), NOW + 3600, 1).await;
        mount_rp(&server, metadata, NOW + 3600, 1).await;
        Mock::given(method("GET"))
            .and(path("/jws.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        let chain = resolver.resolve(&server.uri()).await.unwrap();

        assert_eq!(resolver.tls_client_certs(&chain).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_keys_not_found() {
        let server = MockServer::start().await;
        let metadata = json!({ "redirect_uris": [], "scope": "openid" });
        mount_anchor(&server, &public_jwk("puk_fd_sig"), NOW + 3600, 1).await;
        mount_rp(&server, metadata, NOW + 3600, 1).await;

        let resolver = resolver(&server, public_jwk("ta"), FixedClock::new(NOW));
        let chain = resolver.resolve(&server.uri()).await.unwrap();

        assert!(matches!(
            resolver.encryption_key(&chain).await,
            Err(FederationError::NotFound(_))
        ));
        assert!(matches!(
            resolver.tls_client_certs(&chain).await,
            Err(FederationError::NotFound(_))
        ));
    }

    #[test]
    fn test_entity_statement_url() {
        assert_eq!(
            entity_statement_url("https://rp.example/").unwrap().as_str(),
            "https://rp.example/.well-known/openid-federation"
        );
    }
}

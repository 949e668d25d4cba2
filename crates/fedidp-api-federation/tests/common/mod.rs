//! Shared setup for the federation integration tests.
//!
//! A single `wiremock` server plays the federation master and the relying
//! party: it answers the fetch endpoint, the relying party's entity statement
//! and its signed JWKS. The relying party's `client_id` is the server's URI.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fedidp_api_federation::{
    router_with_state, FederationConfig, FederationState, FixedClock, StubAuthenticator,
    TrustAnchor,
};
use fedidp_auth::{StatementSigner, TYP_ENTITY_STATEMENT, TYP_JWK_SET};
use http::{header, Request, Response, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ANCHOR: &str = "https://fedmaster.example";
pub const IDP_ISSUER: &str = "https://idp.example";

/// Code verifier from RFC 7636, appendix B.
pub const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CODE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// DER bytes standing in for the relying party's TLS client certificate.
pub const CLIENT_CERT_DER: &[u8] = b"\x30\x82\x02\x0a relying party tls certificate";

pub use fedidp_auth::test_keys::{public_jwk, TEST_MODULUS, TEST_PRIVATE_KEY};

pub fn signer(kid: &str) -> StatementSigner {
    StatementSigner::from_pem(kid, TEST_PRIVATE_KEY, public_jwk(kid)).expect("test key is valid")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn client_cert_pem(der: &[u8]) -> String {
    ::pem::encode(&::pem::Pem::new("CERTIFICATE", der.to_vec()))
}

/// The forwarded certificate header as a TLS terminator sends it.
pub fn client_cert_header(der: &[u8]) -> String {
    percent_encoding::utf8_percent_encode(&client_cert_pem(der), percent_encoding::NON_ALPHANUMERIC)
        .to_string()
}

/// A wiremock federation with one registered relying party.
pub struct TestFederation {
    pub server: MockServer,
}

/// Route service logs to the test output; `RUST_LOG` narrows them.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fedidp_api_federation=debug".into()),
        )
        .try_init();
}

impl TestFederation {
    pub async fn start() -> Self {
        init_test_logging();
        let server = MockServer::start().await;
        let federation = Self { server };
        federation.mount().await;
        federation
    }

    pub fn client_id(&self) -> String {
        self.server.uri()
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/cb", self.server.uri())
    }

    async fn mount(&self) {
        let rp = self.client_id();
        let iat = now();
        let exp = iat + 3600;

        let about_rp = json!({
            "iss": ANCHOR,
            "sub": rp,
            "iat": iat,
            "exp": exp,
            "jwks": { "keys": [public_jwk("puk_fd_sig")] },
        });
        Mock::given(method("GET"))
            .and(path("/federation/fetch"))
            .and(query_param("iss", ANCHOR))
            .and(query_param("sub", rp.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                signer("puk_fedmaster_sig")
                    .sign(TYP_ENTITY_STATEMENT, &about_rp, false)
                    .expect("sign"),
            ))
            .mount(&self.server)
            .await;

        let rp_statement = json!({
            "iss": rp,
            "sub": rp,
            "iat": iat,
            "exp": exp,
            "jwks": { "keys": [public_jwk("puk_fd_sig")] },
            "authority_hints": [ANCHOR],
            "metadata": {
                "openid_relying_party": {
                    "redirect_uris": [self.redirect_uri()],
                    "scope": "openid urn:telematik:versicherter urn:telematik:email urn:telematik:given_name",
                    "signed_jwks_uri": format!("{rp}/jws.json"),
                    "client_name": "Test Fachdienst",
                },
            },
        });
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-federation"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                signer("puk_fd_sig")
                    .sign(TYP_ENTITY_STATEMENT, &rp_statement, false)
                    .expect("sign"),
            ))
            .mount(&self.server)
            .await;

        let tls_key = public_jwk("puk_tls_sig").with_x5c(vec![STANDARD.encode(CLIENT_CERT_DER)]);
        let signed_jwks = json!({ "iss": rp, "iat": iat, "keys": [tls_key] });
        Mock::given(method("GET"))
            .and(path("/jws.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                signer("puk_fd_sig")
                    .sign(TYP_JWK_SET, &signed_jwks, false)
                    .expect("sign"),
            ))
            .mount(&self.server)
            .await;
    }

    pub fn config(&self, require_client_cert: bool) -> FederationConfig {
        FederationConfig {
            issuer: IDP_ISSUER.to_string(),
            trust_anchor: TrustAnchor {
                issuer: ANCHOR.to_string(),
                fetch_endpoint: format!("{}/federation/fetch", self.server.uri()),
                public_key: public_jwk("puk_fedmaster_sig"),
            },
            signer: signer("puk_idp_sig"),
            scopes_supported: fedidp_api_federation::services::default_supported_scopes(),
            upstream_timeout: Duration::from_secs(5),
            id_token_ttl_secs: 300,
            require_client_cert,
            entity_name: "Test IDP".to_string(),
            contacts: vec!["ops@idp.example".to_string()],
        }
    }

    pub fn app(&self, require_client_cert: bool) -> Router {
        self.app_with_clock(require_client_cert, FixedClock::at_system_time())
    }

    /// The router over a clock the test keeps a handle to.
    pub fn app_with_clock(&self, require_client_cert: bool, clock: FixedClock) -> Router {
        let state = FederationState::with_parts(
            self.config(require_client_cert),
            Arc::new(clock),
            Arc::new(StubAuthenticator),
        )
        .expect("state builds");
        router_with_state(state)
    }

    /// Form parameters of a valid pushed authorization request.
    pub fn par_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id()),
            ("state", "state-4711".to_string()),
            ("redirect_uri", self.redirect_uri()),
            ("code_challenge", CODE_CHALLENGE.to_string()),
            ("code_challenge_method", "S256".to_string()),
            ("response_type", "code".to_string()),
            ("nonce", "nonce-0815".to_string()),
            ("scope", "openid urn:telematik:versicherter".to_string()),
            ("acr_values", "gematik-ehealth-loa-high".to_string()),
        ]
    }
}

pub fn form_body(params: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

pub fn form_request(uri: &str, params: &[(&str, String)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body(params)))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Run PAR and redemption, returning the authorization code.
pub async fn authorize(app: &Router, federation: &TestFederation) -> String {
    authorize_with(app, &federation.par_params()).await
}

/// Push `params` and return the `request_uri`.
pub async fn push(app: &Router, params: &[(&str, String)]) -> String {
    let response = send(app, form_request("/PAR_Auth", params)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["request_uri"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Run PAR with `params` and redemption, returning the authorization code.
pub async fn authorize_with(app: &Router, params: &[(&str, String)]) -> String {
    let request_uri = push(app, params).await;

    let response = send(app, redeem_request(&request_uri)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = url::Url::parse(
        response.headers()[header::LOCATION].to_str().unwrap(),
    )
    .unwrap();
    location
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

pub fn redeem_request(request_uri: &str) -> Request<Body> {
    let query = form_body(&[("request_uri", request_uri.to_string())]);
    Request::builder()
        .method("GET")
        .uri(format!("/auth?{query}"))
        .body(Body::empty())
        .unwrap()
}

pub fn token_params(federation: &TestFederation, code: &str) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("code_verifier", CODE_VERIFIER.to_string()),
        ("client_id", federation.client_id()),
        ("redirect_uri", federation.redirect_uri()),
    ]
}

pub fn token_request(
    federation: &TestFederation,
    code: &str,
    client_cert: Option<&[u8]>,
) -> Request<Body> {
    let mut request = form_request("/token", &token_params(federation, code));
    if let Some(der) = client_cert {
        request.headers_mut().insert(
            "x-ssl-client-cert",
            client_cert_header(der).parse().unwrap(),
        );
    }
    request
}

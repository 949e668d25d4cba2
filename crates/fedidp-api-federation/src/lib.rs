//! Federated identity provider for the telematik OpenID federation.
//!
//! The IDP authenticates insured persons on behalf of relying parties
//! ("Fachdienste") that are registered with the federation master.
//!
//! # Flow
//!
//! 1. The relying party pushes its authorization request (`POST /PAR_Auth`).
//!    The IDP resolves the relying party's trust chain, negotiates scopes and
//!    claims, and answers with a `request_uri`.
//! 2. The user agent redeems the `request_uri` (`GET /auth`) and is sent back
//!    to the relying party with an authorization code.
//! 3. The relying party exchanges the code (`POST /token`) over mTLS with PKCE
//!    and receives a signed ID token.
//!
//! # Endpoints
//!
//! - `GET /.well-known/openid-federation` - Self-signed entity statement
//! - `GET /jws.json` - Signed JWKS
//! - `POST /PAR_Auth` - Pushed authorization request
//! - `GET /auth` - Authorization (request_uri redemption)
//! - `POST /token` - Token endpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use fedidp_api_federation::{create_federation_router, FederationConfig};
//!
//! let app = create_federation_router(config)?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8083").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

#[cfg(test)]
mod test_fixtures;

pub use error::{ErrorResponse, FederationError, FederationResult, OAuthErrorCode};
pub use router::{
    create_federation_router, federation_routes, router_with_state, FederationConfig,
    FederationState,
};
pub use services::{
    AuthenticatedUser, FixedClock, StubAuthenticator, SystemClock, TrustAnchor,
    UserAuthenticator,
};

//! Services of the federated IDP.

pub mod auth_flow;
pub mod authenticator;
pub mod claims;
pub mod client_cert;
pub mod clock;
pub mod entity_statement;
pub mod session_store;
pub mod statement_cache;
pub mod token_issuer;
pub mod trust_chain;

pub use auth_flow::AuthFlowService;
pub use authenticator::{AuthenticatedUser, StubAuthenticator, UserAuthenticator};
pub use claims::{claims_for_scope, default_supported_scopes, ClaimsInfo};
pub use client_cert::CLIENT_CERT_HEADER;
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use entity_statement::{EntityInfo, EntityStatementService};
pub use session_store::{AuthSession, AuthSessionStore, MAX_SESSIONS, SESSION_TTL_SECS};
pub use statement_cache::{AnchorIssued, SelfIssued, StatementCache, StatementCacheStats};
pub use token_issuer::{IdTokenBuilder, IdTokenClaims, IssuedIdToken, DEFAULT_ID_TOKEN_TTL_SECS};
pub use trust_chain::{TrustAnchor, TrustChain, TrustChainResolver, DEFAULT_UPSTREAM_TIMEOUT};

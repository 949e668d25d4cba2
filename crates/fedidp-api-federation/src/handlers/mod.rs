//! HTTP handlers of the federated IDP.

pub mod authorization;
pub mod federation;

pub use authorization::*;
pub use federation::*;

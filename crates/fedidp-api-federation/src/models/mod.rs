//! Request and response models for the federated IDP endpoints.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;

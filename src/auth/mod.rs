//! # Auth Module
//!
//! OAuth identity federation and session issuance:
//! - Provider signing-key retrieval (`keys`)
//! - Identity token verification (`verifier`)
//! - External identity to local user mapping (`identity`)
//! - Session token issuance and validation (`session`)
//! - The sign-in flow tying them together (`signin`)
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod keys;
pub mod models;
pub mod providers;
pub mod routes;
pub mod session;
pub mod signin;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use identity::IdentityResolver;
pub use keys::KeySource;
pub use providers::ProviderRegistry;
pub use routes::auth_routes;
pub use session::SessionIssuer;
pub use signin::OAuthSignInHandler;
pub use verifier::TokenVerifier;

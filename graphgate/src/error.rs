//! Errors from the stdio entry point.
//!
//! Every variant is a startup failure; once the session is serving, problems
//! are reported to the client as JSON-RPC errors instead.

use graphgate_core::auth::EndpointKind;
use graphgate_core::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum StdioError {
    /// No credential was supplied for the selected endpoint.
    #[error("no credential for the {endpoint} endpoint: set {source_hint}")]
    MissingCredential {
        endpoint: EndpointKind,
        source_hint: &'static str,
    },

    /// Environment configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The startup credential could not be exchanged for a token.
    ///
    /// The cause is logged by the token cache; it is not repeated here.
    #[error("authentication failed for the {endpoint} endpoint")]
    AuthenticationFailed { endpoint: EndpointKind },
}

//! CLI argument types for `graphgate stdio`.
//!
//! Defined outside `main.rs` so integration tests can parse them directly.

use clap::{Args, ValueEnum};
use graphgate_core::auth::EndpointKind;

use crate::error::StdioError;

pub const ENV_PARTNER_API_KEY: &str = "GRAPHGATE_PARTNER_API_KEY";
pub const ENV_MANAGER_TOKEN: &str = "GRAPHGATE_MANAGER_TOKEN";

/// Arguments for `graphgate stdio`.
///
/// Upstream URLs and timeouts come from the same `GRAPHGATE_*` variables as
/// the HTTP server.
#[derive(Args, Debug)]
pub struct StdioArgs {
    /// Which API this session talks to.
    #[arg(long, value_enum)]
    pub endpoint: CliEndpoint,

    /// Partner API key or `client_id:client_secret`.
    #[arg(long, env = ENV_PARTNER_API_KEY, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Manager bearer token, passed through unmodified.
    #[arg(long, env = ENV_MANAGER_TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// Enable debug logging on stderr.
    #[arg(long)]
    pub verbose: bool,
}

impl StdioArgs {
    /// The credential for the selected endpoint.
    ///
    /// # Errors
    ///
    /// `StdioError::MissingCredential` when the endpoint's credential is
    /// absent or blank.
    pub fn credential(&self) -> Result<&str, StdioError> {
        let (value, source) = match self.endpoint {
            CliEndpoint::Partner => (self.api_key.as_deref(), "--api-key or GRAPHGATE_PARTNER_API_KEY"),
            CliEndpoint::Manager => (self.token.as_deref(), "--token or GRAPHGATE_MANAGER_TOKEN"),
        };
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(StdioError::MissingCredential {
                endpoint: self.endpoint.into(),
                source_hint: source,
            }),
        }
    }
}

/// CLI-level endpoint selection. Maps 1:1 to [`EndpointKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliEndpoint {
    /// Partner API, authenticated by API-key exchange.
    Partner,
    /// Manager API, authenticated by bearer passthrough.
    Manager,
}

impl From<CliEndpoint> for EndpointKind {
    fn from(endpoint: CliEndpoint) -> Self {
        match endpoint {
            CliEndpoint::Partner => EndpointKind::Partner,
            CliEndpoint::Manager => EndpointKind::Manager,
        }
    }
}

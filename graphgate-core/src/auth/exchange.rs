//! API-key to bearer-token exchange against the upstream token endpoint.
//!
//! No retries: a failed exchange surfaces on the request that triggered it.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Credential;

/// Internal cause of an authentication failure.
///
/// These are logged; clients only ever see a generic unauthorized error.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("no credential supplied")]
    Missing,

    /// The credential does not have a recognised shape.
    #[error("malformed credential: {0}")]
    Malformed(&'static str),

    /// The token endpoint rejected the credential (401/403).
    #[error("credential rejected by token endpoint (HTTP {status})")]
    Rejected { status: u16 },

    /// The token endpoint could not be reached.
    #[error("token endpoint unreachable: {0}")]
    Unreachable(String),

    /// The token endpoint returned another non-2xx status.
    #[error("token endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The token endpoint returned a body without the required fields.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    /// Short reason label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Malformed(_) => "malformed_credential",
            AuthError::Rejected { .. } => "rejected",
            AuthError::Unreachable(_) => "unreachable",
            AuthError::Status { .. } => "upstream_status",
            AuthError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, PartialEq, Deserialize)]
pub struct ExchangedToken {
    pub access_token: String,
    /// Declared lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub partner_code: Option<String>,
}

impl std::fmt::Debug for ExchangedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangedToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("partner_code", &self.partner_code)
            .finish()
    }
}

/// Exchanges a credential for an upstream bearer token.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, credential: &Credential) -> Result<ExchangedToken, AuthError>;
}

#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum ExchangeRequest<'a> {
    ClientCredentials {
        client_id: &'a str,
        client_secret: &'a str,
    },
    ApiKey {
        api_key: &'a str,
    },
}

impl<'a> From<&'a Credential> for ExchangeRequest<'a> {
    fn from(credential: &'a Credential) -> Self {
        match credential {
            Credential::ClientCredentials {
                client_id,
                client_secret,
            } => ExchangeRequest::ClientCredentials {
                client_id,
                client_secret,
            },
            Credential::ApiKey(key) => ExchangeRequest::ApiKey { api_key: key },
        }
    }
}

/// [`TokenExchanger`] that POSTs JSON to the token endpoint.
#[derive(Clone)]
pub struct HttpTokenExchanger {
    client: Client,
    token_url: String,
}

impl HttpTokenExchanger {
    /// `client` is shared with the GraphQL client so both use one pool.
    pub fn new(client: Client, token_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
        }
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    #[tracing::instrument(skip_all, fields(kind = credential.kind()))]
    async fn exchange(&self, credential: &Credential) -> Result<ExchangedToken, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&ExchangeRequest::from(credential))
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;
        let token: ExchangedToken = serde_json::from_slice(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "access_token is empty".to_string(),
            ));
        }

        debug!(
            expires_in = ?token.expires_in,
            has_partner_code = token.partner_code.is_some(),
            "Token exchange succeeded"
        );
        Ok(token)
    }
}

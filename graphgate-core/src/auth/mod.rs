//! Client authentication.
//!
//! Partner clients present an API key which is exchanged for an upstream
//! bearer token (see [`cache::TokenCache`]). Manager clients present a bearer
//! token that is passed through unmodified.

pub mod cache;
pub mod exchange;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use cache::{TokenCache, TokenCacheConfig};
pub use exchange::{AuthError, ExchangedToken, HttpTokenExchanger, TokenExchanger};

/// Logical upstream a session or tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Partner-facing API, authenticated by API key exchange.
    Partner,
    /// Manager-facing API, authenticated by bearer passthrough.
    Manager,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 2] = [EndpointKind::Partner, EndpointKind::Manager];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Partner => "partner",
            EndpointKind::Manager => "manager",
        }
    }

    /// Authentication method clients of this endpoint use.
    pub fn auth_method(&self) -> AuthMethod {
        match self {
            EndpointKind::Partner => AuthMethod::ApiKey,
            EndpointKind::Manager => AuthMethod::Bearer,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "partner" => Ok(EndpointKind::Partner),
            "manager" => Ok(EndpointKind::Manager),
            other => Err(format!("unknown endpoint '{other}' (expected partner or manager)")),
        }
    }
}

/// How a session's token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey,
    Bearer,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::ApiKey => "api_key",
            AuthMethod::Bearer => "bearer",
        }
    }
}

/// Upstream token bound to a session for its whole lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct BoundToken {
    pub token: String,
    pub partner_code: Option<String>,
    pub method: AuthMethod,
}

impl BoundToken {
    /// Wrap a client-supplied bearer token without exchanging it.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            partner_code: None,
            method: AuthMethod::Bearer,
        }
    }
}

// Tokens must never reach logs through a derived Debug.
impl fmt::Debug for BoundToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundToken")
            .field("token", &"<redacted>")
            .field("partner_code", &self.partner_code)
            .field("method", &self.method)
            .finish()
    }
}

/// A parsed partner credential.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `client_id:client_secret`
    ClientCredentials { client_id: String, client_secret: String },
    /// Opaque pre-issued API key.
    ApiKey(String),
}

impl Credential {
    /// Parse a raw credential string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Malformed` for empty input, input containing
    /// whitespace or control characters, or a colon form with an empty half.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        if raw.is_empty() {
            return Err(AuthError::Malformed("empty credential"));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AuthError::Malformed(
                "credential contains whitespace or control characters",
            ));
        }

        match raw.split_once(':') {
            Some((id, secret)) => {
                if id.is_empty() || secret.is_empty() {
                    return Err(AuthError::Malformed("client id or secret is empty"));
                }
                Ok(Credential::ClientCredentials {
                    client_id: id.to_string(),
                    client_secret: secret.to_string(),
                })
            }
            None => Ok(Credential::ApiKey(raw.to_string())),
        }
    }

    /// Kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ClientCredentials { .. } => "client_credentials",
            Credential::ApiKey(_) => "api_key",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_credentials() {
        let cred = Credential::parse("abc:s3cret").unwrap();
        assert_eq!(
            cred,
            Credential::ClientCredentials {
                client_id: "abc".to_string(),
                client_secret: "s3cret".to_string()
            }
        );
        assert_eq!(cred.kind(), "client_credentials");
    }

    #[test]
    fn test_parse_opaque_key() {
        let cred = Credential::parse("pk_live_123").unwrap();
        assert_eq!(cred, Credential::ApiKey("pk_live_123".to_string()));
    }

    #[test]
    fn test_secret_may_contain_colon() {
        let cred = Credential::parse("id:sec:ret").unwrap();
        let Credential::ClientCredentials { client_secret, .. } = cred else {
            panic!("expected client credentials");
        };
        assert_eq!(client_secret, "sec:ret");
    }

    #[test]
    fn test_malformed_credentials() {
        for raw in ["", ":secret", "id:", "has space", "tab\there", "nl\n"] {
            assert!(
                matches!(Credential::parse(raw), Err(AuthError::Malformed(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::parse("abc:topsecret").unwrap();
        assert!(!format!("{cred:?}").contains("topsecret"));

        let token = BoundToken::bearer("tok-xyz");
        assert!(!format!("{token:?}").contains("tok-xyz"));
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer  abc "), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("abc"), None);
    }

    #[test]
    fn test_endpoint_kind_from_str() {
        assert_eq!("partner".parse::<EndpointKind>(), Ok(EndpointKind::Partner));
        assert_eq!("MANAGER".parse::<EndpointKind>(), Ok(EndpointKind::Manager));
        assert!("admin".parse::<EndpointKind>().is_err());
        assert_eq!(EndpointKind::Partner.auth_method(), AuthMethod::ApiKey);
    }
}

//! Environment configuration shared by the HTTP server and the stdio CLI.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `GRAPHGATE_PARTNER_GRAPHQL_URL` | `http://localhost:4000/partner/graphql` |
//! | `GRAPHGATE_MANAGER_GRAPHQL_URL` | `http://localhost:4000/manager/graphql` |
//! | `GRAPHGATE_TOKEN_URL` | `http://localhost:4000/auth/token` |
//! | `GRAPHGATE_TOKEN_TTL_SECS` | `3300` |
//! | `GRAPHGATE_TOKEN_EXPIRY_MARGIN_SECS` | `60` |
//! | `GRAPHGATE_REQUEST_TIMEOUT_SECS` | `30` |
//! | `GRAPHGATE_CONNECT_TIMEOUT_SECS` | `5` |
//!
//! An unparseable value is a startup error, not a fallback to the default.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::auth::{HttpTokenExchanger, TokenCache, TokenCacheConfig};
use crate::graphql::{GraphqlClient, UpstreamConfig};
use crate::metrics::GraphGateMetrics;

pub const ENV_PARTNER_GRAPHQL_URL: &str = "GRAPHGATE_PARTNER_GRAPHQL_URL";
pub const ENV_MANAGER_GRAPHQL_URL: &str = "GRAPHGATE_MANAGER_GRAPHQL_URL";
pub const ENV_TOKEN_URL: &str = "GRAPHGATE_TOKEN_URL";
pub const ENV_TOKEN_TTL_SECS: &str = "GRAPHGATE_TOKEN_TTL_SECS";
pub const ENV_TOKEN_EXPIRY_MARGIN_SECS: &str = "GRAPHGATE_TOKEN_EXPIRY_MARGIN_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "GRAPHGATE_REQUEST_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "GRAPHGATE_CONNECT_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: expected a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: invalid URL '{value}': {reason}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphGateConfig {
    pub partner_graphql_url: Url,
    pub manager_graphql_url: Url,
    pub token_url: Url,
    pub token_ttl: Duration,
    pub token_expiry_margin: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

pub const DEFAULT_PARTNER_GRAPHQL_URL: &str = "http://localhost:4000/partner/graphql";
pub const DEFAULT_MANAGER_GRAPHQL_URL: &str = "http://localhost:4000/manager/graphql";
pub const DEFAULT_TOKEN_URL: &str = "http://localhost:4000/auth/token";
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3300);
const DEFAULT_TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl GraphGateConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            partner_graphql_url: url_var(&lookup, ENV_PARTNER_GRAPHQL_URL, DEFAULT_PARTNER_GRAPHQL_URL)?,
            manager_graphql_url: url_var(&lookup, ENV_MANAGER_GRAPHQL_URL, DEFAULT_MANAGER_GRAPHQL_URL)?,
            token_url: url_var(&lookup, ENV_TOKEN_URL, DEFAULT_TOKEN_URL)?,
            token_ttl: secs_var(&lookup, ENV_TOKEN_TTL_SECS, DEFAULT_TOKEN_TTL)?,
            token_expiry_margin: secs_var(
                &lookup,
                ENV_TOKEN_EXPIRY_MARGIN_SECS,
                DEFAULT_TOKEN_EXPIRY_MARGIN,
            )?,
            request_timeout: secs_var(&lookup, ENV_REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT)?,
            connect_timeout: secs_var(&lookup, ENV_CONNECT_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Invariants
    /// 1. `token_ttl` is non-zero
    /// 2. `request_timeout` and `connect_timeout` are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_ttl.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "{ENV_TOKEN_TTL_SECS} must be greater than zero"
            )));
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request and connect timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn token_cache_config(&self) -> TokenCacheConfig {
        TokenCacheConfig {
            ttl_ceiling: self.token_ttl,
            expiry_margin: self.token_expiry_margin,
        }
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            ..UpstreamConfig::default()
        }
    }

    /// Build the token cache and GraphQL client over one shared HTTP client.
    pub fn build_upstreams(
        &self,
        metrics: Option<Arc<GraphGateMetrics>>,
    ) -> Result<(TokenCache, GraphqlClient), ConfigError> {
        let client = self
            .upstream_config()
            .build_client()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        let exchanger = Arc::new(HttpTokenExchanger::new(client.clone(), self.token_url.as_str()));
        let mut cache = TokenCache::new(exchanger, self.token_cache_config());
        let mut graphql = GraphqlClient::new(
            client,
            self.partner_graphql_url.as_str(),
            self.manager_graphql_url.as_str(),
        );
        if let Some(metrics) = metrics {
            cache = cache.with_metrics(Arc::clone(&metrics));
            graphql = graphql.with_metrics(metrics);
        }
        Ok((cache, graphql))
    }
}

fn url_var<F>(lookup: &F, var: &'static str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    let url = Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
        var,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            var,
            value,
            reason: "scheme must be http or https".to_string(),
        });
    }
    Ok(url)
}

fn secs_var<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

//! Credential → upstream token cache with TTL-based expiry.
//!
//! The cache is a time-boxed memoization of [`TokenExchanger::exchange`], not
//! authoritative storage. Entries are keyed by a SHA-256 digest of the raw
//! credential so the secret itself is never held as a map key.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::exchange::{AuthError, TokenExchanger};
use super::{AuthMethod, BoundToken, Credential};
use crate::error::GraphGateError;
use crate::metrics::{GraphGateMetrics, outcome};

/// Expiry settings for cached tokens.
#[derive(Debug, Clone)]
pub struct TokenCacheConfig {
    /// Upper bound on how long any token is cached.
    pub ttl_ceiling: Duration,
    /// Subtracted from the upstream-declared lifetime.
    pub expiry_margin: Duration,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ceiling: Duration::from_secs(3300),
            expiry_margin: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    partner_code: Option<String>,
    expires_at: Instant,
}

/// Token cache shared by every partner session and the stdio entry point.
pub struct TokenCache {
    entries: DashMap<String, CachedToken>,
    exchanger: Arc<dyn TokenExchanger>,
    config: TokenCacheConfig,
    metrics: Option<Arc<GraphGateMetrics>>,
}

impl TokenCache {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, config: TokenCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            exchanger,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GraphGateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Authenticate a raw credential, collapsing every failure into a generic
    /// unauthorized error. The specific cause is logged.
    pub async fn authenticate(&self, raw: &str) -> Result<BoundToken, GraphGateError> {
        self.try_authenticate(raw).await.map_err(|e| {
            warn!(reason = e.reason(), error = %e, "Credential exchange failed");
            GraphGateError::Unauthorized
        })
    }

    /// Authenticate a raw credential, returning the specific failure cause.
    ///
    /// A cached, unexpired token is returned without a network call. On a
    /// miss the credential is exchanged and the result cached; failures are
    /// never cached.
    pub async fn try_authenticate(&self, raw: &str) -> Result<BoundToken, AuthError> {
        let credential = match Credential::parse(raw) {
            Ok(c) => c,
            Err(e) => {
                self.record(outcome::FAILURE);
                return Err(e);
            }
        };
        let key = cache_key(raw);

        if let Some(hit) = self.lookup(&key) {
            self.record(outcome::HIT);
            debug!("Token cache hit");
            return Ok(hit);
        }

        let exchanged = match self.exchanger.exchange(&credential).await {
            Ok(t) => t,
            Err(e) => {
                self.record(outcome::FAILURE);
                return Err(e);
            }
        };
        self.record(outcome::MISS);

        let lifetime = self.lifetime(exchanged.expires_in);
        if lifetime.is_zero() {
            debug!(
                expires_in = ?exchanged.expires_in,
                "Token lifetime within expiry margin, not caching"
            );
        } else {
            self.entries.insert(
                key,
                CachedToken {
                    token: exchanged.access_token.clone(),
                    partner_code: exchanged.partner_code.clone(),
                    expires_at: Instant::now() + lifetime,
                },
            );
        }

        Ok(BoundToken {
            token: exchanged.access_token,
            partner_code: exchanged.partner_code,
            method: AuthMethod::ApiKey,
        })
    }

    /// Number of cached credentials that have not expired.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries, returning how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn lookup(&self, key: &str) -> Option<BoundToken> {
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|entry| {
            (entry.expires_at > now).then(|| BoundToken {
                token: entry.token.clone(),
                partner_code: entry.partner_code.clone(),
                method: AuthMethod::ApiKey,
            })
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    fn lifetime(&self, expires_in: Option<u64>) -> Duration {
        match expires_in {
            Some(secs) => Duration::from_secs(secs)
                .saturating_sub(self.config.expiry_margin)
                .min(self.config.ttl_ceiling),
            None => self.config.ttl_ceiling,
        }
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_token_lookup(outcome);
        }
    }
}

fn cache_key(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

//! Session registry for the Streamable HTTP transport.
//!
//! A session binds a server-generated id to a [`ChannelTransport`], the
//! token obtained when the session was initialized, and the endpoint it was
//! created under. The token is never re-exchanged for the life of the
//! session.
//!
//! Entries leave the registry on DELETE, when their transport closes, or on
//! shutdown through [`SessionRegistry::close_all`].

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{AuthMethod, BoundToken, EndpointKind};
use crate::error::GraphGateError;
use crate::metrics::GraphGateMetrics;
use crate::protocol::{McpServer, SessionContext};
use crate::transport::{ChannelTransport, Transport};

/// A live session.
pub struct SessionEntry {
    pub id: String,
    pub transport: Arc<ChannelTransport>,
    pub token: BoundToken,
    pub endpoint: EndpointKind,
    pub created_at: Instant,
}

impl SessionEntry {
    pub fn auth_method(&self) -> AuthMethod {
        self.token.method
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("auth_method", &self.token.method)
            .field("closed", &self.transport.is_closed())
            .finish()
    }
}

/// Session counts reported on `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub partner: usize,
    pub manager: usize,
    pub total: usize,
}

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionEntry>>,
    server: Arc<McpServer>,
    metrics: Option<Arc<GraphGateMetrics>>,
}

impl SessionRegistry {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            sessions: DashMap::new(),
            server,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GraphGateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Create a session, register it and start its dispatcher loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(self: &Arc<Self>, endpoint: EndpointKind, token: BoundToken) -> Arc<SessionEntry> {
        let id = Uuid::new_v4().to_string();
        let transport = Arc::new(ChannelTransport::new());
        let entry = Arc::new(SessionEntry {
            id: id.clone(),
            transport: Arc::clone(&transport),
            token: token.clone(),
            endpoint,
            created_at: Instant::now(),
        });

        self.sessions.insert(id.clone(), Arc::clone(&entry));
        self.publish_gauge(endpoint);

        let registry: Weak<Self> = Arc::downgrade(self);
        let closed_id = id.clone();
        transport.on_close(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&closed_id);
            }
        }));

        let ctx = Arc::new(SessionContext {
            endpoint,
            token,
            session_id: Some(id.clone()),
        });
        tokio::spawn(Arc::clone(&self.server).serve(transport, ctx));

        info!(
            session_id = %id,
            endpoint = %endpoint,
            auth_method = entry.auth_method().as_str(),
            "Session created"
        );
        entry
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Resolve a presented session id on `endpoint`.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` for unknown or terminated ids
    /// - `SessionEndpointMismatch` when the session belongs to the other
    ///   endpoint
    pub fn lookup(&self, id: &str, endpoint: EndpointKind) -> Result<Arc<SessionEntry>, GraphGateError> {
        let entry = self.get(id).ok_or(GraphGateError::SessionNotFound)?;
        if entry.endpoint != endpoint {
            return Err(GraphGateError::SessionEndpointMismatch {
                session_endpoint: entry.endpoint,
                requested_endpoint: endpoint,
            });
        }
        Ok(entry)
    }

    /// Drop an entry without closing its transport.
    pub fn remove(&self, id: &str) -> Option<Arc<SessionEntry>> {
        let (_, entry) = self.sessions.remove(id)?;
        self.publish_gauge(entry.endpoint);
        debug!(session_id = %id, "Session removed");
        Some(entry)
    }

    /// Close and remove a session presented on `endpoint`.
    pub async fn terminate(&self, id: &str, endpoint: EndpointKind) -> Result<(), GraphGateError> {
        self.lookup(id, endpoint)?;
        // A concurrent DELETE may have won the race.
        let entry = self.remove(id).ok_or(GraphGateError::SessionNotFound)?;
        if let Err(e) = entry.transport.close().await {
            warn!(session_id = %id, error = %e, "Failed to close session transport");
        }
        info!(
            session_id = %id,
            endpoint = %endpoint,
            age_secs = entry.age().as_secs(),
            "Session terminated"
        );
        Ok(())
    }

    /// Close every session. Failures are logged and not retried.
    ///
    /// Returns the number of sessions closed.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            let Some(entry) = self.remove(&id) else {
                continue;
            };
            match entry.transport.close().await {
                Ok(()) => closed += 1,
                Err(e) => warn!(session_id = %id, error = %e, "Failed to close session on shutdown"),
            }
        }
        info!(closed, "All sessions closed");
        closed
    }

    pub fn counts(&self) -> SessionCounts {
        let mut counts = SessionCounts::default();
        for entry in self.sessions.iter() {
            match entry.endpoint {
                EndpointKind::Partner => counts.partner += 1,
                EndpointKind::Manager => counts.manager += 1,
            }
        }
        counts.total = counts.partner + counts.manager;
        counts
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn publish_gauge(&self, endpoint: EndpointKind) {
        if let Some(metrics) = &self.metrics {
            let count = self
                .sessions
                .iter()
                .filter(|e| e.endpoint == endpoint)
                .count();
            metrics.set_sessions_active(endpoint, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::{GraphqlError, GraphqlExecutor};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct NoUpstream;

    #[async_trait]
    impl GraphqlExecutor for NoUpstream {
        async fn execute(
            &self,
            _endpoint: EndpointKind,
            _token: &BoundToken,
            _document: &str,
            _variables: Value,
        ) -> Result<Value, GraphqlError> {
            Err(GraphqlError::Transport("no upstream in tests".to_string()))
        }
    }

    fn registry() -> Arc<SessionRegistry> {
        let server = McpServer::new(Arc::new(ToolRegistry::builtin()), Arc::new(NoUpstream));
        Arc::new(SessionRegistry::new(Arc::new(server)))
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let registry = registry();
        let entry = registry.create(EndpointKind::Partner, BoundToken::bearer("t"));

        let found = registry.lookup(&entry.id, EndpointKind::Partner).unwrap();
        assert!(Arc::ptr_eq(&found.transport, &entry.transport));
        assert_eq!(found.auth_method(), AuthMethod::Bearer);
    }

    #[tokio::test]
    async fn test_unique_ids() {
        let registry = registry();
        let a = registry.create(EndpointKind::Partner, BoundToken::bearer("t"));
        let b = registry.create(EndpointKind::Partner, BoundToken::bearer("t"));
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_cross_endpoint_lookup_rejected() {
        let registry = registry();
        let entry = registry.create(EndpointKind::Partner, BoundToken::bearer("t"));

        let err = registry.lookup(&entry.id, EndpointKind::Manager).unwrap_err();
        assert_eq!(
            err,
            GraphGateError::SessionEndpointMismatch {
                session_endpoint: EndpointKind::Partner,
                requested_endpoint: EndpointKind::Manager,
            }
        );
        // The session itself is untouched.
        assert!(registry.lookup(&entry.id, EndpointKind::Partner).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let registry = registry();
        assert_eq!(
            registry.lookup("nope", EndpointKind::Partner).unwrap_err(),
            GraphGateError::SessionNotFound
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_twice() {
        let registry = registry();
        let entry = registry.create(EndpointKind::Manager, BoundToken::bearer("t"));

        registry.terminate(&entry.id, EndpointKind::Manager).await.unwrap();
        assert!(entry.transport.is_closed());
        assert_eq!(
            registry.terminate(&entry.id, EndpointKind::Manager).await,
            Err(GraphGateError::SessionNotFound)
        );
        assert_eq!(
            registry.terminate("never-existed", EndpointKind::Manager).await,
            Err(GraphGateError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn test_transport_close_removes_entry() {
        let registry = registry();
        let entry = registry.create(EndpointKind::Partner, BoundToken::bearer("t"));
        entry.transport.close().await.unwrap();
        assert!(registry.get(&entry.id).is_none());
    }

    #[tokio::test]
    async fn test_counts_and_close_all() {
        let registry = registry();
        registry.create(EndpointKind::Partner, BoundToken::bearer("t"));
        registry.create(EndpointKind::Partner, BoundToken::bearer("t"));
        registry.create(EndpointKind::Manager, BoundToken::bearer("t"));

        assert_eq!(
            registry.counts(),
            SessionCounts {
                partner: 2,
                manager: 1,
                total: 3
            }
        );
        assert_eq!(registry.close_all().await, 3);
        assert_eq!(registry.counts(), SessionCounts::default());
    }

    #[tokio::test]
    async fn test_session_dispatches_requests() {
        let registry = registry();
        let entry = registry.create(EndpointKind::Partner, BoundToken::bearer("t"));

        let rx = entry
            .transport
            .request(
                crate::jsonrpc::JsonRpcId::Number(1),
                json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
            )
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap()["result"], json!({}));
    }
}

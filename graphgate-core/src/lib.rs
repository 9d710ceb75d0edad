//! GraphGate Core: MCP access to the partner and manager GraphQL APIs.
//!
//! This library holds everything both entry points share: credential
//! exchange and caching, the GraphQL client, the static tool catalog, the
//! transport abstraction, the MCP dispatcher and the session registry. The
//! Streamable HTTP server (`graphgate-server`) and the stdio CLI
//! (`graphgate`) are thin shells around it.

pub mod auth;
pub mod config;
pub mod error;
pub mod graphql;
pub mod jsonrpc;
pub mod lifecycle;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;

pub use error::GraphGateError;

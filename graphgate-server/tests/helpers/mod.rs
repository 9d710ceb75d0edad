//! Test helpers for GraphGate server integration tests.
//!
//! - Mock upstream: token endpoint plus partner and manager GraphQL APIs
//! - In-process router client built on `tower::ServiceExt::oneshot`

#![allow(unused_imports)] // Not every test file uses every helper

pub mod mock_graphql;
pub mod test_client;

pub use mock_graphql::*;
pub use test_client::*;

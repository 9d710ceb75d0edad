//! GraphGate stdio entry point for subprocess-launched agents.
//!
//! `graphgate stdio --endpoint partner|manager` serves one MCP session over
//! newline-delimited JSON on stdin/stdout. Stdin is buffered while the
//! startup credential is authenticated, then replayed into the transport.

pub mod cli;
pub mod error;
pub mod stdio;

//! # ticketgraph
//!
//! Composition root for the knowledge graph engine: configuration, the HTTP
//! API and the CLI. The engine itself lives in `ticketgraph-core`.

pub mod api;
pub mod cli;
pub mod config;

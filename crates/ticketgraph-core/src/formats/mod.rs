//! # Formats Module
//!
//! Serialization formats for the knowledge graph.
//!
//! - `snapshot`: canonical binary snapshot (postcard + header)

pub mod snapshot;

pub use snapshot::{
    CanonicalSnapshot, MAX_SNAPSHOT_SIZE, SnapshotHeader, snapshot_checksum, snapshot_from_bytes,
    snapshot_to_bytes,
};

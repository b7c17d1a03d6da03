//! # Engine Primitives
//!
//! Hardcoded constants of the knowledge graph engine.
//!
//! Tunable behavior (decay, thresholds, layout geometry) lives in
//! [`crate::config`]; the values here are fixed limits and format markers.

/// Magic bytes for the snapshot format header.
pub const MAGIC_BYTES: &[u8; 4] = b"TKGS";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum number of observation timestamps kept per node.
///
/// Older observations are evicted first. Trend detection only looks at the
/// two most recent windows, so the cap only matters for very hot nodes.
pub const MAX_OBSERVATIONS: usize = 256;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a ticket id in bytes.
pub const MAX_TICKET_ID_LENGTH: usize = 128;

/// Maximum length of an entity label in bytes.
pub const MAX_LABEL_LENGTH: usize = 256;

/// Maximum number of extracted entities in one ticket.
pub const MAX_ENTITIES_PER_TICKET: usize = 1000;

/// Maximum number of extracted relations in one ticket.
pub const MAX_RELATIONS_PER_TICKET: usize = 1000;

// =============================================================================
// COMPUTATIONAL BOUNDS
// =============================================================================

/// Upper bound accepted for the force layout iteration count.
pub const MAX_FORCE_ITERATIONS: usize = 10_000;

/// Upper bound accepted for the number of nodes handed to a layout.
pub const MAX_LAYOUT_NODES: usize = 50_000;

/// Upper bound for the trend window, in days.
pub const MAX_TREND_WINDOW_DAYS: f64 = 3650.0;

/// Upper bound for layout geometry (canvas sides, radius, spacing, node size).
pub const MAX_LAYOUT_EXTENT: f64 = 1e6;

/// Smallest squared distance used in the repulsion term.
pub const MIN_DISTANCE_SQUARED: f64 = 1e-4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"TKGS");
    }

    #[test]
    fn label_limit_fits_ticket_limit() {
        assert!(MAX_TICKET_ID_LENGTH <= MAX_LABEL_LENGTH);
    }
}

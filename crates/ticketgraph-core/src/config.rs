//! # Engine Configuration
//!
//! Tunable parameters for decay, insight mining and layout.
//!
//! Every section deserializes with defaults for missing keys, so a partial
//! `[engine]` table in the application config file is enough.

use crate::primitives::{
    MAX_FORCE_ITERATIONS, MAX_LAYOUT_EXTENT, MAX_LAYOUT_NODES, MAX_TREND_WINDOW_DAYS,
};
use crate::types::EngineError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Convert a (possibly fractional) number of days into a duration.
fn days(value: f64) -> Duration {
    Duration::milliseconds((value * MILLIS_PER_DAY) as i64)
}

fn ensure(condition: bool, message: &str) -> Result<(), EngineError> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(message.to_string()))
    }
}

// =============================================================================
// DECAY
// =============================================================================

/// Read-time decay of accumulated weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Half-life in days. Zero disables decay.
    pub half_life_days: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
        }
    }
}

impl DecayConfig {
    #[must_use]
    pub fn half_life(&self) -> Duration {
        days(self.half_life_days)
    }
}

// =============================================================================
// INSIGHTS
// =============================================================================

/// Thresholds used by the insight engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Normalized edge strength that a co-occurrence must exceed.
    pub co_occurrence_threshold: f64,
    /// Occurrence count that a co-occurrence or anomaly must exceed.
    pub min_support: u64,
    /// Length of the recent and prior trend windows, in days.
    pub trend_window_days: f64,
    /// Growth factor of recent over prior observations.
    pub trend_multiplier: f64,
    /// Minimum observations in the recent window.
    pub trend_min_recent: u64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            co_occurrence_threshold: 0.6,
            min_support: 3,
            trend_window_days: 7.0,
            trend_multiplier: 2.0,
            trend_min_recent: 2,
        }
    }
}

impl InsightConfig {
    #[must_use]
    pub fn trend_window(&self) -> Duration {
        days(self.trend_window_days)
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

/// Geometry and iteration bounds for the layout engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Force layout iteration cap.
    pub iterations: usize,
    /// Force layout early-exit threshold on the largest displacement.
    pub epsilon: f64,
    /// Seed for the force layout's initial placement.
    pub seed: u64,
    pub width: f64,
    pub height: f64,
    /// Circle radius for the circular layout.
    pub radius: f64,
    /// Distance between slots in the hierarchical and grid layouts.
    pub spacing: f64,
    pub min_size: f64,
    pub size_scale: f64,
    /// Larger graphs are cut down to their heaviest nodes before layout.
    pub max_nodes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            epsilon: 0.01,
            seed: 42,
            width: 1000.0,
            height: 1000.0,
            radius: 400.0,
            spacing: 100.0,
            min_size: 4.0,
            size_scale: 6.0,
            max_nodes: 2000,
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub decay: DecayConfig,
    pub insights: InsightConfig,
    pub layout: LayoutConfig,
}

impl EngineConfig {
    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), EngineError> {
        let decay = &self.decay;
        ensure(
            decay.half_life_days.is_finite() && decay.half_life_days >= 0.0,
            "decay.half_life_days must be a non-negative number",
        )?;

        let insights = &self.insights;
        ensure(
            (0.0..=1.0).contains(&insights.co_occurrence_threshold),
            "insights.co_occurrence_threshold must be within [0, 1]",
        )?;
        ensure(
            insights.trend_window_days > 0.0
                && insights.trend_window_days <= MAX_TREND_WINDOW_DAYS,
            "insights.trend_window_days must be within (0, 3650]",
        )?;
        ensure(
            insights.trend_multiplier.is_finite() && insights.trend_multiplier >= 1.0,
            "insights.trend_multiplier must be at least 1",
        )?;

        let layout = &self.layout;
        ensure(
            (1..=MAX_FORCE_ITERATIONS).contains(&layout.iterations),
            "layout.iterations is out of range",
        )?;
        ensure(
            layout.epsilon.is_finite() && layout.epsilon > 0.0,
            "layout.epsilon must be positive",
        )?;
        for (value, message) in [
            (layout.width, "layout.width must be within (0, 1e6]"),
            (layout.height, "layout.height must be within (0, 1e6]"),
            (layout.radius, "layout.radius must be within (0, 1e6]"),
            (layout.spacing, "layout.spacing must be within (0, 1e6]"),
        ] {
            ensure(value > 0.0 && value <= MAX_LAYOUT_EXTENT, message)?;
        }
        ensure(
            (0.0..=MAX_LAYOUT_EXTENT).contains(&layout.min_size)
                && (0.0..=MAX_LAYOUT_EXTENT).contains(&layout.size_scale),
            "layout sizes must be within [0, 1e6]",
        )?;
        ensure(
            (1..=MAX_LAYOUT_NODES).contains(&layout.max_nodes),
            "layout.max_nodes is out of range",
        )?;
        Ok(())
    }
}

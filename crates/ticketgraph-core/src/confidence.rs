//! # Confidence Module
//!
//! Clamping and time decay of accumulated confidence.
//!
//! - Stored weights are raw sums of clamped confidences and are never decayed
//! - Decay is a read-time projection: `weight * 0.5^(elapsed / half_life)`
//! - Normalized strength divides the projection by the occurrence count,
//!   giving a decayed mean confidence in `[0, 1]`

use crate::config::DecayConfig;
use crate::types::{Edge, Node};
use chrono::{DateTime, Duration, Utc};

/// Clamp a confidence into `[0, 1]`. NaN maps to zero.
#[must_use]
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Exponential decay factor for the given elapsed time.
///
/// Negative elapsed time counts as zero. A non-positive half-life disables
/// decay.
#[must_use]
pub fn decay_factor(elapsed: Duration, half_life: Duration) -> f64 {
    if half_life <= Duration::zero() {
        return 1.0;
    }
    let elapsed_ms = elapsed.num_milliseconds().max(0) as f64;
    let half_life_ms = half_life.num_milliseconds() as f64;
    0.5_f64.powf(elapsed_ms / half_life_ms)
}

/// Decayed projection of a stored weight.
#[must_use]
pub fn effective_weight(
    weight: f64,
    last_seen: DateTime<Utc>,
    now: DateTime<Utc>,
    half_life: Duration,
) -> f64 {
    weight * decay_factor(now - last_seen, half_life)
}

/// Anything carrying an accumulated, decayable weight.
pub trait Weighted {
    fn weight(&self) -> f64;
    fn occurrences(&self) -> u64;
    fn last_seen(&self) -> DateTime<Utc>;
}

impl Weighted for Node {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn occurrences(&self) -> u64 {
        self.occurrences
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

impl Weighted for Edge {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn occurrences(&self) -> u64 {
        self.occurrences
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

/// Decay policy shared by the insight and layout engines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayPolicy {
    half_life: Duration,
}

impl DecayPolicy {
    #[must_use]
    pub fn new(half_life: Duration) -> Self {
        Self { half_life }
    }

    #[must_use]
    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    /// Time-decayed weight of `item` as seen at `now`.
    #[must_use]
    pub fn effective_weight<W: Weighted>(&self, item: &W, now: DateTime<Utc>) -> f64 {
        effective_weight(item.weight(), item.last_seen(), now, self.half_life)
    }

    /// Decayed mean confidence of `item`, in `[0, 1]`.
    #[must_use]
    pub fn strength<W: Weighted>(&self, item: &W, now: DateTime<Utc>) -> f64 {
        match item.occurrences() {
            0 => 0.0,
            n => clamp_confidence(self.effective_weight(item, now) / n as f64),
        }
    }
}

impl From<&DecayConfig> for DecayPolicy {
    fn from(config: &DecayConfig) -> Self {
        Self::new(config.half_life())
    }
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self::from(&DecayConfig::default())
    }
}

// =============================================================================
// TESTS
// =============================================================================

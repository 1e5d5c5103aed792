//! Score events and the direction rule that decides which value is better.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::SystemTime;

/// Whether a higher or lower value is the better result in a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    /// Larger values rank first (points, distance, ...)
    HigherBetter,
    /// Smaller values rank first (times, strokes, ...)
    LowerBetter,
}

impl ScoreDirection {
    /// Check whether `candidate` strictly beats `incumbent`.
    ///
    /// Equal values never beat each other, so the first one seen keeps its
    /// place. A NaN never beats anything and is beaten by any real value.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        if candidate.is_nan() {
            return false;
        }
        if incumbent.is_nan() {
            return true;
        }
        match self {
            ScoreDirection::HigherBetter => candidate > incumbent,
            ScoreDirection::LowerBetter => candidate < incumbent,
        }
    }

    /// Order two values best-first. NaN sorts after every real value.
    pub fn rank_order(self, a: f64, b: f64) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match self {
                ScoreDirection::HigherBetter => b.total_cmp(&a),
                ScoreDirection::LowerBetter => a.total_cmp(&b),
            },
        }
    }
}

/// One submitted measurement.
///
/// Immutable once created; the aggregator only ever reads events and clones
/// the winners into its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    id: String,
    user_id: String,
    category_slug: String,
    value: f64,
    #[serde(alias = "score_type")]
    direction: ScoreDirection,
    /// Milliseconds since the Unix epoch on the wire.
    #[serde(with = "epoch_millis")]
    created_at: SystemTime,
}

impl ScoreEvent {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        category_slug: impl Into<String>,
        value: f64,
        direction: ScoreDirection,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            category_slug: category_slug.into(),
            value,
            direction,
            created_at: SystemTime::now(),
        }
    }

    /// Replace the creation timestamp.
    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn category_slug(&self) -> &str {
        &self.category_slug
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn direction(&self) -> ScoreDirection {
        self.direction
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

mod epoch_millis {
    use super::*;
    use serde::{de::Error, Deserializer, Serializer};
    use std::time::{Duration, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(at: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        // Pre-epoch times clamp to 0
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().try_into().unwrap_or(u64::MAX))
            .unwrap_or(0);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        UNIX_EPOCH
            .checked_add(Duration::from_millis(millis))
            .ok_or_else(|| D::Error::custom(format!("created_at out of range: {}", millis)))
    }
}

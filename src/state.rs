//! Last published estimate.
//!
//! The sampling loop is the only writer. Each cycle builds a complete
//! `Estimate` and swaps it in under one short write lock, so a reader
//! always gets a whole snapshot from a single cycle.

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, RwLock};

/// Reading key carrying the smoothed label.
pub const LABEL_KEY: &str = "estimated_wait_time_min";
/// Reading key carrying the latest raw count.
pub const COUNT_KEY: &str = "count_in_view";

/// One cycle's published result.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub label: String,
    pub count_in_view: u32,
    /// Policy-specific fields (mean, history, counter).
    pub details: Map<String, Value>,
    /// Sampling cycles completed when this estimate was published.
    pub cycle: u64,
}

impl Estimate {
    /// Flatten into a reading: extra fields first, then the estimate's own
    /// keys, which win on collision.
    pub fn to_reading(&self, extra_fields: &Map<String, Value>) -> Map<String, Value> {
        let mut out = extra_fields.clone();
        out.insert(LABEL_KEY.to_string(), Value::from(self.label.clone()));
        out.insert(COUNT_KEY.to_string(), Value::from(self.count_in_view));
        for (key, value) in &self.details {
            out.insert(key.clone(), value.clone());
        }
        out
    }
}

/// Shared slot holding the latest estimate, if any.
#[derive(Clone, Debug, Default)]
pub struct LatestEstimate {
    slot: Arc<RwLock<Option<Arc<Estimate>>>>,
}

impl LatestEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, estimate: Estimate) {
        let estimate = Arc::new(estimate);
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(estimate);
    }

    /// Latest snapshot; `None` until the first successful cycle.
    pub fn load(&self) -> Option<Arc<Estimate>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Why a reading could not be produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadingError {
    /// No sampling cycle has completed yet.
    NotReady,
    /// The loop has been told to stop (shutdown or reconfiguration).
    ShuttingDown,
    /// The estimator was closed.
    Closed,
}

impl std::fmt::Display for ReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingError::NotReady => write!(f, "estimate not ready: no sampling cycle has completed"),
            ReadingError::ShuttingDown => {
                write!(f, "lost connection with background vision service loop; module might be configuring")
            }
            ReadingError::Closed => write!(f, "estimator is closed"),
        }
    }
}
impl std::error::Error for ReadingError {}

/// Sampling loop lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
    #[default]
    Stopped,
}

/// Loop state shared between a worker, its handle and readers.
#[derive(Clone, Debug, Default)]
pub struct LoopStatus {
    inner: Arc<Mutex<LoopState>>,
}

impl LoopStatus {
    pub fn new(state: LoopState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn get(&self) -> LoopState {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn set(&self, next: LoopState) {
        let mut state = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_published() {
        let latest = LatestEstimate::new();
        assert!(latest.load().is_none());
        latest.publish(Estimate {
            label: "low".to_string(),
            count_in_view: 1,
            details: Map::new(),
            cycle: 1,
        });
        assert_eq!(latest.load().unwrap().label, "low");
    }

    #[test]
    fn reading_merges_extra_fields() {
        let mut details = Map::new();
        details.insert("mean_count".to_string(), Value::from(1.5));
        let estimate = Estimate {
            label: "moderate".to_string(),
            count_in_view: 2,
            details,
            cycle: 7,
        };
        let mut extra = Map::new();
        extra.insert("location".to_string(), Value::from("gate 4"));
        extra.insert(COUNT_KEY.to_string(), Value::from("shadowed"));

        let reading = estimate.to_reading(&extra);
        assert_eq!(reading[LABEL_KEY], Value::from("moderate"));
        assert_eq!(reading[COUNT_KEY], Value::from(2));
        assert_eq!(reading["mean_count"], Value::from(1.5));
        assert_eq!(reading["location"], Value::from("gate 4"));
    }
}

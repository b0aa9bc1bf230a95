//! Count-to-label classification.
//!
//! A `ThresholdTable` is built from the `count_thresholds` mapping
//! (label -> inclusive upper bound). Bins are kept sorted ascending by bound,
//! and a count larger than every bound maps to [`OVERFLOW_LABEL`].

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Label returned when a count exceeds every configured threshold.
pub const OVERFLOW_LABEL: &str = "Overflow";

/// One classification bin: counts `<= upper_bound` get `label`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    pub upper_bound: f64,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdTable {
    bins: Vec<Bin>,
}

impl ThresholdTable {
    /// Invert the label -> threshold mapping and sort by threshold.
    ///
    /// Two labels sharing a threshold would make the mapping ambiguous, so
    /// duplicates are rejected.
    pub fn new(thresholds: &BTreeMap<String, i64>) -> Result<Self> {
        let mut inverted: BTreeMap<i64, &str> = BTreeMap::new();
        for (label, &value) in thresholds {
            if label == OVERFLOW_LABEL {
                return Err(anyhow!(
                    "attribute count_thresholds cannot use the reserved label {}",
                    OVERFLOW_LABEL
                ));
            }
            if let Some(existing) = inverted.insert(value, label) {
                return Err(anyhow!(
                    "cannot have two labels for the same threshold in count_thresholds. \
                     Threshold value {} appears more than once ({} and {})",
                    value,
                    existing,
                    label
                ));
            }
        }
        let bins = inverted
            .into_iter()
            .map(|(value, label)| Bin {
                upper_bound: value as f64,
                label: label.to_string(),
            })
            .collect();
        Ok(Self { bins })
    }

    /// First bin whose upper bound is >= `count`, otherwise the overflow label.
    pub fn classify(&self, count: f64) -> &str {
        self.bins
            .iter()
            .find(|bin| count <= bin.upper_bound)
            .map(|bin| bin.label.as_str())
            .unwrap_or(OVERFLOW_LABEL)
    }

    /// Bins in ascending threshold order.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Every label this table can produce, in ascending threshold order,
    /// followed by the overflow label.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bins
            .iter()
            .map(|bin| bin.label.as_str())
            .chain(std::iter::once(OVERFLOW_LABEL))
    }

    /// Largest configured upper bound (0 for an empty table).
    pub fn max_threshold(&self) -> f64 {
        self.bins.last().map(|bin| bin.upper_bound).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

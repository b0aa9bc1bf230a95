//! Temporal smoothing of per-cycle counts.
//!
//! - `RingBuffer`: fixed-capacity circular history with a write cursor and a
//!   `full` flag that flips once the cursor wraps.
//! - `Smoother`: the strategy seam. A smoother is fed one raw count per cycle
//!   and reports the stable label plus policy-specific reading fields.
//! - `MeanSmoother`: mean of the held counts, classified.
//! - `MajoritySmoother`: each count is classified first; the most frequent
//!   label in the window wins.
//! - `TriggerCounter`: hysteresis counter for the single-camera variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::classify::{ThresholdTable, OVERFLOW_LABEL};

// ----------------------------------------------------------------------------
// RingBuffer
// ----------------------------------------------------------------------------

/// Fixed-capacity ring buffer. Writing at capacity overwrites the oldest slot.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    cursor: usize,
    full: bool,
}

impl<T> RingBuffer<T> {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            cursor: 0,
            full: false,
        }
    }

    /// Write a sample, returning the evicted one when the slot was occupied.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = self.slots[self.cursor].replace(value);
        self.cursor = (self.cursor + 1) % self.slots.len();
        if self.cursor == 0 {
            self.full = true;
        }
        evicted
    }

    /// Number of samples written so far, capped at capacity.
    pub fn len(&self) -> usize {
        if self.full {
            self.slots.len()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Held samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.slots.split_at(self.cursor);
        older.iter().chain(newer.iter()).filter_map(Option::as_ref)
    }
}

// ----------------------------------------------------------------------------
// Policies
// ----------------------------------------------------------------------------

/// Smoothing policy selected by the `smoothing` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingKind {
    #[default]
    Mean,
    Majority,
}

/// Fully resolved policy, including the hysteresis variant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SmoothingPolicy {
    Mean { window: usize },
    Majority { window: usize },
    Trigger { trigger_threshold: u32 },
}

impl SmoothingPolicy {
    /// Fresh smoother with an empty history.
    pub fn build(&self, thresholds: Arc<ThresholdTable>) -> Box<dyn Smoother> {
        match *self {
            SmoothingPolicy::Mean { window } => Box::new(MeanSmoother::new(window, thresholds)),
            SmoothingPolicy::Majority { window } => {
                Box::new(MajoritySmoother::new(window, thresholds))
            }
            SmoothingPolicy::Trigger { trigger_threshold } => {
                Box::new(TriggerCounter::new(trigger_threshold, thresholds))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SmoothingPolicy::Mean { .. } => "mean",
            SmoothingPolicy::Majority { .. } => "majority",
            SmoothingPolicy::Trigger { .. } => "trigger",
        }
    }
}

/// Strategy that turns a stream of raw counts into a stable label.
///
/// Smoothers are owned and mutated by the sampling loop only.
pub trait Smoother: Send {
    /// Feed one cycle's total count.
    fn push(&mut self, count: u32);

    /// Current stable label. Never mutates.
    fn label(&self) -> String;

    /// Policy-specific fields merged into each published reading.
    fn reading_fields(&self) -> Map<String, Value>;
}

/// Mean-of-counts policy.
pub struct MeanSmoother {
    buffer: RingBuffer<f64>,
    thresholds: Arc<ThresholdTable>,
}

impl MeanSmoother {
    pub fn new(window: usize, thresholds: Arc<ThresholdTable>) -> Self {
        Self {
            buffer: RingBuffer::new(window),
            thresholds,
        }
    }

    /// Mean over samples written so far (not over capacity).
    pub fn mean(&self) -> f64 {
        let n = self.buffer.len();
        if n == 0 {
            return 0.0;
        }
        self.buffer.iter().sum::<f64>() / n as f64
    }

    pub fn buffer(&self) -> &RingBuffer<f64> {
        &self.buffer
    }

    fn history(&self) -> String {
        let samples: Vec<String> = self.buffer.iter().map(|v| format!("{:.1}", v)).collect();
        format!("[{}]", samples.join(" "))
    }
}

impl Smoother for MeanSmoother {
    fn push(&mut self, count: u32) {
        self.buffer.push(count as f64);
    }

    fn label(&self) -> String {
        self.thresholds.classify(self.mean()).to_string()
    }

    fn reading_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("mean_count".to_string(), Value::from(self.mean()));
        fields.insert("count_list".to_string(), Value::from(self.history()));
        fields
    }
}

/// Majority-of-labels policy.
///
/// The tally is a vector in threshold order (overflow last), so ties are
/// broken the same way on every run: the earliest label with the strictly
/// highest count wins.
pub struct MajoritySmoother {
    buffer: RingBuffer<usize>,
    tally: Vec<(String, usize)>,
    thresholds: Arc<ThresholdTable>,
}

impl MajoritySmoother {
    pub fn new(window: usize, thresholds: Arc<ThresholdTable>) -> Self {
        let tally = thresholds
            .labels()
            .map(|label| (label.to_string(), 0))
            .collect();
        Self {
            buffer: RingBuffer::new(window),
            tally,
            thresholds,
        }
    }

    fn slot_for(&self, label: &str) -> usize {
        self.tally
            .iter()
            .position(|(l, _)| l == label)
            .unwrap_or(self.tally.len() - 1)
    }

    /// Winning label and its vote count.
    pub fn winner(&self) -> (&str, usize) {
        let mut best = (OVERFLOW_LABEL, 0);
        for (label, count) in &self.tally {
            if *count > best.1 {
                best = (label.as_str(), *count);
            }
        }
        best
    }

    pub fn votes(&self, label: &str) -> usize {
        self.tally
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    fn history(&self) -> String {
        let labels: Vec<&str> = self
            .buffer
            .iter()
            .map(|&slot| self.tally[slot].0.as_str())
            .collect();
        format!("[{}]", labels.join(" "))
    }
}

impl Smoother for MajoritySmoother {
    fn push(&mut self, count: u32) {
        let slot = self.slot_for(self.thresholds.classify(count as f64));
        self.tally[slot].1 += 1;
        if let Some(evicted) = self.buffer.push(slot) {
            self.tally[evicted].1 -= 1;
        }
    }

    fn label(&self) -> String {
        self.winner().0.to_string()
    }

    fn reading_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("label_votes".to_string(), Value::from(self.winner().1));
        fields.insert("label_list".to_string(), Value::from(self.history()));
        fields
    }
}

/// Hysteresis counter.
///
/// Increments while the raw count is at or above the trigger threshold,
/// decrements otherwise, clamped to `[0, highest configured threshold]`.
pub struct TriggerCounter {
    trigger_threshold: u32,
    counter: u32,
    ceiling: u32,
    thresholds: Arc<ThresholdTable>,
}

impl TriggerCounter {
    pub fn new(trigger_threshold: u32, thresholds: Arc<ThresholdTable>) -> Self {
        let ceiling = thresholds.max_threshold().max(0.0) as u32;
        Self {
            trigger_threshold,
            counter: 0,
            ceiling,
            thresholds,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl Smoother for TriggerCounter {
    fn push(&mut self, count: u32) {
        if count >= self.trigger_threshold {
            self.counter = (self.counter + 1).min(self.ceiling);
        } else {
            self.counter = self.counter.saturating_sub(1);
        }
    }

    fn label(&self) -> String {
        self.thresholds.classify(self.counter as f64).to_string()
    }

    fn reading_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("threshold_counter".to_string(), Value::from(self.counter));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn thresholds(pairs: &[(&str, i64)]) -> Arc<ThresholdTable> {
        let map: BTreeMap<String, i64> = pairs
            .iter()
            .map(|(label, value)| (label.to_string(), *value))
            .collect();
        Arc::new(ThresholdTable::new(&map).unwrap())
    }

    #[test]
    fn ring_buffer_fills_then_evicts_oldest() {
        let mut buf = RingBuffer::new(3);
        assert!(buf.is_empty());
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert!(!buf.is_full());
        assert_eq!(buf.push(3), None);
        assert!(buf.is_full());
        assert_eq!(buf.len(), 3);

        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.capacity(), 3);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn ring_buffer_zero_capacity_is_clamped() {
        let mut buf = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push("a");
        assert_eq!(buf.push("b"), Some("a"));
    }

    #[test]
    fn mean_of_repeated_sample_is_the_sample() {
        let mut s = MeanSmoother::new(5, thresholds(&[("low", 1), ("high", 3)]));
        for _ in 0..5 {
            s.push(2);
        }
        assert!(s.buffer().is_full());
        assert_eq!(s.mean(), 2.0);
        assert_eq!(s.label(), "high");
    }

    #[test]
    fn mean_divides_by_written_samples_before_wrap() {
        let mut s = MeanSmoother::new(10, thresholds(&[("low", 1), ("high", 3)]));
        s.push(4);
        s.push(2);
        assert_eq!(s.mean(), 3.0);
        let fields = s.reading_fields();
        assert_eq!(fields["mean_count"], Value::from(3.0));
        assert_eq!(fields["count_list"], Value::from("[4.0 2.0]"));
    }

    #[test]
    fn mean_window_slides() {
        let mut s = MeanSmoother::new(2, thresholds(&[("low", 1), ("high", 3)]));
        s.push(10);
        s.push(0);
        s.push(0);
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.label(), "low");
        assert_eq!(s.buffer().capacity(), 2);
    }

    #[test]
    fn majority_reports_repeated_label() {
        let mut s = MajoritySmoother::new(4, thresholds(&[("low", 1), ("high", 3)]));
        for _ in 0..4 {
            s.push(0);
        }
        assert_eq!(s.label(), "low");
        assert_eq!(s.votes("low"), 4);
    }

    #[test]
    fn majority_flips_once_new_label_leads() {
        let mut s = MajoritySmoother::new(4, thresholds(&[("low", 1), ("high", 3)]));
        for _ in 0..4 {
            s.push(0);
        }
        s.push(3);
        s.push(3);
        // 2 low, 2 high: tie keeps the earlier label in threshold order
        assert_eq!(s.label(), "low");
        s.push(3);
        assert_eq!(s.label(), "high");
        assert_eq!(s.votes("low"), 1);
        assert_eq!(s.votes("high"), 3);
    }

    #[test]
    fn majority_empty_window_is_overflow() {
        let s = MajoritySmoother::new(3, thresholds(&[("low", 1)]));
        assert_eq!(s.label(), OVERFLOW_LABEL);
        assert_eq!(s.winner().1, 0);
    }

    #[test]
    fn majority_counts_overflow_samples() {
        let mut s = MajoritySmoother::new(3, thresholds(&[("low", 1)]));
        s.push(9);
        s.push(9);
        s.push(0);
        assert_eq!(s.label(), OVERFLOW_LABEL);
        assert_eq!(
            s.reading_fields()["label_list"],
            Value::from("[Overflow Overflow low]")
        );
    }

    #[test]
    fn trigger_counter_is_clamped() {
        let mut s = TriggerCounter::new(2, thresholds(&[("short", 1), ("long", 3)]));
        s.push(0);
        assert_eq!(s.counter(), 0);
        for _ in 0..10 {
            s.push(5);
        }
        assert_eq!(s.counter(), 3);
        assert_eq!(s.label(), "long");
        s.push(1);
        s.push(1);
        assert_eq!(s.counter(), 1);
        assert_eq!(s.label(), "short");
        assert_eq!(s.reading_fields()["threshold_counter"], Value::from(1));
    }

    #[test]
    fn policy_builds_matching_smoother() {
        let t = thresholds(&[("low", 1), ("high", 3)]);
        let mut smoother = SmoothingPolicy::Majority { window: 2 }.build(t);
        smoother.push(2);
        assert_eq!(smoother.label(), "high");
        assert!(smoother.reading_fields().contains_key("label_votes"));
    }
}

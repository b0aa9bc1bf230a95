use anyhow::{anyhow, Result};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One scripted detector answer.
#[derive(Clone, Debug)]
pub enum StubResponse {
    Detections(Vec<Detection>),
    Fail(String),
}

/// Stub backend for tests and the demo daemon.
///
/// Scripted responses are consumed first, in order. After the script runs out
/// every call returns the steady detections, or a random number of
/// detections when random mode is set.
pub struct StubBackend {
    script: VecDeque<StubResponse>,
    steady: Vec<Detection>,
    random: Option<(String, u32)>,
    delay: Option<Duration>,
    calls: Arc<AtomicU64>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            steady: Vec::new(),
            random: None,
            delay: None,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return these detections on every unscripted call.
    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.steady = detections;
        self
    }

    /// Return between 0 and `max` detections of `label` per call.
    pub fn with_random_counts(mut self, label: impl Into<String>, max: u32) -> Self {
        self.random = Some((label.into(), max));
        self
    }

    /// Fail the next `times` calls with `message`.
    pub fn failing(mut self, times: usize, message: &str) -> Self {
        for _ in 0..times {
            self.script
                .push_back(StubResponse::Fail(message.to_string()));
        }
        self
    }

    /// Append one scripted response.
    pub fn then(mut self, response: StubResponse) -> Self {
        self.script.push_back(response);
        self
    }

    /// Sleep this long inside every call, to simulate a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of `detect` calls, readable after the backend is moved
    /// into a registry.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.script.pop_front() {
            Some(StubResponse::Detections(detections)) => return Ok(detections),
            Some(StubResponse::Fail(message)) => return Err(anyhow!(message)),
            None => {}
        }
        if let Some((label, max)) = &self.random {
            let n = rand::thread_rng().gen_range(0..=*max);
            return Ok((0..n).map(|_| Detection::new(label.clone(), 0.9)).collect());
        }
        Ok(self.steady.clone())
    }
}

//! Queue estimator instance and its reconfiguration discipline.
//!
//! An estimator owns at most one sampling loop. `reconfigure` validates the
//! new config and resolves its detector and cameras before touching the
//! running loop, so a bad config leaves the old loop untouched. Otherwise the
//! old loop is cancelled and joined before the new one starts: two loops never
//! run at once for the same instance.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::cancel::CancelToken;
use crate::config::{Config, Settings};
use crate::detect::DetectorRegistry;
use crate::ingest::SourceRegistry;
use crate::processor::FrameProcessor;
use crate::sampling::{LoopHandle, ResolvedRegion, SamplingLoop};
use crate::state::{Estimate, LatestEstimate, LoopState, LoopStatus, ReadingError};

/// Collaborators the host makes available by name.
#[derive(Clone, Default)]
pub struct Dependencies {
    pub detectors: DetectorRegistry,
    pub sources: SourceRegistry,
}

impl Dependencies {
    pub fn new(detectors: DetectorRegistry, sources: SourceRegistry) -> Self {
        Self { detectors, sources }
    }
}

/// What readers need from the current loop. Cheap to clone.
#[derive(Clone)]
struct SessionView {
    cancel: CancelToken,
    status: LoopStatus,
    latest: LatestEstimate,
    extra_fields: Arc<Map<String, Value>>,
}

pub struct QueueEstimator {
    name: String,
    deps: Dependencies,
    /// Serialises reconfigure and close.
    session: Mutex<Option<LoopHandle>>,
    view: RwLock<Option<SessionView>>,
    closed: AtomicBool,
}

impl QueueEstimator {
    /// Build an estimator and start its first sampling loop.
    pub fn new(name: impl Into<String>, deps: Dependencies, config: &Config) -> Result<Self> {
        let estimator = Self {
            name: name.into(),
            deps,
            session: Mutex::new(None),
            view: RwLock::new(None),
            closed: AtomicBool::new(false),
        };
        estimator.reconfigure(config)?;
        Ok(estimator)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the running loop with one built from `config`.
    ///
    /// Returns only after the previous loop's thread has exited.
    pub fn reconfigure(&self, config: &Config) -> Result<()> {
        let settings = config
            .validate()
            .with_context(|| format!("invalid config for {}", self.name))?;
        let sampler = self.build_loop(&settings)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("{}: session lock poisoned", self.name))?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("{}: estimator is closed", self.name));
        }
        if let Some(mut previous) = session.take() {
            if let Err(err) = previous.stop() {
                log::error!("{}: previous sampling loop: {:#}", self.name, err);
            }
        }

        let latest = sampler.latest.clone();
        let handle = sampler.spawn()?;
        let view = SessionView {
            cancel: handle.cancel_token().clone(),
            status: handle.status().clone(),
            latest,
            extra_fields: Arc::new(settings.extra_fields.clone()),
        };
        *self
            .view
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(view);
        *session = Some(handle);
        Ok(())
    }

    /// Resolve collaborators and assemble a fresh loop, without starting it.
    fn build_loop(&self, settings: &Settings) -> Result<SamplingLoop> {
        let detector = self.deps.detectors.resolve(&settings.detector_name)?;
        let regions = settings
            .regions
            .iter()
            .map(|region| {
                let source = self.deps.sources.resolve(&region.camera)?;
                Ok(ResolvedRegion {
                    region: region.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "{}: {} smoothing, window policy {:?}, poll every {:.3}s ({:.2} Hz), {} camera(s), detector {}",
            self.name,
            settings.policy.name(),
            settings.policy,
            settings.poll_interval.as_secs_f64(),
            settings.frequency_hz(),
            regions.len(),
            settings.detector_name
        );

        Ok(SamplingLoop::new(
            self.name.clone(),
            regions,
            detector,
            FrameProcessor::new(&settings.labels),
            settings.policy.build(settings.thresholds.clone()),
            settings.poll_interval,
            LatestEstimate::new(),
        ))
    }

    /// Latest estimate, or why there is none.
    pub fn estimate(&self) -> std::result::Result<Arc<Estimate>, ReadingError> {
        self.current_view()?.latest.load().ok_or(ReadingError::NotReady)
    }

    /// Latest reading: extra fields plus label, count and policy fields.
    pub fn readings(&self) -> std::result::Result<Map<String, Value>, ReadingError> {
        let view = self.current_view()?;
        let estimate = view.latest.load().ok_or(ReadingError::NotReady)?;
        Ok(estimate.to_reading(&view.extra_fields))
    }

    fn current_view(&self) -> std::result::Result<SessionView, ReadingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReadingError::Closed);
        }
        let view = self
            .view
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(ReadingError::NotReady)?;
        if view.cancel.is_cancelled() {
            return Err(ReadingError::ShuttingDown);
        }
        Ok(view)
    }

    pub fn loop_state(&self) -> LoopState {
        self.view
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|view| view.status.get())
            .unwrap_or_default()
    }

    /// Stop the loop and refuse further readings. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("{}: session lock poisoned", self.name))?;
        if let Some(mut handle) = session.take() {
            handle.stop()?;
            log::info!("{}: closed", self.name);
        }
        Ok(())
    }
}

impl Drop for QueueEstimator {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("{}: close failed: {:#}", self.name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, StubBackend};
    use crate::ingest::SyntheticSource;
    use std::time::{Duration, Instant};

    fn deps(detector: StubBackend) -> Dependencies {
        let mut detectors = DetectorRegistry::new();
        detectors.register("people", detector);
        let mut sources = SourceRegistry::new();
        sources.register("stub://lobby", SyntheticSource::with_url("stub://lobby").unwrap());
        Dependencies::new(detectors, sources)
    }

    fn config() -> Config {
        Config {
            detector_name: "people".to_string(),
            camera_name: Some("stub://lobby".to_string()),
            chosen_labels: [("person".to_string(), 0.5)].into_iter().collect(),
            count_thresholds: [("low".to_string(), 1), ("high".to_string(), 3)]
                .into_iter()
                .collect(),
            n_samples: Some(2),
            poll_frequency_hz: Some(200.0),
            ..Config::default()
        }
    }

    fn wait_for_reading(estimator: &QueueEstimator) -> Map<String, Value> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(reading) = estimator.readings() {
                return reading;
            }
            assert!(Instant::now() < deadline, "no reading within 5s");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn invalid_config_keeps_previous_loop() {
        let detector = StubBackend::new().with_detections(vec![Detection::new("person", 0.9)]);
        let estimator = QueueEstimator::new("lobby", deps(detector), &config()).unwrap();
        wait_for_reading(&estimator);

        let mut bad = config();
        bad.count_thresholds.insert("dup".to_string(), 3);
        assert!(estimator.reconfigure(&bad).is_err());

        let mut missing = config();
        missing.detector_name = "cars".to_string();
        let err = estimator.reconfigure(&missing).unwrap_err();
        assert!(err.to_string().contains("cars"));

        assert_eq!(estimator.loop_state(), LoopState::Running);
        assert!(estimator.readings().is_ok());
    }

    #[test]
    fn close_is_idempotent_and_blocks_readings() {
        let estimator = QueueEstimator::new("lobby", deps(StubBackend::new()), &config()).unwrap();
        estimator.close().unwrap();
        estimator.close().unwrap();
        assert_eq!(estimator.readings().unwrap_err(), ReadingError::Closed);
        assert_eq!(estimator.loop_state(), LoopState::Stopped);
        assert!(estimator.reconfigure(&config()).is_err());
    }

    #[test]
    fn cancelled_loop_reports_shutting_down() {
        let detector = StubBackend::new().with_detections(vec![Detection::new("person", 0.9)]);
        let estimator = QueueEstimator::new("lobby", deps(detector), &config()).unwrap();
        wait_for_reading(&estimator);

        let cancel = estimator
            .view
            .read()
            .unwrap()
            .as_ref()
            .map(|view| view.cancel.clone())
            .unwrap();
        cancel.cancel();
        assert_eq!(estimator.readings().unwrap_err(), ReadingError::ShuttingDown);
        assert_eq!(estimator.estimate().unwrap_err(), ReadingError::ShuttingDown);
    }

    #[test]
    fn readings_during_reconfigure_report_shutting_down() {
        let slow = StubBackend::new()
            .with_detections(vec![Detection::new("person", 0.9)])
            .with_delay(Duration::from_millis(300));
        let calls = slow.call_counter();
        let estimator = QueueEstimator::new("lobby", deps(slow), &config()).unwrap();
        while calls.load(std::sync::atomic::Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let mut seen = Vec::new();
        std::thread::scope(|scope| {
            let worker = scope.spawn(|| estimator.reconfigure(&config()));
            while !worker.is_finished() {
                seen.push(estimator.readings().err());
                std::thread::sleep(Duration::from_millis(1));
            }
            worker.join().unwrap().unwrap();
        });

        assert!(seen.contains(&Some(ReadingError::ShuttingDown)));
        assert_eq!(estimator.loop_state(), LoopState::Running);
    }

    #[test]
    fn not_ready_before_first_cycle() {
        let slow = StubBackend::new().with_delay(Duration::from_millis(300));
        let estimator = QueueEstimator::new("lobby", deps(slow), &config()).unwrap();
        assert_eq!(estimator.readings().unwrap_err(), ReadingError::NotReady);
    }
}

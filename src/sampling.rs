//! The per-instance sampling loop.
//!
//! One background thread per estimator. Each cycle:
//! 1. captures one frame per region,
//! 2. counts matching detections across all areas,
//! 3. feeds the total into the smoother,
//! 4. publishes a complete `Estimate`,
//! 5. sleeps out the rest of the poll interval (wakes early on cancel).
//!
//! A failing camera or detector aborts the cycle without publishing. The
//! supervisor logs the error and restarts the loop forever; only
//! cancellation ends it.

use anyhow::{anyhow, Context, Result};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cancel::{CancelToken, Cancelled};
use crate::detect::SharedDetector;
use crate::ingest::SharedSource;
use crate::processor::FrameProcessor;
use crate::region::Region;
use crate::smoothing::Smoother;
use crate::state::{Estimate, LatestEstimate, LoopState, LoopStatus};

/// A region together with the camera it reads from.
pub struct ResolvedRegion {
    pub region: Region,
    pub source: SharedSource,
}

/// Everything one sampling loop owns.
pub struct SamplingLoop {
    pub name: String,
    pub regions: Vec<ResolvedRegion>,
    pub detector: SharedDetector,
    pub processor: FrameProcessor,
    pub smoother: Box<dyn Smoother>,
    pub poll_interval: Duration,
    pub latest: LatestEstimate,
    cycles: u64,
}

impl SamplingLoop {
    pub fn new(
        name: impl Into<String>,
        regions: Vec<ResolvedRegion>,
        detector: SharedDetector,
        processor: FrameProcessor,
        smoother: Box<dyn Smoother>,
        poll_interval: Duration,
        latest: LatestEstimate,
    ) -> Self {
        Self {
            name: name.into(),
            regions,
            detector,
            processor,
            smoother,
            poll_interval,
            latest,
            cycles: 0,
        }
    }

    /// Start the supervised loop on its own thread.
    pub fn spawn(self) -> Result<LoopHandle> {
        let cancel = CancelToken::new();
        let status = LoopStatus::new(LoopState::Running);
        let worker_cancel = cancel.clone();
        let worker_status = status.clone();
        let join = std::thread::Builder::new()
            .name(format!("sampler-{}", self.name))
            .spawn(move || self.supervise(worker_cancel, worker_status))
            .context("spawn sampling thread")?;
        Ok(LoopHandle {
            cancel,
            status,
            join: Some(join),
        })
    }

    /// Restart `run` after every failure until cancelled.
    fn supervise(mut self, cancel: CancelToken, status: LoopStatus) {
        if let Err(err) = self.warm_up() {
            log::warn!("{}: detector warm-up failed: {:#}", self.name, err);
        }
        loop {
            match self.run(&cancel) {
                Ok(()) => break,
                Err(err) if is_cancellation(&err) || cancel.is_cancelled() => break,
                Err(err) => {
                    log::error!("{}: sampling loop exited with error: {:#}", self.name, err);
                    // keep trying to run, forever
                    if cancel.wait_timeout(self.poll_interval) {
                        break;
                    }
                }
            }
        }
        status.set(LoopState::Stopped);
        log::info!("{}: sampling loop stopped after {} cycles", self.name, self.cycles);
    }

    fn warm_up(&self) -> Result<()> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        detector.warm_up()
    }

    /// Cycle until cancelled (`Ok`) or a cycle fails (`Err`).
    fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        loop {
            let start = Instant::now();
            self.run_cycle(cancel)?;
            let wait = self.poll_interval.saturating_sub(start.elapsed());
            if cancel.wait_timeout(wait) {
                return Ok(());
            }
        }
    }

    /// One acquire -> detect -> count -> smooth -> publish pass.
    pub fn run_cycle(&mut self, cancel: &CancelToken) -> Result<()> {
        let mut total: u32 = 0;
        for resolved in &self.regions {
            cancel.check()?;
            let camera = &resolved.region.camera;
            let frame = {
                let mut source = resolved
                    .source
                    .lock()
                    .map_err(|_| anyhow!("camera {} lock poisoned", camera))?;
                source
                    .next_frame(cancel)
                    .with_context(|| format!("camera {} error retrieving frame", camera))?
            };
            cancel.check()?;
            total += self
                .processor
                .process_shared(&frame, &resolved.region, &self.detector)?;
        }
        // a cancelled cycle must not publish
        cancel.check()?;

        self.smoother.push(total);
        self.cycles += 1;
        let label = self.smoother.label();
        log::debug!(
            "{}: cycle {} count={} label={}",
            self.name,
            self.cycles,
            total,
            label
        );
        self.latest.publish(Estimate {
            label,
            count_in_view: total,
            details: self.smoother.reading_fields(),
            cycle: self.cycles,
        });
        Ok(())
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

/// Controller-side handle to a running loop.
///
/// Dropping the handle stops the loop and waits for its thread, so a loop
/// never outlives its owner.
#[derive(Debug)]
pub struct LoopHandle {
    cancel: CancelToken,
    status: LoopStatus,
    join: Option<JoinHandle<()>>,
}

impl LoopHandle {
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn state(&self) -> LoopState {
        self.status.get()
    }

    pub fn status(&self) -> &LoopStatus {
        &self.status
    }

    /// Signal cancellation and block until the worker thread has exited.
    pub fn stop(&mut self) -> Result<()> {
        if self.state() == LoopState::Running {
            self.status.set(LoopState::Stopping);
        }
        self.cancel.cancel();
        let result = match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("sampling thread panicked")),
            None => Ok(()),
        };
        self.status.set(LoopState::Stopped);
        result
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("{}", err);
        }
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Cancelled>())
}

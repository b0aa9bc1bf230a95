//! queue_estimator - demo daemon for the wait-time estimator
//!
//! This daemon:
//! 1. Loads estimator attributes from a JSON or TOML file
//! 2. Wires `stub://` cameras to synthetic sources and anything else to image files
//! 3. Uses a stub detector that reports a random number of the first chosen label
//! 4. Logs the latest reading on a fixed interval
//! 5. Reconfigures in place when the config file changes on disk
//! 6. Closes the estimator cleanly on Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, SystemTime};

use queue_estimator::{
    Config, Dependencies, DetectorRegistry, FileSource, QueueEstimator, SourceRegistry,
    StubBackend, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Estimate queue wait times from detection counts"
)]
struct Args {
    /// Path to the estimator config (.json or .toml).
    #[arg(long, env = "QUEUE_ESTIMATOR_CONFIG")]
    config: PathBuf,

    /// Instance name used in logs.
    #[arg(long, env = "QUEUE_ESTIMATOR_NAME", default_value = "queue")]
    name: String,

    /// Seconds between reading reports.
    #[arg(long, default_value_t = 5)]
    report_interval_secs: u64,

    /// Upper bound for the stub detector's random count.
    #[arg(long, default_value_t = 8)]
    max_count: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.report_interval_secs == 0 {
        return Err(anyhow!("--report-interval-secs must be greater than 0"));
    }

    let mut current = Config::load_from(&args.config)?;
    let mut estimator = Some(start(&args, &current)?);
    let mut last_modified = modified_at(&args.config);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "queue_estimator running. config {} (Ctrl-C to stop)",
        args.config.display()
    );

    let report_interval = Duration::from_secs(args.report_interval_secs);
    loop {
        match rx.recv_timeout(report_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let modified = modified_at(&args.config);
        if modified != last_modified {
            last_modified = modified;
            match reload(&args, &mut estimator, &current) {
                Ok(next) => {
                    current = next;
                    log::info!("{}: reconfigured from {}", args.name, args.config.display());
                }
                Err(err) => log::error!("config reload rejected, keeping previous: {:#}", err),
            }
        }
        ensure_running(&args, &mut estimator, &current);

        match estimator.as_ref().map(QueueEstimator::readings) {
            Some(Ok(reading)) => log::info!(
                "{}: {}",
                args.name,
                serde_json::Value::Object(reading)
            ),
            Some(Err(err)) => log::warn!("{}: {}", args.name, err),
            None => log::warn!("{}: no estimator running", args.name),
        }
    }

    log::info!("shutdown signal received, stopping estimator...");
    if let Some(estimator) = estimator {
        estimator.close()?;
    }
    Ok(())
}

fn start(args: &Args, config: &Config) -> Result<QueueEstimator> {
    QueueEstimator::new(
        args.name.clone(),
        build_dependencies(config, args.max_count)?,
        config,
    )
}

/// Apply a changed config file. Returns the new config on success.
///
/// A config naming the same cameras and detector is applied in place. A
/// config naming different ones needs fresh collaborators: the old estimator
/// is closed once the new collaborators are built, then replaced. If the
/// replacement fails to start the slot is left empty and `ensure_running`
/// brings the previous config back.
fn reload(args: &Args, slot: &mut Option<QueueEstimator>, current: &Config) -> Result<Config> {
    let next = Config::load_from(&args.config)?;
    if let Some(estimator) = slot.as_ref() {
        if next.dependencies() == current.dependencies() {
            estimator.reconfigure(&next)?;
            return Ok(next);
        }
    }
    next.validate()?;
    let deps = build_dependencies(&next, args.max_count)?;
    if let Some(previous) = slot.take() {
        if let Err(err) = previous.close() {
            log::error!("{}: closing previous estimator: {:#}", args.name, err);
        }
    }
    *slot = Some(QueueEstimator::new(args.name.clone(), deps, &next)?);
    Ok(next)
}

/// Restart from the last good config when no estimator is running.
fn ensure_running(args: &Args, slot: &mut Option<QueueEstimator>, current: &Config) {
    if slot.is_some() {
        return;
    }
    match start(args, current) {
        Ok(estimator) => {
            log::info!("{}: restarted from last good config", args.name);
            *slot = Some(estimator);
        }
        Err(err) => log::error!("{}: restart failed, retrying: {:#}", args.name, err),
    }
}

fn build_dependencies(config: &Config, max_count: u32) -> Result<Dependencies> {
    let label = config
        .chosen_labels
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "person".to_string());
    let mut detectors = DetectorRegistry::new();
    detectors.register(
        config.detector_name.clone(),
        StubBackend::new().with_random_counts(label, max_count),
    );

    let mut sources = SourceRegistry::new();
    for camera in config.camera_names() {
        if sources.contains(&camera) {
            continue;
        }
        if camera.starts_with("stub://") {
            sources.register(camera.clone(), SyntheticSource::with_url(&camera)?);
        } else {
            sources.register(camera.clone(), FileSource::new(Path::new(&camera))?);
        }
    }
    Ok(Dependencies::new(detectors, sources))
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_estimator::{LoopState, COUNT_KEY};
    use std::time::Instant;

    fn write_config(path: &Path, camera: &str, thresholds: &str) {
        let json = format!(
            r#"{{
                "detector_name": "people",
                "camera_name": "{}",
                "chosen_labels": {{ "person": 0.5 }},
                "count_thresholds": {},
                "n_samples": 3,
                "poll_frequency_hz": 100
            }}"#,
            camera, thresholds
        );
        std::fs::write(path, json).expect("write config");
    }

    fn args(path: &Path) -> Args {
        Args {
            config: path.to_path_buf(),
            name: "test".to_string(),
            report_interval_secs: 1,
            max_count: 2,
        }
    }

    fn wait_for_reading(estimator: &QueueEstimator) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while estimator.readings().is_err() {
            assert!(Instant::now() < deadline, "no reading within 5s");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn rejected_reload_keeps_running_estimator() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("queue.json");
        write_config(&path, "stub://a", r#"{ "low": 1, "high": 3 }"#);
        let args = args(&path);
        let current = Config::load_from(&path).unwrap();
        let mut slot = Some(start(&args, &current).unwrap());

        write_config(&path, "stub://b", r#"{ "low": 1, "high": 1 }"#);
        assert!(reload(&args, &mut slot, &current).is_err());

        let estimator = slot.as_ref().expect("estimator kept");
        assert_eq!(estimator.loop_state(), LoopState::Running);
        wait_for_reading(estimator);
    }

    #[test]
    fn reload_with_new_camera_replaces_estimator() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("queue.json");
        write_config(&path, "stub://a", r#"{ "low": 1, "high": 3 }"#);
        let args = args(&path);
        let current = Config::load_from(&path).unwrap();
        let mut slot = Some(start(&args, &current).unwrap());

        write_config(&path, "stub://b", r#"{ "low": 1, "high": 3 }"#);
        let next = reload(&args, &mut slot, &current).unwrap();
        assert_eq!(next.camera_name.as_deref(), Some("stub://b"));
        wait_for_reading(slot.as_ref().expect("replacement running"));
    }

    #[test]
    fn empty_slot_restarts_from_last_good_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("queue.json");
        write_config(&path, "stub://a", r#"{ "low": 1, "high": 3 }"#);
        let args = args(&path);
        let current = Config::load_from(&path).unwrap();

        let mut slot = None;
        ensure_running(&args, &mut slot, &current);
        let estimator = slot.as_ref().expect("restarted");
        wait_for_reading(estimator);
        assert!(estimator.readings().unwrap().contains_key(COUNT_KEY));
    }
}

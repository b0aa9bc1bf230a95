use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::classify::ThresholdTable;
use crate::region::{BoundingBoxConfig, Region};
use crate::smoothing::{SmoothingKind, SmoothingPolicy};

/// Poll frequency used when neither cadence attribute is set, in Hz.
pub const DEFAULT_POLL_FREQUENCY_HZ: f64 = 1.0;
/// Time for the smoothed state to fully turn over, in seconds.
pub const DEFAULT_SAMPLING_PERIOD_S: f64 = 30.0;

/// Largest smoothing window accepted; the window is allocated up front.
pub const MAX_N_SAMPLES: i64 = 100_000;

const CONFIG_ENV: &str = "QUEUE_ESTIMATOR_CONFIG";
const DETECTOR_ENV: &str = "QUEUE_ESTIMATOR_DETECTOR";
const POLL_HZ_ENV: &str = "QUEUE_ESTIMATOR_POLL_HZ";

/// Estimator attributes as written by the user.
///
/// Everything is optional at this layer; `validate` decides what is required
/// and turns the record into `Settings`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector_name: String,
    /// Single-camera variant.
    pub camera_name: Option<String>,
    pub cropping_box: Option<BoundingBoxConfig>,
    /// Multi-camera variant: camera name -> areas of interest.
    pub valid_regions: Option<BTreeMap<String, Vec<BoundingBoxConfig>>>,
    pub chosen_labels: BTreeMap<String, f64>,
    pub count_thresholds: BTreeMap<String, i64>,
    pub poll_frequency_hz: Option<f64>,
    pub sampling_period_s: Option<f64>,
    pub n_samples: Option<i64>,
    pub smoothing: Option<SmoothingKind>,
    pub trigger_threshold: Option<i64>,
    pub extra_fields: Map<String, Value>,
}

/// Validated estimator settings.
#[derive(Clone, Debug)]
pub struct Settings {
    pub detector_name: String,
    pub regions: Vec<Region>,
    /// Lower-cased label -> minimum confidence.
    pub labels: HashMap<String, f64>,
    pub thresholds: Arc<ThresholdTable>,
    pub poll_interval: Duration,
    pub policy: SmoothingPolicy,
    pub extra_fields: Map<String, Value>,
}

impl Settings {
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.poll_interval.as_secs_f64()
    }
}

impl Config {
    /// Load from the file named by `QUEUE_ESTIMATOR_CONFIG`, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map_err(|_| anyhow!("{} must point at a config file", CONFIG_ENV))?;
        Self::load_from(Path::new(&path))
    }

    /// Read `path`, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_path(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Read a JSON or TOML config file (chosen by extension, JSON otherwise).
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let cfg = if is_toml {
            toml::from_str(&raw)
                .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
        };
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = std::env::var(DETECTOR_ENV) {
            if !name.trim().is_empty() {
                self.detector_name = name;
            }
        }
        if let Ok(hz) = std::env::var(POLL_HZ_ENV) {
            let hz: f64 = hz
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number of hertz", POLL_HZ_ENV))?;
            self.poll_frequency_hz = Some(hz);
        }
        Ok(())
    }

    /// Check every attribute and build `Settings`.
    pub fn validate(&self) -> Result<Settings> {
        if self.detector_name.trim().is_empty() {
            return Err(anyhow!("attribute detector_name cannot be left blank"));
        }
        let regions = self.regions()?;
        if self.count_thresholds.is_empty() {
            return Err(anyhow!("attribute count_thresholds is required"));
        }
        let window = match self.n_samples {
            Some(n) if n > MAX_N_SAMPLES => {
                return Err(anyhow!(
                    "attribute n_samples cannot be greater than {}",
                    MAX_N_SAMPLES
                ))
            }
            Some(n) if n > 0 => n as usize,
            _ => return Err(anyhow!("attribute n_samples must be greater than 0")),
        };
        for (label, confidence) in &self.chosen_labels {
            if *confidence < 0.0 || confidence.is_nan() {
                return Err(anyhow!(
                    "attribute chosen_labels: confidence for {} cannot be less than 0",
                    label
                ));
            }
        }
        let thresholds = Arc::new(ThresholdTable::new(&self.count_thresholds)?);
        let poll_interval = self.poll_interval(window)?;
        let policy = self.policy(window)?;

        let mut labels = HashMap::new();
        for (label, confidence) in &self.chosen_labels {
            labels.insert(label.to_lowercase(), *confidence);
        }

        Ok(Settings {
            detector_name: self.detector_name.clone(),
            regions,
            labels,
            thresholds,
            poll_interval,
            policy,
            extra_fields: self.extra_fields.clone(),
        })
    }

    /// Names of every collaborator this config depends on.
    pub fn dependencies(&self) -> Vec<String> {
        let mut names = vec![self.detector_name.clone()];
        names.extend(self.camera_names());
        names
    }

    /// Cameras this config reads from, in region order.
    pub fn camera_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.camera_name.iter().cloned().collect();
        if let Some(regions) = &self.valid_regions {
            names.extend(regions.keys().cloned());
        }
        names
    }

    fn regions(&self) -> Result<Vec<Region>> {
        match (&self.camera_name, &self.valid_regions) {
            (Some(_), Some(_)) => Err(anyhow!(
                "attributes camera_name and valid_regions cannot both be set"
            )),
            (Some(camera), None) => {
                if camera.trim().is_empty() {
                    return Err(anyhow!("attribute camera_name cannot be left blank"));
                }
                let boxes: Vec<BoundingBoxConfig> = self.cropping_box.into_iter().collect();
                Ok(vec![Region::new(camera.clone(), &boxes)?])
            }
            (None, Some(regions)) => {
                if regions.is_empty() {
                    return Err(anyhow!("attribute valid_regions cannot be left blank"));
                }
                if self.cropping_box.is_some() {
                    return Err(anyhow!(
                        "attribute cropping_box requires camera_name; use valid_regions boxes instead"
                    ));
                }
                regions
                    .iter()
                    .map(|(camera, boxes)| Region::new(camera.clone(), boxes))
                    .collect()
            }
            (None, None) => Err(anyhow!("attribute valid_regions cannot be left blank")),
        }
    }

    fn poll_interval(&self, window: usize) -> Result<Duration> {
        if let Some(hz) = self.poll_frequency_hz {
            if hz < 0.0 || !hz.is_finite() {
                return Err(anyhow!(
                    "attribute poll_frequency_hz must be a finite number, not less than 0"
                ));
            }
            if hz > 0.0 {
                return Duration::try_from_secs_f64(1.0 / hz).map_err(|_| {
                    anyhow!("attribute poll_frequency_hz {} is too small to schedule", hz)
                });
            }
        }
        match self.sampling_period_s {
            Some(period) if period < 0.0 || !period.is_finite() => Err(anyhow!(
                "attribute sampling_period_s cannot be less than 0. default is 30s"
            )),
            Some(period) if period > 0.0 => Duration::try_from_secs_f64(period / window as f64)
                .map_err(|_| {
                    anyhow!("attribute sampling_period_s {} is too large to schedule", period)
                }),
            // single-camera configs poll at a fixed rate unless told otherwise
            _ if self.camera_name.is_some() => {
                Ok(Duration::from_secs_f64(1.0 / DEFAULT_POLL_FREQUENCY_HZ))
            }
            _ => Ok(Duration::from_secs_f64(
                DEFAULT_SAMPLING_PERIOD_S / window as f64,
            )),
        }
    }

    fn policy(&self, window: usize) -> Result<SmoothingPolicy> {
        if let Some(trigger) = self.trigger_threshold {
            if self.camera_name.is_none() {
                return Err(anyhow!(
                    "attribute trigger_threshold is only supported with camera_name"
                ));
            }
            if trigger < 0 {
                return Err(anyhow!("attribute trigger_threshold cannot be less than 0"));
            }
            if self.smoothing == Some(SmoothingKind::Majority) {
                return Err(anyhow!(
                    "attribute trigger_threshold cannot be combined with majority smoothing"
                ));
            }
            return Ok(SmoothingPolicy::Trigger {
                trigger_threshold: trigger.min(u32::MAX as i64) as u32,
            });
        }
        Ok(match self.smoothing.unwrap_or_default() {
            SmoothingKind::Mean => SmoothingPolicy::Mean { window },
            SmoothingKind::Majority => SmoothingPolicy::Majority { window },
        })
    }
}

//! Queue wait-time estimator.
//!
//! Periodically samples one or more cameras, counts detections of chosen
//! labels inside configured regions, smooths the counts over a window, and
//! maps the smoothed value onto user-defined wait-time labels.
//!
//! # Module Structure
//!
//! - `classify`: threshold table (count -> label)
//! - `smoothing`: ring buffer and the smoothing policies (mean, majority, trigger)
//! - `region` / `frame`: bounding boxes and frame cropping
//! - `detect` / `ingest`: detector and camera boundaries, with stub implementations
//! - `processor`: frame -> filtered count
//! - `sampling`: the supervised background loop
//! - `estimator`: instance lifecycle and reconfiguration
//! - `config`: attribute parsing and validation

pub mod cancel;
pub mod classify;
pub mod config;
pub mod detect;
pub mod estimator;
pub mod frame;
pub mod ingest;
pub mod processor;
pub mod region;
pub mod sampling;
pub mod smoothing;
pub mod state;

pub use cancel::{CancelToken, Cancelled};
pub use classify::{ThresholdTable, OVERFLOW_LABEL};
pub use config::{Config, Settings};
pub use detect::{Detection, DetectorBackend, DetectorRegistry, StubBackend};
pub use estimator::{Dependencies, QueueEstimator};
pub use frame::Frame;
pub use ingest::{FileSource, FrameSource, SourceRegistry, SyntheticSource};
pub use region::{BoundingBox, BoundingBoxConfig, Region};
pub use smoothing::{SmoothingKind, SmoothingPolicy};
pub use state::{Estimate, LoopState, ReadingError, COUNT_KEY, LABEL_KEY};

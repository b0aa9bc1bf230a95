//! Frame sources (cameras).
//!
//! This module provides the camera side of the estimator:
//! - `FrameSource`: the boundary trait, one frame per call
//! - `SourceRegistry`: name -> shared source, resolved at reconfigure time
//! - `SyntheticSource`: generated frames for `stub://` cameras
//! - `FileSource`: a still image re-read from disk on every poll
//!
//! Sources block until a frame is available. A source that waits on a stream
//! should give up early once the cancel token fires.

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::frame::Frame;

pub mod file;
mod registry;
pub mod synthetic;

pub use file::FileSource;
pub use registry::{SharedSource, SourceRegistry};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Camera boundary.
pub trait FrameSource: Send {
    /// Source identifier (URL, path, device name).
    fn name(&self) -> &str;

    /// Capture the next frame.
    fn next_frame(&mut self, cancel: &CancelToken) -> Result<Frame>;
}

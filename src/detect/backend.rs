use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector backend.
///
/// The estimator treats backends as black boxes: a frame goes in, a list of
/// labelled detections comes out. Any error aborts the current sampling
/// cycle and is retried on the next one.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once when a sampling loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

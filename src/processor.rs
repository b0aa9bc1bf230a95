//! Frame -> count reduction.
//!
//! For every area of a region the detector runs once (on the full frame, or
//! on a crop of the original frame), and detections are kept only when their
//! label is one of the chosen labels (case-insensitive) and their confidence
//! reaches that label's minimum.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::region::Region;

#[derive(Clone, Debug, Default)]
pub struct FrameProcessor {
    /// Lower-cased label -> minimum confidence.
    labels: HashMap<String, f64>,
}

impl FrameProcessor {
    pub fn new<'a, I>(chosen_labels: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        let labels = chosen_labels
            .into_iter()
            .map(|(label, confidence)| (label.to_lowercase(), *confidence))
            .collect();
        Self { labels }
    }

    /// Number of detections with a chosen label and sufficient confidence.
    pub fn count_detections(&self, detections: &[Detection]) -> u32 {
        detections
            .iter()
            .filter(|d| {
                self.labels
                    .get(&d.label.to_lowercase())
                    .is_some_and(|min| d.confidence >= *min)
            })
            .count() as u32
    }

    /// Run the detector over every area of `region` and sum the counts.
    pub fn process(
        &self,
        frame: &Frame,
        region: &Region,
        detector: &mut dyn DetectorBackend,
    ) -> Result<u32> {
        let mut total = 0;
        for area in region.areas() {
            let view = area.crop(frame);
            let detections = detector
                .detect(&view)
                .with_context(|| format!("vision service error for camera {}", region.camera))?;
            total += self.count_detections(&detections);
        }
        Ok(total)
    }

    /// Lock a shared detector and process one region.
    pub fn process_shared(
        &self,
        frame: &Frame,
        region: &Region,
        detector: &crate::detect::SharedDetector,
    ) -> Result<u32> {
        let mut guard = detector
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        self.process(frame, region, &mut *guard)
    }
}

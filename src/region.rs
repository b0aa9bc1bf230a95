//! Regions of interest.
//!
//! A `Region` names a camera and lists zero or more `BoundingBox` sub-areas
//! inside its frames. Box coordinates are fractions of the frame size. A box
//! whose maximum coordinates are zero covers the whole frame.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, PixelRect};

/// Bounding box as written in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBoxConfig {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// Validated fractional bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

impl BoundingBox {
    pub fn new(coords: &BoundingBoxConfig) -> Result<Self> {
        for value in [coords.x_min, coords.y_min, coords.x_max, coords.y_max] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!(
                    "bounding box numbers are relative to the image dimension, \
                     and must be numbers between 0 and 1"
                ));
            }
        }
        // A zero max means "whole image", in which case min may equal max.
        if coords.x_max > 0.0 && coords.x_min >= coords.x_max {
            return Err(anyhow!(
                "x_min ({}) must be less than x_max ({})",
                coords.x_min,
                coords.x_max
            ));
        }
        if coords.y_max > 0.0 && coords.y_min >= coords.y_max {
            return Err(anyhow!(
                "y_min ({}) must be less than y_max ({})",
                coords.y_min,
                coords.y_max
            ));
        }
        Ok(Self {
            x_min: coords.x_min,
            y_min: coords.y_min,
            x_max: coords.x_max,
            y_max: coords.y_max,
        })
    }

    pub fn full_frame() -> Self {
        Self {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 0.0,
            y_max: 0.0,
        }
    }

    /// True when this box means "no crop".
    pub fn is_full_frame(&self) -> bool {
        self.x_max == 0.0 || self.y_max == 0.0
    }

    /// Scale to pixel bounds, truncating toward zero.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let x1 = (self.x_min * width as f64) as u32;
        let y1 = (self.y_min * height as f64) as u32;
        let x2 = (self.x_max * width as f64) as u32;
        let y2 = (self.y_max * height as f64) as u32;
        PixelRect {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        }
    }

    /// Cut this box out of `frame`. Full-frame boxes, and boxes that shrink
    /// to zero pixels, return a copy of the whole frame.
    pub fn crop(&self, frame: &Frame) -> Frame {
        if self.is_full_frame() {
            return frame.clone();
        }
        let rect = self.to_pixels(frame.width(), frame.height());
        if rect.is_empty() {
            log::debug!(
                "bounding box {:?} has no pixels in a {}x{} frame; using full frame",
                self,
                frame.width(),
                frame.height()
            );
            return frame.clone();
        }
        frame.crop(rect)
    }
}

/// A camera plus its areas of interest.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub camera: String,
    pub boxes: Vec<BoundingBox>,
}

impl Region {
    pub fn new(camera: impl Into<String>, boxes: &[BoundingBoxConfig]) -> Result<Self> {
        let camera = camera.into();
        let boxes = boxes
            .iter()
            .map(BoundingBox::new)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| anyhow!("error in valid region for {}: {}", camera, e))?;
        Ok(Self { camera, boxes })
    }

    /// Sub-areas to run detection on; a region without boxes is one full frame.
    pub fn areas(&self) -> Vec<BoundingBox> {
        if self.boxes.is_empty() {
            vec![BoundingBox::full_frame()]
        } else {
            self.boxes.clone()
        }
    }
}

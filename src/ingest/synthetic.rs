//! Synthetic frame source for `stub://` cameras.
//!
//! Generates a shifting gradient so consecutive frames differ. Useful for
//! tests and for running the daemon without hardware.

use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::cancel::CancelToken;
use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL (e.g., "stub://front_queue").
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
    pending_failures: usize,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source requires a stub:// url, got {}",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        Ok(Self {
            config,
            frame_count: 0,
            scene_state: 0,
            pending_failures: 0,
        })
    }

    /// Shorthand for a 640x480 source at `url`.
    pub fn with_url(url: &str) -> Result<Self> {
        Self::new(SyntheticConfig {
            url: url.to_string(),
            ..SyntheticConfig::default()
        })
    }

    /// Make the next `times` captures fail.
    pub fn failing(mut self, times: usize) -> Self {
        self.pending_failures = times;
        self
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn next_frame(&mut self, cancel: &CancelToken) -> Result<Frame> {
        cancel.check()?;
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(anyhow!("{}: stream unavailable", self.config.url));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::from_rgb(self.config.width, self.config.height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_frames_of_configured_size() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            url: "stub://queue".to_string(),
            width: 32,
            height: 24,
        })
        .unwrap();
        let cancel = CancelToken::new();
        let a = source.next_frame(&cancel).unwrap();
        let b = source.next_frame(&cancel).unwrap();
        assert_eq!((a.width(), a.height()), (32, 24));
        assert_ne!(a.pixels(), b.pixels());
        assert_eq!(source.frames_captured(), 2);
    }

    #[test]
    fn rejects_non_stub_urls() {
        assert!(SyntheticSource::with_url("rtsp://10.0.0.2/stream").is_err());
    }

    #[test]
    fn scripted_failures_then_recovers() {
        let mut source = SyntheticSource::with_url("stub://queue").unwrap().failing(1);
        let cancel = CancelToken::new();
        assert!(source.next_frame(&cancel).is_err());
        assert!(source.next_frame(&cancel).is_ok());
    }

    #[test]
    fn cancelled_capture_returns_cancelled() {
        let mut source = SyntheticSource::with_url("stub://queue").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = source.next_frame(&cancel).unwrap_err();
        assert!(err.is::<crate::cancel::Cancelled>());
    }
}

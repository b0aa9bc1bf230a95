//! Local still-image frame source.
//!
//! `FileSource` re-reads an image file on every poll, which lets an external
//! process (a snapshot script, a camera's FTP upload) drive the estimator by
//! overwriting one file. Only local paths are accepted.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::cancel::CancelToken;
use crate::frame::Frame;

pub struct FileSource {
    name: String,
    path: PathBuf,
    frames_captured: u64,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        if !is_local_file_path(&name) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            name,
            path: path.to_path_buf(),
            frames_captured: 0,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }
}

impl FrameSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self, cancel: &CancelToken) -> Result<Frame> {
        cancel.check()?;
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read frame from {}", self.path.display()))?;
        let frame =
            Frame::decode(&bytes).with_context(|| format!("camera {} error decoding bytes", self.name))?;
        self.frames_captured += 1;
        Ok(frame)
    }
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn rejects_urls() {
        assert!(FileSource::new("http://camera/snapshot.jpg").is_err());
        assert!(FileSource::new("").is_err());
    }

    #[test]
    fn reads_png_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("snapshot.png");
        RgbImage::new(12, 9).save(&path).expect("write png");

        let mut source = FileSource::new(&path).unwrap();
        let frame = source.next_frame(&CancelToken::new()).unwrap();
        assert_eq!((frame.width(), frame.height()), (12, 9));
        assert_eq!(source.frames_captured(), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut source = FileSource::new("/nonexistent/queue.png").unwrap();
        let err = source.next_frame(&CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("read frame from"));
    }
}

//! Frame capture and the per-frame processing pipeline.
//!
//! This module provides:
//! - Captured frames and the sources that produce them (`FrameSource`)
//! - The frame change gate (`gate`)
//! - Offer card regions (`region`)
//! - Candidate voting and the sanity verdict (`stability`)
//! - The capture worker (`service`)

pub mod gate;
pub mod region;
pub mod service;
pub mod stability;

pub use gate::{perceptual_hash, FrameChangeGate, GateDecision};
pub use region::{PixelRect, RegionSelector};
pub use service::{run_capture_loop, CaptureService, CycleOutcome, FrameProcessor, SubmitOutcome};
pub use stability::{SanityLimits, StabilityConfig, StabilityWindow};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::error::CaptureError;

/// One screen image, owned by the pipeline for a single cycle.
pub struct CapturedFrame {
    pub image: RgbaImage,
    pub hash: u64,
    pub captured_at: Instant,
}

impl CapturedFrame {
    /// Wraps an image and computes its perceptual hash.
    pub fn new(image: RgbaImage, captured_at: Instant) -> Self {
        let hash = perceptual_hash(&image);
        Self {
            image,
            hash,
            captured_at,
        }
    }
}

/// Produces screen frames. `Ok(None)` means the source is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError>;

    /// A live source keeps producing whether or not anyone keeps up. A
    /// recorded one can wait for the pipeline, so none of its frames are lost.
    fn is_live(&self) -> bool {
        true
    }
}

/// Replays the PNG and JPEG files of a directory in name order.
///
/// Frames are stamped with the wall clock when loaded, or `spacing` apart
/// when one is set.
pub struct DirectorySource {
    files: VecDeque<PathBuf>,
    spacing: Option<Duration>,
    started: Instant,
    replayed: u32,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> Result<Self, CaptureError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        files.sort();
        log::info!("Found {} screenshots in {}", files.len(), dir.display());
        Ok(Self {
            files: files.into(),
            spacing: None,
            started: Instant::now(),
            replayed: 0,
        })
    }

    /// Stamps consecutive frames `spacing` apart instead of with the time
    /// they were loaded.
    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// Frames left to replay.
    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        log::debug!("Loading frame {}", path.display());
        let image = image::open(&path)
            .map_err(|source| CaptureError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        let captured_at = match self.spacing {
            Some(step) => self.started + step * self.replayed,
            None => Instant::now(),
        };
        self.replayed += 1;
        Ok(Some(CapturedFrame::new(image, captured_at)))
    }

    fn is_live(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_directory_source_replays_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = DirectorySource::new(dir.path()).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.image.dimensions(), (2, 2));
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.image.dimensions(), (4, 4));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_directory_source_spacing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))
                .save(dir.path().join(name))
                .unwrap();
        }

        let mut source = DirectorySource::new(dir.path())
            .unwrap()
            .with_spacing(Duration::from_secs(2));
        assert!(!source.is_live());

        let first = source.next_frame().unwrap().unwrap().captured_at;
        let second = source.next_frame().unwrap().unwrap().captured_at;
        let third = source.next_frame().unwrap().unwrap().captured_at;
        assert_eq!(second - first, Duration::from_secs(2));
        assert_eq!(third - first, Duration::from_secs(4));
    }

    #[test]
    fn test_directory_source_reports_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let mut source = DirectorySource::new(dir.path()).unwrap();
        assert!(matches!(source.next_frame(), Err(CaptureError::Decode { .. })));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_hash_matches_pixels() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        let frame = CapturedFrame::new(img.clone(), Instant::now());
        assert_eq!(frame.hash, perceptual_hash(&img));
    }
}

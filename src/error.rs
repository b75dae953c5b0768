//! Error types shared by the capture, OCR and extraction layers.
//!
//! None of these are fatal to the pipeline. The worst outcome of any of them
//! is a single cycle that produces no offer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Transient failures while pulling a frame from a capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode frame {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures reported by an OCR engine.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not found: {0}")]
    EngineNotFound(String),

    #[error("OCR engine failed: {0}")]
    Failed(String),

    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// A configured vocabulary phrase produced an invalid pattern.
#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("invalid vocabulary pattern: {0}")]
    Pattern(#[from] regex::Error),
}

//! Text recognition: the engine interface and its Tesseract adapter.

pub mod engine;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractEngine;
pub use setup::{find_tessdata_dir, find_tesseract_executable};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// One recognized line with its vertical position in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub text: String,
    pub center_y: f32,
    pub height: f32,
}

/// One recognized word with its position in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub center_x: f32,
    pub center_y: f32,
    pub height: f32,
    /// 0-100, as reported by the engine.
    pub confidence: f32,
}

/// What an engine read from one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub lines: Vec<OcrLine>,
    pub tokens: Vec<OcrToken>,
}

impl RecognizedText {
    /// Plain text with no layout.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Lines as reported, or rebuilt from the tokens when the engine gave
    /// tokens only.
    pub fn effective_lines(&self) -> Vec<OcrLine> {
        if !self.lines.is_empty() {
            return self.lines.clone();
        }
        lines_from_tokens(&self.tokens)
    }

    /// The full text, falling back to the lines joined by newlines.
    pub fn full_text(&self) -> String {
        if !self.text.trim().is_empty() {
            return self.text.clone();
        }
        self.effective_lines()
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Joins tokens that share a baseline into lines, top to bottom.
///
/// A token joins a line when its centre is within half a token height of the
/// line's centre.
pub fn lines_from_tokens(tokens: &[OcrToken]) -> Vec<OcrLine> {
    let mut sorted: Vec<&OcrToken> = tokens.iter().filter(|t| !t.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));

    let mut rows: Vec<Vec<&OcrToken>> = Vec::new();
    for token in sorted {
        let joins = rows.last().is_some_and(|row| {
            let center = row.iter().map(|t| t.center_y).sum::<f32>() / row.len() as f32;
            let height = row.iter().map(|t| t.height).fold(token.height, f32::max);
            (token.center_y - center).abs() <= height / 2.0
        });
        match rows.last_mut() {
            Some(row) if joins => row.push(token),
            _ => rows.push(vec![token]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
            let top = row
                .iter()
                .map(|t| t.center_y - t.height / 2.0)
                .fold(f32::INFINITY, f32::min);
            let bottom = row
                .iter()
                .map(|t| t.center_y + t.height / 2.0)
                .fold(f32::NEG_INFINITY, f32::max);
            OcrLine {
                text: row.iter().map(|t| t.text.trim()).collect::<Vec<_>>().join(" "),
                center_y: (top + bottom) / 2.0,
                height: bottom - top,
            }
        })
        .collect()
}

/// Turns an image into text with layout.
pub trait OcrEngine: Send {
    fn recognize(&mut self, image: &RgbaImage) -> Result<RecognizedText, OcrError>;
}

/// Tesseract settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit path to the tesseract executable. Searched for when empty.
    pub tesseract_path: Option<String>,
    /// Tesseract language codes, e.g. "por+eng".
    pub language: String,
    /// Page segmentation mode.
    pub psm: u8,
    /// Upscale factor applied before recognition. 1 disables it.
    pub upscale: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            language: "por+eng".to_string(),
            psm: 6,
            upscale: 1,
        }
    }
}

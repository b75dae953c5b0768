//! Offer Capture
//!
//! Reads ride-offer cards off screen frames: OCR, structured extraction,
//! profitability rating and a deduplicated hand-off to a display sink.

pub mod capture;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod logging;
pub mod ocr;
pub mod offer;
pub mod paths;
pub mod sink;

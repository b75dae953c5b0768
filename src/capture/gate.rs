//! Decides whether a new frame is worth analyzing.
//!
//! Two rules: nothing is analyzed for half the offer lock after an offer was
//! accepted, and a frame whose hash equals the previous one is skipped while
//! that hash is still fresh.

use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::config::TimingConfig;

const HASH_SIZE: u32 = 64;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hashes a 64x64 grayscale thumbnail of the image with FNV-1a.
///
/// Equal pixels give equal hashes. Small changes in the card area usually
/// change it, which is all the gate needs.
pub fn perceptual_hash(image: &RgbaImage) -> u64 {
    if image.width() == 0 || image.height() == 0 {
        return FNV_OFFSET;
    }
    let thumb = imageops::resize(image, HASH_SIZE, HASH_SIZE, FilterType::Triangle);
    let gray = imageops::grayscale(&thumb);
    fnv1a(gray.as_raw())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// An offer was accepted moments ago.
    SkipLocked,
    /// Same picture as the last analyzed frame.
    SkipDuplicate,
    Proceed,
}

/// Everything the gate remembers between frames.
#[derive(Debug, Clone, Default)]
pub struct GateState {
    pub last_frame_hash: Option<u64>,
    pub last_hash_at: Option<Instant>,
    pub last_offer_at: Option<Instant>,
    pub last_offer_signature: Option<String>,
}

#[derive(Debug, Default)]
pub struct FrameChangeGate {
    state: GateState,
}

impl FrameChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn check(&mut self, hash: u64, now: Instant, timing: &TimingConfig) -> GateDecision {
        if let Some(at) = self.state.last_offer_at {
            if now.saturating_duration_since(at) < timing.offer_lock() / 2 {
                return GateDecision::SkipLocked;
            }
        }

        if self.state.last_frame_hash == Some(hash) {
            let fresh = self
                .state
                .last_hash_at
                .is_some_and(|at| now.saturating_duration_since(at) < timing.hash_cache());
            if fresh {
                return GateDecision::SkipDuplicate;
            }
        }

        self.state.last_frame_hash = Some(hash);
        self.state.last_hash_at = Some(now);
        GateDecision::Proceed
    }

    /// Remembers an accepted offer. Starts the frame lock.
    pub fn record_offer(&mut self, signature: String, now: Instant) {
        self.state.last_offer_at = Some(now);
        self.state.last_offer_signature = Some(signature);
    }

    /// Whether the same offer was accepted within `lock`.
    pub fn is_recent_offer(&self, signature: &str, now: Instant, lock: Duration) -> bool {
        let same = self.state.last_offer_signature.as_deref() == Some(signature);
        same && self
            .state
            .last_offer_at
            .is_some_and(|at| now.saturating_duration_since(at) < lock)
    }

    pub fn reset(&mut self) {
        self.state = GateState::default();
    }
}

//! Pipeline configuration.
//!
//! Loads settings from config.json next to the executable. Every section and
//! field has a default, so a partial file only overrides what it names.
//! [`SharedConfig`] lets the running pipeline pick up changes without a
//! restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::stability::{SanityLimits, StabilityConfig};
use crate::extract::{AddressWeights, LegPolicyConfig, Vocabulary};
use crate::ocr::OcrConfig;
use crate::offer::RatingThresholds;
use crate::paths;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with the screen size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of screen width
    pub width: f32,
    /// Height as fraction of screen height
    pub height: f32,
}

impl RelativeRect {
    /// The default offer card area: below a 5% status bar margin and the top
    /// 30% of the screen, i.e. the lower 65%.
    pub fn offer_card_area() -> Self {
        Self {
            x: 0.0,
            y: 0.35,
            width: 1.0,
            height: 0.65,
        }
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

/// Time windows, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// After an offer is accepted, frames are skipped for half of this and
    /// the same offer is ignored for all of it.
    pub offer_lock_ms: u64,
    /// How long an unchanged frame hash counts as a duplicate.
    pub hash_cache_ms: u64,
    /// How long the gateway keeps holding the displayed offer.
    pub hold_window_ms: u64,
    pub stability_window_ms: u64,
    /// An in-flight frame older than this is considered stuck.
    pub stall_timeout_ms: u64,
    pub ocr_timeout_ms: u64,
    pub pickup_prompt_debounce_ms: u64,
    /// Delay between frames pulled from a frame source.
    pub frame_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            offer_lock_ms: 3000,
            hash_cache_ms: 800,
            hold_window_ms: 25_000,
            stability_window_ms: 1000,
            stall_timeout_ms: 2000,
            ocr_timeout_ms: 5000,
            pickup_prompt_debounce_ms: 4000,
            frame_interval_ms: 250,
        }
    }
}

impl TimingConfig {
    pub fn offer_lock(&self) -> Duration {
        Duration::from_millis(self.offer_lock_ms)
    }

    pub fn hash_cache(&self) -> Duration {
        Duration::from_millis(self.hash_cache_ms)
    }

    pub fn hold_window(&self) -> Duration {
        Duration::from_millis(self.hold_window_ms)
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }

    pub fn pickup_prompt_debounce(&self) -> Duration {
        Duration::from_millis(self.pickup_prompt_debounce_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: RatingThresholds,
    pub timing: TimingConfig,
    /// Areas of the screen where offer cards appear.
    pub regions: Vec<RelativeRect>,
    pub stability: StabilityConfig,
    pub sanity: SanityLimits,
    pub legs: LegPolicyConfig,
    pub address: AddressWeights,
    pub ocr: OcrConfig,
    pub vocabulary: Vocabulary,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: RatingThresholds::default(),
            timing: TimingConfig::default(),
            regions: vec![RelativeRect::offer_card_area()],
            stability: StabilityConfig::default(),
            sanity: SanityLimits::default(),
            legs: LegPolicyConfig::default(),
            address: AddressWeights::default(),
            ocr: OcrConfig::default(),
            vocabulary: Vocabulary::default(),
        }
    }
}

/// Returns the default config path: config.json next to the executable.
pub fn default_config_path() -> PathBuf {
    paths::get_exe_dir().join("config.json")
}

/// Reads a config file.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Loads configuration from config.json or returns defaults.
/// Looks for config.json in the same directory as the executable.
pub fn load_config() -> PipelineConfig {
    let config_path = default_config_path();
    log::info!("Looking for config at: {}", config_path.display());

    if !config_path.exists() {
        log::info!("config.json not found. Using default config.");
        return PipelineConfig::default();
    }

    match load_config_from(&config_path) {
        Ok(config) => {
            log::info!("Config loaded from config.json");
            config
        }
        Err(e) => {
            log::warn!("{:#}. Using defaults.", e);
            PipelineConfig::default()
        }
    }
}

/// Configuration shared between the capture worker and the gateway.
///
/// Every change bumps a generation counter so holders of derived state (the
/// compiled extractor) know when to rebuild it.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<PipelineConfig>>,
    generation: Arc<AtomicU64>,
}

impl SharedConfig {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A copy of the current configuration.
    pub fn snapshot(&self) -> PipelineConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn timing(&self) -> TimingConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).timing
    }

    pub fn thresholds(&self) -> RatingThresholds {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).thresholds
    }

    /// Reads part of the configuration without copying the rest.
    pub fn with<R>(&self, read: impl FnOnce(&PipelineConfig) -> R) -> R {
        read(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Applies a change in place.
    pub fn update(&self, change: impl FnOnce(&mut PipelineConfig)) {
        {
            let mut config = self.inner.write().unwrap_or_else(|e| e.into_inner());
            change(&mut config);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Replaces the configuration with the contents of a file. On error the
    /// current configuration stays in place.
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let config = load_config_from(path)?;
        self.update(|c| *c = config);
        log::info!("Config reloaded from {}", path.display());
        Ok(())
    }
}

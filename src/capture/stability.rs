//! Candidate voting and the price sanity check.
//!
//! OCR of a card that is still animating in produces partial or wrong reads.
//! A candidate is only passed on after the same reading has been seen a few
//! times within a short window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::offer::{signature, StructuredOffer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Votes needed when the reading has a value and a trip leg.
    pub votes_complete: usize,
    /// Votes needed for any other reading.
    pub votes_partial: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            votes_complete: 2,
            votes_partial: 3,
        }
    }
}

struct Vote {
    signature: String,
    at: Instant,
    offer: StructuredOffer,
}

#[derive(Default)]
pub struct StabilityWindow {
    votes: VecDeque<Vote>,
}

impl StabilityWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate and returns the winning reading once it has enough
    /// votes within `window`.
    pub fn add(
        &mut self,
        offer: StructuredOffer,
        now: Instant,
        window: Duration,
        config: &StabilityConfig,
    ) -> Option<StructuredOffer> {
        self.votes.push_back(Vote {
            signature: signature(&offer),
            at: now,
            offer,
        });
        while self
            .votes
            .front()
            .is_some_and(|v| now.saturating_duration_since(v.at) > window)
        {
            self.votes.pop_front();
        }

        // Most voted signature, first seen wins a tie
        let mut best: Option<(&str, usize)> = None;
        for vote in &self.votes {
            let count = self
                .votes
                .iter()
                .filter(|v| v.signature == vote.signature)
                .count();
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((vote.signature.as_str(), count));
            }
        }
        let (best_signature, count) = best?;

        let latest = self
            .votes
            .iter()
            .rev()
            .find(|v| v.signature == best_signature)?;
        let complete = !latest.offer.monetary_value.is_empty() && latest.offer.has_trip_leg();
        let required = if complete {
            config.votes_complete
        } else {
            config.votes_partial
        };

        (count >= required).then(|| latest.offer.clone())
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }
}

/// Bounds outside which a price is a misread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityLimits {
    /// Prices at or below this are rejected.
    pub min_price: f64,
    /// Prices above this are rejected.
    pub max_price: f64,
}

impl Default for SanityLimits {
    fn default() -> Self {
        Self {
            min_price: 0.10,
            max_price: 200.0,
        }
    }
}

impl SanityLimits {
    /// Whether the offer's price is believable.
    pub fn verdict(&self, offer: &StructuredOffer) -> bool {
        offer
            .value()
            .is_some_and(|price| price > self.min_price && price <= self.max_price)
    }
}

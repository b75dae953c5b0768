//! Stage D: pickup and trip legs (minutes and kilometres).
//!
//! Every line is scanned for a "<n> min" and a "(<x> km)" pattern. The line
//! carrying a trip phrase ("Trip of 12 min (4,5 km)") holds the trip leg and
//! the nearest candidate above it is the pickup leg. Without a trip phrase a
//! [`LegPolicy`] decides.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::normalize::strip_leading_symbols;
use crate::error::VocabularyError;

/// Group 1 is an opening bracket right before the number. A bare "m" inside
/// brackets is metres, not minutes.
const TIME_PATTERN: &str = r"(\(\s*)?\b(\d{1,3})\s*(minutos?|minutes?|mins?|m)\b";
const KM_PATTERN: &str = r"\(?\s*(\d{1,3}(?:[.,]\d{1,2})?)\s*km\b";
const METERS_PATTERN: &str = r"\(\s*(\d{1,4})\s*m\s*\)";

/// Time and distance found on one line.
#[derive(Debug, Clone, PartialEq)]
pub struct LegCandidate {
    pub line_index: usize,
    pub minutes: Option<u32>,
    pub km: Option<f64>,
    /// The line carries a pickup word such as "away".
    pub pickup_hint: bool,
}

/// Legs assigned from the candidates. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegAssignment {
    pub pickup: Option<LegCandidate>,
    pub trip: Option<LegCandidate>,
}

/// Decides which candidate is which leg when no line names the trip.
///
/// This is a guess about card layouts, so it is swappable.
pub trait LegPolicy: Send + Sync {
    fn assign(&self, candidates: &[LegCandidate]) -> LegAssignment;
}

/// Tunables of [`HeuristicLegPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegPolicyConfig {
    /// A lone candidate at or above this many minutes is a trip.
    pub trip_min_minutes: u32,
    /// A lone candidate at or above this many km is a trip.
    pub trip_min_km: f64,
    pub minute_weight: f64,
    pub km_weight: f64,
}

impl Default for LegPolicyConfig {
    fn default() -> Self {
        Self {
            trip_min_minutes: 6,
            trip_min_km: 3.5,
            minute_weight: 60.0,
            km_weight: 10.0,
        }
    }
}

/// Earliest (or hinted) candidate is the pickup, the heaviest remaining one
/// is the trip. A lone candidate is a trip only when it is long enough.
#[derive(Debug, Clone, Default)]
pub struct HeuristicLegPolicy {
    pub config: LegPolicyConfig,
}

impl HeuristicLegPolicy {
    pub fn new(config: LegPolicyConfig) -> Self {
        Self { config }
    }

    fn weight(&self, c: &LegCandidate) -> f64 {
        f64::from(c.minutes.unwrap_or(0)) * self.config.minute_weight
            + c.km.unwrap_or(0.0) * self.config.km_weight
    }
}

impl LegPolicy for HeuristicLegPolicy {
    fn assign(&self, candidates: &[LegCandidate]) -> LegAssignment {
        match candidates {
            [] => LegAssignment::default(),
            [only] => {
                let seems_trip = only.minutes.unwrap_or(0) >= self.config.trip_min_minutes
                    || only.km.unwrap_or(0.0) >= self.config.trip_min_km;
                if seems_trip {
                    LegAssignment {
                        pickup: None,
                        trip: Some(only.clone()),
                    }
                } else {
                    LegAssignment {
                        pickup: Some(only.clone()),
                        trip: None,
                    }
                }
            }
            _ => {
                let pickup = candidates
                    .iter()
                    .find(|c| c.pickup_hint)
                    .unwrap_or(&candidates[0]);
                let trip = candidates
                    .iter()
                    .filter(|c| c.line_index != pickup.line_index)
                    .max_by(|a, b| self.weight(a).total_cmp(&self.weight(b)));
                LegAssignment {
                    pickup: Some(pickup.clone()),
                    trip: trip.cloned(),
                }
            }
        }
    }
}

pub struct LegScanner {
    time: Regex,
    km: Regex,
    meters: Regex,
    trip_line: Regex,
    pickup_hint: Regex,
}

impl LegScanner {
    pub fn new(trip_phrases: &[String], pickup_hints: &[String]) -> Result<Self, VocabularyError> {
        Ok(Self {
            time: Regex::new(TIME_PATTERN)?,
            km: Regex::new(KM_PATTERN)?,
            meters: Regex::new(METERS_PATTERN)?,
            trip_line: phrase_pattern(trip_phrases)?,
            pickup_hint: phrase_pattern(pickup_hints)?,
        })
    }

    /// Whether a folded line names the trip leg.
    pub fn is_trip_line(&self, folded_line: &str) -> bool {
        self.trip_line.is_match(folded_line)
    }

    pub fn is_pickup_hint(&self, folded_line: &str) -> bool {
        self.pickup_hint.is_match(folded_line)
    }

    /// Minutes and km of a single folded line, if any.
    pub fn scan_line(&self, index: usize, folded_line: &str) -> Option<LegCandidate> {
        let line = strip_leading_symbols(folded_line);
        let minutes = self
            .time
            .captures_iter(line)
            .filter(|c| !(c.get(1).is_some() && c.get(3).is_some_and(|u| u.as_str() == "m")))
            .find_map(|c| c.get(2)?.as_str().parse::<u32>().ok());
        let km = self
            .km
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
            .or_else(|| {
                self.meters
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .map(|m| m / 1000.0)
            });

        if minutes.is_none() && km.is_none() {
            return None;
        }
        Some(LegCandidate {
            line_index: index,
            minutes,
            km,
            pickup_hint: self.is_pickup_hint(line),
        })
    }

    /// Assigns pickup and trip legs across the folded, corrected lines.
    pub fn assign(&self, folded_lines: &[String], policy: &dyn LegPolicy) -> LegAssignment {
        let trip_line = folded_lines.iter().position(|l| self.is_trip_line(l));
        let candidates: Vec<LegCandidate> = folded_lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| self.scan_line(i, l))
            .collect();

        let Some(trip_index) = trip_line else {
            return policy.assign(&candidates);
        };

        let trip = candidates.iter().find(|c| c.line_index == trip_index).cloned();
        let pickup = candidates
            .iter()
            .filter(|c| c.line_index < trip_index)
            .max_by_key(|c| c.line_index + if c.pickup_hint { 1000 } else { 0 })
            .cloned();

        LegAssignment { pickup, trip }
    }
}

/// Builds one case-insensitive whole-word alternation from phrases.
pub fn phrase_pattern(phrases: &[String]) -> Result<Regex, VocabularyError> {
    let alternatives: Vec<String> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect();
    if alternatives.is_empty() {
        // never matches
        return Ok(Regex::new(r"\b\B")?);
    }
    Ok(Regex::new(&format!(r"(?i)(?:^|\W)(?:{})(?:\W|$)", alternatives.join("|")))?)
}

/// Formats km the way the offer record stores them ("4.5").
pub fn format_km(km: f64) -> String {
    format!("{:.1}", km)
}

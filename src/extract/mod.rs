//! Turns recognized screen text into a [`StructuredOffer`].
//!
//! The extractor runs in stages over the text:
//!
//! - A: normalize spaces, fold case and accents, repair digit misreads
//! - B: reject text that does not look like an offer card
//! - C: the monetary value (required)
//! - D: pickup and trip legs
//! - E: pickup and destination addresses
//! - F: the service label
//! - G: assemble and validate
//!
//! Every pattern is compiled once in [`OfferTextExtractor::new`], so a single
//! extractor should be kept for as long as the vocabulary does not change.

pub mod address;
pub mod legs;
pub mod money;
pub mod normalize;
pub mod vocabulary;

pub use address::{AddressFinder, AddressPair, AddressWeights};
pub use legs::{HeuristicLegPolicy, LegAssignment, LegCandidate, LegPolicy, LegPolicyConfig};
pub use vocabulary::Vocabulary;

use regex::Regex;

use crate::error::VocabularyError;
use crate::ocr::RecognizedText;
use crate::offer::model::RAW_TEXT_LIMIT;
use crate::offer::StructuredOffer;
use legs::{format_km, phrase_pattern, LegScanner};
use money::MoneyExtractor;
use normalize::{correct_numeric, fold, normalize_spaces};

const CURRENCY_PATTERN: &str = r"€|\beur\b";
const DISTANCE_UNIT_PATTERN: &str = r"\d\s*km\b|\bkm\b";
const DURATION_UNIT_PATTERN: &str = r"\d\s*(?:minutos?|minutes?|mins?|m)\b|\bmin\b";

pub struct OfferTextExtractor {
    money: MoneyExtractor,
    legs: LegScanner,
    policy: Box<dyn LegPolicy>,
    addresses: AddressFinder,
    offer_keywords: Regex,
    currency: Regex,
    distance_unit: Regex,
    duration_unit: Regex,
    service_labels: Vec<(String, Regex)>,
    pickup_state: Regex,
}

impl OfferTextExtractor {
    pub fn new(
        vocabulary: &Vocabulary,
        legs: LegPolicyConfig,
        address: AddressWeights,
    ) -> Result<Self, VocabularyError> {
        let service_labels = vocabulary
            .service_labels
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| Ok((title_case(l), phrase_pattern(std::slice::from_ref(l))?)))
            .collect::<Result<Vec<_>, VocabularyError>>()?;

        let pickup_state_phrases: Vec<String> = vocabulary
            .pickup_state_phrases
            .iter()
            .map(|p| unconfuse(p))
            .collect();

        Ok(Self {
            money: MoneyExtractor::new()?,
            legs: LegScanner::new(&vocabulary.trip_phrases, &vocabulary.pickup_hints)?,
            policy: Box::new(HeuristicLegPolicy::new(legs)),
            addresses: AddressFinder::new(vocabulary, address)?,
            offer_keywords: phrase_pattern(&vocabulary.offer_keywords)?,
            currency: Regex::new(CURRENCY_PATTERN)?,
            distance_unit: Regex::new(DISTANCE_UNIT_PATTERN)?,
            duration_unit: Regex::new(DURATION_UNIT_PATTERN)?,
            service_labels,
            pickup_state: phrase_pattern(&pickup_state_phrases)?,
        })
    }

    /// Replaces the fallback leg assignment.
    pub fn with_policy(mut self, policy: Box<dyn LegPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Parses one recognized screen. `None` means "not an offer".
    pub fn extract(&self, recognized: &RecognizedText) -> Option<StructuredOffer> {
        let full_text = recognized.full_text();

        // Stage A
        let pretty = normalize_spaces(&full_text);
        let mut pretty_lines: Vec<String> = pretty
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if pretty_lines.len() <= 1 {
            pretty_lines = self.addresses.split_pseudo_lines(&pretty);
        }
        let corrected_lines: Vec<String> = pretty_lines.iter().map(|l| correct_numeric(l)).collect();
        let folded_lines: Vec<String> = corrected_lines.iter().map(|l| fold(l)).collect();
        let folded = folded_lines.join("\n");

        // Stage B
        if !self.is_plausible(&folded) {
            log::trace!("Not an offer: implausible text");
            return None;
        }

        // Stage C
        let Some(monetary_value) = self.money.extract(&corrected_lines.join("\n")) else {
            log::trace!("Not an offer: no monetary value");
            return None;
        };

        // Stage D
        let legs = self.legs.assign(&folded_lines, self.policy.as_ref());

        // Stage E
        let addresses = self
            .addresses
            .from_layout(&recognized.effective_lines())
            .unwrap_or_else(|| self.addresses.from_lines(&pretty_lines, &self.legs));

        // Stage F
        let service_label = self.service_label(&folded);

        // Stage G
        let km = |c: &Option<LegCandidate>| c.as_ref().and_then(|c| c.km).map(format_km);
        let minutes = |c: &Option<LegCandidate>| {
            c.as_ref().and_then(|c| c.minutes).map(|m| m.to_string())
        };
        let mut offer = StructuredOffer {
            monetary_value,
            pickup_distance_km: km(&legs.pickup),
            trip_distance_km: km(&legs.trip),
            pickup_duration_min: minutes(&legs.pickup),
            trip_duration_min: minutes(&legs.trip),
            total_distance_km: None,
            total_duration_min: None,
            service_label,
            pickup_address: addresses.pickup,
            destination_address: addresses.destination,
            raw_text: full_text.chars().take(RAW_TEXT_LIMIT).collect(),
        };
        offer.recompute_totals();

        if !offer.is_valid() || !offer.has_any_leg() {
            log::trace!("Not an offer: value {} without legs", offer.monetary_value);
            return None;
        }
        Some(offer)
    }

    fn is_plausible(&self, folded: &str) -> bool {
        let has_units = self.currency.is_match(folded)
            && self.distance_unit.is_match(folded)
            && self.duration_unit.is_match(folded);
        has_units || self.offer_keywords.is_match(folded)
    }

    fn service_label(&self, folded: &str) -> Option<String> {
        self.service_labels
            .iter()
            .find(|(_, re)| re.is_match(folded))
            .map(|(label, _)| label.clone())
    }

    /// Whether the screen shows the "picking up a passenger" prompt.
    pub fn detects_pickup_state(&self, text: &str) -> bool {
        self.pickup_state.is_match(&unconfuse(&fold(&normalize_spaces(text))))
    }
}

/// Folds the digit/letter pairs OCR mixes up onto the letters.
fn unconfuse(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '1' | '|' => 'l',
            '0' => 'o',
            other => other,
        })
        .collect()
}

fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

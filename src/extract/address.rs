//! Stage E: pickup and destination addresses.
//!
//! Best effort. With line geometry the rows closest to the trip and
//! destination anchors win; without it the line following each leg line is
//! taken. Both paths fall back to the first and last address-like lines.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::legs::{phrase_pattern, LegScanner};
use super::normalize::{correct_numeric, fold, normalize_spaces};
use super::vocabulary::Vocabulary;
use crate::error::VocabularyError;
use crate::ocr::OcrLine;

const UNIT_MARKER_PATTERN: &str =
    r"(?i)€|\beur\b|(?:\b|\d)km\b|\b(?:min|mins|minutos?|minutes?)\b|\dm\b";
const ADDRESS_CHARSET_PATTERN: &str = r"^[\p{L}\p{N}\s,.'ºª°#/\-]{8,}$";
const POSTCODE_PATTERN: &str = r"\b\d{4}-\d{3}\b";
const HOUSE_NUMBER_PATTERN: &str = r"\b\d{1,4}[a-z]?\b";
const NOISE_START_PATTERN: &str = r"^[\s•·▶▷⦿●○▸▹▻▏▎▍\-|—–]*";
const BULLET_TAIL_PATTERN: &str = r"\s*[•·].*$";
const DISTANCE_NOTE_PATTERN: &str = r"(?i)\([^)]*(?:dist[aâ]nci[ao]|distance|away)[^)]*\)";
const MAP_LINK_PATTERN: &str = r"(?i)\b(?:ver\s+no\s+mapa|ver\s+no\s+google\s+maps|detalhes|see\s+on\s+map|view\s+on\s+map|details)\b.*";
const MINUTES_TAIL_PATTERN: &str = r"(?i)\b\d+\s*(?:min\.?|m)\b.*";
const KM_TAIL_PATTERN: &str = r"(?i)\b\d+[.,]?\d*\s*km\b.*";
const LEG_NOTE_PATTERN: &str =
    r"(?i)(\([^)\n]*km\s*\)(?:\s*(?:de\s+)?(?:dist[aâ]nci[ao]|distance|away))?)";

/// Scoring weights for address candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressWeights {
    pub looks_like: i32,
    pub comma: i32,
    pub postcode: i32,
    pub number: i32,
    pub street: i32,
    pub city: i32,
    /// Characters beyond this do not add to the length bonus.
    pub length_cap: usize,
    /// Bonus for a row sitting right on the anchor, shrinking by one per two
    /// pixels of distance.
    pub proximity_max: f32,
}

impl Default for AddressWeights {
    fn default() -> Self {
        Self {
            looks_like: 60,
            comma: 5,
            postcode: 20,
            number: 10,
            street: 10,
            city: 8,
            length_cap: 40,
            proximity_max: 120.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressPair {
    pub pickup: Option<String>,
    pub destination: Option<String>,
}

impl AddressPair {
    fn new(pickup: Option<String>, destination: Option<String>) -> Self {
        let pickup = pickup.filter(|s| !s.is_empty());
        let mut destination = destination.filter(|s| !s.is_empty());
        if destination.is_some() && destination == pickup {
            destination = None;
        }
        Self {
            pickup,
            destination,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pickup.is_none() && self.destination.is_none()
    }
}

struct Candidate {
    index: usize,
    center_y: f32,
    cleaned: String,
    folded: String,
}

pub struct AddressFinder {
    weights: AddressWeights,
    street_tokens: Vec<String>,
    city_hints: Vec<String>,
    ui_noise: Vec<String>,
    trip_marker: Regex,
    destination_marker: Regex,
    split_before: Option<Regex>,
    leg_note: Regex,
    unit_marker: Regex,
    charset: Regex,
    postcode: Regex,
    house_number: Regex,
    noise_start: Regex,
    bullet_tail: Regex,
    distance_note: Regex,
    map_link: Regex,
    minutes_tail: Regex,
    km_tail: Regex,
    spaces: Regex,
}

impl AddressFinder {
    pub fn new(vocabulary: &Vocabulary, weights: AddressWeights) -> Result<Self, VocabularyError> {
        let split_words: Vec<&String> = vocabulary
            .trip_phrases
            .iter()
            .chain(&vocabulary.destination_markers)
            .chain(&vocabulary.ui_noise)
            .filter(|p| !p.trim().is_empty())
            .collect();
        let split_before = if split_words.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = split_words
                .iter()
                .map(|p| regex::escape(p.trim()).replace(' ', r"\s+"))
                .collect();
            Some(Regex::new(&format!(r"(?i)\b((?:{}))\b", alternatives.join("|")))?)
        };

        Ok(Self {
            weights,
            street_tokens: vocabulary.street_tokens.clone(),
            city_hints: vocabulary.city_hints.clone(),
            ui_noise: vocabulary.ui_noise.clone(),
            trip_marker: phrase_pattern(&vocabulary.trip_phrases)?,
            destination_marker: phrase_pattern(&vocabulary.destination_markers)?,
            split_before,
            leg_note: Regex::new(LEG_NOTE_PATTERN)?,
            unit_marker: Regex::new(UNIT_MARKER_PATTERN)?,
            charset: Regex::new(ADDRESS_CHARSET_PATTERN)?,
            postcode: Regex::new(POSTCODE_PATTERN)?,
            house_number: Regex::new(HOUSE_NUMBER_PATTERN)?,
            noise_start: Regex::new(NOISE_START_PATTERN)?,
            bullet_tail: Regex::new(BULLET_TAIL_PATTERN)?,
            distance_note: Regex::new(DISTANCE_NOTE_PATTERN)?,
            map_link: Regex::new(MAP_LINK_PATTERN)?,
            minutes_tail: Regex::new(MINUTES_TAIL_PATTERN)?,
            km_tail: Regex::new(KM_TAIL_PATTERN)?,
            spaces: Regex::new(r"\s{2,}")?,
        })
    }

    fn is_ui_noise(&self, folded: &str) -> bool {
        self.ui_noise.iter().any(|n| folded.contains(n.as_str()))
    }

    fn has_street_token(&self, folded: &str) -> bool {
        self.street_tokens.iter().any(|t| folded.contains(t.as_str()))
    }

    fn has_city_hint(&self, folded: &str) -> bool {
        self.city_hints.iter().any(|c| folded.contains(c.as_str()))
    }

    /// Whether a folded line reads like a street address.
    pub fn looks_like_address(&self, folded: &str) -> bool {
        let n = folded.trim();
        if !n.chars().any(char::is_alphabetic) {
            return false;
        }
        if self.unit_marker.is_match(n) || self.is_ui_noise(n) || !self.charset.is_match(n) {
            return false;
        }

        let has_number = self.house_number.is_match(n);
        self.has_street_token(n)
            || self.postcode.is_match(n)
            || (n.contains(',') && has_number)
            || (has_number && self.has_city_hint(n))
    }

    pub fn score(&self, folded: &str, proximity: i32) -> i32 {
        let w = &self.weights;
        let mut score = proximity;
        if self.looks_like_address(folded) {
            score += w.looks_like;
        }
        if folded.contains(',') {
            score += w.comma;
        }
        if self.postcode.is_match(folded) {
            score += w.postcode;
        }
        if self.house_number.is_match(folded) {
            score += w.number;
        }
        if self.has_street_token(folded) {
            score += w.street;
        }
        if self.has_city_hint(folded) {
            score += w.city;
        }
        score + (folded.chars().count().min(w.length_cap) / 2) as i32
    }

    /// Strips bullets, leg notes and map links around an address line.
    pub fn clean(&self, line: &str) -> String {
        let t = self.noise_start.replace(line, "");
        let t = self.bullet_tail.replace(t.trim(), "");
        let t = self.distance_note.replace_all(&t, "");
        let t = self.map_link.replace(&t, "");
        let t = self.minutes_tail.replace(&t, "");
        let t = self.km_tail.replace(&t, "");
        let t = self.spaces.replace_all(&t, " ");
        t.trim().trim_matches(',').trim().to_string()
    }

    /// Splits a text recognized as one long line at the known markers.
    pub fn split_pseudo_lines(&self, text: &str) -> Vec<String> {
        let text = normalize_spaces(text).replace('\n', " ");
        let text = self.leg_note.replace_all(&text, "${1}\n");
        let text = match &self.split_before {
            Some(re) => re.replace_all(&text, "\n${1}").into_owned(),
            None => text.into_owned(),
        };
        text.split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }

    fn candidates(&self, lines: &[OcrLine]) -> Vec<Candidate> {
        lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| {
                let cleaned = self.clean(&normalize_spaces(&line.text));
                if cleaned.is_empty() {
                    return None;
                }
                let folded = fold(&cleaned);
                if self.is_ui_noise(&folded) || self.unit_marker.is_match(&folded) {
                    return None;
                }
                Some(Candidate {
                    index,
                    center_y: line.center_y,
                    cleaned,
                    folded,
                })
            })
            .collect()
    }

    fn best_near<'a>(
        &self,
        candidates: &'a [Candidate],
        anchor_y: f32,
        above: bool,
    ) -> Option<&'a Candidate> {
        let mut best: Option<(i32, &Candidate)> = None;
        for c in candidates {
            let on_side = if above {
                c.center_y < anchor_y
            } else {
                c.center_y > anchor_y
            };
            if !on_side {
                continue;
            }
            let distance = (c.center_y - anchor_y).abs();
            let proximity = (self.weights.proximity_max - distance / 2.0).max(0.0) as i32;
            let score = self.score(&c.folded, proximity);
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, c));
            }
        }
        best.map(|(_, c)| c)
    }

    /// Addresses from lines with vertical positions. `None` when nothing
    /// usable was found, so the caller can try the text-only path.
    pub fn from_layout(&self, lines: &[OcrLine]) -> Option<AddressPair> {
        if lines.is_empty() {
            return None;
        }
        let first_y = |re: &Regex| {
            lines
                .iter()
                .find(|l| re.is_match(&fold(&l.text)))
                .map(|l| l.center_y)
        };
        let trip_y = first_y(&self.trip_marker);
        let destination_y = first_y(&self.destination_marker);

        let candidates = self.candidates(lines);
        if candidates.is_empty() {
            return None;
        }

        let mut pickup = None;
        let mut destination = None;
        if let Some(y) = trip_y {
            pickup = self.best_near(&candidates, y, true).map(|c| c.cleaned.clone());
            destination = self.best_near(&candidates, y, false).map(|c| c.cleaned.clone());
        }
        if let Some(y) = destination_y {
            if let Some(c) = self.best_near(&candidates, y, false) {
                destination = Some(c.cleaned.clone());
            }
        }

        if pickup.is_none() || destination.is_none() {
            let address_like: Vec<&Candidate> = candidates
                .iter()
                .filter(|c| self.looks_like_address(&c.folded))
                .collect();
            if pickup.is_none() {
                pickup = address_like.iter().min_by_key(|c| c.index).map(|c| c.cleaned.clone());
            }
            if destination.is_none() {
                destination = address_like.iter().max_by_key(|c| c.index).map(|c| c.cleaned.clone());
            }
        }

        let pair = AddressPair::new(pickup, destination);
        (!pair.is_empty()).then_some(pair)
    }

    /// Addresses from plain lines: the line after the hinted pickup leg and
    /// the line after the trip leg.
    pub fn from_lines(&self, lines: &[String], legs: &LegScanner) -> AddressPair {
        let mut pickup = None;
        let mut destination = None;

        for (i, line) in lines.iter().enumerate() {
            let folded = fold(&correct_numeric(line));
            let Some(candidate) = legs.scan_line(i, &folded) else {
                continue;
            };
            if candidate.minutes.is_none() || candidate.km.is_none() {
                continue;
            }
            let next = || lines.get(i + 1).map(|l| self.clean(l));
            if pickup.is_none() && candidate.pickup_hint {
                pickup = next();
            } else if destination.is_none() && legs.is_trip_line(&folded) {
                destination = next();
            }
            if pickup.is_some() && destination.is_some() {
                break;
            }
        }

        let missing = |s: &Option<String>| s.as_deref().is_none_or(str::is_empty);
        if missing(&pickup) || missing(&destination) {
            let address_like: Vec<String> = lines
                .iter()
                .filter(|l| self.looks_like_address(&fold(l)))
                .map(|l| self.clean(l))
                .filter(|c| !c.is_empty())
                .collect();
            if missing(&pickup) {
                pickup = address_like.first().cloned();
            }
            if missing(&destination) && address_like.len() >= 2 {
                destination = address_like.last().cloned();
            }
        }

        AddressPair::new(pickup, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finder() -> AddressFinder {
        AddressFinder::new(&Vocabulary::default(), AddressWeights::default()).unwrap()
    }

    fn scanner() -> LegScanner {
        let v = Vocabulary::default();
        LegScanner::new(&v.trip_phrases, &v.pickup_hints).unwrap()
    }

    fn line(text: &str, center_y: f32) -> OcrLine {
        OcrLine {
            text: text.to_string(),
            center_y,
            height: 20.0,
        }
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn test_looks_like_address() {
        let f = finder();
        assert!(f.looks_like_address("rua augusta 10, lisboa"));
        assert!(f.looks_like_address("avenida da republica 45"));
        assert!(f.looks_like_address("2780-123 oeiras"));
        assert!(!f.looks_like_address("trip of 12 min (4,5 km)"));
        assert!(!f.looks_like_address("€ 7,50"));
        assert!(!f.looks_like_address("ver no mapa"));
        assert!(!f.looks_like_address("uberx"));
    }

    #[test]
    fn test_score_prefers_richer_lines() {
        let f = finder();
        let rich = f.score("rua augusta 10, 1100-053 lisboa", 0);
        let plain = f.score("rua augusta", 0);
        assert!(rich > plain);
        assert_eq!(f.score("x", 7), 7);
    }

    #[test]
    fn test_clean_strips_noise() {
        let f = finder();
        assert_eq!(f.clean("• Rua Augusta 10 · 3 min"), "Rua Augusta 10");
        assert_eq!(f.clean("Rua do Ouro 5 (1,2 km de distância)"), "Rua do Ouro 5");
        assert_eq!(f.clean("Praça do Comércio, Lisboa Ver no mapa"), "Praça do Comércio, Lisboa");
        assert_eq!(f.clean("Av. da Liberdade 50 12 min"), "Av. da Liberdade 50");
    }

    #[test]
    fn test_layout_uses_anchors() {
        let f = finder();
        let rows = vec![
            line("UberX", 10.0),
            line("€ 7,50", 40.0),
            line("3 min (1.2 km) away", 80.0),
            line("Rua Augusta 10, Lisboa", 110.0),
            line("Trip of 12 min (4,5 km)", 150.0),
            line("Av. da Liberdade 50, Lisboa", 190.0),
        ];
        let pair = f.from_layout(&rows).unwrap();
        assert_eq!(pair.pickup.as_deref(), Some("Rua Augusta 10, Lisboa"));
        assert_eq!(pair.destination.as_deref(), Some("Av. da Liberdade 50, Lisboa"));
    }

    #[test]
    fn test_layout_destination_marker_wins() {
        let f = finder();
        let rows = vec![
            line("Rua Augusta 10, Lisboa", 100.0),
            line("Trip of 12 min (4,5 km)", 140.0),
            line("Rua do Ouro 3, Lisboa", 180.0),
            line("Destination", 300.0),
            line("Rua da Prata 80, Lisboa", 330.0),
        ];
        let pair = f.from_layout(&rows).unwrap();
        assert_eq!(pair.destination.as_deref(), Some("Rua da Prata 80, Lisboa"));
    }

    #[test]
    fn test_layout_without_anchors_falls_back() {
        let f = finder();
        let rows = vec![
            line("Rua Augusta 10, Lisboa", 100.0),
            line("Comfort", 140.0),
            line("Rua da Prata 80, Lisboa", 180.0),
        ];
        let pair = f.from_layout(&rows).unwrap();
        assert_eq!(pair.pickup.as_deref(), Some("Rua Augusta 10, Lisboa"));
        assert_eq!(pair.destination.as_deref(), Some("Rua da Prata 80, Lisboa"));
    }

    #[test]
    fn test_lines_follow_leg_lines() {
        let f = finder();
        let text = lines(
            "€ 7,50\n3 min (1.2 km) away\nRua Augusta 10\nTrip of 12 min (4,5 km)\nAv. da Liberdade 50",
        );
        let pair = f.from_lines(&text, &scanner());
        assert_eq!(pair.pickup.as_deref(), Some("Rua Augusta 10"));
        assert_eq!(pair.destination.as_deref(), Some("Av. da Liberdade 50"));
    }

    #[test]
    fn test_identical_addresses_keep_only_pickup() {
        let f = finder();
        let text = lines("€ 5,00\nRua Augusta 10, Lisboa\n4 min (1.0 km)");
        let pair = f.from_lines(&text, &scanner());
        assert_eq!(pair.pickup.as_deref(), Some("Rua Augusta 10, Lisboa"));
        assert_eq!(pair.destination, None);
    }

    #[test]
    fn test_split_pseudo_lines() {
        let f = finder();
        let parts = f.split_pseudo_lines(
            "€ 7,50 3 min (1.2 km) away Rua Augusta 10 Trip of 12 min (4,5 km) Av. da Liberdade 50",
        );
        assert_eq!(
            parts,
            vec![
                "€ 7,50 3 min (1.2 km) away",
                "Rua Augusta 10",
                "Trip of 12 min (4,5 km)",
                "Av. da Liberdade 50",
            ]
        );
    }
}

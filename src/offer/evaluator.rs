//! Profitability rating of an offer against €/km and €/h thresholds.

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{MIN_VALID_DISTANCE_KM, MIN_VALID_VALUE};
use super::StructuredOffer;

/// Rating of a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndividualRating {
    Good,
    Medium,
    Poor,
    Unknown,
}

/// Combined rating, used as the border colour of the display card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinedRating {
    Green,
    Yellow,
    Red,
    Gray,
}

impl std::fmt::Display for CombinedRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombinedRating::Green => write!(f, "GREEN"),
            CombinedRating::Yellow => write!(f, "YELLOW"),
            CombinedRating::Red => write!(f, "RED"),
            CombinedRating::Gray => write!(f, "GRAY"),
        }
    }
}

/// The four configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingThresholds {
    /// €/km at or above this is Good
    pub good_per_km: f64,
    /// €/km at or below this is Poor
    pub poor_per_km: f64,
    /// €/h at or above this is Good
    pub good_per_hour: f64,
    /// €/h at or below this is Poor
    pub poor_per_hour: f64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self {
            good_per_km: 0.80,
            poor_per_km: 0.40,
            good_per_hour: 15.0,
            poor_per_hour: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub km_rating: IndividualRating,
    pub hour_rating: IndividualRating,
    pub combined_rating: CombinedRating,
    pub value_per_km: Option<f64>,
    pub value_per_hour: Option<f64>,
}

/// €/km, or `None` when the value or total distance is missing or too small.
pub fn value_per_km(offer: &StructuredOffer) -> Option<f64> {
    let value = offer.value().filter(|v| *v >= MIN_VALID_VALUE)?;
    let km = offer.total_distance().filter(|d| *d >= MIN_VALID_DISTANCE_KM)?;
    let ratio = value / km;
    ratio.is_finite().then_some(ratio)
}

/// €/h, or `None` when the value is too small or the total time is not positive.
pub fn value_per_hour(offer: &StructuredOffer) -> Option<f64> {
    let value = offer.value().filter(|v| *v >= MIN_VALID_VALUE)?;
    let minutes = offer.total_minutes().filter(|m| *m > 0)?;
    let ratio = value / (f64::from(minutes) / 60.0);
    ratio.is_finite().then_some(ratio)
}

fn rate(metric: Option<f64>, good: f64, poor: f64) -> IndividualRating {
    match metric {
        None => IndividualRating::Unknown,
        Some(v) if v >= good => IndividualRating::Good,
        Some(v) if v <= poor => IndividualRating::Poor,
        Some(_) => IndividualRating::Medium,
    }
}

/// Gray wins over everything else; Green and Red need both metrics to agree.
pub fn combine(km: IndividualRating, hour: IndividualRating) -> CombinedRating {
    use IndividualRating::*;
    match (km, hour) {
        (Unknown, _) | (_, Unknown) => CombinedRating::Gray,
        (Good, Good) => CombinedRating::Green,
        (Poor, Poor) => CombinedRating::Red,
        _ => CombinedRating::Yellow,
    }
}

/// Rates an offer. Pure: no state, no side effects besides a debug log line.
pub fn evaluate(offer: &StructuredOffer, thresholds: &RatingThresholds) -> EvaluationResult {
    let per_km = value_per_km(offer);
    let per_hour = value_per_hour(offer);

    let km_rating = rate(per_km, thresholds.good_per_km, thresholds.poor_per_km);
    let hour_rating = rate(per_hour, thresholds.good_per_hour, thresholds.poor_per_hour);
    let combined_rating = combine(km_rating, hour_rating);

    debug!(
        "Evaluated {}€ ({:?} km, {:?} min): €/km={:?} {:?}, €/h={:?} {:?} -> {}",
        offer.monetary_value,
        offer.total_distance_km,
        offer.total_duration_min,
        per_km,
        km_rating,
        per_hour,
        hour_rating,
        combined_rating
    );

    EvaluationResult {
        km_rating,
        hour_rating,
        combined_rating,
        value_per_km: per_km,
        value_per_hour: per_hour,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(value: &str, km: Option<&str>, minutes: Option<&str>) -> StructuredOffer {
        let mut offer = StructuredOffer {
            monetary_value: value.to_string(),
            trip_distance_km: km.map(String::from),
            trip_duration_min: minutes.map(String::from),
            ..Default::default()
        };
        offer.recompute_totals();
        offer
    }

    #[test]
    fn test_green_example() {
        let mut o = StructuredOffer {
            monetary_value: "7.50".into(),
            pickup_distance_km: Some("1.2".into()),
            trip_distance_km: Some("4.5".into()),
            pickup_duration_min: Some("3".into()),
            trip_duration_min: Some("12".into()),
            ..Default::default()
        };
        o.recompute_totals();

        let result = evaluate(&o, &RatingThresholds::default());
        let per_km = result.value_per_km.unwrap();
        assert!((per_km - 1.3158).abs() < 0.01);
        assert!((result.value_per_hour.unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(result.km_rating, IndividualRating::Good);
        assert_eq!(result.hour_rating, IndividualRating::Good);
        assert_eq!(result.combined_rating, CombinedRating::Green);
    }

    #[test]
    fn test_missing_distance_is_unknown() {
        let result = evaluate(&offer("5.00", None, Some("10")), &RatingThresholds::default());
        assert_eq!(result.km_rating, IndividualRating::Unknown);
        assert_eq!(result.combined_rating, CombinedRating::Gray);
    }

    #[test]
    fn test_zero_distance_is_unknown() {
        let result = evaluate(&offer("5.00", Some("0.0"), Some("10")), &RatingThresholds::default());
        assert_eq!(result.km_rating, IndividualRating::Unknown);
    }

    #[test]
    fn test_zero_minutes_is_unknown() {
        let result = evaluate(&offer("5.00", Some("3.0"), Some("0")), &RatingThresholds::default());
        assert_eq!(result.hour_rating, IndividualRating::Unknown);
        assert_eq!(result.combined_rating, CombinedRating::Gray);
    }

    #[test]
    fn test_tiny_value_is_unknown() {
        let result = evaluate(&offer("0.00", Some("3.0"), Some("10")), &RatingThresholds::default());
        assert_eq!(result.km_rating, IndividualRating::Unknown);
        assert_eq!(result.hour_rating, IndividualRating::Unknown);
    }

    #[test]
    fn test_red_when_both_poor() {
        // 2€ over 10 km and 30 min: 0.20 €/km, 4 €/h
        let result = evaluate(&offer("2.00", Some("10.0"), Some("30")), &RatingThresholds::default());
        assert_eq!(result.km_rating, IndividualRating::Poor);
        assert_eq!(result.hour_rating, IndividualRating::Poor);
        assert_eq!(result.combined_rating, CombinedRating::Red);
    }

    #[test]
    fn test_yellow_when_mixed() {
        // 6€ over 10 km and 20 min: 0.60 €/km (medium), 18 €/h (good)
        let result = evaluate(&offer("6.00", Some("10.0"), Some("20")), &RatingThresholds::default());
        assert_eq!(result.km_rating, IndividualRating::Medium);
        assert_eq!(result.hour_rating, IndividualRating::Good);
        assert_eq!(result.combined_rating, CombinedRating::Yellow);
    }

    #[test]
    fn test_threshold_boundaries_inclusive() {
        let thresholds = RatingThresholds {
            good_per_km: 1.0,
            poor_per_km: 0.5,
            good_per_hour: 20.0,
            poor_per_hour: 10.0,
        };
        // exactly 1.0 €/km and 10 €/h
        let result = evaluate(&offer("5.00", Some("5.0"), Some("30")), &thresholds);
        assert_eq!(result.km_rating, IndividualRating::Good);
        assert_eq!(result.hour_rating, IndividualRating::Poor);
    }

    #[test]
    fn test_combine_truth_table() {
        use IndividualRating::*;
        let all = [Good, Medium, Poor, Unknown];
        for km in all {
            for hour in all {
                let expected = if km == Unknown || hour == Unknown {
                    CombinedRating::Gray
                } else if km == Good && hour == Good {
                    CombinedRating::Green
                } else if km == Poor && hour == Poor {
                    CombinedRating::Red
                } else {
                    CombinedRating::Yellow
                };
                assert_eq!(combine(km, hour), expected, "km={:?} hour={:?}", km, hour);
            }
        }
    }
}

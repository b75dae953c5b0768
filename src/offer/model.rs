use serde::{Deserialize, Serialize};

/// Offers below this value are not offers.
pub const MIN_VALID_VALUE: f64 = 0.01;

/// Total distances below this cannot be rated per km.
pub const MIN_VALID_DISTANCE_KM: f64 = 0.01;

/// Upper bound on the diagnostic copy of the source text, in characters.
pub const RAW_TEXT_LIMIT: usize = 1200;

/// A ride offer parsed from one recognized screen.
///
/// All numeric fields are kept as normalized strings so the signature is a
/// direct function of what was read. Use the accessor methods to get numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredOffer {
    /// Decimal with a period separator and two fraction digits, e.g. "7.50".
    pub monetary_value: String,
    pub pickup_distance_km: Option<String>,
    pub trip_distance_km: Option<String>,
    pub pickup_duration_min: Option<String>,
    pub trip_duration_min: Option<String>,
    /// Derived. Refresh with [`StructuredOffer::recompute_totals`].
    pub total_distance_km: Option<String>,
    /// Derived. Refresh with [`StructuredOffer::recompute_totals`].
    pub total_duration_min: Option<String>,
    pub service_label: Option<String>,
    pub pickup_address: Option<String>,
    pub destination_address: Option<String>,
    pub raw_text: String,
}

impl StructuredOffer {
    /// Recomputes the derived totals from whichever legs are present.
    ///
    /// A leg counts when it parses and is non-negative. A total is absent
    /// when neither leg counts.
    pub fn recompute_totals(&mut self) {
        let distance = sum_present(
            parse_decimal(self.pickup_distance_km.as_deref()),
            parse_decimal(self.trip_distance_km.as_deref()),
        );
        self.total_distance_km = distance.map(|km| format!("{:.1}", km));

        let minutes = sum_present(
            parse_minutes(self.pickup_duration_min.as_deref()),
            parse_minutes(self.trip_duration_min.as_deref()),
        );
        self.total_duration_min = minutes.map(|min| min.to_string());
    }

    pub fn value(&self) -> Option<f64> {
        parse_decimal(Some(&self.monetary_value))
    }

    pub fn total_distance(&self) -> Option<f64> {
        parse_decimal(self.total_distance_km.as_deref())
    }

    pub fn total_minutes(&self) -> Option<u32> {
        parse_minutes(self.total_duration_min.as_deref())
    }

    pub fn is_valid(&self) -> bool {
        self.value().is_some_and(|v| v >= MIN_VALID_VALUE)
    }

    pub fn is_usable_for_rating(&self) -> bool {
        self.is_valid() && (self.total_distance_km.is_some() || self.total_duration_min.is_some())
    }

    /// True when any of the four leg fields is present.
    pub fn has_any_leg(&self) -> bool {
        self.pickup_distance_km.is_some()
            || self.trip_distance_km.is_some()
            || self.pickup_duration_min.is_some()
            || self.trip_duration_min.is_some()
    }

    /// True when the trip leg (distance or duration) is present.
    pub fn has_trip_leg(&self) -> bool {
        self.trip_distance_km.is_some() || self.trip_duration_min.is_some()
    }
}

fn sum_present<T>(a: Option<T>, b: Option<T>) -> Option<T>
where
    T: std::ops::Add<Output = T>,
{
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Parses a decimal field, accepting a comma separator. Negative or
/// malformed values read as absent.
pub fn parse_decimal(text: Option<&str>) -> Option<f64> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    let value: f64 = text.replace(',', ".").parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Parses a whole-minutes field.
pub fn parse_minutes(text: Option<&str>) -> Option<u32> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(value: &str) -> StructuredOffer {
        StructuredOffer {
            monetary_value: value.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_totals_sum_both_legs() {
        let mut o = offer("7.50");
        o.pickup_distance_km = Some("1.2".into());
        o.trip_distance_km = Some("4.5".into());
        o.pickup_duration_min = Some("3".into());
        o.trip_duration_min = Some("12".into());
        o.recompute_totals();

        assert_eq!(o.total_distance_km.as_deref(), Some("5.7"));
        assert_eq!(o.total_duration_min.as_deref(), Some("15"));
        assert!(o.is_usable_for_rating());
    }

    #[test]
    fn test_totals_single_leg() {
        let mut o = offer("4.00");
        o.trip_duration_min = Some("9".into());
        o.recompute_totals();

        assert_eq!(o.total_distance_km, None);
        assert_eq!(o.total_duration_min.as_deref(), Some("9"));
    }

    #[test]
    fn test_totals_recomputed_after_change() {
        let mut o = offer("4.00");
        o.trip_distance_km = Some("2.0".into());
        o.recompute_totals();
        assert_eq!(o.total_distance_km.as_deref(), Some("2.0"));

        o.trip_distance_km = None;
        o.recompute_totals();
        assert_eq!(o.total_distance_km, None);
    }

    #[test]
    fn test_negative_and_garbage_legs_ignored() {
        let mut o = offer("4.00");
        o.pickup_distance_km = Some("-1.0".into());
        o.trip_distance_km = Some("abc".into());
        o.recompute_totals();
        assert_eq!(o.total_distance_km, None);
        assert!(!o.is_usable_for_rating());
    }

    #[test]
    fn test_validity_threshold() {
        assert!(offer("0.01").is_valid());
        assert!(!offer("0.00").is_valid());
        assert!(!offer("").is_valid());
        assert!(!offer("abc").is_valid());
    }
}

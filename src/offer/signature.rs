use super::StructuredOffer;

const ABSENT: &str = "-";

/// Builds the deduplication key of an offer.
///
/// Only the five raw fields take part: value, pickup distance, trip distance,
/// pickup duration and trip duration. Addresses, labels and derived totals do
/// not, so a re-read address does not make the same offer look new.
pub fn signature(offer: &StructuredOffer) -> String {
    fn field(value: Option<&str>) -> &str {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => ABSENT,
        }
    }

    format!(
        "v:{}|pd:{}|td:{}|pt:{}|tt:{}",
        field(Some(&offer.monetary_value)),
        field(offer.pickup_distance_km.as_deref()),
        field(offer.trip_distance_km.as_deref()),
        field(offer.pickup_duration_min.as_deref()),
        field(offer.trip_duration_min.as_deref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StructuredOffer {
        let mut offer = StructuredOffer {
            monetary_value: "7.50".into(),
            pickup_distance_km: Some("1.2".into()),
            trip_distance_km: Some("4.5".into()),
            pickup_duration_min: Some("3".into()),
            trip_duration_min: Some("12".into()),
            ..Default::default()
        };
        offer.recompute_totals();
        offer
    }

    #[test]
    fn test_signature_format() {
        assert_eq!(signature(&sample()), "v:7.50|pd:1.2|td:4.5|pt:3|tt:12");
    }

    #[test]
    fn test_signature_stable() {
        let offer = sample();
        assert_eq!(signature(&offer), signature(&offer.clone()));
    }

    #[test]
    fn test_signature_placeholders() {
        let offer = StructuredOffer {
            monetary_value: "5.00".into(),
            trip_duration_min: Some("8".into()),
            ..Default::default()
        };
        assert_eq!(signature(&offer), "v:5.00|pd:-|td:-|pt:-|tt:8");
    }

    #[test]
    fn test_signature_changes_with_each_raw_field() {
        let base = sample();
        let base_sig = signature(&base);

        let mutations: Vec<Box<dyn Fn(&mut StructuredOffer)>> = vec![
            Box::new(|o| o.monetary_value = "7.60".into()),
            Box::new(|o| o.pickup_distance_km = Some("1.3".into())),
            Box::new(|o| o.trip_distance_km = None),
            Box::new(|o| o.pickup_duration_min = Some("4".into())),
            Box::new(|o| o.trip_duration_min = Some("13".into())),
        ];

        for mutate in mutations {
            let mut changed = base.clone();
            mutate(&mut changed);
            assert_ne!(signature(&changed), base_sig);
        }
    }

    #[test]
    fn test_signature_ignores_non_key_fields() {
        let base = sample();
        let mut other = base.clone();
        other.pickup_address = Some("Rua Augusta 10".into());
        other.service_label = Some("Comfort".into());
        other.raw_text = "different".into();
        assert_eq!(signature(&base), signature(&other));
    }
}

//! The single coordinator between the capture pipeline and the display.
//!
//! Holds the offer currently on display. A reading of the same offer within
//! the hold window keeps the display as it is, so a card that stays on screen
//! for a while is shown once.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::SharedConfig;
use crate::offer::{evaluate, signature, EvaluationResult, StructuredOffer};
use crate::sink::OfferSink;

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    /// Same offer as the one on display; the hold was refreshed.
    Held,
    /// A new offer, evaluated and forwarded to the sink.
    Forwarded(EvaluationResult),
    /// Display is turned off.
    Suppressed,
}

/// The offer on display.
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    pub offer: Option<StructuredOffer>,
    pub displayed_at: Option<Instant>,
    pub signature: Option<String>,
}

pub struct OfferGateway {
    state: Mutex<DisplayState>,
    display_enabled: Mutex<bool>,
    config: SharedConfig,
    sink: Arc<dyn OfferSink>,
}

impl OfferGateway {
    pub fn new(config: SharedConfig, sink: Arc<dyn OfferSink>) -> Self {
        Self {
            state: Mutex::new(DisplayState::default()),
            display_enabled: Mutex::new(true),
            config,
            sink,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn process(&self, offer: StructuredOffer, now: Instant) -> GatewayOutcome {
        if !self.is_display_enabled() {
            self.clear();
            return GatewayOutcome::Suppressed;
        }

        let sig = signature(&offer);
        let hold_window = self.config.timing().hold_window();

        let evaluation = {
            let mut state = self.lock_state();
            let held = state.signature.as_deref() == Some(sig.as_str())
                && state
                    .displayed_at
                    .is_some_and(|at| now.saturating_duration_since(at) < hold_window);
            if held {
                state.displayed_at = Some(now);
                log::debug!("Offer {} already on display", sig);
                return GatewayOutcome::Held;
            }

            let evaluation = evaluate(&offer, &self.config.thresholds());
            state.offer = Some(offer.clone());
            state.displayed_at = Some(now);
            state.signature = Some(sig);
            evaluation
        };

        self.sink.offer_accepted(&evaluation, &offer);
        GatewayOutcome::Forwarded(evaluation)
    }

    /// Forgets the offer on display.
    pub fn clear(&self) {
        *self.lock_state() = DisplayState::default();
    }

    /// Turns the display on or off. Turning it off clears the held offer.
    pub fn set_display_enabled(&self, enabled: bool) {
        *self.display_enabled.lock().unwrap_or_else(|e| e.into_inner()) = enabled;
        if !enabled {
            self.clear();
        }
        log::info!("Offer display {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_display_enabled(&self) -> bool {
        *self.display_enabled.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn display_state(&self) -> DisplayState {
        self.lock_state().clone()
    }

    /// Forwards the pickup prompt to the sink.
    pub fn pickup_detected(&self) {
        self.sink.pickup_detected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::offer::CombinedRating;
    use crate::sink::{ChannelSink, SinkEvent};
    use std::sync::mpsc;
    use std::time::Duration;

    fn offer(value: &str) -> StructuredOffer {
        let mut o = StructuredOffer {
            monetary_value: value.to_string(),
            pickup_distance_km: Some("1.2".into()),
            trip_distance_km: Some("4.5".into()),
            pickup_duration_min: Some("3".into()),
            trip_duration_min: Some("12".into()),
            ..Default::default()
        };
        o.recompute_totals();
        o
    }

    fn gateway() -> (OfferGateway, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel();
        let gw = OfferGateway::new(
            SharedConfig::new(PipelineConfig::default()),
            Arc::new(ChannelSink::new(tx)),
        );
        (gw, rx)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_first_offer_is_forwarded() {
        let (gw, rx) = gateway();
        let outcome = gw.process(offer("7.50"), Instant::now());

        match outcome {
            GatewayOutcome::Forwarded(e) => assert_eq!(e.combined_rating, CombinedRating::Green),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Ok(SinkEvent::Offer(_, _))));
    }

    #[test]
    fn test_same_offer_within_hold_is_held() {
        let (gw, rx) = gateway();
        let t0 = Instant::now();

        gw.process(offer("7.50"), t0);
        assert_eq!(gw.process(offer("7.50"), t0 + secs(10)), GatewayOutcome::Held);
        // Held refreshes the window
        assert_eq!(gw.process(offer("7.50"), t0 + secs(30)), GatewayOutcome::Held);

        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_same_offer_after_hold_is_forwarded_again() {
        let (gw, rx) = gateway();
        let t0 = Instant::now();

        gw.process(offer("7.50"), t0);
        let outcome = gw.process(offer("7.50"), t0 + secs(25));
        assert!(matches!(outcome, GatewayOutcome::Forwarded(_)));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_different_offer_replaces_held_one() {
        let (gw, _rx) = gateway();
        let t0 = Instant::now();

        gw.process(offer("7.50"), t0);
        let outcome = gw.process(offer("9.10"), t0 + secs(1));
        assert!(matches!(outcome, GatewayOutcome::Forwarded(_)));
        assert_eq!(gw.display_state().offer.unwrap().monetary_value, "9.10");
    }

    #[test]
    fn test_clear_forgets_held_offer() {
        let (gw, _rx) = gateway();
        let t0 = Instant::now();

        gw.process(offer("7.50"), t0);
        gw.clear();
        assert!(gw.display_state().signature.is_none());
        assert!(matches!(
            gw.process(offer("7.50"), t0 + secs(1)),
            GatewayOutcome::Forwarded(_)
        ));
    }

    #[test]
    fn test_disabled_display_suppresses() {
        let (gw, rx) = gateway();
        let t0 = Instant::now();

        gw.process(offer("7.50"), t0);
        gw.set_display_enabled(false);
        assert_eq!(gw.process(offer("8.00"), t0 + secs(1)), GatewayOutcome::Suppressed);
        assert!(gw.display_state().offer.is_none());

        gw.set_display_enabled(true);
        assert!(matches!(
            gw.process(offer("7.50"), t0 + secs(2)),
            GatewayOutcome::Forwarded(_)
        ));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_thresholds_follow_config_updates() {
        let (tx, _rx) = mpsc::channel();
        let config = SharedConfig::new(PipelineConfig::default());
        let gw = OfferGateway::new(config.clone(), Arc::new(ChannelSink::new(tx)));

        config.update(|c| c.thresholds.good_per_km = 5.0);
        match gw.process(offer("7.50"), Instant::now()) {
            GatewayOutcome::Forwarded(e) => assert_eq!(e.combined_rating, CombinedRating::Yellow),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

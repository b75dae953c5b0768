//! Where accepted offers go: the display and tracking side.
//!
//! The gateway calls an [`OfferSink`] once per offer that makes it through
//! both dedupe layers.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Local;

use crate::offer::{EvaluationResult, StructuredOffer};

pub trait OfferSink: Send + Sync {
    fn offer_accepted(&self, evaluation: &EvaluationResult, offer: &StructuredOffer);

    /// The "picking up" prompt showed up on screen.
    fn pickup_detected(&self) {}
}

/// Logs each accepted offer.
#[derive(Debug, Default)]
pub struct LogSink;

impl OfferSink for LogSink {
    fn offer_accepted(&self, evaluation: &EvaluationResult, offer: &StructuredOffer) {
        log::info!(
            "[{}] {}€ {} | {} km, {} min | {} -> {} | {:.2} €/km, {:.2} €/h",
            evaluation.combined_rating,
            offer.monetary_value,
            offer.service_label.as_deref().unwrap_or("?"),
            offer.total_distance_km.as_deref().unwrap_or("-"),
            offer.total_duration_min.as_deref().unwrap_or("-"),
            offer.pickup_address.as_deref().unwrap_or("?"),
            offer.destination_address.as_deref().unwrap_or("?"),
            evaluation.value_per_km.unwrap_or(0.0),
            evaluation.value_per_hour.unwrap_or(0.0),
        );
    }

    fn pickup_detected(&self) {
        log::info!("Pickup prompt detected");
    }
}

/// CSV header row.
const CSV_HEADER: &str = "timestamp,value,service,pickup_km,pickup_min,trip_km,trip_min,total_km,total_min,eur_per_km,eur_per_hour,km_rating,hour_rating,combined,pickup_address,destination_address";

/// Initializes CSV file with header if it doesn't exist or is empty.
///
/// If the file exists and has content, this does nothing (preserves existing data).
pub fn init_csv(path: &Path) -> Result<()> {
    if path.exists() {
        let file = File::open(path).context("Failed to open existing CSV")?;
        let reader = BufReader::new(file);
        if reader.lines().next().is_some() {
            return Ok(());
        }
    }

    let mut file = File::create(path).context("Failed to create CSV file")?;
    writeln!(file, "{}", CSV_HEADER).context("Failed to write CSV header")?;
    Ok(())
}

/// Quotes a field when it holds a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn opt(value: &Option<String>) -> String {
    csv_field(value.as_deref().unwrap_or(""))
}

fn ratio(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Appends one offer row to the CSV file.
///
/// Opens the file in append mode for each write, so rows written before a
/// crash are kept.
pub fn append_offer(path: &Path, evaluation: &EvaluationResult, offer: &StructuredOffer) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Failed to open CSV for append")?;

    let line = [
        Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        csv_field(&offer.monetary_value),
        opt(&offer.service_label),
        opt(&offer.pickup_distance_km),
        opt(&offer.pickup_duration_min),
        opt(&offer.trip_distance_km),
        opt(&offer.trip_duration_min),
        opt(&offer.total_distance_km),
        opt(&offer.total_duration_min),
        ratio(evaluation.value_per_km),
        ratio(evaluation.value_per_hour),
        format!("{:?}", evaluation.km_rating),
        format!("{:?}", evaluation.hour_rating),
        evaluation.combined_rating.to_string(),
        opt(&offer.pickup_address),
        opt(&offer.destination_address),
    ]
    .join(",");

    writeln!(file, "{}", line).context("Failed to write CSV row")?;
    Ok(())
}

/// Appends one row per accepted offer.
pub struct CsvSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Result<Self> {
        init_csv(&path)?;
        log::info!("Writing offers to {}", path.display());
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OfferSink for CsvSink {
    fn offer_accepted(&self, evaluation: &EvaluationResult, offer: &StructuredOffer) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = append_offer(&self.path, evaluation, offer) {
            log::warn!("Failed to record offer: {:#}", e);
        }
    }
}

/// What a [`ChannelSink`] sends.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Offer(EvaluationResult, StructuredOffer),
    PickupDetected,
}

/// Sends every event over an mpsc channel.
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SinkEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Sink channel closed, event dropped");
        }
    }
}

impl OfferSink for ChannelSink {
    fn offer_accepted(&self, evaluation: &EvaluationResult, offer: &StructuredOffer) {
        self.send(SinkEvent::Offer(*evaluation, offer.clone()));
    }

    fn pickup_detected(&self) {
        self.send(SinkEvent::PickupDetected);
    }
}

/// Forwards every event to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OfferSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn OfferSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn OfferSink>) {
        self.sinks.push(sink);
    }
}

impl OfferSink for FanoutSink {
    fn offer_accepted(&self, evaluation: &EvaluationResult, offer: &StructuredOffer) {
        for sink in &self.sinks {
            sink.offer_accepted(evaluation, offer);
        }
    }

    fn pickup_detected(&self) {
        for sink in &self.sinks {
            sink.pickup_detected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{evaluate, RatingThresholds};
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn sample() -> (EvaluationResult, StructuredOffer) {
        let mut offer = StructuredOffer {
            monetary_value: "7.50".into(),
            pickup_distance_km: Some("1.2".into()),
            trip_distance_km: Some("4.5".into()),
            pickup_duration_min: Some("3".into()),
            trip_duration_min: Some("12".into()),
            pickup_address: Some("Rua Augusta 10, Lisboa".into()),
            ..Default::default()
        };
        offer.recompute_totals();
        (evaluate(&offer, &RatingThresholds::default()), offer)
    }

    #[test]
    fn test_init_csv_creates_header() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("offers.csv");

        init_csv(&csv_path).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with(CSV_HEADER));
    }

    #[test]
    fn test_init_csv_preserves_existing() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("offers.csv");
        std::fs::write(&csv_path, "existing,data\n1,2,3\n").unwrap();

        init_csv(&csv_path).unwrap();

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("existing,data"));
    }

    #[test]
    fn test_csv_sink_writes_header_once() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("offers.csv");
        let (evaluation, offer) = sample();

        let sink = CsvSink::new(csv_path.clone()).unwrap();
        sink.offer_accepted(&evaluation, &offer);
        let sink = CsvSink::new(csv_path.clone()).unwrap();
        sink.offer_accepted(&evaluation, &offer);

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 data rows
        assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);
        assert!(lines[1].contains(",7.50,"));
        assert!(lines[1].contains(",5.7,15,1.32,30.00,Good,Good,GREEN,"));
        assert!(lines[1].contains("\"Rua Augusta 10, Lisboa\""));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a, b"), "\"a, b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_channel_and_fanout() {
        let (tx, rx) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        let fanout = FanoutSink::new(vec![
            Arc::new(ChannelSink::new(tx)),
            Arc::new(LogSink),
            Arc::new(ChannelSink::new(tx2)),
        ]);
        let (evaluation, offer) = sample();

        fanout.offer_accepted(&evaluation, &offer);
        fanout.pickup_detected();

        assert_eq!(rx.recv().unwrap(), SinkEvent::Offer(evaluation, offer.clone()));
        assert_eq!(rx.recv().unwrap(), SinkEvent::PickupDetected);
        assert_eq!(rx2.recv().unwrap(), SinkEvent::Offer(evaluation, offer));
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        let (evaluation, offer) = sample();
        sink.offer_accepted(&evaluation, &offer);
    }
}

//! The capture worker.
//!
//! One worker thread owns the whole per-frame pipeline: gate, crop, OCR,
//! extraction, voting, the capture-side dedupe and the hand-off to the
//! gateway. At most one frame is in flight. Frames submitted while one is
//! being processed are dropped, never queued behind it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::gate::{FrameChangeGate, GateDecision};
use super::region::{crop, RegionSelector};
use super::stability::StabilityWindow;
use super::{CapturedFrame, FrameSource};
use crate::config::{SharedConfig, TimingConfig};
use crate::extract::OfferTextExtractor;
use crate::gateway::{GatewayOutcome, OfferGateway};
use crate::ocr::OcrEngine;
use crate::offer::{signature, StructuredOffer};

/// How often a recorded source checks whether the worker is free.
const BUSY_POLL: Duration = Duration::from_millis(5);

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    SkippedLocked,
    SkippedDuplicate,
    /// No configured region had any pixels.
    NoRegion,
    OcrFailed,
    NotAnOffer,
    /// Not yet seen often enough to trust.
    Unstable,
    /// Price outside the sanity limits.
    Insane,
    /// Same offer as the one accepted moments ago.
    DuplicateOffer,
    Delivered(GatewayOutcome),
}

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    DroppedBusy,
    DroppedPaused,
    DroppedStopped,
}

/// Runs one frame through the pipeline. Owns all per-frame state.
pub struct FrameProcessor {
    config: SharedConfig,
    gateway: Arc<OfferGateway>,
    engine: Box<dyn OcrEngine>,
    gate: FrameChangeGate,
    stability: StabilityWindow,
    /// Extractor and the config generation it was built from.
    extractor: Option<(u64, OfferTextExtractor)>,
    /// Candidate read from the last analyzed frame, keyed by its hash. An
    /// unchanged frame votes for it again without another OCR pass.
    last_candidate: Option<(u64, StructuredOffer)>,
    last_pickup_prompt: Option<Instant>,
}

impl FrameProcessor {
    pub fn new(config: SharedConfig, gateway: Arc<OfferGateway>, engine: Box<dyn OcrEngine>) -> Self {
        Self {
            config,
            gateway,
            engine,
            gate: FrameChangeGate::new(),
            stability: StabilityWindow::new(),
            extractor: None,
            last_candidate: None,
            last_pickup_prompt: None,
        }
    }

    /// Rebuilds the extractor when the configuration changed. A vocabulary
    /// that fails to compile keeps the previous extractor.
    fn refresh_extractor(&mut self) {
        let generation = self.config.generation();
        if self.extractor.as_ref().is_some_and(|(g, _)| *g == generation) {
            return;
        }
        let built = self
            .config
            .with(|c| OfferTextExtractor::new(&c.vocabulary, c.legs, c.address));
        match built {
            Ok(extractor) => {
                log::debug!("Extractor built for config generation {}", generation);
                self.extractor = Some((generation, extractor));
            }
            Err(e) => log::warn!("Keeping previous extractor: {}", e),
        }
    }

    pub fn process(&mut self, frame: CapturedFrame) -> CycleOutcome {
        let now = frame.captured_at;
        let timing = self.config.timing();

        match self.gate.check(frame.hash, now, &timing) {
            GateDecision::SkipLocked => return CycleOutcome::SkippedLocked,
            GateDecision::SkipDuplicate => return self.revote(frame.hash, now, &timing),
            GateDecision::Proceed => {}
        }
        self.last_candidate = None;

        let hash = frame.hash;
        let (width, height) = frame.image.dimensions();
        let crops: Vec<_> = RegionSelector::new(self.config.with(|c| c.regions.clone()))
            .regions(width, height)
            .iter()
            .filter_map(|rect| crop(&frame.image, rect))
            .collect();
        drop(frame);
        if crops.is_empty() {
            return CycleOutcome::NoRegion;
        }

        self.refresh_extractor();
        let Some((_, extractor)) = self.extractor.as_ref() else {
            return CycleOutcome::NotAnOffer;
        };

        let mut candidate = None;
        for image in crops {
            let recognized = match self.engine.recognize(&image) {
                Ok(recognized) => recognized,
                Err(e) => {
                    log::warn!("OCR failed: {}", e);
                    return CycleOutcome::OcrFailed;
                }
            };
            drop(image);

            if extractor.detects_pickup_state(&recognized.full_text()) {
                let debounced = self
                    .last_pickup_prompt
                    .is_some_and(|at| now.saturating_duration_since(at) < timing.pickup_prompt_debounce());
                if !debounced {
                    self.last_pickup_prompt = Some(now);
                    self.gateway.pickup_detected();
                }
            }

            if let Some(offer) = extractor.extract(&recognized) {
                candidate = Some(offer);
                break;
            }
        }

        let Some(candidate) = candidate else {
            return CycleOutcome::NotAnOffer;
        };
        log::trace!("Candidate {}", signature(&candidate));
        self.last_candidate = Some((hash, candidate.clone()));
        self.settle(candidate, now, &timing)
    }

    /// An unchanged frame repeats the reading of the frame it duplicates.
    fn revote(&mut self, hash: u64, now: Instant, timing: &TimingConfig) -> CycleOutcome {
        let candidate = match &self.last_candidate {
            Some((seen, candidate)) if *seen == hash => candidate.clone(),
            _ => return CycleOutcome::SkippedDuplicate,
        };
        self.settle(candidate, now, timing)
    }

    /// Votes, checks and delivers a candidate.
    fn settle(&mut self, candidate: StructuredOffer, now: Instant, timing: &TimingConfig) -> CycleOutcome {
        let (stability, sanity) = self.config.with(|c| (c.stability, c.sanity));

        let Some(stable) = self
            .stability
            .add(candidate, now, timing.stability_window(), &stability)
        else {
            return CycleOutcome::Unstable;
        };

        if !sanity.verdict(&stable) {
            log::debug!("Rejected implausible price {}", stable.monetary_value);
            return CycleOutcome::Insane;
        }

        let sig = signature(&stable);
        if self.gate.is_recent_offer(&sig, now, timing.offer_lock()) {
            return CycleOutcome::DuplicateOffer;
        }
        self.gate.record_offer(sig, now);

        CycleOutcome::Delivered(self.gateway.process(stable, now))
    }

    /// Forgets all per-frame state.
    pub fn reset(&mut self) {
        self.gate.reset();
        self.stability.clear();
        self.last_candidate = None;
        self.last_pickup_prompt = None;
    }
}

/// State shared between the submitting side and the worker.
///
/// Every submitted frame gets a ticket. Only the holder of the current ticket
/// can clear it, so a late finish never frees a newer frame.
#[derive(Default)]
struct Flags {
    /// Ticket of the frame handed to the worker, 0 when idle.
    in_flight: AtomicU64,
    /// Ticket the worker is analyzing, 0 when none.
    analyzing: AtomicU64,
    next_ticket: AtomicU64,
    in_flight_since: Mutex<Option<Instant>>,
    paused: AtomicBool,
    frozen_until: Mutex<Option<Instant>>,
}

impl Flags {
    /// Ticket transitions happen under this lock.
    fn lock_since(&self) -> MutexGuard<'_, Option<Instant>> {
        self.in_flight_since.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the in-flight slot. `None` when a frame already holds it.
    fn try_begin(&self, now: Instant) -> Option<u64> {
        let mut since = self.lock_since();
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight
            .compare_exchange(0, ticket, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        *since = Some(now);
        Some(ticket)
    }

    /// The worker takes ownership of a ticket. False when it was released in
    /// the meantime.
    fn start(&self, ticket: u64) -> bool {
        let _since = self.lock_since();
        if self.in_flight.load(Ordering::SeqCst) != ticket {
            return false;
        }
        self.analyzing.store(ticket, Ordering::SeqCst);
        true
    }

    /// Clears `ticket` if it is still the current one.
    fn finish(&self, ticket: u64) {
        let mut since = self.lock_since();
        let _ = self
            .analyzing
            .compare_exchange(ticket, 0, Ordering::SeqCst, Ordering::SeqCst);
        if self
            .in_flight
            .compare_exchange(ticket, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *since = None;
        }
    }

    /// Releases a frame the worker never picked up within `timeout`. A frame
    /// under analysis is left alone; the OCR timeout bounds it.
    fn release_if_stalled(&self, now: Instant, timeout: Duration) -> bool {
        let mut since = self.lock_since();
        let ticket = self.in_flight.load(Ordering::SeqCst);
        if ticket == 0 || self.analyzing.load(Ordering::SeqCst) == ticket {
            return false;
        }
        let stalled = since.is_some_and(|at| now.saturating_duration_since(at) > timeout);
        if stalled {
            *since = None;
            self.in_flight.store(0, Ordering::SeqCst);
        }
        stalled
    }

    fn clear(&self) {
        let mut since = self.lock_since();
        *since = None;
        self.analyzing.store(0, Ordering::SeqCst);
        self.in_flight.store(0, Ordering::SeqCst);
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) != 0
    }
}

/// Finishes a ticket when dropped, including on panic.
struct InFlightGuard<'a> {
    flags: &'a Flags,
    ticket: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flags.finish(self.ticket);
    }
}

pub struct CaptureService {
    tx: Option<SyncSender<(u64, CapturedFrame)>>,
    worker: Option<JoinHandle<()>>,
    flags: Arc<Flags>,
    config: SharedConfig,
    gateway: Arc<OfferGateway>,
}

impl CaptureService {
    /// Spawns the worker thread.
    pub fn start(
        config: SharedConfig,
        gateway: Arc<OfferGateway>,
        engine: Box<dyn OcrEngine>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<(u64, CapturedFrame)>(1);
        let flags = Arc::new(Flags::default());
        let processor = FrameProcessor::new(config.clone(), gateway.clone(), engine);

        let worker_flags = flags.clone();
        let worker = thread::Builder::new()
            .name("offer-capture-worker".to_string())
            .spawn(move || run_worker(rx, processor, worker_flags))
            .context("Failed to spawn capture worker")?;

        log::info!("Capture service started");
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            flags,
            config,
            gateway,
        })
    }

    /// Hands a frame to the worker unless it is busy, paused or stopped.
    pub fn submit(&self, frame: CapturedFrame) -> SubmitOutcome {
        let Some(tx) = &self.tx else {
            return SubmitOutcome::DroppedStopped;
        };
        if self.is_paused() {
            return SubmitOutcome::DroppedPaused;
        }
        let Some(ticket) = self.flags.try_begin(Instant::now()) else {
            return SubmitOutcome::DroppedBusy;
        };

        match tx.try_send((ticket, frame)) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.flags.finish(ticket);
                SubmitOutcome::DroppedBusy
            }
            Err(TrySendError::Disconnected(_)) => {
                self.flags.finish(ticket);
                SubmitOutcome::DroppedStopped
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.flags.is_busy()
    }

    /// Paused explicitly or frozen for a while.
    pub fn is_paused(&self) -> bool {
        if self.flags.paused.load(Ordering::SeqCst) {
            return true;
        }
        self.flags
            .frozen_until
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|until| Instant::now() < until)
    }

    /// Suspends analysis for `duration`.
    pub fn freeze_for(&self, duration: Duration) {
        *self.flags.frozen_until.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Instant::now() + duration);
        log::debug!("Capture frozen for {:?}", duration);
    }

    /// Lifts a freeze early.
    pub fn resume(&self) {
        *self.flags.frozen_until.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn set_paused(&self, paused: bool) {
        self.flags.paused.store(paused, Ordering::SeqCst);
        log::info!("Capture {}", if paused { "paused" } else { "resumed" });
    }

    /// Releases a queued frame the worker has not picked up within the stall
    /// timeout. Returns true when it did. A frame already under analysis
    /// stays in flight until OCR finishes or times out.
    pub fn watchdog_tick(&self, now: Instant) -> bool {
        let stall_timeout = self.config.timing().stall_timeout();
        let released = self.flags.release_if_stalled(now, stall_timeout);
        if released {
            log::warn!("Frame queued for over {:?}, releasing", stall_timeout);
        }
        released
    }

    /// Closes the channel, waits for the worker and clears the display.
    pub fn stop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        drop(tx);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Capture worker panicked");
            }
        }
        self.flags.clear();
        self.gateway.clear();
        log::info!("Capture service stopped");
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(rx: Receiver<(u64, CapturedFrame)>, mut processor: FrameProcessor, flags: Arc<Flags>) {
    log::info!("Capture worker started");

    for (ticket, frame) in rx {
        if !flags.start(ticket) {
            log::debug!("Frame {} was released before analysis, dropped", ticket);
            continue;
        }
        let _guard = InFlightGuard {
            flags: &flags,
            ticket,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| processor.process(frame))) {
            Ok(outcome) => log::debug!("Cycle: {:?}", outcome),
            Err(_) => log::error!("Frame processing panicked, frame dropped"),
        }
    }

    processor.reset();
    log::info!("Capture worker finished");
}

/// Pulls frames from `source` into `service` until the source runs dry or
/// `stop` is set. Capture errors are logged and skipped.
///
/// A live source is sampled every `frame_interval` and frames that arrive
/// while the worker is busy are dropped. A recorded source instead waits for
/// the worker before reading its next frame.
///
/// Returns the number of frames read.
pub fn run_capture_loop(
    source: &mut dyn FrameSource,
    service: &CaptureService,
    stop: &AtomicBool,
    frame_interval: Duration,
) -> usize {
    let live = source.is_live();
    let mut frames = 0;

    while !stop.load(Ordering::SeqCst) {
        if !live {
            while service.is_busy() && !stop.load(Ordering::SeqCst) {
                service.watchdog_tick(Instant::now());
                thread::sleep(BUSY_POLL);
            }
        }

        match source.next_frame() {
            Ok(Some(frame)) => {
                frames += 1;
                let outcome = service.submit(frame);
                log::trace!("Frame {}: {:?}", frames, outcome);
                if outcome == SubmitOutcome::DroppedStopped {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => log::warn!("Capture failed, skipping: {}", e),
        }

        service.watchdog_tick(Instant::now());
        if live && !frame_interval.is_zero() {
            thread::sleep(frame_interval);
        }
    }

    log::info!("Capture loop finished after {} frames", frames);
    frames
}

//! Offer Capture
//!
//! Replays a directory of screenshots through the offer pipeline and records
//! every accepted offer to a per-session CSV file.

mod cli;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;

use offer_capture::capture::{run_capture_loop, CaptureService, DirectorySource};
use offer_capture::config::{self, SharedConfig};
use offer_capture::gateway::OfferGateway;
use offer_capture::logging::{self, LOG_FILE_NAME};
use offer_capture::ocr::TesseractEngine;
use offer_capture::paths;
use offer_capture::sink::{CsvSink, FanoutSink, LogSink, OfferSink};

use crate::cli::CliArgs;

fn main() -> Result<()> {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join(LOG_FILE_NAME);
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            use std::io::Write;
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));

    let args = CliArgs::parse();

    // Ensure output directories exist
    paths::ensure_directories()?;
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::init(level).context("Failed to install logger")?;

    let mut pipeline_config = match &args.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config(),
    };
    args.apply_replay_votes(&mut pipeline_config);
    let ocr_config = pipeline_config.ocr.clone();
    let ocr_timeout = pipeline_config.timing.ocr_timeout();
    let frame_interval = pipeline_config.timing.frame_interval();
    let shared = SharedConfig::new(pipeline_config);

    let session_dir = paths::get_output_dir().join(paths::session_folder_name());
    std::fs::create_dir_all(&session_dir)
        .with_context(|| format!("Failed to create {}", session_dir.display()))?;
    let csv_sink = CsvSink::new(session_dir.join("offers.csv"))?;
    let sinks: Vec<Arc<dyn OfferSink>> = vec![Arc::new(LogSink), Arc::new(csv_sink)];
    let gateway = Arc::new(OfferGateway::new(shared.clone(), Arc::new(FanoutSink::new(sinks))));

    let engine = TesseractEngine::new(&ocr_config, ocr_timeout)
        .context("Tesseract is required. Install it or set ocr.tesseract_path in config.json")?;
    let mut source = DirectorySource::new(&args.input_dir)
        .with_context(|| format!("Failed to read {}", args.input_dir.display()))?
        .with_spacing(args.spacing());

    let mut service = CaptureService::start(shared, gateway, Box::new(engine))?;
    let stop = AtomicBool::new(false);
    let frames = run_capture_loop(&mut source, &service, &stop, frame_interval);

    // Let the last frame finish
    while service.is_busy() {
        std::thread::sleep(frame_interval.max(std::time::Duration::from_millis(10)));
    }
    service.stop();

    log::info!("Processed {} screenshots, results in {}", frames, session_dir.display());
    Ok(())
}

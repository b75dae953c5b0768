//! Console and file logging.
//!
//! Every record goes to stdout and is appended to `logs/offer_capture.log`
//! next to the executable, each line prefixed with a local timestamp.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::paths;

pub const LOG_FILE_NAME: &str = "offer_capture.log";

pub struct FileLogger {
    level: LevelFilter,
    path: PathBuf,
}

impl FileLogger {
    pub fn new(level: LevelFilter, path: PathBuf) -> Self {
        Self { level, path }
    }
}

/// `[HH:MM:SS.mmm] LEVEL target: message`
fn format_line(record: &Record) -> String {
    format!(
        "[{}] {:<5} {}: {}\n",
        Local::now().format("%H:%M:%S%.3f"),
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record);
        print!("{}", line);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = file.write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Installs the logger. Call once at startup.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let path = paths::get_logs_dir().join(LOG_FILE_NAME);
    log::set_boxed_logger(Box::new(FileLogger::new(level, path)))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use tempfile::tempdir;

    #[test]
    fn test_logger_appends_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let logger = FileLogger::new(LevelFilter::Info, path.clone());

        logger.log(
            &Record::builder()
                .args(format_args!("offer accepted"))
                .level(Level::Info)
                .target("offer_capture::sink")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("too chatty"))
                .level(Level::Debug)
                .target("offer_capture::sink")
                .build(),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with('['));
        assert!(content.contains("] INFO  offer_capture::sink: offer accepted"));
    }

    #[test]
    fn test_unwritable_path_is_ignored() {
        let dir = tempdir().unwrap();
        let logger = FileLogger::new(LevelFilter::Info, dir.path().join("missing").join("x.log"));
        logger.log(
            &Record::builder()
                .args(format_args!("still fine"))
                .level(Level::Warn)
                .build(),
        );
    }

    #[test]
    fn test_init_installs_logger_once() {
        init(LevelFilter::Warn).unwrap();
        assert_eq!(log::max_level(), LevelFilter::Warn);
        assert!(init(LevelFilter::Info).is_err());
    }
}

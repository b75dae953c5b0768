use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::Local;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the output directory: `<exe_dir>/offers/`
pub fn get_output_dir() -> PathBuf {
    get_exe_dir().join("offers")
}

/// Returns a fresh per-session folder name: `session_YYYYMMDD_HHMMSS`
pub fn session_folder_name() -> String {
    format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_output_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_live_next_to_exe() {
        assert!(get_logs_dir().starts_with(get_exe_dir()));
        assert!(get_output_dir().ends_with("offers"));
    }

    #[test]
    fn test_session_folder_name() {
        let name = session_folder_name();
        assert!(name.starts_with("session_"));
        assert_eq!(name.len(), "session_20250101_120000".len());
    }
}

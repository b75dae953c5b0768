use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::OcrError;

const EXE_NAME: &str = if cfg!(windows) { "tesseract.exe" } else { "tesseract" };

/// Returns the directory for a locally installed Tesseract:
/// `<data_local_dir>/offer-capture/tesseract`.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("offer-capture")
        .join("tesseract")
}

/// Finds the Tesseract executable: the configured path first, then our local
/// dir, then `PATH`, then the usual install locations.
pub fn find_tesseract_executable(configured: Option<&str>) -> Result<PathBuf, OcrError> {
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        log::warn!("Configured tesseract path {} does not exist, searching", p.display());
    }

    let local_exe = get_tesseract_dir().join(EXE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
        "/usr/bin/tesseract",
        "/usr/local/bin/tesseract",
        "/opt/homebrew/bin/tesseract",
    ];
    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(OcrError::EngineNotFound(
        "tesseract not found, install Tesseract-OCR or set ocr.tesseract_path".to_string(),
    ))
}

fn has_languages(dir: &Path, language: &str) -> bool {
    language
        .split('+')
        .filter(|l| !l.is_empty())
        .all(|l| dir.join(format!("{}.traineddata", l)).exists())
}

/// Finds a tessdata directory holding every language in `language`
/// ("por+eng"). `None` lets Tesseract use its built-in default.
pub fn find_tessdata_dir(language: &str) -> Option<PathBuf> {
    let local_tessdata = get_tesseract_dir().join("tessdata");
    if has_languages(&local_tessdata, language) {
        return Some(local_tessdata);
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_languages(&p, language) {
            return Some(p);
        }
        let p = p.join("tessdata");
        if has_languages(&p, language) {
            return Some(p);
        }
    }

    let system_paths = [
        r"C:\Program Files\Tesseract-OCR\tessdata",
        r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    ];
    system_paths
        .iter()
        .map(PathBuf::from)
        .find(|p| has_languages(p, language))
}

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tempfile::NamedTempFile;

use super::preprocess::prepare_for_ocr;
use super::setup::{find_tessdata_dir, find_tesseract_executable};
use super::{OcrConfig, OcrEngine, OcrLine, OcrToken, RecognizedText};
use crate::error::OcrError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the `tesseract` CLI in TSV mode on each image.
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    config: OcrConfig,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig, timeout: Duration) -> Result<Self, OcrError> {
        let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
        let tessdata = find_tessdata_dir(&config.language);
        log::info!(
            "Using tesseract at {} (tessdata: {})",
            executable.display(),
            tessdata
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "default".to_string())
        );
        Ok(Self {
            executable,
            tessdata,
            config: config.clone(),
            timeout,
        })
    }

    fn command(&self, input: &std::path::Path, output_base: &str) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input).arg(output_base);
        if let Some(dir) = &self.tessdata {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(self.config.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, image: &RgbaImage) -> Result<RecognizedText, OcrError> {
        let prepared = prepare_for_ocr(image, self.config.upscale);

        let temp_input = NamedTempFile::with_suffix(".png")?;
        prepared.save(temp_input.path())?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();
        let tsv_path = format!("{}.tsv", output_base);

        let started = Instant::now();
        let mut child = self.command(temp_input.path(), &output_base).spawn()?;
        let status = match wait_with_timeout(&mut child, self.timeout) {
            Ok(status) => status,
            Err(e) => {
                cleanup(temp_input, temp_output, &tsv_path);
                return Err(e);
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            cleanup(temp_input, temp_output, &tsv_path);
            return Err(OcrError::Failed(format!("tesseract exited with {}: {}", status, stderr.trim())));
        }

        let tsv = std::fs::read_to_string(&tsv_path);
        cleanup(temp_input, temp_output, &tsv_path);
        let text = parse_tsv_output(&tsv?);

        log::debug!(
            "OCR: {} lines, {} tokens in {:?}",
            text.lines.len(),
            text.tokens.len(),
            started.elapsed()
        );
        Ok(text)
    }
}

/// Polls the child until it exits, killing it once `timeout` has passed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, OcrError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill timed out tesseract: {}", e);
            }
            let _ = child.wait();
            return Err(OcrError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn cleanup(input: NamedTempFile, output: NamedTempFile, tsv_path: &str) {
    if let Err(e) = input.close() {
        log::warn!("Failed to remove OCR input file: {}", e);
    }
    if let Err(e) = output.close() {
        log::warn!("Failed to remove OCR output file: {}", e);
    }
    if let Err(e) = std::fs::remove_file(tsv_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", tsv_path, e);
        }
    }
}

struct LineAccumulator {
    key: (i32, i32, i32),
    words: Vec<String>,
    top: f32,
    bottom: f32,
}

impl LineAccumulator {
    fn finish(self) -> OcrLine {
        OcrLine {
            text: self.words.join(" "),
            center_y: (self.top + self.bottom) / 2.0,
            height: self.bottom - self.top,
        }
    }
}

/// Parses Tesseract TSV output into tokens and lines.
///
/// Words are grouped into lines by (block, paragraph, line).
pub fn parse_tsv_output(tsv: &str) -> RecognizedText {
    let mut tokens = Vec::new();
    let mut lines: Vec<LineAccumulator> = Vec::new();

    for row in tsv.lines().skip(1) {
        // Skip header
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let level: i32 = fields[0].parse().unwrap_or(-1);
        // Level 5 = word
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| fields[i].trim().parse::<i32>().unwrap_or(-1);
        let px = |i: usize| fields[i].trim().parse::<f32>().unwrap_or(0.0);
        let key = (num(2), num(3), num(4));
        let (left, top, width, height) = (px(6), px(7), px(8), px(9));

        tokens.push(OcrToken {
            text: text.to_string(),
            center_x: left + width / 2.0,
            center_y: top + height / 2.0,
            height,
            confidence: conf,
        });

        match lines.iter_mut().find(|l| l.key == key) {
            Some(line) => {
                line.words.push(text.to_string());
                line.top = line.top.min(top);
                line.bottom = line.bottom.max(top + height);
            }
            None => lines.push(LineAccumulator {
                key,
                words: vec![text.to_string()],
                top,
                bottom: top + height,
            }),
        }
    }

    let lines: Vec<OcrLine> = lines.into_iter().map(LineAccumulator::finish).collect();
    let text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    RecognizedText {
        text,
        lines,
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: i32, line: i32, word: i32, left: i32, top: i32, conf: &str, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t{word}\t{left}\t{top}\t40\t20\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_groups_lines() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t".to_string(),
            word(1, 1, 1, 10, 100, "95.1", "€"),
            word(1, 1, 2, 60, 102, "93.0", "7,50"),
            word(1, 2, 1, 10, 140, "90.2", "Trip"),
            word(1, 2, 2, 60, 140, "91.0", "of"),
            word(1, 2, 3, 110, 141, "88.4", "12"),
        ]
        .join("\n");

        let rt = parse_tsv_output(&tsv);
        assert_eq!(rt.tokens.len(), 5);
        assert_eq!(rt.lines.len(), 2);
        assert_eq!(rt.lines[0].text, "€ 7,50");
        assert_eq!(rt.lines[1].text, "Trip of 12");
        assert_eq!(rt.text, "€ 7,50\nTrip of 12");

        // top 100, bottom 122
        assert_eq!(rt.lines[0].center_y, 111.0);
        assert_eq!(rt.lines[0].height, 22.0);
        assert_eq!(rt.tokens[0].center_x, 30.0);
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_unconfident() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, 10, 100, "-1", ""),
            word(1, 1, 2, 10, 100, "-1", "ghost"),
            word(1, 1, 3, 60, 100, "80", "UberX"),
            "garbage row".to_string(),
        ]
        .join("\n");

        let rt = parse_tsv_output(&tsv);
        assert_eq!(rt.tokens.len(), 1);
        assert_eq!(rt.text, "UberX");
    }

    #[test]
    fn test_parse_tsv_separates_blocks() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, 10, 100, "90", "left"),
            word(2, 1, 1, 400, 100, "90", "right"),
        ]
        .join("\n");

        let rt = parse_tsv_output(&tsv);
        assert_eq!(rt.lines.len(), 2);
    }

    #[test]
    fn test_parse_empty_output() {
        let rt = parse_tsv_output("");
        assert!(rt.text.is_empty());
        assert!(rt.lines.is_empty());
    }
}

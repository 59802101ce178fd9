//! OCR invocation.
//!
//! The engine is a trait seam so the pipeline can degrade to a no-op when
//! no OCR backend is installed and so tests can run against a stub. The
//! shipped implementation shells out to the Tesseract CLI and parses its
//! TSV output for per-word confidences.

use std::process::Command;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use uuid::Uuid;

use crate::config::{DpiMode, ReaderConfig};

#[derive(Debug, Clone)]
pub struct OcrParams {
    pub lang: String,
    pub psm: u8,
    pub oem: u8,
}

impl OcrParams {
    pub fn from_config(cfg: &ReaderConfig) -> Self {
        Self {
            lang: cfg.lang.clone(),
            psm: cfg.psm,
            oem: cfg.oem,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub text: String,
    /// Average per-word confidence; invalid (negative) word scores are
    /// discarded before averaging.
    pub avg_conf: f32,
    pub words: usize,
    pub elapsed: Duration,
}

pub trait OcrEngine: Send + Sync {
    /// Whether the backend is usable at all. A false answer downgrades OCR
    /// to a no-op for the remainder of the run.
    fn is_available(&self) -> bool;

    fn recognize(&self, image: &DynamicImage, params: &OcrParams) -> Result<OcrOutput>;
}

/// Rasterization DPI for a page, chosen adaptively from the estimated font
/// size: small glyphs need more pixels to survive recognition.
pub fn recommended_dpi(cfg: &ReaderConfig, median_font_size: Option<f32>) -> u32 {
    let dpi = match cfg.dpi_mode {
        DpiMode::Fixed => cfg.dpi,
        DpiMode::Auto => match median_font_size {
            None => 350,
            Some(size) if size < 7.5 => 400,
            Some(size) if size < 9.5 => 350,
            Some(_) => 300,
        },
    };
    dpi.clamp(ReaderConfig::DPI_MIN, ReaderConfig::DPI_MAX)
}

/// Tesseract CLI backend. Requires the `tesseract` binary on PATH (or an
/// explicit path); availability is probed once per process.
pub struct TesseractOcr {
    binary: String,
    available: OnceLock<bool>,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            available: OnceLock::new(),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            Command::new(&self.binary)
                .arg("--version")
                .output()
                .map(|out| out.status.success())
                .unwrap_or(false)
        })
    }

    fn recognize(&self, image: &DynamicImage, params: &OcrParams) -> Result<OcrOutput> {
        let start = Instant::now();
        let tmp_path = std::env::temp_dir().join(format!("unipage-ocr-{}.png", Uuid::new_v4()));
        image
            .save(&tmp_path)
            .with_context(|| format!("can't write OCR input image to {}", tmp_path.display()))?;

        let output = Command::new(&self.binary)
            .arg(&tmp_path)
            .arg("stdout")
            .args(["-l", &params.lang])
            .args(["--psm", &params.psm.to_string()])
            .args(["--oem", &params.oem.to_string()])
            .arg("tsv")
            .output();
        let _ = std::fs::remove_file(&tmp_path);

        let output = output.context("failed to spawn tesseract")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let mut parsed = parse_tsv(&tsv);
        parsed.elapsed = start.elapsed();
        Ok(parsed)
    }
}

/// Reassemble text and average word confidence from tesseract TSV rows.
///
/// Word rows carry level 5; line breaks follow the (block, paragraph, line)
/// triple so the reconstructed text keeps tesseract's line structure.
pub(crate) fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut text = String::new();
    let mut confidences: Vec<f32> = Vec::new();
    let mut words = 0usize;
    let mut current_line: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let line_key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match current_line {
            Some(key) if key == line_key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(line_key);
        text.push_str(word);
        words += 1;
        if let Ok(conf) = cols[10].parse::<f32>() {
            if conf >= 0.0 {
                confidences.push(conf);
            }
        }
    }

    let avg_conf = if confidences.is_empty() {
        0.0
    } else {
        let avg = confidences.iter().sum::<f32>() / confidences.len() as f32;
        (avg * 100.0).round() / 100.0
    };

    OcrOutput {
        text,
        avg_conf,
        words,
        elapsed: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(block: u32, par: u32, line: u32, word: u32, conf: &str, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn parses_words_and_line_breaks() {
        let tsv = [
            HEADER.to_owned(),
            word_row(1, 1, 1, 1, "91.0", "Hello"),
            word_row(1, 1, 1, 2, "88.5", "world"),
            word_row(1, 1, 2, 1, "76.0", "again"),
        ]
        .join("\n");
        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "Hello world\nagain");
        assert_eq!(out.words, 3);
        assert_eq!(out.avg_conf, 85.17);
    }

    #[test]
    fn discards_negative_confidences() {
        let tsv = [
            HEADER.to_owned(),
            word_row(1, 1, 1, 1, "-1", "noise"),
            word_row(1, 1, 1, 2, "80", "signal"),
        ]
        .join("\n");
        let out = parse_tsv(&tsv);
        assert_eq!(out.words, 2);
        assert_eq!(out.avg_conf, 80.0);
    }

    #[test]
    fn skips_non_word_rows_and_empty_words() {
        let tsv = [
            HEADER.to_owned(),
            "4\t1\t1\t1\t1\t0\t0\t0\t10\t10\t-1\t".to_owned(),
            word_row(1, 1, 1, 1, "70", " "),
            word_row(1, 1, 1, 2, "70", "ok"),
        ]
        .join("\n");
        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "ok");
        assert_eq!(out.words, 1);
    }

    #[test]
    fn empty_input_yields_zero_confidence() {
        let out = parse_tsv(HEADER);
        assert!(out.text.is_empty());
        assert_eq!(out.avg_conf, 0.0);
        assert_eq!(out.words, 0);
    }

    #[test]
    fn dpi_follows_font_size_in_auto_mode() {
        let cfg = ReaderConfig::default();
        assert_eq!(recommended_dpi(&cfg, None), 350);
        assert_eq!(recommended_dpi(&cfg, Some(6.0)), 400);
        assert_eq!(recommended_dpi(&cfg, Some(8.0)), 350);
        assert_eq!(recommended_dpi(&cfg, Some(11.0)), 300);
    }

    #[test]
    fn dpi_is_clamped_in_fixed_mode() {
        let mut cfg = ReaderConfig {
            dpi_mode: DpiMode::Fixed,
            ..Default::default()
        };
        cfg.dpi = 100;
        assert_eq!(recommended_dpi(&cfg, None), 200);
        cfg.dpi = 1000;
        assert_eq!(recommended_dpi(&cfg, Some(8.0)), 450);
        cfg.dpi = 300;
        assert_eq!(recommended_dpi(&cfg, Some(6.0)), 300);
    }
}

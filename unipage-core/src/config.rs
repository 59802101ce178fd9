use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Overall extraction mode for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderMode {
    /// Trust embedded text, OCR only empty pages (or overlay candidates).
    Native,
    /// OCR every page unconditionally.
    Ocr,
    /// Decide per page from structural richness.
    #[default]
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TablesMode {
    Off,
    /// Flag probable table regions without OCRing cells.
    #[default]
    Detect,
    /// Segment the grid and OCR every cell.
    Extract,
}

/// How the rasterization DPI is chosen for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DpiMode {
    /// Pick from the estimated font size, clamped to [`ReaderConfig::DPI_MIN`]..[`ReaderConfig::DPI_MAX`].
    #[default]
    Auto,
    /// Always use the configured DPI (still clamped).
    Fixed,
}

/// Every heuristic threshold of the engine, in one place, validated once at
/// startup. The numeric defaults are intentionally preserved from the
/// calibrated production values; do not tune them without a dataset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    pub mode: ReaderMode,
    pub tables_mode: TablesMode,

    /// OCR language, tesseract notation (e.g. "deu+eng").
    pub lang: String,
    pub dpi: u32,
    pub dpi_mode: DpiMode,
    /// Tesseract page segmentation mode.
    pub psm: u8,
    /// Tesseract engine mode.
    pub oem: u8,
    /// A page whose OCR exceeds this budget degrades to native-or-empty.
    pub ocr_timeout: Duration,

    /// Minimum native block count for the mixed-mode native branch.
    pub blocks_threshold: usize,
    /// Low-confidence floor: native text below this routes to OCR in mixed
    /// mode, and pages below it are flagged for review.
    pub any_min_conf: f32,
    /// Stricter floor applied to pages that used OCR.
    pub ocr_min_conf: f32,
    /// OCR pages with fewer words than this are flagged low-text.
    pub ocr_low_text_min_words: usize,
    /// OCR pages with fewer characters than this are flagged low-text.
    pub suspicious_text_chars_min: usize,
    /// Document review trips when flagged/total pages reaches this ratio.
    pub review_low_conf_ratio: f32,
    /// Embedded-image coverage above which mixed mode distrusts native text.
    pub image_coverage_max: f32,

    /// Enable OCR overlay on otherwise-native pages.
    pub native_ocr_overlay: bool,
    pub overlay_area_thr: f32,
    pub overlay_min_images: usize,
    pub overlay_if_any_image: bool,

    /// Minimum average cell area (raster px^2) for a light-mode candidate.
    pub table_detect_min_area: f32,
    /// Maximum cell count before a candidate is considered fragmentation
    /// noise rather than a table.
    pub table_detect_max_cells: usize,
    /// Minimum aggregate OCR word yield for a full-mode table.
    pub tables_min_words: usize,
    /// Floor applied to live candidate confidences.
    pub table_candidate_min_conf: f32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: ReaderMode::Mixed,
            tables_mode: TablesMode::Detect,
            lang: "deu+eng".to_owned(),
            dpi: 300,
            dpi_mode: DpiMode::Auto,
            psm: 3,
            oem: 1,
            ocr_timeout: Duration::from_secs(120),
            blocks_threshold: 3,
            any_min_conf: 75.0,
            ocr_min_conf: 80.0,
            ocr_low_text_min_words: 12,
            suspicious_text_chars_min: 40,
            review_low_conf_ratio: 0.25,
            image_coverage_max: 0.6,
            native_ocr_overlay: false,
            overlay_area_thr: 0.35,
            overlay_min_images: 1,
            overlay_if_any_image: false,
            table_detect_min_area: 9000.0,
            table_detect_max_cells: 600,
            tables_min_words: 12,
            table_candidate_min_conf: 0.45,
        }
    }
}

impl ReaderConfig {
    pub const DPI_MIN: u32 = 200;
    pub const DPI_MAX: u32 = 450;

    pub fn validate(&self) -> Result<()> {
        if self.lang.is_empty() {
            bail!("lang must not be empty");
        }
        if !(72..=1200).contains(&self.dpi) {
            bail!("dpi {} outside supported range 72..=1200", self.dpi);
        }
        if self.psm > 13 {
            bail!("psm {} outside tesseract range 0..=13", self.psm);
        }
        if self.oem > 3 {
            bail!("oem {} outside tesseract range 0..=3", self.oem);
        }
        if self.ocr_timeout.is_zero() {
            bail!("ocr_timeout must be positive");
        }
        for (name, value) in [
            ("any_min_conf", self.any_min_conf),
            ("ocr_min_conf", self.ocr_min_conf),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("{name} {value} outside 0..=100");
            }
        }
        for (name, value) in [
            ("review_low_conf_ratio", self.review_low_conf_ratio),
            ("image_coverage_max", self.image_coverage_max),
            ("overlay_area_thr", self.overlay_area_thr),
            ("table_candidate_min_conf", self.table_candidate_min_conf),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} {value} outside 0..=1");
            }
        }
        if self.table_detect_min_area < 0.0 {
            bail!("table_detect_min_area must be non-negative");
        }
        if self.table_detect_max_cells == 0 {
            bail!("table_detect_max_cells must be positive");
        }
        Ok(())
    }
}

/// Per-item overrides accepted from the upstream input contract. Anything
/// left `None` falls back to the batch-level [`ReaderConfig`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemOverrides {
    pub mode: Option<ReaderMode>,
    pub lang: Option<String>,
    pub dpi: Option<u32>,
    pub psm: Option<u8>,
    pub tables_mode: Option<TablesMode>,
    pub native_ocr_overlay: Option<bool>,
    pub overlay_area_thr: Option<f32>,
    pub overlay_min_images: Option<usize>,
}

impl ItemOverrides {
    pub fn apply(&self, base: &ReaderConfig) -> ReaderConfig {
        let mut cfg = base.clone();
        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        if let Some(lang) = &self.lang {
            cfg.lang = lang.clone();
        }
        if let Some(dpi) = self.dpi {
            cfg.dpi = dpi;
        }
        if let Some(psm) = self.psm {
            cfg.psm = psm;
        }
        if let Some(tables_mode) = self.tables_mode {
            cfg.tables_mode = tables_mode;
        }
        if let Some(overlay) = self.native_ocr_overlay {
            cfg.native_ocr_overlay = overlay;
        }
        if let Some(thr) = self.overlay_area_thr {
            cfg.overlay_area_thr = thr;
        }
        if let Some(min_images) = self.overlay_min_images {
            cfg.overlay_min_images = min_images;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ReaderConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = ReaderConfig::default();
        cfg.dpi = 50;
        assert!(cfg.validate().is_err());

        let mut cfg = ReaderConfig::default();
        cfg.psm = 99;
        assert!(cfg.validate().is_err());

        let mut cfg = ReaderConfig::default();
        cfg.review_low_conf_ratio = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = ReaderConfig::default();
        cfg.ocr_min_conf = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_apply_selectively() {
        let base = ReaderConfig::default();
        let overrides = ItemOverrides {
            mode: Some(ReaderMode::Ocr),
            dpi: Some(400),
            ..Default::default()
        };
        let cfg = overrides.apply(&base);
        assert_eq!(cfg.mode, ReaderMode::Ocr);
        assert_eq!(cfg.dpi, 400);
        assert_eq!(cfg.lang, base.lang);
        assert_eq!(cfg.tables_mode, base.tables_mode);
    }
}

//! Page decision engine: whether to trust a page's embedded text, invoke
//! OCR, or merge both, plus the native/OCR reconciliation rule.
//!
//! The numeric behavior here is calibrated; the constants are intentionally
//! not tuned per deployment.

use crate::config::{ReaderConfig, ReaderMode};
use crate::entities::PageDecision;

/// Confidence at or above which a native page is never routed to OCR on
/// quality grounds alone.
const NATIVE_TRUSTED_CONF: f32 = 85.0;
/// Word count above which a trusted-confidence page is accepted outright.
const NATIVE_TRUSTED_MIN_WORDS: usize = 40;
/// Ceiling of the structural native-confidence score.
const NATIVE_CONF_CAP: f32 = 96.0;
/// Length advantage one side needs before its text replaces the other's.
const RECONCILE_LEN_RATIO: f32 = 1.25;
/// Ceiling of the agreement-boosted confidence.
const RECONCILE_CONF_CAP: f32 = 99.0;

/// Structural signals of a page's embedded text, gathered during native
/// extraction.
#[derive(Debug, Clone, Default)]
pub struct NativeSignals {
    pub text: String,
    pub block_count: usize,
    pub words: usize,
    /// Embedded-image area over page area, capped during collection.
    pub image_coverage: f32,
    pub image_count: usize,
}

/// Score the trustworthiness of embedded text from structural richness.
///
/// Block count saturates at 8, word count at 120, character volume at 1500;
/// the combined score lives in 0..=96. Empty text scores 0.
pub fn native_confidence(text: &str, block_count: usize, words: usize) -> f32 {
    if text.trim().is_empty() {
        return 0.0;
    }
    let block_factor = block_count.min(8) as f32 / 8.0;
    let word_factor = (words as f32 / 120.0).min(1.0);
    let char_factor = (text.len() as f32 / 1500.0).min(1.0);
    let conf = 55.0 + block_factor * 20.0 + word_factor * 15.0 + char_factor * 10.0;
    (conf.min(NATIVE_CONF_CAP) * 100.0).round() / 100.0
}

/// Whether mixed mode accepts the native text of a page.
pub fn use_native_mixed(cfg: &ReaderConfig, conf: f32, signals: &NativeSignals) -> bool {
    if conf == 0.0 || signals.words == 0 {
        return false;
    }
    if signals.block_count >= cfg.blocks_threshold.max(1)
        && conf >= cfg.any_min_conf
        && signals.image_coverage < cfg.image_coverage_max
    {
        return true;
    }
    conf >= NATIVE_TRUSTED_CONF && signals.words > NATIVE_TRUSTED_MIN_WORDS
}

/// Whether an otherwise-native page should additionally be OCR'd to recover
/// text trapped inside embedded image regions.
pub fn should_overlay(cfg: &ReaderConfig, conf: f32, signals: &NativeSignals) -> bool {
    if !cfg.native_ocr_overlay || signals.image_count == 0 {
        return false;
    }
    let any_image = cfg.overlay_if_any_image && signals.image_count > 0;
    if signals.image_count < cfg.overlay_min_images && !any_image {
        return false;
    }
    if signals.image_coverage < cfg.overlay_area_thr && !any_image {
        return false;
    }
    if signals.text.trim().is_empty() {
        return true;
    }
    conf < NATIVE_TRUSTED_CONF
}

/// The routing decided for a page before OCR runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRoute {
    /// Keep the native text as-is.
    Native,
    /// Discard native text (if any) in favor of OCR.
    Ocr,
    /// Keep native text and merge OCR on top of it.
    Overlay,
}

impl PageRoute {
    pub fn needs_ocr(&self) -> bool {
        !matches!(self, PageRoute::Native)
    }

    pub fn decision(&self) -> PageDecision {
        match self {
            PageRoute::Native => PageDecision::Native,
            PageRoute::Ocr => PageDecision::Ocr,
            PageRoute::Overlay => PageDecision::NativeOcr,
        }
    }
}

/// Route one page given its native signals and the configured mode.
pub fn route_page(cfg: &ReaderConfig, signals: &NativeSignals) -> PageRoute {
    let conf = native_confidence(&signals.text, signals.block_count, signals.words);
    match cfg.mode {
        ReaderMode::Ocr => PageRoute::Ocr,
        ReaderMode::Native => {
            if signals.text.trim().is_empty() {
                PageRoute::Ocr
            } else if should_overlay(cfg, conf, signals) {
                PageRoute::Overlay
            } else {
                PageRoute::Native
            }
        }
        ReaderMode::Mixed => {
            if use_native_mixed(cfg, conf, signals) {
                if should_overlay(cfg, conf, signals) {
                    PageRoute::Overlay
                } else {
                    PageRoute::Native
                }
            } else {
                PageRoute::Ocr
            }
        }
    }
}

/// Outcome of reconciling native and OCR text for the same page.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub text: String,
    pub conf: f32,
}

/// Choose or merge native vs. OCR text.
///
/// An empty side loses outright. A >25% length advantage wins with the max
/// of the two confidences. Near-equal lengths are treated as agreement: the
/// native text is kept and the confidence is boosted with an
/// order-independent formula capped at 99.
pub fn reconcile_text(
    native_text: &str,
    ocr_text: &str,
    native_conf: f32,
    ocr_conf: f32,
) -> Reconciled {
    if native_text.trim().is_empty() {
        return Reconciled {
            text: ocr_text.to_owned(),
            conf: ocr_conf,
        };
    }
    if ocr_text.trim().is_empty() {
        return Reconciled {
            text: native_text.to_owned(),
            conf: native_conf,
        };
    }
    let len_native = native_text.len() as f32;
    let len_ocr = ocr_text.len() as f32;
    if len_ocr > len_native * RECONCILE_LEN_RATIO {
        return Reconciled {
            text: ocr_text.to_owned(),
            conf: ocr_conf.max(native_conf),
        };
    }
    if len_native > len_ocr * RECONCILE_LEN_RATIO {
        return Reconciled {
            text: native_text.to_owned(),
            conf: native_conf.max(ocr_conf),
        };
    }
    let avg = (native_conf + ocr_conf) / 2.0;
    let boosted = native_conf.max(ocr_conf).max(avg).min(RECONCILE_CONF_CAP);
    Reconciled {
        text: native_text.to_owned(),
        conf: (boosted * 100.0).round() / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(text: &str, blocks: usize, words: usize) -> NativeSignals {
        NativeSignals {
            text: text.to_owned(),
            block_count: blocks,
            words,
            image_coverage: 0.0,
            image_count: 0,
        }
    }

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(native_confidence("", 4, 10), 0.0);
        assert_eq!(native_confidence("   \n ", 4, 10), 0.0);
    }

    #[test]
    fn confidence_saturates_at_cap() {
        let text = "x".repeat(5000);
        assert_eq!(native_confidence(&text, 20, 500), 96.0);
    }

    #[test]
    fn rich_page_stays_native_in_mixed_mode() {
        // 50 words over 9 blocks, no images: decision native, conf >= 70.
        let words: Vec<String> = (0..50).map(|i| format!("wort{i}")).collect();
        let text = words.join(" ");
        let sig = signals(&text, 9, 50);
        let cfg = ReaderConfig::default();

        let conf = native_confidence(&sig.text, sig.block_count, sig.words);
        assert!(conf >= 70.0, "conf was {conf}");
        assert_eq!(route_page(&cfg, &sig), PageRoute::Native);
        assert_eq!(route_page(&cfg, &sig).decision(), PageDecision::Native);
    }

    #[test]
    fn empty_native_page_falls_back_to_ocr_in_native_mode() {
        let cfg = ReaderConfig {
            mode: ReaderMode::Native,
            ..Default::default()
        };
        let sig = signals("", 0, 0);
        assert_eq!(route_page(&cfg, &sig), PageRoute::Ocr);
    }

    #[test]
    fn ocr_mode_is_unconditional() {
        let cfg = ReaderConfig {
            mode: ReaderMode::Ocr,
            ..Default::default()
        };
        let words: Vec<String> = (0..120).map(|i| format!("w{i}")).collect();
        let sig = signals(&words.join(" "), 10, 120);
        assert_eq!(route_page(&cfg, &sig), PageRoute::Ocr);
    }

    #[test]
    fn sparse_page_routes_to_ocr_in_mixed_mode() {
        let cfg = ReaderConfig::default();
        let sig = signals("kurz", 1, 1);
        assert_eq!(route_page(&cfg, &sig), PageRoute::Ocr);
    }

    #[test]
    fn image_heavy_page_routes_to_ocr_in_mixed_mode() {
        let cfg = ReaderConfig::default();
        let words: Vec<String> = (0..45).map(|i| format!("wort{i}")).collect();
        let mut sig = signals(&words.join(" "), 9, 45);
        sig.image_coverage = 0.8;
        // The structural branch is blocked by coverage, and the page is
        // below the trusted-confidence floor.
        let conf = native_confidence(&sig.text, sig.block_count, sig.words);
        assert!(conf < NATIVE_TRUSTED_CONF, "conf was {conf}");
        assert_eq!(route_page(&cfg, &sig), PageRoute::Ocr);
    }

    #[test]
    fn overlay_requires_opt_in_and_images() {
        let mut cfg = ReaderConfig {
            mode: ReaderMode::Native,
            ..Default::default()
        };
        let mut sig = signals("etwas text", 2, 2);
        sig.image_count = 2;
        sig.image_coverage = 0.5;
        assert_eq!(route_page(&cfg, &sig), PageRoute::Native);

        cfg.native_ocr_overlay = true;
        assert_eq!(route_page(&cfg, &sig), PageRoute::Overlay);

        sig.image_count = 0;
        assert_eq!(route_page(&cfg, &sig), PageRoute::Native);
    }

    #[test]
    fn overlay_respects_coverage_threshold() {
        let cfg = ReaderConfig {
            mode: ReaderMode::Native,
            native_ocr_overlay: true,
            ..Default::default()
        };
        let mut sig = signals("etwas text", 2, 2);
        sig.image_count = 1;
        sig.image_coverage = 0.1;
        assert_eq!(route_page(&cfg, &sig), PageRoute::Native);

        let cfg_any = ReaderConfig {
            overlay_if_any_image: true,
            ..cfg
        };
        assert_eq!(route_page(&cfg_any, &sig), PageRoute::Overlay);
    }

    #[test]
    fn longer_ocr_text_wins_with_max_confidence() {
        let native = "n".repeat(100);
        let ocr = "o".repeat(300);
        let merged = reconcile_text(&native, &ocr, 60.0, 70.0);
        assert_eq!(merged.text, ocr);
        assert_eq!(merged.conf, 70.0);
    }

    #[test]
    fn longer_native_text_wins_with_max_confidence() {
        let native = "n".repeat(300);
        let ocr = "o".repeat(100);
        let merged = reconcile_text(&native, &ocr, 60.0, 70.0);
        assert_eq!(merged.text, native);
        assert_eq!(merged.conf, 70.0);
    }

    #[test]
    fn empty_side_loses_outright() {
        let merged = reconcile_text("", "ocr text", 0.0, 55.0);
        assert_eq!(merged.text, "ocr text");
        assert_eq!(merged.conf, 55.0);

        let merged = reconcile_text("native text", "", 81.0, 0.0);
        assert_eq!(merged.text, "native text");
        assert_eq!(merged.conf, 81.0);
    }

    #[test]
    fn near_equal_lengths_boost_confidence() {
        let native = "a".repeat(100);
        let ocr = "b".repeat(110);
        let merged = reconcile_text(&native, &ocr, 70.0, 60.0);
        assert_eq!(merged.text, native);
        assert_eq!(merged.conf, 70.0); // max(70, 60, 65)
    }

    #[test]
    fn near_equal_branch_confidence_is_commutative() {
        // Swapping which side is called native vs OCR must yield the same
        // merged confidence on the near-equal-length branch.
        let a = "x".repeat(100);
        let b = "y".repeat(105);
        let forward = reconcile_text(&a, &b, 62.0, 78.0);
        let swapped = reconcile_text(&b, &a, 78.0, 62.0);
        assert_eq!(forward.conf, swapped.conf);
    }

    #[test]
    fn boost_is_capped() {
        let a = "x".repeat(100);
        let b = "y".repeat(100);
        let merged = reconcile_text(&a, &b, 99.5, 99.5);
        assert_eq!(merged.conf, 99.0);
    }
}

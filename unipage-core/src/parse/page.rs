//! Per-page processing: decision, OCR, reconciliation, blocks, zones,
//! tables, artifacts and hints, folded into one [`PageOutcome`].
//!
//! Pages are independent units of work; everything here runs inside one
//! task per page and only the aggregation barrier afterwards needs all of
//! them.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::blocks::{build_blocks, synthetic_block};
use crate::config::{ReaderConfig, TablesMode};
use crate::decide::{native_confidence, reconcile_text, route_page, NativeSignals, PageRoute};
use crate::entities::{BBox, PageDecision, PageGeometry, PageNo, PageRecord, ToolEvent};
use crate::error::PageWarning;
use crate::lang::{language_hint, locale_hint, merge_hint, LangHint};
use crate::ocr::{OcrEngine, OcrOutput, OcrParams};
use crate::parse::native::NativePage;
use crate::summary::PageOutcome;
use crate::tables::{scan_page_raster, TableContext};
use crate::zones::detect_zones;
use crate::artifacts::collect_artifacts;

/// Default page box (A4, PDF points) for inputs without real geometry.
pub(crate) const DEFAULT_PAGE_BBOX: BBox = BBox {
    x0: 0.0,
    y0: 0.0,
    x1: 595.276,
    y1: 841.89,
};

pub(crate) async fn run_ocr(
    page: PageNo,
    raster: Arc<image::DynamicImage>,
    cfg: &ReaderConfig,
    engine: Arc<dyn OcrEngine>,
    warnings: &mut Vec<PageWarning>,
    events: &mut Vec<ToolEvent>,
) -> Option<OcrOutput> {
    let params = OcrParams::from_config(cfg);
    let lang = params.lang.clone();
    let task = tokio::task::spawn_blocking(move || engine.recognize(&raster, &params));
    match tokio::time::timeout(cfg.ocr_timeout, task).await {
        Err(_) => {
            warnings.push(PageWarning::OcrTimeout { page });
            events.push(ToolEvent::new("ocr_runner", "timeout").on_page(page));
            None
        }
        Ok(Err(join_err)) => {
            warnings.push(PageWarning::OcrError {
                page,
                detail: join_err.to_string(),
            });
            events.push(ToolEvent::new("ocr_runner", "error").on_page(page));
            None
        }
        Ok(Ok(Err(err))) => {
            warnings.push(PageWarning::OcrError {
                page,
                detail: err.to_string(),
            });
            events.push(
                ToolEvent::new("ocr_runner", "error")
                    .on_page(page)
                    .detail("error", err.to_string()),
            );
            None
        }
        Ok(Ok(Ok(output))) => {
            events.push(
                ToolEvent::new("ocr_runner", "ok")
                    .on_page(page)
                    .detail("lang", lang)
                    .detail("words", output.words)
                    .detail("avg_conf", output.avg_conf),
            );
            Some(output)
        }
    }
}

/// Process one natively parsed PDF page end to end.
#[instrument(skip_all, fields(page = native.page_no))]
pub(crate) async fn process_page(
    file: String,
    native: NativePage,
    cfg: Arc<ReaderConfig>,
    ocr: Arc<dyn OcrEngine>,
    ocr_available: bool,
) -> PageOutcome {
    let page = native.page_no;
    let mut warnings = Vec::new();
    let mut events = Vec::new();

    let native_text = native
        .lines
        .iter()
        .map(|l| l.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut blocks = build_blocks(page, &native.lines, None);
    let signals = NativeSignals {
        text: native_text.clone(),
        block_count: blocks.len(),
        words: native_text.split_whitespace().count(),
        image_coverage: native.image_coverage,
        image_count: native.image_boxes.len(),
    };
    let native_conf = native_confidence(&signals.text, signals.block_count, signals.words);
    let route = route_page(&cfg, &signals);

    let ocr_output = if route.needs_ocr() && ocr_available {
        run_ocr(
            page,
            Arc::clone(&native.raster),
            &cfg,
            Arc::clone(&ocr),
            &mut warnings,
            &mut events,
        )
        .await
    } else {
        None
    };

    let (final_text, final_conf, decision, ocr_conf_avg, ocr_elapsed) = match route {
        PageRoute::Native => (
            native_text.clone(),
            native_conf,
            PageDecision::Native,
            None,
            Duration::ZERO,
        ),
        PageRoute::Ocr => match &ocr_output {
            Some(out) => (
                out.text.clone(),
                out.avg_conf,
                PageDecision::Ocr,
                Some(out.avg_conf),
                out.elapsed,
            ),
            // OCR degraded: keep whatever native text exists, confidence 0.
            None => (native_text.clone(), 0.0, PageDecision::Ocr, None, Duration::ZERO),
        },
        PageRoute::Overlay => match &ocr_output {
            Some(out) => {
                let merged = reconcile_text(&native_text, &out.text, native_conf, out.avg_conf);
                (
                    merged.text,
                    merged.conf,
                    PageDecision::NativeOcr,
                    Some(out.avg_conf),
                    out.elapsed,
                )
            }
            None => (
                native_text.clone(),
                native_conf,
                PageDecision::Native,
                None,
                Duration::ZERO,
            ),
        },
    };

    if final_text.trim().is_empty() {
        warnings.push(PageWarning::EmptyPageText { page });
    }

    if blocks.is_empty() {
        let conf = decision.used_ocr().then_some(ocr_conf_avg).flatten();
        blocks.extend(synthetic_block(page, &final_text, None, conf));
    } else if decision.used_ocr() {
        for block in &mut blocks {
            block.ocr_conf_avg = ocr_conf_avg;
        }
    }

    let zones = detect_zones(page, &native.page_bbox, &blocks);

    let scan = if cfg.tables_mode != TablesMode::Off && !final_text.trim().is_empty() {
        let gray = native.raster.to_luma8();
        let cfg_scan = Arc::clone(&cfg);
        let engine = Arc::clone(&ocr);
        let blocks_scan = blocks.clone();
        let page_bbox = native.page_bbox.clone();
        let file_scan = file.clone();
        let zoom = native.zoom;
        let ocr_text = ocr_output.as_ref().map(|o| o.text.clone());
        tokio::task::spawn_blocking(move || {
            let params = OcrParams::from_config(&cfg_scan);
            let ctx = TableContext {
                file: &file_scan,
                page,
                page_bbox: &page_bbox,
                decision,
                blocks: &blocks_scan,
                zoom,
                ocr_page_text: ocr_text.as_deref(),
            };
            let with_ocr = cfg_scan.tables_mode == TablesMode::Extract && ocr_available;
            let ocr_ref = with_ocr.then(|| (&*engine as &dyn OcrEngine, &params));
            scan_page_raster(&gray, &ctx, &cfg_scan, ocr_ref)
        })
        .await
        .unwrap_or_default()
    } else {
        Default::default()
    };
    warnings.extend(scan.warnings);
    events.extend(scan.events);

    let artifacts = collect_artifacts(page, &native.page_bbox, &native.image_boxes, &mut events);

    let mut lang = LangHint::Unknown;
    let mut locale = LangHint::Unknown;
    for block in &blocks {
        lang = merge_hint(lang, block.lang_hint);
        locale = merge_hint(locale, block.locale_hint);
    }
    lang = merge_hint(lang, language_hint(&final_text));
    locale = merge_hint(locale, locale_hint(&final_text));

    let words = final_text.split_whitespace().count();
    let chars = final_text.chars().count();
    PageOutcome {
        record: PageRecord {
            file,
            page,
            decision,
            conf: final_conf,
            elapsed: native.elapsed + ocr_elapsed,
            words,
            chars,
            ocr_conf_avg,
            text: final_text,
        },
        geometry: PageGeometry {
            width: native.page_bbox.width(),
            height: native.page_bbox.height(),
            rotation: native.rotation,
            images_count: native.image_boxes.len(),
        },
        blocks,
        zones,
        tables: scan.records,
        table_candidates: scan.candidates,
        artifacts,
        warnings,
        events,
        lang_hint: lang,
        locale_hint: locale,
    }
}

/// Build the outcome of a single-page input that has no structured spans:
/// plain text, legacy word-processor text, or a standalone OCR'd image.
pub(crate) fn simple_page_outcome(
    file: String,
    page: PageNo,
    decision: PageDecision,
    text: String,
    conf: f32,
    elapsed: Duration,
    ocr_conf_avg: Option<f32>,
    page_bbox: BBox,
    images_count: usize,
) -> PageOutcome {
    let mut warnings = Vec::new();
    if text.trim().is_empty() {
        warnings.push(PageWarning::EmptyPageText { page });
    }
    let blocks: Vec<_> = synthetic_block(page, &text, None, ocr_conf_avg)
        .into_iter()
        .collect();
    let zones = detect_zones(page, &page_bbox, &blocks);
    let lang = language_hint(&text);
    let locale = locale_hint(&text);
    let words = text.split_whitespace().count();
    let chars = text.chars().count();
    PageOutcome {
        record: PageRecord {
            file,
            page,
            decision,
            conf,
            elapsed,
            words,
            chars,
            ocr_conf_avg,
            text,
        },
        geometry: PageGeometry {
            width: page_bbox.width(),
            height: page_bbox.height(),
            rotation: 0.0,
            images_count,
        },
        blocks,
        zones,
        tables: Vec::new(),
        table_candidates: Vec::new(),
        artifacts: Vec::new(),
        warnings,
        events: Vec::new(),
        lang_hint: lang,
        locale_hint: locale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ZoneKind;

    #[test]
    fn simple_outcome_carries_block_and_body_zone() {
        let outcome = simple_page_outcome(
            "notes.txt".to_owned(),
            1,
            PageDecision::Native,
            "Wir bestellen die Ware\nund zahlen am 03.12.2024".to_owned(),
            92.0,
            Duration::from_millis(2),
            None,
            DEFAULT_PAGE_BBOX,
            0,
        );
        assert_eq!(outcome.blocks.len(), 1);
        assert_eq!(outcome.zones.len(), 1);
        assert_eq!(outcome.zones[0].kind, ZoneKind::Body);
        assert_eq!(outcome.record.words, 8);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.lang_hint, LangHint::De);
        assert_eq!(outcome.locale_hint, LangHint::De);
    }

    #[test]
    fn empty_simple_page_is_flagged() {
        let outcome = simple_page_outcome(
            "empty.txt".to_owned(),
            1,
            PageDecision::Native,
            String::new(),
            0.0,
            Duration::ZERO,
            None,
            DEFAULT_PAGE_BBOX,
            0,
        );
        assert!(outcome.blocks.is_empty());
        assert_eq!(
            outcome.warnings,
            vec![PageWarning::EmptyPageText { page: 1 }]
        );
    }

    #[test]
    fn ocr_image_outcome_keeps_ocr_confidence() {
        let outcome = simple_page_outcome(
            "scan.png".to_owned(),
            1,
            PageDecision::OcrImage,
            "recognized words here".to_owned(),
            77.5,
            Duration::from_millis(120),
            Some(77.5),
            BBox::new(0.0, 0.0, 800.0, 600.0),
            1,
        );
        assert_eq!(outcome.record.decision, PageDecision::OcrImage);
        assert_eq!(outcome.record.ocr_conf_avg, Some(77.5));
        assert_eq!(outcome.blocks[0].ocr_conf_avg, Some(77.5));
        assert_eq!(outcome.geometry.images_count, 1);
    }
}

//! Document-level orchestration.
//!
//! The input kind is resolved upstream and matched exhaustively here; every
//! page is an independent unit of work fanned out on a `JoinSet`, and the
//! aggregation barrier afterwards re-sorts by page number. A document
//! either yields a full summary (page-level degradation included) or fails
//! only when the input itself cannot be opened.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::Instrument;

use crate::config::{ItemOverrides, ReaderConfig};
use crate::entities::{
    BBox, DocumentKind, ExtractedDocument, PageDecision, ToolEvent,
};
use crate::error::PageWarning;
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::parse::legacy::read_docx_text;
use crate::parse::native::{ParseNativeQueue, ParseNativeRequest};
use crate::parse::page::{process_page, run_ocr, simple_page_outcome, DEFAULT_PAGE_BBOX};
use crate::summary::DocumentBuilder;

/// Confidence assigned to non-empty plain-text input.
const TEXT_NATIVE_CONF: f32 = 92.0;
/// Confidence assigned to non-empty legacy word-processor text.
const LEGACY_NATIVE_CONF: f32 = 90.0;

/// One input record from the upstream contract: a resolved path and kind
/// plus optional per-item overrides.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub overrides: ItemOverrides,
}

impl DocumentInput {
    pub fn new(path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            path: path.into(),
            kind,
            overrides: ItemOverrides::default(),
        }
    }
}

/// Core document parser. Owns the native pdfium worker and the OCR engine
/// for the lifetime of a batch.
#[derive(Clone)]
pub struct DocumentParser {
    native_queue: ParseNativeQueue,
    ocr: Arc<dyn OcrEngine>,
}

impl DocumentParser {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            native_queue: ParseNativeQueue::new(),
            ocr,
        }
    }

    /// Parser backed by the system Tesseract installation.
    pub fn with_system_ocr() -> Self {
        Self::new(Arc::new(TesseractOcr::default()))
    }

    /// Process one document into its summary. Page-level degradation never
    /// fails this call; only a structurally invalid input does.
    #[tracing::instrument(skip_all, fields(path = %input.path.display()))]
    pub async fn parse_document(
        &self,
        input: &DocumentInput,
        base_cfg: &ReaderConfig,
    ) -> anyhow::Result<ExtractedDocument> {
        let cfg = input.overrides.apply(base_cfg);
        cfg.validate()?;
        let data = tokio::fs::read(&input.path)
            .await
            .with_context(|| format!("can't read input file {}", input.path.display()))?;
        let doc_name = input
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_owned();
        let file = input.path.display().to_string();

        match input.kind {
            DocumentKind::Pdf => self.parse_pdf(file, doc_name, &data, cfg).await,
            DocumentKind::LegacyDoc => parse_legacy_doc(file, doc_name, &data, cfg),
            DocumentKind::Text => Ok(parse_plain_text(file, doc_name, &data, cfg)),
            DocumentKind::Image => self.parse_image(file, doc_name, &data, cfg).await,
        }
    }

    /// Process a batch sequentially. Each entry fails independently; one
    /// unopenable file never aborts the rest.
    pub async fn parse_batch(
        &self,
        inputs: &[DocumentInput],
        base_cfg: &ReaderConfig,
    ) -> Vec<anyhow::Result<ExtractedDocument>> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.parse_document(input, base_cfg).await);
        }
        results
    }

    async fn parse_pdf(
        &self,
        file: String,
        doc_name: String,
        data: &[u8],
        cfg: ReaderConfig,
    ) -> anyhow::Result<ExtractedDocument> {
        let cfg = Arc::new(cfg);
        let mut builder = DocumentBuilder::new(doc_name, DocumentKind::Pdf, cfg.as_ref().clone());
        let ocr_available = self.ocr.is_available();

        let (native_tx, mut native_rx) = mpsc::channel(32);
        let req = ParseNativeRequest::new(data, None, None, cfg.as_ref().clone(), native_tx);
        self.native_queue.push(req).await?;

        let mut set = JoinSet::new();
        let mut opened = false;
        while let Some((page_no, native_page)) = native_rx.recv().await {
            match native_page {
                Ok(native) => {
                    if !opened {
                        builder.event(ToolEvent::new("pdf_open", "ok"));
                        opened = true;
                    }
                    set.spawn(
                        process_page(
                            file.clone(),
                            native,
                            Arc::clone(&cfg),
                            Arc::clone(&self.ocr),
                            ocr_available,
                        )
                        .in_current_span(),
                    );
                }
                Err(err) if page_no == 0 => {
                    // The document itself could not be opened; this is the
                    // only failure that surfaces to the caller.
                    return Err(err.context(format!("can't open document {file}")));
                }
                Err(err) => {
                    let detail = err.to_string();
                    builder.warn(PageWarning::PdfPageError {
                        page: page_no,
                        detail: detail.clone(),
                    });
                    builder.event(
                        ToolEvent::new("native_parse", "error")
                            .on_page(page_no)
                            .detail("error", detail),
                    );
                    // The page proceeds with the best available partial
                    // result, which here is an empty record.
                    builder.push(simple_page_outcome(
                        file.clone(),
                        page_no,
                        PageDecision::Native,
                        String::new(),
                        0.0,
                        std::time::Duration::ZERO,
                        None,
                        DEFAULT_PAGE_BBOX,
                        0,
                    ));
                }
            }
        }

        let mut ocr_was_needed = false;
        while let Some(result) = set.join_next().await {
            match result {
                Ok(outcome) => {
                    ocr_was_needed |= outcome.record.decision.used_ocr();
                    builder.push(outcome);
                }
                Err(err) => tracing::error!("error joining page task: {err:?}"),
            }
        }
        if ocr_was_needed && !ocr_available {
            builder.warn(PageWarning::OcrUnavailable);
            builder.event(ToolEvent::new("ocr_runner", "unavailable"));
        }
        Ok(builder.finish())
    }

    async fn parse_image(
        &self,
        file: String,
        doc_name: String,
        data: &[u8],
        cfg: ReaderConfig,
    ) -> anyhow::Result<ExtractedDocument> {
        let image = image::load_from_memory(data)
            .with_context(|| format!("can't decode raster image input {file}"))?;
        let mut builder = DocumentBuilder::new(doc_name, DocumentKind::Image, cfg.clone());
        builder.event(
            ToolEvent::new("image_open", "ok")
                .detail("width", image.width())
                .detail("height", image.height()),
        );
        let page_bbox = BBox::new(0.0, 0.0, image.width() as f32, image.height() as f32);

        let started = Instant::now();
        let mut warnings = Vec::new();
        let mut events = Vec::new();
        let ocr_output = if self.ocr.is_available() {
            run_ocr(
                1,
                Arc::new(image),
                &cfg,
                Arc::clone(&self.ocr),
                &mut warnings,
                &mut events,
            )
            .await
        } else {
            warnings.push(PageWarning::OcrUnavailable);
            events.push(ToolEvent::new("ocr_runner", "unavailable").on_page(1));
            None
        };

        let (text, conf) = match &ocr_output {
            Some(out) => (out.text.clone(), out.avg_conf),
            None => (String::new(), 0.0),
        };
        let ocr_conf_avg = ocr_output
            .as_ref()
            .filter(|_| !text.trim().is_empty())
            .map(|out| out.avg_conf);
        let mut outcome = simple_page_outcome(
            file,
            1,
            PageDecision::OcrImage,
            text,
            conf,
            started.elapsed(),
            ocr_conf_avg,
            page_bbox,
            1,
        );
        outcome.warnings.extend(warnings);
        outcome.events.extend(events);
        builder.push(outcome);
        Ok(builder.finish())
    }
}

fn parse_plain_text(
    file: String,
    doc_name: String,
    data: &[u8],
    cfg: ReaderConfig,
) -> ExtractedDocument {
    let started = Instant::now();
    let text = String::from_utf8_lossy(data).into_owned();
    let conf = if text.trim().is_empty() {
        0.0
    } else {
        TEXT_NATIVE_CONF
    };
    let mut builder = DocumentBuilder::new(doc_name, DocumentKind::Text, cfg);
    builder.event(
        ToolEvent::new("text_reader", "ok").detail("words", text.split_whitespace().count()),
    );
    builder.push(simple_page_outcome(
        file,
        1,
        PageDecision::Native,
        text,
        conf,
        started.elapsed(),
        None,
        DEFAULT_PAGE_BBOX,
        0,
    ));
    builder.finish()
}

fn parse_legacy_doc(
    file: String,
    doc_name: String,
    data: &[u8],
    cfg: ReaderConfig,
) -> anyhow::Result<ExtractedDocument> {
    let started = Instant::now();
    let text = read_docx_text(data).with_context(|| format!("can't open document {file}"))?;
    let conf = if text.trim().is_empty() {
        0.0
    } else {
        LEGACY_NATIVE_CONF
    };
    let mut builder = DocumentBuilder::new(doc_name, DocumentKind::LegacyDoc, cfg);
    builder.event(
        ToolEvent::new("legacy_reader", "ok").detail("words", text.split_whitespace().count()),
    );
    builder.push(simple_page_outcome(
        file,
        1,
        PageDecision::Native,
        text,
        conf,
        started.elapsed(),
        None,
        DEFAULT_PAGE_BBOX,
        0,
    ));
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ZoneKind;
    use crate::lang::LangHint;

    #[test]
    fn plain_text_document_summary() {
        let doc = parse_plain_text(
            "brief.txt".to_owned(),
            "brief".to_owned(),
            "Wir senden die Unterlagen und bitten um Antwort.".as_bytes(),
            ReaderConfig::default(),
        );
        assert_eq!(doc.kind, DocumentKind::Text);
        assert_eq!(doc.summary.page_count, 1);
        assert_eq!(doc.summary.page_decisions, vec![PageDecision::Native]);
        assert_eq!(doc.pages[0].conf, TEXT_NATIVE_CONF);
        assert_eq!(doc.summary.doc_lang, LangHint::De);
        assert!(!doc.summary.manual_review);
        assert_eq!(doc.blocks.len(), 1);
        assert!(doc.zones.iter().any(|z| z.kind == ZoneKind::Body));
    }

    #[test]
    fn empty_text_document_is_flagged() {
        let doc = parse_plain_text(
            "empty.txt".to_owned(),
            "empty".to_owned(),
            b"",
            ReaderConfig::default(),
        );
        assert_eq!(doc.pages[0].conf, 0.0);
        assert!(doc
            .summary
            .warnings
            .contains(&"empty_page_text:p1".to_owned()));
        assert!(doc.summary.manual_review);
    }

    #[test]
    fn legacy_doc_rejects_garbage_container() {
        let result = parse_legacy_doc(
            "broken.doc".to_owned(),
            "broken".to_owned(),
            b"not a container at all",
            ReaderConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn identical_input_produces_identical_output() {
        let data = "Der Vertrag und die Anlage liegen bei.".as_bytes();
        let cfg = ReaderConfig::default();
        let a = parse_plain_text("a.txt".to_owned(), "a".to_owned(), data, cfg.clone());
        let b = parse_plain_text("a.txt".to_owned(), "a".to_owned(), data, cfg);
        assert_eq!(a.summary.page_decisions, b.summary.page_decisions);
        assert_eq!(a.blocks.len(), b.blocks.len());
        assert_eq!(a.summary.warnings, b.summary.warnings);
        assert_eq!(a.pages[0].conf, b.pages[0].conf);
    }
}

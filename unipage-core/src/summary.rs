//! Per-document accumulation and QA aggregation.
//!
//! Every page task produces a private [`PageOutcome`]; the builder owns all
//! intermediate vectors and is consumed exactly once into an immutable
//! [`ExtractedDocument`] after the last page lands. Order-sensitive outputs
//! are re-sorted by page number, so parallel completion order never leaks
//! into the artifacts.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::ReaderConfig;
use crate::entities::{
    DocumentKind, DocumentMetadata, DocumentSummary, ExtractedDocument, PageGeometry,
    PageHintEntry, PageNo, PageRecord, PageStats, TableCandidate, TableRecord, TableStatus,
    TextBlock, ToolEvent, VisualArtifact, Zone,
};
use crate::error::PageWarning;
use crate::lang::{merge_hint, LangHint};

/// Everything one page contributes to the document. Produced by a single
/// page task and merged back under one ownership point.
#[derive(Debug)]
pub struct PageOutcome {
    pub record: PageRecord,
    pub geometry: PageGeometry,
    pub blocks: Vec<TextBlock>,
    pub zones: Vec<Zone>,
    pub tables: Vec<TableRecord>,
    pub table_candidates: Vec<TableCandidate>,
    pub artifacts: Vec<VisualArtifact>,
    pub warnings: Vec<PageWarning>,
    pub events: Vec<ToolEvent>,
    pub lang_hint: LangHint,
    pub locale_hint: LangHint,
}

/// Owns all per-document mutable state during processing.
pub struct DocumentBuilder {
    doc_name: String,
    kind: DocumentKind,
    cfg: ReaderConfig,
    outcomes: Vec<PageOutcome>,
    run_warnings: Vec<PageWarning>,
    run_events: Vec<ToolEvent>,
    started: Instant,
}

impl DocumentBuilder {
    pub fn new(doc_name: impl Into<String>, kind: DocumentKind, cfg: ReaderConfig) -> Self {
        Self {
            doc_name: doc_name.into(),
            kind,
            cfg,
            outcomes: Vec::new(),
            run_warnings: Vec::new(),
            run_events: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Record a run-level (not page-scoped) warning.
    pub fn warn(&mut self, warning: PageWarning) {
        self.run_warnings.push(warning);
    }

    pub fn event(&mut self, event: ToolEvent) {
        self.run_events.push(event);
    }

    pub fn push(&mut self, outcome: PageOutcome) {
        self.outcomes.push(outcome);
    }

    /// Consume the builder into the immutable document output.
    pub fn finish(mut self) -> ExtractedDocument {
        self.outcomes.sort_by_key(|o| o.record.page);

        let mut pages = Vec::with_capacity(self.outcomes.len());
        let mut blocks = Vec::new();
        let mut zones = Vec::new();
        let mut tables = Vec::new();
        let mut table_candidates = Vec::new();
        let mut artifacts = Vec::new();
        let mut tool_log = std::mem::take(&mut self.run_events);
        let mut warning_codes: Vec<String> = Vec::new();
        let mut push_warning = |codes: &mut Vec<String>, warning: &PageWarning| {
            let code = warning.code();
            if !codes.contains(&code) {
                codes.push(code);
            }
        };
        for warning in &self.run_warnings {
            push_warning(&mut warning_codes, warning);
        }

        let mut lang_per_page = Vec::new();
        let mut locale_per_page = Vec::new();
        let mut doc_lang = LangHint::Unknown;
        let mut doc_locale = LangHint::Unknown;
        let mut per_page_stats = Vec::new();
        let mut table_pages = Vec::new();
        let mut table_counts: BTreeMap<PageNo, usize> = BTreeMap::new();
        let mut flagged_pages = Vec::new();

        for outcome in &self.outcomes {
            let page = outcome.record.page;
            let tables_found = outcome
                .tables
                .iter()
                .filter(|t| matches!(t.status, TableStatus::Ok | TableStatus::Candidate))
                .count();
            if tables_found > 0 {
                table_pages.push(page);
                table_counts.insert(page, tables_found);
            }
            let table_cells: usize = outcome.tables.iter().map(|t| t.cells.len()).sum();
            let table_failed = outcome.events.iter().any(|e| {
                e.step == "table_extract" && (e.status == "failed" || e.status == "fallback")
            });

            let flags = page_flags(&self.cfg, &outcome.record, table_failed);
            if flags.iter().any(|f| f == "low_conf_page") {
                flagged_pages.push(page);
            }

            per_page_stats.push(PageStats {
                page,
                source: outcome.record.decision,
                conf: outcome.record.conf,
                ocr_words: outcome.record.words,
                chars: outcome.record.chars,
                ocr_conf_avg: outcome.record.ocr_conf_avg,
                has_table: table_cells > 0 || tables_found > 0,
                tables_found,
                table_cells,
                decision: outcome.record.decision,
                lang: outcome.lang_hint,
                locale: outcome.locale_hint,
                flags,
                elapsed: outcome.record.elapsed,
                geometry: outcome.geometry.clone(),
            });

            lang_per_page.push(PageHintEntry {
                page,
                hint: outcome.lang_hint,
            });
            locale_per_page.push(PageHintEntry {
                page,
                hint: outcome.locale_hint,
            });
            doc_lang = merge_hint(doc_lang, outcome.lang_hint);
            doc_locale = merge_hint(doc_locale, outcome.locale_hint);

            for warning in &outcome.warnings {
                push_warning(&mut warning_codes, warning);
            }
        }

        for mut outcome in self.outcomes {
            pages.push(outcome.record);
            blocks.append(&mut outcome.blocks);
            zones.append(&mut outcome.zones);
            tables.append(&mut outcome.tables);
            table_candidates.append(&mut outcome.table_candidates);
            artifacts.append(&mut outcome.artifacts);
            tool_log.append(&mut outcome.events);
        }

        let page_count = pages.len();
        let conf_values: Vec<f32> = pages.iter().map(|p| p.conf).filter(|&c| c > 0.0).collect();
        let avg_conf = if conf_values.is_empty() {
            0.0
        } else {
            let avg = conf_values.iter().sum::<f32>() / conf_values.len() as f32;
            (avg * 100.0).round() / 100.0
        };

        let ratio = self.cfg.review_low_conf_ratio;
        let mut manual_review = !warning_codes.is_empty();
        if page_count > 0 && flagged_pages.len() as f32 / page_count as f32 >= ratio && ratio > 0.0
        {
            manual_review = true;
        } else if !flagged_pages.is_empty() && ratio <= 0.0 {
            manual_review = true;
        }

        let summary = DocumentSummary {
            page_count,
            page_decisions: pages.iter().map(|p| p.decision).collect(),
            avg_conf,
            warnings: warning_codes,
            per_page_stats,
            table_pages,
            table_counts,
            text_blocks_count: blocks.len(),
            visual_artifacts_count: artifacts.len(),
            lang_per_page,
            locale_per_page,
            doc_lang,
            doc_locale,
            manual_review,
            flagged_pages,
            tool_log,
        };

        ExtractedDocument {
            doc_name: self.doc_name,
            kind: self.kind,
            pages,
            blocks,
            zones,
            tables,
            table_candidates,
            artifacts,
            summary,
            metadata: DocumentMetadata::new(self.started.elapsed()),
        }
    }
}

/// Review flags for one page.
fn page_flags(cfg: &ReaderConfig, record: &PageRecord, table_failed: bool) -> Vec<String> {
    let mut flags = Vec::new();
    let used_ocr = record.decision.used_ocr();
    if record.conf < cfg.any_min_conf || (used_ocr && record.conf < cfg.ocr_min_conf) {
        flags.push("low_conf_page".to_owned());
    }
    if used_ocr
        && (record.words < cfg.ocr_low_text_min_words
            || record.chars < cfg.suspicious_text_chars_min)
    {
        flags.push("low_text_page".to_owned());
    }
    if table_failed {
        flags.push("table_extract_error".to_owned());
    }
    flags
}

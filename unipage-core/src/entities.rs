use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::lang::LangHint;

/// 1-based physical page number.
pub type PageNo = usize;

const UNIPAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Coordinate origin convention for every bbox emitted by the engine.
/// Recorded once per document in [`DocumentMetadata`].
pub const COORDINATE_ORIGIN: &str = "top-left";

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }
    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.height() * self.width()
    }

    #[inline(always)]
    pub(crate) fn merge(&mut self, other: &Self) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }

    #[inline(always)]
    fn overlap_x(&self, other: &Self) -> f32 {
        f32::max(
            0f32,
            f32::min(self.x1, other.x1) - f32::max(self.x0, other.x0),
        )
    }
    #[inline(always)]
    fn overlap_y(&self, other: &Self) -> f32 {
        f32::max(
            0f32,
            f32::min(self.y1, other.y1) - f32::max(self.y0, other.y0),
        )
    }

    #[inline(always)]
    pub fn intersection(&self, other: &Self) -> f32 {
        self.overlap_x(other) * self.overlap_y(other)
    }

    #[inline(always)]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.x1 <= other.x0 || other.x1 <= self.x0 || self.y1 <= other.y0 || other.y1 <= self.y0)
    }

    #[inline(always)]
    pub fn contains(&self, other: &Self) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }
}

/// Input kind, resolved once by the caller and matched exhaustively by the
/// orchestrator. No extension sniffing happens past this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    LegacyDoc,
    Text,
    Image,
}

/// How the text of a page was ultimately obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PageDecision {
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "ocr")]
    Ocr,
    #[serde(rename = "native+ocr")]
    NativeOcr,
    #[serde(rename = "ocr_image")]
    OcrImage,
}

impl PageDecision {
    pub fn used_ocr(&self) -> bool {
        matches!(
            self,
            PageDecision::Ocr | PageDecision::NativeOcr | PageDecision::OcrImage
        )
    }
}

impl fmt::Display for PageDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageDecision::Native => "native",
            PageDecision::Ocr => "ocr",
            PageDecision::NativeOcr => "native+ocr",
            PageDecision::OcrImage => "ocr_image",
        };
        write!(f, "{s}")
    }
}

/// Resolved text of one physical page. Created once during the
/// decision/reconciliation step and immutable afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageRecord {
    pub file: String,
    pub page: PageNo,
    pub decision: PageDecision,
    pub text: String,
    /// 0-100 confidence in the resolved text.
    pub conf: f32,
    #[serde(with = "serde_millis")]
    pub elapsed: Duration,
    pub words: usize,
    pub chars: usize,
    /// Average per-word OCR confidence when OCR contributed to this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_conf_avg: Option<f32>,
}

/// Style features carried by a text block.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StyleFeatures {
    pub font_size_avg: Option<f32>,
    pub is_bold: bool,
    pub is_upper: bool,
    pub char_count: usize,
}

/// A contiguous span of text on one page.
///
/// Blocks are append-only during page processing; the reading-order index is
/// assigned in emission order and is unique per page, starting at 0.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextBlock {
    pub id: String,
    pub page: PageNo,
    pub text_raw: String,
    pub text_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    pub reading_order_index: usize,
    pub is_heading_like: bool,
    pub is_list_like: bool,
    pub lang_hint: LangHint,
    pub locale_hint: LangHint,
    #[serde(flatten)]
    pub style: StyleFeatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_conf_avg: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Header,
    Footer,
    Body,
}

/// Page-level region. At most one zone of each kind per page; the body zone
/// is always present.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Zone {
    pub page: PageNo,
    pub bbox: BBox,
    #[serde(rename = "type")]
    pub kind: ZoneKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Ok,
    Fallback,
    Failed,
    Candidate,
    Inadmissible,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Ok => "ok",
            TableStatus::Fallback => "fallback",
            TableStatus::Failed => "failed",
            TableStatus::Candidate => "candidate",
            TableStatus::Inadmissible => "inadmissible",
        }
    }
}

/// Which path produced the pixels a table was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionTool {
    Render,
    Ocr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    Morph,
    TextAlignment,
}

/// Structural metrics of a detected grid.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TableMetrics {
    pub rows: usize,
    pub cols: usize,
    pub cell_count: usize,
    pub avg_cell_height: f32,
    pub avg_cell_width: f32,
    pub avg_cell_area: f32,
}

/// A detected (not necessarily cell-extracted) tabular region.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableCandidate {
    pub page: PageNo,
    pub bbox: BBox,
    pub confidence: f32,
    pub cues: Vec<String>,
    pub overlaps_text: bool,
    pub method: DetectionMethod,
    pub gridlines_h: usize,
    pub gridlines_v: usize,
    pub status: TableStatus,
    pub tool: ExtractionTool,
    pub rows: usize,
    pub cols: usize,
    pub cell_count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableCell {
    pub row: usize,
    pub col: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

/// A table with its (possibly empty) cell matrix. In lightweight detection
/// mode cell text is always empty.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableRecord {
    pub file: String,
    pub page: PageNo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    pub status: TableStatus,
    pub tool: ExtractionTool,
    pub metrics: TableMetrics,
    pub cells: Vec<TableCell>,
    /// Page-level OCR text standing in for cells when the grid could not be
    /// segmented (status `fallback`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Signature,
    Stamp,
    Logo,
    Image,
}

/// An embedded raster image recorded during native rendering.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VisualArtifact {
    pub page: PageNo,
    pub bbox: BBox,
    pub kind: ArtifactKind,
    pub confidence: f32,
    pub source: String,
}

/// One entry of the structured tool-event log.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolEvent {
    pub step: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageNo>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ToolEvent {
    pub fn new(step: &str, status: &str) -> Self {
        Self {
            step: step.to_owned(),
            status: status.to_owned(),
            page: None,
            details: BTreeMap::new(),
        }
    }

    pub fn on_page(mut self, page: PageNo) -> Self {
        self.page = Some(page);
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }
}

/// Width/height/rotation of a page plus its embedded-image count.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub images_count: usize,
}

/// Per-page statistics row of the document summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageStats {
    pub page: PageNo,
    pub source: PageDecision,
    pub conf: f32,
    pub ocr_words: usize,
    pub chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_conf_avg: Option<f32>,
    pub has_table: bool,
    pub tables_found: usize,
    pub table_cells: usize,
    pub decision: PageDecision,
    pub lang: LangHint,
    pub locale: LangHint,
    pub flags: Vec<String>,
    #[serde(with = "serde_millis")]
    pub elapsed: Duration,
    pub geometry: PageGeometry,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageHintEntry {
    pub page: PageNo,
    pub hint: LangHint,
}

/// Aggregate quality signals for one document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentSummary {
    pub page_count: usize,
    pub page_decisions: Vec<PageDecision>,
    pub avg_conf: f32,
    /// Deduplicated, insertion-ordered warning codes.
    pub warnings: Vec<String>,
    pub per_page_stats: Vec<PageStats>,
    pub table_pages: Vec<PageNo>,
    pub table_counts: BTreeMap<PageNo, usize>,
    pub text_blocks_count: usize,
    pub visual_artifacts_count: usize,
    pub lang_per_page: Vec<PageHintEntry>,
    pub locale_per_page: Vec<PageHintEntry>,
    pub doc_lang: LangHint,
    pub doc_locale: LangHint,
    pub manual_review: bool,
    pub flagged_pages: Vec<PageNo>,
    pub tool_log: Vec<ToolEvent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentMetadata {
    #[serde(with = "serde_millis")]
    pub parsing_duration: Duration,
    pub unipage_version: String,
    pub coordinate_origin: String,
}

impl DocumentMetadata {
    pub fn new(parsing_duration: Duration) -> Self {
        Self {
            parsing_duration,
            unipage_version: UNIPAGE_VERSION.to_owned(),
            coordinate_origin: COORDINATE_ORIGIN.to_owned(),
        }
    }
}

/// The engine's sole externally visible output per document. Never mutated
/// once emitted.
#[derive(Debug, Deserialize, Serialize)]
pub struct ExtractedDocument {
    pub doc_name: String,
    pub kind: DocumentKind,
    pub pages: Vec<PageRecord>,
    pub blocks: Vec<TextBlock>,
    pub zones: Vec<Zone>,
    pub tables: Vec<TableRecord>,
    pub table_candidates: Vec<TableCandidate>,
    pub artifacts: Vec<VisualArtifact>,
    pub summary: DocumentSummary,
    pub metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let bbox1 = BBox::new(0.0, 0.0, 2.0, 2.0);
        let bbox2 = BBox::new(1.0, 1.0, 3.0, 3.0);
        let bbox3 = BBox::new(2.0, 2.0, 4.0, 4.0);
        let bbox4 = BBox::new(3.0, 3.0, 5.0, 5.0); // No overlap
        let bbox5 = BBox::new(-1.0, -1.0, 1.0, 1.0); // Negative coordinates
        let bbox6 = BBox::new(0.5, 0.5, 1.5, 1.5); // Inside bbox1

        // Edge cases
        assert_eq!(bbox1.intersection(&bbox3), 0.0);
        assert_eq!(bbox1.intersection(&bbox4), 0.0); // Adjacent
        assert_eq!(bbox5.intersection(&bbox1), 1.0);

        // Overlaps
        assert_eq!(bbox1.intersection(&bbox2), 1.0);
        assert_eq!(bbox1.intersection(&bbox6), bbox6.area()); // bbox6 is inside bbox1

        // Sanity checks
        assert_eq!(bbox1.intersection(&bbox1), bbox1.area());
    }

    #[test]
    fn test_intersects() {
        let a = BBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BBox::new(1.0, 1.0, 3.0, 3.0);
        let c = BBox::new(2.0, 2.0, 4.0, 4.0);
        let d = BBox::new(5.0, 5.0, 6.0, 6.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c)); // touching edges do not count
        assert!(!a.intersects(&d));
        assert!(a.intersects(&a));
    }

    #[test]
    fn test_merge() {
        let mut a = BBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BBox::new(1.0, -1.0, 3.0, 1.0);
        a.merge(&b);
        assert_eq!(a, BBox::new(0.0, -1.0, 3.0, 2.0));
    }

    #[test]
    fn test_decision_serde_labels() {
        let labels: Vec<String> = [
            PageDecision::Native,
            PageDecision::Ocr,
            PageDecision::NativeOcr,
            PageDecision::OcrImage,
        ]
        .iter()
        .map(|d| serde_json::to_string(d).unwrap())
        .collect();
        assert_eq!(
            labels,
            vec![
                "\"native\"".to_owned(),
                "\"ocr\"".to_owned(),
                "\"native+ocr\"".to_owned(),
                "\"ocr_image\"".to_owned()
            ]
        );
    }

    #[test]
    fn test_used_ocr() {
        assert!(!PageDecision::Native.used_ocr());
        assert!(PageDecision::Ocr.used_ocr());
        assert!(PageDecision::NativeOcr.used_ocr());
        assert!(PageDecision::OcrImage.used_ocr());
    }
}

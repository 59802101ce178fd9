use std::fmt;

use crate::entities::PageNo;

/// An expected degraded path during page processing. Warnings never unwind:
/// the page keeps whatever partial result exists and the cause is surfaced
/// through the warning list and tool-event log.
///
/// Fatal conditions (missing input, a document the format library cannot
/// open) are `anyhow` errors on the orchestration call instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PageWarning {
    /// A page whose resolved text came out empty.
    EmptyPageText { page: PageNo },
    /// The OCR engine is not present on this system; OCR degrades to a
    /// no-op for the remainder of the run.
    OcrUnavailable,
    /// The OCR engine raised on one page.
    OcrError { page: PageNo, detail: String },
    /// OCR exceeded the per-page budget and was abandoned.
    OcrTimeout { page: PageNo },
    /// Native extraction or rasterization failed on one page; the page
    /// proceeds with whatever partial result exists.
    PdfPageError { page: PageNo, detail: String },
    /// Grid segmentation or cell OCR failed on one page.
    TableExtractError { page: PageNo, detail: String },
    /// A structurally valid candidate was dropped by the area/cell filter.
    TableCandidateFiltered {
        page: PageNo,
        cells: usize,
        avg_area: f32,
    },
    /// A full-mode table whose aggregate OCR yield was too sparse to keep.
    TableTextSparse { page: PageNo, words: usize },
}

impl PageWarning {
    /// Page the warning is attached to, when page-scoped.
    pub fn page(&self) -> Option<PageNo> {
        match self {
            PageWarning::EmptyPageText { page }
            | PageWarning::OcrError { page, .. }
            | PageWarning::OcrTimeout { page }
            | PageWarning::PdfPageError { page, .. }
            | PageWarning::TableExtractError { page, .. }
            | PageWarning::TableCandidateFiltered { page, .. }
            | PageWarning::TableTextSparse { page, .. } => Some(*page),
            PageWarning::OcrUnavailable => None,
        }
    }

    /// Stable string code recorded in the document summary. Downstream
    /// phases match on these, so the shapes are load-bearing.
    pub fn code(&self) -> String {
        match self {
            PageWarning::EmptyPageText { page } => format!("empty_page_text:p{page}"),
            PageWarning::OcrUnavailable => "ocr_unavailable".to_owned(),
            PageWarning::OcrError { page, detail } => format!("ocr_runner_error:p{page}:{detail}"),
            PageWarning::OcrTimeout { page } => format!("ocr_timeout:p{page}"),
            PageWarning::PdfPageError { page, detail } => {
                format!("pdf_page_error:p{page}:{detail}")
            }
            PageWarning::TableExtractError { page, detail } => {
                format!("table_extract_error:p{page}:{detail}")
            }
            PageWarning::TableCandidateFiltered {
                page,
                cells,
                avg_area,
            } => format!("table_candidate_filtered:p{page}:cells{cells}:area{avg_area:.0}"),
            PageWarning::TableTextSparse { page, words } => {
                format!("table_text_sparse:p{page}:words{words}")
            }
        }
    }
}

impl fmt::Display for PageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

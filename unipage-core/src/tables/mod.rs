//! Table detection and extraction.
//!
//! Light mode flags probable table regions from morphological line
//! structure without paying any OCR cost; full mode segments the grid and
//! OCRs every cell. Degenerate candidates are dropped with a diagnostic
//! warning instead of polluting the output.

use image::{DynamicImage, GrayImage};

use crate::config::{ReaderConfig, TablesMode};
use crate::entities::{
    BBox, DetectionMethod, ExtractionTool, PageDecision, PageNo, TableCandidate, TableCell,
    TableMetrics, TableRecord, TableStatus, TextBlock, ToolEvent,
};
use crate::error::PageWarning;
use crate::ocr::{OcrEngine, OcrParams};

pub mod grid;

use grid::{GridDetection, GridGeometry, GridOutcome, Sensitivity};

/// Cell-count saturation point of the richness term.
const RICHNESS_CELLS_CAP: f32 = 200.0;

/// Everything a table scan produces for one page.
#[derive(Debug, Default)]
pub struct TableScan {
    pub candidates: Vec<TableCandidate>,
    pub records: Vec<TableRecord>,
    pub warnings: Vec<PageWarning>,
    pub events: Vec<ToolEvent>,
}

/// Page-side inputs of a table scan.
pub struct TableContext<'a> {
    pub file: &'a str,
    pub page: PageNo,
    pub page_bbox: &'a BBox,
    pub decision: PageDecision,
    pub blocks: &'a [TextBlock],
    /// Raster pixels per PDF point.
    pub zoom: f32,
    /// Page-level OCR text, used as fallback content when the grid cannot
    /// be segmented into cells.
    pub ocr_page_text: Option<&'a str>,
}

/// Candidate confidence from detection status and structural richness.
///
/// Grid evidence yields a higher base than text-alignment inference; live
/// statuses are floored by the configured minimum confidence.
pub(crate) fn candidate_confidence(
    min_conf: f32,
    status: TableStatus,
    rows: usize,
    cols: usize,
    cell_count: usize,
) -> f32 {
    let base = match status {
        TableStatus::Ok => 0.85f32.max(min_conf),
        TableStatus::Fallback => 0.6f32.max(min_conf),
        TableStatus::Candidate => 0.5f32.max(min_conf),
        TableStatus::Failed => 0.2,
        TableStatus::Inadmissible => 0.1,
    };
    let richness = (cell_count as f32 / RICHNESS_CELLS_CAP).min(1.0);
    let structure = if rows >= 2 && cols >= 2 {
        0.25
    } else if rows >= 1 && cols >= 1 {
        0.1
    } else {
        0.0
    };
    let conf = (base + 0.25 * richness + structure).clamp(0.0, 1.0);
    (conf * 10000.0).round() / 10000.0
}

fn candidate_cues(rows: usize, cols: usize, gridlines_h: usize, gridlines_v: usize) -> Vec<String> {
    let mut cues = Vec::new();
    if gridlines_h > 0 || gridlines_v > 0 {
        cues.push("rulings".to_owned());
    }
    if cols >= 3 {
        cues.push("columns".to_owned());
    }
    if rows >= 2 && cols >= 2 {
        cues.push("grid".to_owned());
    }
    if cues.is_empty() {
        cues.push("layout".to_owned());
    }
    cues
}

/// Map pixel-space grid extents back to page coordinates.
pub(crate) fn table_bbox(geometry: &GridGeometry, page_bbox: &BBox, zoom: f32) -> Option<BBox> {
    if geometry.row_lines.len() < 2 || geometry.col_lines.len() < 2 {
        return None;
    }
    let y0 = *geometry.row_lines.first().unwrap() as f32;
    let y1 = *geometry.row_lines.last().unwrap() as f32;
    let x0 = *geometry.col_lines.first().unwrap() as f32;
    let x1 = *geometry.col_lines.last().unwrap() as f32;
    Some(BBox::new(
        page_bbox.x0 + x0 / zoom,
        page_bbox.y0 + y0 / zoom,
        page_bbox.x0 + x1 / zoom,
        page_bbox.y0 + y1 / zoom,
    ))
}

fn cell_bbox(
    geometry: &GridGeometry,
    page_bbox: &BBox,
    zoom: f32,
    row: usize,
    col: usize,
) -> Option<BBox> {
    if geometry.row_lines.len() <= row + 1 || geometry.col_lines.len() <= col + 1 {
        return None;
    }
    Some(BBox::new(
        page_bbox.x0 + geometry.col_lines[col] as f32 / zoom,
        page_bbox.y0 + geometry.row_lines[row] as f32 / zoom,
        page_bbox.x0 + geometry.col_lines[col + 1] as f32 / zoom,
        page_bbox.y0 + geometry.row_lines[row] as f32 / zoom
            + (geometry.row_lines[row + 1] - geometry.row_lines[row]) as f32 / zoom,
    ))
}

fn make_candidate(
    cfg: &ReaderConfig,
    ctx: &TableContext<'_>,
    status: TableStatus,
    bbox: BBox,
    metrics: &TableMetrics,
    geometry: &GridGeometry,
) -> TableCandidate {
    let gridlines_h = geometry.row_lines.len();
    let gridlines_v = geometry.col_lines.len();
    let method = if gridlines_h > 0 || gridlines_v > 0 {
        DetectionMethod::Morph
    } else {
        DetectionMethod::TextAlignment
    };
    let overlaps_text = ctx
        .blocks
        .iter()
        .filter(|b| b.page == ctx.page)
        .filter_map(|b| b.bbox.as_ref())
        .any(|b| b.intersects(&bbox));
    TableCandidate {
        page: ctx.page,
        bbox,
        confidence: candidate_confidence(
            cfg.table_candidate_min_conf,
            status,
            metrics.rows,
            metrics.cols,
            metrics.cell_count,
        ),
        cues: candidate_cues(metrics.rows, metrics.cols, gridlines_h, gridlines_v),
        overlaps_text,
        method,
        gridlines_h,
        gridlines_v,
        status,
        tool: extraction_tool(ctx.decision),
        rows: metrics.rows,
        cols: metrics.cols,
        cell_count: metrics.cell_count,
    }
}

fn extraction_tool(decision: PageDecision) -> ExtractionTool {
    if decision.used_ocr() {
        ExtractionTool::Ocr
    } else {
        ExtractionTool::Render
    }
}

/// Scan one rendered page for tables. `ocr` is only consulted in full
/// extraction mode; passing `None` (engine unavailable) degrades full mode
/// to detection.
pub fn scan_page_raster(
    gray: &GrayImage,
    ctx: &TableContext<'_>,
    cfg: &ReaderConfig,
    ocr: Option<(&dyn OcrEngine, &OcrParams)>,
) -> TableScan {
    let mut scan = TableScan::default();
    if cfg.tables_mode == TablesMode::Off {
        return scan;
    }
    let extract = cfg.tables_mode == TablesMode::Extract && ocr.is_some();
    let sensitivity = if cfg.tables_mode == TablesMode::Extract {
        Sensitivity::High
    } else {
        Sensitivity::Normal
    };

    let detection = match grid::detect_grid(gray, sensitivity) {
        GridOutcome::None => return scan,
        GridOutcome::Partial => {
            // Rulings without a complete grid: in full mode the page OCR
            // text can still stand in for the table content.
            if extract {
                if let Some(text) = ctx.ocr_page_text.filter(|t| !t.trim().is_empty()) {
                    let metrics = TableMetrics::default();
                    let geometry = GridGeometry {
                        image_width: gray.width(),
                        image_height: gray.height(),
                        ..Default::default()
                    };
                    scan.candidates.push(make_candidate(
                        cfg,
                        ctx,
                        TableStatus::Fallback,
                        ctx.page_bbox.clone(),
                        &metrics,
                        &geometry,
                    ));
                    scan.records.push(TableRecord {
                        file: ctx.file.to_owned(),
                        page: ctx.page,
                        bbox: None,
                        status: TableStatus::Fallback,
                        tool: extraction_tool(ctx.decision),
                        metrics,
                        cells: Vec::new(),
                        table_text: Some(text.to_owned()),
                    });
                    scan.events.push(
                        ToolEvent::new("table_extract", "fallback").on_page(ctx.page),
                    );
                }
            }
            return scan;
        }
        GridOutcome::Grid(detection) => detection,
    };

    let GridDetection { metrics, geometry } = detection;
    let bbox = table_bbox(&geometry, ctx.page_bbox, ctx.zoom)
        .expect("complete grid always has a bbox");

    if !extract {
        // Lightweight detection: filter degenerate candidates, never OCR.
        if metrics.cell_count == 0
            || metrics.cell_count > cfg.table_detect_max_cells
            || metrics.avg_cell_area < cfg.table_detect_min_area
        {
            scan.warnings.push(PageWarning::TableCandidateFiltered {
                page: ctx.page,
                cells: metrics.cell_count,
                avg_area: metrics.avg_cell_area,
            });
            scan.events.push(
                ToolEvent::new("table_detect", "filtered")
                    .on_page(ctx.page)
                    .detail("cells", metrics.cell_count)
                    .detail("avg_cell_area", metrics.avg_cell_area.round() as i64),
            );
            return scan;
        }
        scan.events.push(
            ToolEvent::new("table_detect", "ok")
                .on_page(ctx.page)
                .detail("rows", metrics.rows)
                .detail("cols", metrics.cols),
        );
        scan.candidates.push(make_candidate(
            cfg,
            ctx,
            TableStatus::Candidate,
            bbox.clone(),
            &metrics,
            &geometry,
        ));
        scan.records.push(TableRecord {
            file: ctx.file.to_owned(),
            page: ctx.page,
            bbox: Some(bbox),
            status: TableStatus::Candidate,
            tool: extraction_tool(ctx.decision),
            metrics,
            cells: Vec::new(),
            table_text: None,
        });
        return scan;
    }

    // Full extraction: OCR every cell.
    let (engine, params) = ocr.expect("extract implies an OCR engine");
    let mut cells = Vec::with_capacity(metrics.cell_count);
    let mut total_words = 0usize;
    for row in 0..metrics.rows {
        let y1 = geometry.row_lines[row];
        let y2 = geometry.row_lines[row + 1];
        for col in 0..metrics.cols {
            let x1 = geometry.col_lines[col];
            let x2 = geometry.col_lines[col + 1];
            let text = match grid::crop_cell(gray, y1, y2, x1, x2, 1) {
                Some(cell_img) => {
                    match engine.recognize(&DynamicImage::ImageLuma8(cell_img), params) {
                        Ok(out) => {
                            total_words += out.words;
                            out.text.trim().to_owned()
                        }
                        Err(err) => {
                            scan.warnings.push(PageWarning::TableExtractError {
                                page: ctx.page,
                                detail: err.to_string(),
                            });
                            String::new()
                        }
                    }
                }
                None => String::new(),
            };
            cells.push(TableCell {
                row,
                col,
                text,
                bbox: cell_bbox(&geometry, ctx.page_bbox, ctx.zoom, row, col),
            });
        }
    }

    if total_words < cfg.tables_min_words {
        // Structurally valid but too sparse to be useful; keep the
        // detection evidence, drop the cell matrix.
        scan.warnings.push(PageWarning::TableTextSparse {
            page: ctx.page,
            words: total_words,
        });
        scan.events.push(
            ToolEvent::new("table_extract", "inadmissible")
                .on_page(ctx.page)
                .detail("words", total_words),
        );
        scan.candidates.push(make_candidate(
            cfg,
            ctx,
            TableStatus::Inadmissible,
            bbox,
            &metrics,
            &geometry,
        ));
        return scan;
    }

    scan.events.push(
        ToolEvent::new("table_extract", "ok")
            .on_page(ctx.page)
            .detail("rows", metrics.rows)
            .detail("cols", metrics.cols)
            .detail("words", total_words),
    );
    scan.candidates.push(make_candidate(
        cfg,
        ctx,
        TableStatus::Ok,
        bbox.clone(),
        &metrics,
        &geometry,
    ));
    scan.records.push(TableRecord {
        file: ctx.file.to_owned(),
        page: ctx.page,
        bbox: Some(bbox),
        status: TableStatus::Ok,
        tool: extraction_tool(ctx.decision),
        metrics,
        cells,
        table_text: None,
    });
    scan
}

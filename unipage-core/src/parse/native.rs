//! Native PDF page access.
//!
//! A single blocking worker owns the pdfium instance; requests arrive over
//! an mpsc queue and every page is streamed back as soon as it is parsed.
//! Each page carries its text lines with span styles, embedded-image
//! statistics and one raster at the OCR-recommended DPI, so no later stage
//! has to talk to pdfium again.

use std::{ops::Range, sync::Arc, time::Instant};

use anyhow::Context;
use image::DynamicImage;
use pdfium_render::prelude::{
    PdfFontWeight, PdfPage, PdfPageObjectCommon, PdfPageObjectsCommon, PdfPageRenderRotation,
    PdfPageTextChar, PdfRenderConfig, Pdfium,
};
use plsfix::fix_text;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{instrument, Span};

use crate::blocks::{LineSpan, PageLine};
use crate::config::ReaderConfig;
use crate::entities::{BBox, PageNo};
use crate::ocr::recommended_dpi;

const MAX_CONCURRENT_NATIVE_REQS: usize = 10;
/// Embedded-image coverage is capped here; overlapping XObjects can sum to
/// more than the page area.
const COVERAGE_CAP: f32 = 1.5;

/// Everything the native worker extracts from one page.
#[derive(Debug)]
pub struct NativePage {
    pub page_no: PageNo,
    pub lines: Vec<PageLine>,
    pub page_bbox: BBox,
    pub rotation: f32,
    /// Page raster at `dpi`, shared with OCR and table detection.
    pub raster: Arc<DynamicImage>,
    /// Raster pixels per PDF point.
    pub zoom: f32,
    pub dpi: u32,
    pub image_boxes: Vec<BBox>,
    pub image_coverage: f32,
    pub median_font_size: Option<f32>,
    pub elapsed: std::time::Duration,
}

/// Per-page message streamed back from the native worker. Page 0 carries
/// document-level failures (the file could not be opened at all).
pub type NativePageResult = (PageNo, anyhow::Result<NativePage>);

pub struct ParseNativeRequest {
    pub doc_data: Arc<[u8]>,
    pub password: Option<String>,
    pub page_range: Option<Range<usize>>,
    pub config: ReaderConfig,
    pub sender_tx: Sender<NativePageResult>,
}

impl ParseNativeRequest {
    pub fn new(
        data: &[u8],
        password: Option<&str>,
        page_range: Option<Range<usize>>,
        config: ReaderConfig,
        sender_tx: Sender<NativePageResult>,
    ) -> Self {
        ParseNativeRequest {
            doc_data: Arc::from(data),
            password: password.map(|p| p.to_string()),
            page_range,
            config,
            sender_tx,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseNativeQueue {
    queue: Sender<(ParseNativeRequest, Span)>,
}

impl Default for ParseNativeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseNativeQueue {
    pub fn new() -> Self {
        let (queue_sender, queue_receiver) = mpsc::channel(MAX_CONCURRENT_NATIVE_REQS);

        tokio::task::spawn_blocking(move || start_native_parser(queue_receiver));
        Self {
            queue: queue_sender,
        }
    }

    pub(crate) async fn push(&self, req: ParseNativeRequest) -> anyhow::Result<()> {
        let span = Span::current();
        self.queue
            .send((req, span))
            .await
            .context("error sending parse native request")
    }
}

/// A run of characters sharing font, size, weight and rotation.
struct CharSpan {
    bbox: BBox,
    text: String,
    rotation: f32,
    font_name: String,
    font_size: f32,
    font_weight: Option<PdfFontWeight>,
}

fn char_bbox(char: &PdfPageTextChar, page_height: f32) -> anyhow::Result<BBox> {
    let bounds = char
        .tight_bounds()
        .context("error reading char tight bounds")?;
    Ok(BBox {
        x0: bounds.left.value,
        y0: page_height - bounds.top.value,
        x1: bounds.right.value,
        y1: page_height - bounds.bottom.value,
    })
}

impl CharSpan {
    fn new_from_char(char: &PdfPageTextChar, page_bbox: &BBox) -> anyhow::Result<Self> {
        Ok(Self {
            bbox: char_bbox(char, page_bbox.height())?,
            text: char.unicode_char().unwrap_or_default().into(),
            font_name: char.font_name(),
            font_weight: char.font_weight(),
            font_size: char.unscaled_font_size().value,
            rotation: char.get_rotation_clockwise_degrees(),
        })
    }

    /// Extend this span; returns `None` when the char opens a new span.
    fn append(&mut self, char: &PdfPageTextChar, page_bbox: &BBox) -> anyhow::Result<Option<()>> {
        if char.unscaled_font_size().value != self.font_size
            || char.font_name() != self.font_name
            || char.font_weight() != self.font_weight
            || char.get_rotation_clockwise_degrees() != self.rotation
        {
            return Ok(None);
        }
        let bbox = char_bbox(char, page_bbox.height())?;
        self.text.push(char.unicode_char().unwrap_or_default());
        self.bbox.merge(&bbox);
        Ok(Some(()))
    }
}

/// A line assembled from consecutive spans.
struct NativeLine {
    text: String,
    bbox: BBox,
    rotation: f32,
    spans: Vec<CharSpan>,
}

impl NativeLine {
    fn new_from_span(span: CharSpan) -> Self {
        Self {
            bbox: span.bbox.clone(),
            text: span.text.clone(),
            rotation: span.rotation,
            spans: vec![span],
        }
    }

    fn append(&mut self, span: CharSpan) -> Result<(), CharSpan> {
        if span.rotation != self.rotation
            // NOTE: pdfium doesn't always inject a linebreak, so span
            // positions are checked as well.
            || span.bbox.y0 > self.bbox.y1
            || span.text.ends_with('\n')
            || span.text.ends_with('\x02')
        {
            self.text = fix_text(&self.text, None);
            Err(span)
        } else {
            self.bbox.merge(&span.bbox);
            self.text.push_str(&span.text);
            self.spans.push(span);
            Ok(())
        }
    }
}

fn weight_value(weight: &PdfFontWeight) -> u32 {
    match weight {
        PdfFontWeight::Weight100 => 100,
        PdfFontWeight::Weight200 => 200,
        PdfFontWeight::Weight300 => 300,
        PdfFontWeight::Weight400Normal => 400,
        PdfFontWeight::Weight500 => 500,
        PdfFontWeight::Weight600 => 600,
        PdfFontWeight::Weight700Bold => 700,
        PdfFontWeight::Weight800 => 800,
        PdfFontWeight::Weight900 => 900,
        PdfFontWeight::Custom(value) => *value,
    }
}

fn parse_text_spans<'a>(
    chars: impl Iterator<Item = PdfPageTextChar<'a>>,
    page_bbox: &BBox,
) -> anyhow::Result<Vec<CharSpan>> {
    let mut spans: Vec<CharSpan> = Vec::new();
    for char in chars {
        match spans.last_mut() {
            None => spans.push(CharSpan::new_from_char(&char, page_bbox)?),
            Some(span) => {
                if span.append(&char, page_bbox)?.is_none() {
                    spans.push(CharSpan::new_from_char(&char, page_bbox)?);
                }
            }
        }
    }
    Ok(spans)
}

fn parse_text_lines(spans: Vec<CharSpan>) -> Vec<NativeLine> {
    let mut lines: Vec<NativeLine> = Vec::new();
    for span in spans {
        match lines.last_mut() {
            None => lines.push(NativeLine::new_from_span(span)),
            Some(line) => {
                if let Err(span) = line.append(span) {
                    lines.push(NativeLine::new_from_span(span));
                }
            }
        }
    }
    if let Some(line) = lines.last_mut() {
        line.text = fix_text(&line.text, None);
    }
    lines
}

fn to_page_lines(lines: Vec<NativeLine>) -> Vec<PageLine> {
    lines
        .into_iter()
        .map(|line| PageLine {
            text: line.text,
            bbox: line.bbox,
            spans: line
                .spans
                .into_iter()
                .map(|span| LineSpan {
                    text: span.text,
                    font_name: span.font_name,
                    font_size: span.font_size,
                    font_weight: span.font_weight.as_ref().map(weight_value),
                })
                .collect(),
        })
        .collect()
}

pub(crate) fn median_font_size(lines: &[PageLine]) -> Option<f32> {
    let mut sizes: Vec<f32> = lines
        .iter()
        .flat_map(|l| l.spans.iter())
        .map(|s| s.font_size)
        .filter(|&s| s > 0.0)
        .collect();
    if sizes.is_empty() {
        return None;
    }
    sizes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(sizes[sizes.len() / 2])
}

pub(crate) fn image_coverage(image_boxes: &[BBox], page_area: f32) -> f32 {
    if image_boxes.is_empty() {
        return 0.0;
    }
    let area: f32 = image_boxes.iter().map(|b| b.area().max(0.0)).sum();
    (area / page_area.max(1.0)).clamp(0.0, COVERAGE_CAP)
}

fn collect_image_boxes(page: &PdfPage, page_height: f32) -> Vec<BBox> {
    let mut boxes = Vec::new();
    for object in page.objects().iter() {
        if object.as_image_object().is_none() {
            continue;
        }
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        boxes.push(BBox {
            x0: bounds.left().value,
            y0: page_height - bounds.top().value,
            x1: bounds.right().value,
            y1: page_height - bounds.bottom().value,
        });
    }
    boxes
}

#[instrument(skip(page, config))]
pub(crate) fn parse_page_native(
    page_no: PageNo,
    page: &mut PdfPage,
    config: &ReaderConfig,
) -> anyhow::Result<NativePage> {
    let start_time = Instant::now();

    let page_bbox = BBox {
        x0: 0f32,
        y0: 0f32,
        x1: page.width().value,
        y1: page.height().value,
    };
    let rotation = match page.rotation() {
        Ok(PdfPageRenderRotation::None) | Err(_) => 0.0,
        Ok(PdfPageRenderRotation::Degrees90) => 90.0,
        Ok(PdfPageRenderRotation::Degrees180) => 180.0,
        Ok(PdfPageRenderRotation::Degrees270) => 270.0,
    };

    let text_spans = parse_text_spans(page.text()?.chars().iter(), &page_bbox)?;
    let lines = to_page_lines(parse_text_lines(text_spans));
    let median = median_font_size(&lines);

    let dpi = recommended_dpi(config, median);
    let zoom = dpi as f32 / 72.0;
    let raster = page
        .render_with_config(&PdfRenderConfig::default().scale_page_by_factor(zoom))
        .map(|bitmap| bitmap.as_image())?;

    let image_boxes = collect_image_boxes(page, page_bbox.height());
    let coverage = image_coverage(&image_boxes, page_bbox.area());

    let elapsed = start_time.elapsed();
    tracing::debug!(
        "native parse of page {} took {}ms (dpi {})",
        page_no,
        elapsed.as_millis(),
        dpi
    );
    Ok(NativePage {
        page_no,
        lines,
        page_bbox,
        rotation,
        raster: Arc::new(raster),
        zoom,
        dpi,
        image_boxes,
        image_coverage: coverage,
        median_font_size: median,
        elapsed,
    })
}

fn handle_parse_native_req(
    pdfium: &Pdfium,
    req: ParseNativeRequest,
    parent_span: Span,
) -> anyhow::Result<()> {
    let _guard = parent_span.enter();
    let ParseNativeRequest {
        doc_data,
        password,
        page_range,
        config,
        sender_tx,
    } = req;
    let document = match pdfium.load_pdf_from_byte_slice(&doc_data, password.as_deref()) {
        Ok(document) => document,
        Err(err) => {
            sender_tx.blocking_send((0, Err(err.into())))?;
            return Ok(());
        }
    };
    let mut pages: Vec<_> = document.pages().iter().enumerate().collect();

    let pages = if let Some(range) = page_range {
        if range.end > pages.len() {
            let err = anyhow::anyhow!(
                "Page range end ({}) exceeds document length ({})",
                range.end,
                pages.len()
            );
            sender_tx.blocking_send((0, Err(err)))?;
            return Ok(());
        }
        pages.drain(range).collect()
    } else {
        pages
    };
    for (page_idx, mut page) in pages {
        let page_no = page_idx + 1;
        let parsing_result = parse_page_native(page_no, &mut page, &config);
        sender_tx.blocking_send((page_no, parsing_result))?
    }
    Ok(())
}

pub fn start_native_parser(mut input_rx: Receiver<(ParseNativeRequest, Span)>) {
    let pdfium = Pdfium::new(
        Pdfium::bind_to_statically_linked_library().expect("can't load pdfium bindings"),
    );
    while let Some((req, parent_span)) = input_rx.blocking_recv() {
        match handle_parse_native_req(&pdfium, req, parent_span) {
            Ok(_) => {}
            Err(e) => tracing::error!("error parsing request natively: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_with_sizes(sizes: &[f32]) -> PageLine {
        PageLine {
            text: "x".to_owned(),
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            spans: sizes
                .iter()
                .map(|&size| LineSpan {
                    text: "x".to_owned(),
                    font_name: "F".to_owned(),
                    font_size: size,
                    font_weight: None,
                })
                .collect(),
        }
    }

    #[test]
    fn median_font_size_picks_middle_value() {
        let lines = vec![line_with_sizes(&[8.0, 12.0]), line_with_sizes(&[10.0])];
        assert_eq!(median_font_size(&lines), Some(10.0));
        assert_eq!(median_font_size(&[line_with_sizes(&[0.0])]), None);
        assert_eq!(median_font_size(&[]), None);
    }

    #[test]
    fn coverage_is_capped() {
        let page_area = 100.0;
        let boxes = vec![BBox::new(0.0, 0.0, 20.0, 20.0)];
        assert_eq!(image_coverage(&boxes, page_area), 1.5);
        let small = vec![BBox::new(0.0, 0.0, 5.0, 5.0)];
        assert_eq!(image_coverage(&small, page_area), 0.25);
        assert_eq!(image_coverage(&[], page_area), 0.0);
    }
}

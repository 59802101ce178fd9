//! Morphological gridline detection on a rendered page.
//!
//! The page raster is binarized (ink as white), then eroded and dilated
//! with axis-aligned structuring elements so that only long horizontal and
//! vertical rulings survive. Gridline positions come from projecting the
//! surviving ink onto each axis and grouping the peaks.

use image::imageops;
use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;

use crate::entities::TableMetrics;

/// Kernel divisor: structuring-element length is `dimension / scale`.
const KERNEL_SCALE_NORMAL: u32 = 80;
const KERNEL_SCALE_HIGH: u32 = 50;
const KERNEL_MIN: u32 = 10;
/// Maximum gap between projection indices grouped into one gridline.
const PEAK_GROUP_GAP: u32 = 3;
/// Gridlines closer than this are merged.
const LINE_DEDUP_TOLERANCE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    Normal,
    /// Shorter kernels, catches finer rulings. Used in full extraction.
    High,
}

impl Sensitivity {
    fn kernel_scale(&self) -> u32 {
        match self {
            Sensitivity::Normal => KERNEL_SCALE_NORMAL,
            Sensitivity::High => KERNEL_SCALE_HIGH,
        }
    }
}

/// Pixel-space geometry of a detected grid.
#[derive(Debug, Clone, Default)]
pub struct GridGeometry {
    pub row_lines: Vec<u32>,
    pub col_lines: Vec<u32>,
    pub image_width: u32,
    pub image_height: u32,
}

#[derive(Debug, Clone)]
pub struct GridDetection {
    pub metrics: TableMetrics,
    pub geometry: GridGeometry,
}

/// Result of scanning one page raster for grid structure.
#[derive(Debug, Clone)]
pub enum GridOutcome {
    /// No morphological line structure at all: absence of a table, not a
    /// low-confidence one.
    None,
    /// Some rulings survived but no complete cell grid formed.
    Partial,
    Grid(GridDetection),
}

/// Binarize so that ink is white on black.
fn binarize(gray: &GrayImage) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, 0.8);
    let level = otsu_level(&blurred);
    let mut binary = threshold(&blurred, level, ThresholdType::Binary);
    let sum: u64 = binary.pixels().map(|p| p.0[0] as u64).sum();
    let mean = sum / (binary.width() as u64 * binary.height() as u64).max(1);
    if mean > 127 {
        imageops::invert(&mut binary);
    }
    binary
}

/// Sliding erosion (min) along one axis with a 1xk structuring element.
fn erode_axis(img: &GrayImage, k: u32, horizontal: bool) -> GrayImage {
    axis_filter(img, k, horizontal, true)
}

/// Sliding dilation (max) along one axis with a 1xk structuring element.
fn dilate_axis(img: &GrayImage, k: u32, horizontal: bool) -> GrayImage {
    axis_filter(img, k, horizontal, false)
}

fn axis_filter(img: &GrayImage, k: u32, horizontal: bool, take_min: bool) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    let half = (k / 2) as i64;
    for y in 0..h {
        for x in 0..w {
            let mut acc: u8 = if take_min { 255 } else { 0 };
            for offset in -half..=half {
                let (sx, sy) = if horizontal {
                    (x as i64 + offset, y as i64)
                } else {
                    (x as i64, y as i64 + offset)
                };
                let value = if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
                    // Out-of-bounds counts as background so rulings must be
                    // fully supported by real pixels.
                    0
                } else {
                    img.get_pixel(sx as u32, sy as u32).0[0]
                };
                acc = if take_min {
                    acc.min(value)
                } else {
                    acc.max(value)
                };
            }
            out.put_pixel(x, y, image::Luma([acc]));
        }
    }
    out
}

fn count_nonzero(img: &GrayImage) -> usize {
    img.pixels().filter(|p| p.0[0] > 0).count()
}

/// Project ink counts onto an axis and return the peak positions.
fn project_peaks(img: &GrayImage, project_rows: bool) -> Vec<u32> {
    let (w, h) = img.dimensions();
    let len = if project_rows { h } else { w };
    let mut profile = vec![0u32; len as usize];
    for y in 0..h {
        for x in 0..w {
            if img.get_pixel(x, y).0[0] > 0 {
                let idx = if project_rows { y } else { x };
                profile[idx as usize] += 1;
            }
        }
    }
    let max = profile.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    let thr = 5u32.max(max / 10);
    let indices: Vec<u32> = profile
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > thr)
        .map(|(idx, _)| idx as u32)
        .collect();
    if indices.is_empty() {
        return Vec::new();
    }
    let mut groups: Vec<Vec<u32>> = vec![vec![indices[0]]];
    for &value in &indices[1..] {
        let last = *groups.last().unwrap().last().unwrap();
        if value - last <= PEAK_GROUP_GAP {
            groups.last_mut().unwrap().push(value);
        } else {
            groups.push(vec![value]);
        }
    }
    groups
        .iter()
        .map(|group| group.iter().sum::<u32>() / group.len() as u32)
        .collect()
}

fn dedup_lines(mut values: Vec<u32>) -> Vec<u32> {
    if values.is_empty() {
        return values;
    }
    values.sort_unstable();
    let mut result = vec![values[0]];
    for value in values.into_iter().skip(1) {
        if value - *result.last().unwrap() > LINE_DEDUP_TOLERANCE {
            result.push(value);
        }
    }
    result
}

/// Scan a grayscale page raster for tabular grid structure.
pub fn detect_grid(gray: &GrayImage, sensitivity: Sensitivity) -> GridOutcome {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return GridOutcome::None;
    }
    let binary = binarize(gray);

    let scale = sensitivity.kernel_scale();
    let hor_k = KERNEL_MIN.max(w / scale);
    let ver_k = KERNEL_MIN.max(h / scale);
    let horiz = dilate_axis(&erode_axis(&binary, hor_k, true), hor_k, true);
    let vert = dilate_axis(&erode_axis(&binary, ver_k, false), ver_k, false);

    if count_nonzero(&horiz) == 0 && count_nonzero(&vert) == 0 {
        return GridOutcome::None;
    }

    let row_lines = dedup_lines(project_peaks(&horiz, true));
    let col_lines = dedup_lines(project_peaks(&vert, false));
    if row_lines.len() < 2 || col_lines.len() < 2 {
        return GridOutcome::Partial;
    }

    let rows = row_lines.len() - 1;
    let cols = col_lines.len() - 1;
    let span_height = (row_lines[row_lines.len() - 1] - row_lines[0]) as f32;
    let span_width = (col_lines[col_lines.len() - 1] - col_lines[0]) as f32;
    let avg_cell_height = span_height / rows as f32;
    let avg_cell_width = span_width / cols as f32;

    GridOutcome::Grid(GridDetection {
        metrics: TableMetrics {
            rows,
            cols,
            cell_count: rows * cols,
            avg_cell_height,
            avg_cell_width,
            avg_cell_area: avg_cell_height * avg_cell_width,
        },
        geometry: GridGeometry {
            row_lines,
            col_lines,
            image_width: w,
            image_height: h,
        },
    })
}

/// Crop one cell region from the page raster, shaving `pad` pixels off each
/// edge so the rulings themselves do not enter cell OCR.
pub fn crop_cell(gray: &GrayImage, y1: u32, y2: u32, x1: u32, x2: u32, pad: u32) -> Option<GrayImage> {
    let (w, h) = gray.dimensions();
    let y1p = (y1 + pad).min(h);
    let y2p = y2.saturating_sub(pad).min(h);
    let x1p = (x1 + pad).min(w);
    let x2p = x2.saturating_sub(pad).min(w);
    if y2p <= y1p || x2p <= x1p {
        return None;
    }
    Some(imageops::crop_imm(gray, x1p, y1p, x2p - x1p, y2p - y1p).to_image())
}

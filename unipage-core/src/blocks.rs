//! Text block extraction and classification.
//!
//! Native structured lines are grouped into visually contiguous blocks;
//! OCR-only and plain-text pages get one synthetic block per page. Heading
//! and list classification is shared by both paths.

use crate::entities::{BBox, PageNo, StyleFeatures, TextBlock};
use crate::lang::{language_hint, locale_hint};

/// Vertical gap (relative to the previous line's height) that splits two
/// lines into separate blocks.
const BLOCK_GAP_FACTOR: f32 = 0.8;
/// Uppercase-ratio threshold for the `is_upper` style flag.
const UPPER_STYLE_RATIO: f32 = 0.75;
/// Font weight at or above which a span counts as bold.
const BOLD_WEIGHT_MIN: u32 = 600;

/// One styled span of a native text line, decoupled from the PDF library.
#[derive(Debug, Clone)]
pub struct LineSpan {
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    pub font_weight: Option<u32>,
}

/// One native text line with its spans.
#[derive(Debug, Clone)]
pub struct PageLine {
    pub text: String,
    pub bbox: BBox,
    pub spans: Vec<LineSpan>,
}

/// Uppercase ratio over alphabetic characters only.
fn uppercase_ratio(text: &str) -> f32 {
    let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
    if alpha == 0 {
        return 0.0;
    }
    let upper = text
        .chars()
        .filter(|c| c.is_alphabetic() && c.is_uppercase())
        .count();
    upper as f32 / alpha as f32
}

/// Heading heuristic over a block's raw text, span font sizes and line
/// structure.
pub fn is_heading_like(text_raw: &str, font_sizes: &[f32], line_count: usize) -> bool {
    let trimmed = text_raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    let words = trimmed.split_whitespace().count();
    if words > 12 {
        return false;
    }
    let ratio = uppercase_ratio(trimmed);
    if ratio >= 0.6 && words <= 8 {
        return true;
    }
    if !font_sizes.is_empty() {
        let max_size = font_sizes.iter().cloned().fold(0.0f32, f32::max);
        let mean_size = font_sizes.iter().sum::<f32>() / font_sizes.len() as f32;
        if max_size >= f32::max(14.0, mean_size * 1.2) {
            return true;
        }
    }
    line_count == 1 && words <= 6 && ratio >= 0.4
}

/// List-item heuristic: leading bullet glyph or a `N.`/`N)`/letter marker.
pub fn is_list_like(text_raw: &str) -> bool {
    let stripped = text_raw.trim_start();
    if stripped.is_empty() {
        return false;
    }
    if stripped.starts_with("- ")
        || stripped.starts_with("* ")
        || stripped.starts_with("+ ")
        || stripped.starts_with('\u{2022}')
    {
        return true;
    }
    has_marker_prefix(stripped)
}

/// `1.`, `23)`, `a.`, `B)` followed by whitespace.
fn has_marker_prefix(s: &str) -> bool {
    let Some((token, rest)) = s.split_once(char::is_whitespace) else {
        return false;
    };
    if rest.is_empty() || token.len() < 2 {
        return false;
    }
    let Some(marker) = token.strip_suffix(['.', ')']) else {
        return false;
    };
    if marker.is_empty() {
        return false;
    }
    let all_digits = marker.chars().all(|c| c.is_ascii_digit());
    let single_letter = marker.len() == 1 && marker.chars().all(|c| c.is_ascii_alphabetic());
    all_digits || single_letter
}

/// Style features of a block: average font size, bold and upper-case flags,
/// character count.
pub fn style_features(text: &str, font_sizes: &[f32], spans: &[LineSpan]) -> StyleFeatures {
    let font_size_avg = if font_sizes.is_empty() {
        None
    } else {
        let avg = font_sizes.iter().sum::<f32>() / font_sizes.len() as f32;
        Some((avg * 100.0).round() / 100.0)
    };
    let is_bold = spans.iter().any(|span| {
        span.font_name.to_lowercase().contains("bold")
            || span.font_weight.is_some_and(|w| w >= BOLD_WEIGHT_MIN)
    });
    StyleFeatures {
        font_size_avg,
        is_bold,
        is_upper: uppercase_ratio(text) >= UPPER_STYLE_RATIO,
        char_count: text.chars().count(),
    }
}

/// Group native lines into blocks by vertical-gap segmentation and classify
/// each block. Reading-order indices are assigned in emission order,
/// starting at 0 on every page.
pub fn build_blocks(page: PageNo, lines: &[PageLine], ocr_conf_avg: Option<f32>) -> Vec<TextBlock> {
    let mut groups: Vec<Vec<&PageLine>> = Vec::new();
    for line in lines {
        if line.text.trim().is_empty() {
            continue;
        }
        match groups.last_mut() {
            Some(group) => {
                let prev = group.last().unwrap();
                let gap = line.bbox.y0 - prev.bbox.y1;
                let limit = prev.bbox.height().max(1.0) * BLOCK_GAP_FACTOR;
                if gap > limit || gap < -limit {
                    groups.push(vec![line]);
                } else {
                    group.push(line);
                }
            }
            None => groups.push(vec![line]),
        }
    }

    groups
        .iter()
        .enumerate()
        .map(|(idx, group)| {
            let text_lines: Vec<String> =
                group.iter().map(|l| l.text.trim().to_owned()).collect();
            let text_raw = text_lines.join("\n");
            let mut bbox = group[0].bbox.clone();
            for line in group.iter().skip(1) {
                bbox.merge(&line.bbox);
            }
            let spans: Vec<LineSpan> = group
                .iter()
                .flat_map(|l| l.spans.iter().cloned())
                .collect();
            let font_sizes: Vec<f32> = spans
                .iter()
                .filter(|s| s.font_size > 0.0)
                .map(|s| s.font_size)
                .collect();
            TextBlock {
                id: format!("{page}-{idx}"),
                page,
                is_heading_like: is_heading_like(&text_raw, &font_sizes, text_lines.len()),
                is_list_like: is_list_like(&text_raw),
                lang_hint: language_hint(&text_raw),
                locale_hint: locale_hint(&text_raw),
                style: style_features(&text_raw, &font_sizes, &spans),
                text_raw,
                text_lines,
                bbox: Some(bbox),
                reading_order_index: idx,
                ocr_conf_avg,
            }
        })
        .collect()
}

/// One synthetic block for a page without structured spans (OCR-only or
/// plain text), split into non-empty lines.
pub fn synthetic_block(
    page: PageNo,
    text: &str,
    bbox: Option<BBox>,
    ocr_conf_avg: Option<f32>,
) -> Option<TextBlock> {
    let stripped = text.trim();
    if stripped.is_empty() {
        return None;
    }
    let mut lines: Vec<String> = stripped
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect();
    if lines.is_empty() {
        lines.push(stripped.to_owned());
    }
    let text_raw = lines.join("\n");
    let first_line = lines.first().cloned().unwrap_or_default();
    Some(TextBlock {
        id: format!("{page}-0"),
        page,
        is_heading_like: is_heading_like(&first_line, &[], 1),
        is_list_like: is_list_like(&first_line),
        lang_hint: language_hint(&text_raw),
        locale_hint: locale_hint(&text_raw),
        style: style_features(&text_raw, &[], &[]),
        text_raw,
        text_lines: lines,
        bbox,
        reading_order_index: 0,
        ocr_conf_avg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str, y0: f32, y1: f32) -> PageLine {
        PageLine {
            text: text.to_owned(),
            bbox: BBox::new(10.0, y0, 200.0, y1),
            spans: vec![LineSpan {
                text: text.to_owned(),
                font_name: "Helvetica".to_owned(),
                font_size: 10.0,
                font_weight: None,
            }],
        }
    }

    #[test]
    fn short_uppercase_text_is_heading() {
        assert!(is_heading_like("ZUSAMMENFASSUNG", &[], 1));
        assert!(is_heading_like("ANNUAL REPORT 2024", &[], 1));
    }

    #[test]
    fn large_font_is_heading() {
        assert!(is_heading_like("Introduction to results", &[18.0, 10.0], 1));
        // Larger than the mean but still small in absolute terms.
        assert!(!is_heading_like("kleiner text hier unten", &[9.0, 7.0], 2));
    }

    #[test]
    fn single_short_line_with_some_caps_is_heading() {
        // Half the letters uppercase, two words, one line.
        assert!(is_heading_like("Executive SUMMARY", &[], 1));
        // Mostly lowercase prose does not qualify.
        assert!(!is_heading_like("ein kurzer Satz", &[], 1));
    }

    #[test]
    fn long_text_is_never_heading() {
        let long = "THIS IS A VERY LONG UPPERCASE SENTENCE THAT KEEPS GOING ON AND ON FOR WAY TOO MANY WORDS";
        assert!(!is_heading_like(long, &[20.0], 1));
    }

    #[test]
    fn bullets_and_markers_are_list_like() {
        assert!(is_list_like("- erster Punkt"));
        assert!(is_list_like("* second item"));
        assert!(is_list_like("\u{2022} dritter Punkt"));
        assert!(is_list_like("1. first"));
        assert!(is_list_like("23) twenty-third"));
        assert!(is_list_like("a. lettered"));
        assert!(is_list_like("B) lettered"));
    }

    #[test]
    fn plain_text_is_not_list_like() {
        assert!(!is_list_like("Ein normaler Satz."));
        assert!(!is_list_like("2024 was a good year"));
        assert!(!is_list_like("ab) not a marker"));
        assert!(!is_list_like(""));
    }

    #[test]
    fn style_flags() {
        let spans = vec![LineSpan {
            text: "TOTAL".to_owned(),
            font_name: "Arial-BoldMT".to_owned(),
            font_size: 12.0,
            font_weight: None,
        }];
        let style = style_features("TOTAL", &[12.0], &spans);
        assert!(style.is_bold);
        assert!(style.is_upper);
        assert_eq!(style.font_size_avg, Some(12.0));
        assert_eq!(style.char_count, 5);

        let weight_spans = vec![LineSpan {
            text: "fett".to_owned(),
            font_name: "Custom".to_owned(),
            font_size: 10.0,
            font_weight: Some(700),
        }];
        assert!(style_features("fett", &[10.0], &weight_spans).is_bold);
        assert!(!style_features("normal", &[], &[]).is_bold);
    }

    #[test]
    fn lines_group_into_blocks_by_gap() {
        let lines = vec![
            line("Erste Zeile vom Absatz", 100.0, 110.0),
            line("zweite Zeile direkt darunter", 112.0, 122.0),
            // Paragraph gap: well above 0.8x line height.
            line("Neuer Absatz beginnt hier", 150.0, 160.0),
        ];
        let blocks = build_blocks(1, &lines, None);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text_lines.len(), 2);
        assert_eq!(blocks[1].text_lines.len(), 1);
        // Reading order is contiguous ascending from 0.
        let indices: Vec<usize> = blocks.iter().map(|b| b.reading_order_index).collect();
        assert_eq!(indices, vec![0, 1]);
        // Merged bbox spans both lines.
        let bbox = blocks[0].bbox.as_ref().unwrap();
        assert_eq!(bbox.y0, 100.0);
        assert_eq!(bbox.y1, 122.0);
    }

    #[test]
    fn empty_lines_are_dropped() {
        let lines = vec![line("   ", 100.0, 110.0), line("Inhalt", 112.0, 122.0)];
        let blocks = build_blocks(1, &lines, None);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text_raw, "Inhalt");
    }

    #[test]
    fn synthetic_block_splits_lines() {
        let block = synthetic_block(2, "ERGEBNIS\n\nzeile zwei\nzeile drei\n", None, Some(81.5))
            .expect("block");
        assert_eq!(block.page, 2);
        assert_eq!(block.text_lines.len(), 3);
        assert!(block.is_heading_like); // classified from the first line
        assert_eq!(block.ocr_conf_avg, Some(81.5));
        assert_eq!(block.reading_order_index, 0);
    }

    #[test]
    fn synthetic_block_for_empty_text_is_none() {
        assert!(synthetic_block(1, "   \n ", None, None).is_none());
    }
}

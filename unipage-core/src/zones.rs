//! Header/footer/body zone detection.
//!
//! Blocks clustered entirely inside the top or bottom margin band become a
//! merged header or footer zone; the remaining vertical span is the body,
//! which every page gets exactly once.

use crate::entities::{BBox, PageNo, TextBlock, Zone, ZoneKind};

/// Fraction of the page height forming the header and footer bands.
const MARGIN_BAND_RATIO: f32 = 0.12;

fn merge_boxes(boxes: &[&BBox]) -> Option<BBox> {
    let mut iter = boxes.iter();
    let first = iter.next()?;
    let mut merged = (*first).clone();
    for bbox in iter {
        merged.merge(bbox);
    }
    Some(merged)
}

/// Partition a page's blocks into header/footer/body zones. The body zone
/// is always present; header and footer appear only when blocks cluster
/// inside the margin bands.
pub fn detect_zones(page: PageNo, page_bbox: &BBox, blocks: &[TextBlock]) -> Vec<Zone> {
    let page_height = page_bbox.height();
    if page_height <= 0.0 {
        return Vec::new();
    }
    let header_band = page_bbox.y0 + page_height * MARGIN_BAND_RATIO;
    let footer_band = page_bbox.y1 - page_height * MARGIN_BAND_RATIO;

    let page_boxes: Vec<&BBox> = blocks
        .iter()
        .filter(|b| b.page == page)
        .filter_map(|b| b.bbox.as_ref())
        .collect();

    let header_boxes: Vec<&BBox> = page_boxes
        .iter()
        .copied()
        .filter(|b| b.y1 <= header_band)
        .collect();
    let footer_boxes: Vec<&BBox> = page_boxes
        .iter()
        .copied()
        .filter(|b| b.y0 >= footer_band)
        .collect();

    let mut zones = Vec::new();
    let header = merge_boxes(&header_boxes);
    let footer = merge_boxes(&footer_boxes);

    let mut body_top = header.as_ref().map(|h| h.y1).unwrap_or(page_bbox.y0);
    let mut body_bottom = footer.as_ref().map(|f| f.y0).unwrap_or(page_bbox.y1);
    if body_bottom <= body_top {
        body_top = page_bbox.y0;
        body_bottom = page_bbox.y1;
    }

    if let Some(bbox) = header {
        zones.push(Zone {
            page,
            bbox,
            kind: ZoneKind::Header,
        });
    }
    zones.push(Zone {
        page,
        bbox: BBox::new(page_bbox.x0, body_top, page_bbox.x1, body_bottom),
        kind: ZoneKind::Body,
    });
    if let Some(bbox) = footer {
        zones.push(Zone {
            page,
            bbox,
            kind: ZoneKind::Footer,
        });
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::synthetic_block;

    fn block_at(page: PageNo, y0: f32, y1: f32) -> TextBlock {
        let mut block = synthetic_block(page, "inhalt", None, None).unwrap();
        block.bbox = Some(BBox::new(50.0, y0, 500.0, y1));
        block
    }

    fn page_bbox() -> BBox {
        BBox::new(0.0, 0.0, 595.0, 842.0)
    }

    #[test]
    fn body_only_page() {
        let blocks = vec![block_at(1, 300.0, 320.0)];
        let zones = detect_zones(1, &page_bbox(), &blocks);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].kind, ZoneKind::Body);
        assert_eq!(zones[0].bbox, page_bbox());
    }

    #[test]
    fn header_and_footer_clusters() {
        // 12% of 842 is ~101; header blocks end above it, footer blocks
        // start below 741.
        let blocks = vec![
            block_at(1, 20.0, 40.0),
            block_at(1, 50.0, 70.0),
            block_at(1, 300.0, 500.0),
            block_at(1, 780.0, 820.0),
        ];
        let zones = detect_zones(1, &page_bbox(), &blocks);
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].kind, ZoneKind::Header);
        assert_eq!(zones[0].bbox.y0, 20.0);
        assert_eq!(zones[0].bbox.y1, 70.0);
        assert_eq!(zones[1].kind, ZoneKind::Body);
        assert_eq!(zones[1].bbox.y0, 70.0);
        assert_eq!(zones[1].bbox.y1, 780.0);
        assert_eq!(zones[2].kind, ZoneKind::Footer);
    }

    #[test]
    fn blocks_from_other_pages_are_ignored() {
        let blocks = vec![block_at(2, 20.0, 40.0)];
        let zones = detect_zones(1, &page_bbox(), &blocks);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].kind, ZoneKind::Body);
    }

    #[test]
    fn degenerate_page_height_yields_nothing() {
        let zones = detect_zones(1, &BBox::new(0.0, 0.0, 100.0, 0.0), &[]);
        assert!(zones.is_empty());
    }

    #[test]
    fn at_most_one_zone_per_kind() {
        let blocks = vec![
            block_at(1, 10.0, 30.0),
            block_at(1, 40.0, 60.0),
            block_at(1, 760.0, 790.0),
            block_at(1, 800.0, 830.0),
        ];
        let zones = detect_zones(1, &page_bbox(), &blocks);
        let headers = zones.iter().filter(|z| z.kind == ZoneKind::Header).count();
        let footers = zones.iter().filter(|z| z.kind == ZoneKind::Footer).count();
        let bodies = zones.iter().filter(|z| z.kind == ZoneKind::Body).count();
        assert_eq!((headers, footers, bodies), (1, 1, 1));
    }
}

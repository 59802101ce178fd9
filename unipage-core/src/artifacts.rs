//! Visual artifact collection.
//!
//! Embedded raster images are classified by coarse geometry only: position
//! on the page, aspect ratio and area share. Anything that matches none of
//! the specific shapes is still recorded as a generic image artifact.

use crate::entities::{ArtifactKind, BBox, PageNo, ToolEvent, VisualArtifact};

/// Images covering less than this share of the page are treated as noise.
const MIN_AREA_RATIO: f32 = 5e-4;

/// Classify an embedded image region by its geometry.
pub fn classify_artifact(bbox: &BBox, page_bbox: &BBox) -> Option<(ArtifactKind, f32)> {
    let width = bbox.width().max(0.0);
    let height = bbox.height().max(0.0);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let page_area = (page_bbox.width() * page_bbox.height()).max(1.0);
    let area_ratio = (width * height) / page_area;
    if area_ratio < MIN_AREA_RATIO {
        return None;
    }
    let aspect = if height > 0.0 { width / height } else { 0.0 };
    let center_y = (bbox.y0 + bbox.y1) / 2.0 / page_bbox.height().max(1.0);

    if center_y > 0.6 && aspect >= 2.5 && area_ratio < 0.1 {
        let confidence = (0.55 + ((aspect - 2.5) * 0.1).min(0.4)).min(1.0);
        return Some((ArtifactKind::Signature, confidence));
    }
    if (0.5..=1.5).contains(&aspect) && (0.003..=0.1).contains(&area_ratio) {
        let confidence = (0.6 + (0.1 - (aspect - 1.0).abs()) * 1.2).min(1.0);
        return Some((ArtifactKind::Stamp, confidence));
    }
    if center_y < 0.25 && area_ratio <= 0.15 {
        let confidence = (0.6 + (0.15 - area_ratio) * 1.5).min(1.0);
        return Some((ArtifactKind::Logo, confidence));
    }
    Some((ArtifactKind::Image, 0.5))
}

/// Build artifact entries for the embedded images of one page.
pub fn collect_artifacts(
    page: PageNo,
    page_bbox: &BBox,
    image_boxes: &[BBox],
    events: &mut Vec<ToolEvent>,
) -> Vec<VisualArtifact> {
    let mut artifacts = Vec::new();
    for bbox in image_boxes {
        let Some((kind, confidence)) = classify_artifact(bbox, page_bbox) else {
            continue;
        };
        let confidence = (confidence * 100.0).round() / 100.0;
        events.push(
            ToolEvent::new("visual_artifact", "detected")
                .on_page(page)
                .detail("kind", serde_json::to_value(kind).unwrap())
                .detail("confidence", confidence),
        );
        artifacts.push(VisualArtifact {
            page,
            bbox: bbox.clone(),
            kind,
            confidence,
            source: "image".to_owned(),
        });
    }
    artifacts
}

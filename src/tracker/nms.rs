//! Non-maximum suppression applied to raw detector output before tracking.

use crate::tracker::matching::Detection;

/// Keep only the highest-confidence box of every group overlapping by at
/// least `iou_thresh`. Boxes of different classes never suppress each other.
///
/// The output is ordered by descending score; equal scores keep input order.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) >= iou_thresh);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

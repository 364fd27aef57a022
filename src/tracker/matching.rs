//! Detection input and association cost utilities.

use chrono::{DateTime, Utc};
use ndarray::Array2;

use crate::appearance::Embedding;
use crate::tracker::rect::{Rect, iou_batch};

/// Detection input for the tracker.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box in TLWH storage
    pub bbox: Rect,
    /// Detection confidence score
    pub score: f32,
    /// Detector class, if the model is multi-class
    pub class_id: Option<usize>,
    /// Appearance descriptor of the box, when an embedder ran for this frame
    pub embedding: Option<Embedding>,
    /// Capture time of the frame the detection came from
    pub timestamp: Option<DateTime<Utc>>,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), score)
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self {
            bbox,
            score,
            class_id: None,
            embedding: None,
            timestamp: None,
        }
    }

    pub fn with_class(mut self, class_id: usize) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes).mapv(|iou| 1.0 - iou)
}

/// Blend cosine distance into an IoU distance matrix.
///
/// Only pairs that overlap and where both sides carry a comparable embedding
/// are touched; every other entry keeps its IoU-only cost.
pub fn fuse_appearance(
    cost_matrix: &mut Array2<f32>,
    track_embeddings: &[Option<&Embedding>],
    det_embeddings: &[Option<&Embedding>],
    weight: f32,
) {
    for ((i, j), cost) in cost_matrix.indexed_iter_mut() {
        if *cost >= 1.0 {
            continue;
        }
        let (Some(track), Some(det)) = (track_embeddings[i], det_embeddings[j]) else {
            continue;
        };
        match track.cosine_distance(det) {
            Ok(dist) => *cost = (1.0 - weight) * *cost + weight * dist,
            Err(err) => tracing::trace!(%err, "skipping appearance term"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Optimal one-to-one assignment minimising total cost; pairs costing more
/// than `thresh` are reported as unmatched.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((i, j), &cost) in cost_matrix.indexed_iter() {
        padded[[i, j]] = cost as f64;
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(_) => {
            tracing::warn!("linear assignment failed, leaving all pairs unmatched");
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| u.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

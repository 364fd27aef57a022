//! Per-camera tracker combining appearance-aware and motion-only association.

use serde::{Deserialize, Serialize};

use crate::appearance::Embedding;
use crate::config::{ConfigError, check_min, check_unit, check_weight};
use crate::ids::CameraId;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::Track;
use crate::tracker::track_state::TrackState;

/// Configuration for the HybridTracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum combined cost accepted by the primary association.
    pub match_thresh: f32,
    /// Maximum IoU-only cost accepted by the fallback association.
    pub low_thresh: f32,
    /// Minimum confidence for an unmatched detection to start a track.
    pub new_track_thresh: f32,
    /// Consecutive matches needed to confirm a track.
    pub n_init: u32,
    /// Consecutive misses a confirmed track survives before it is lost.
    pub max_age: u32,
    /// Additional misses a lost track is kept for recovery.
    pub lost_grace: u32,
    /// Weight of the cosine distance in the primary cost.
    pub appearance_weight: f32,
    /// Exponential smoothing factor of the velocity estimate.
    pub velocity_smoothing: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_thresh: 0.7,
            low_thresh: 0.85,
            new_track_thresh: 0.6,
            n_init: 3,
            max_age: 30,
            lost_grace: 30,
            appearance_weight: 0.3,
            velocity_smoothing: 0.5,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("match_thresh", self.match_thresh)?;
        check_unit("low_thresh", self.low_thresh)?;
        check_unit("new_track_thresh", self.new_track_thresh)?;
        check_weight("appearance_weight", self.appearance_weight)?;
        check_weight("velocity_smoothing", self.velocity_smoothing)?;
        check_min("n_init", self.n_init as u64, 1)?;
        if self.low_thresh < self.match_thresh {
            return Err(ConfigError::FallbackStricterThanPrimary {
                primary: self.match_thresh,
                low: self.low_thresh,
            });
        }
        Ok(())
    }
}

/// How the primary association builds its cost matrix.
///
/// Selected once at construction from whether an embedder is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationMode {
    /// IoU blended with cosine distance whenever both sides carry an embedding.
    AppearanceMotion,
    /// IoU only.
    MotionOnly,
}

impl AssociationMode {
    pub fn for_embedder(available: bool) -> Self {
        if available {
            Self::AppearanceMotion
        } else {
            Self::MotionOnly
        }
    }
}

pub struct HybridTracker {
    camera_id: CameraId,
    config: TrackerConfig,
    mode: AssociationMode,
    tracks: Vec<Track>,
    next_track_id: u64,
    frame_id: u64,
}

impl HybridTracker {
    pub fn new(
        camera_id: CameraId,
        config: TrackerConfig,
        mode: AssociationMode,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            camera_id,
            config,
            mode,
            tracks: Vec::new(),
            next_track_id: 1,
            frame_id: 0,
        })
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn mode(&self) -> AssociationMode {
        self.mode
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of frames processed so far.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// All live tracks, including tentative and lost ones.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Consume the detections of one frame and return the confirmed tracks,
    /// ordered by track ID.
    ///
    /// Detections are expected to be de-duplicated by the caller (see
    /// [`crate::tracker::non_max_suppression`]).
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<Track> {
        self.frame_id += 1;

        // Step 1: Predict
        for track in &mut self.tracks {
            track.predict();
        }

        // Step 2: Primary association over every live track
        let track_boxes: Vec<Rect> = self.tracks.iter().map(Track::bbox).collect();
        let det_boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let mut cost = matching::iou_distance(&track_boxes, &det_boxes);

        if self.mode == AssociationMode::AppearanceMotion {
            let track_embeddings: Vec<Option<&Embedding>> = self
                .tracks
                .iter()
                .map(|t| t.last_embedding.as_ref())
                .collect();
            let det_embeddings: Vec<Option<&Embedding>> =
                detections.iter().map(|d| d.embedding.as_ref()).collect();
            matching::fuse_appearance(
                &mut cost,
                &track_embeddings,
                &det_embeddings,
                self.config.appearance_weight,
            );
        }

        let AssignmentResult {
            mut matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&cost, self.config.match_thresh);

        // Step 3: IoU-only fallback over the leftovers
        let rest_track_boxes: Vec<Rect> = unmatched_tracks.iter().map(|&i| track_boxes[i]).collect();
        let rest_det_boxes: Vec<Rect> = unmatched_detections.iter().map(|&j| det_boxes[j]).collect();
        let fallback_cost = matching::iou_distance(&rest_track_boxes, &rest_det_boxes);
        let fallback = matching::linear_assignment(&fallback_cost, self.config.low_thresh);

        matches.extend(
            fallback
                .matches
                .iter()
                .map(|&(i, j)| (unmatched_tracks[i], unmatched_detections[j])),
        );

        // Step 4: Matched tracks
        for &(itrack, idet) in &matches {
            self.tracks[itrack].mark_matched(&detections[idet], &self.config);
        }

        // Step 5: Unmatched tracks
        for &i in &fallback.unmatched_tracks {
            self.tracks[unmatched_tracks[i]].mark_missed(&self.config);
        }

        // Step 6: New tracks
        for &j in &fallback.unmatched_detections {
            let det = &detections[unmatched_detections[j]];
            if !det.score.is_finite() || det.score < self.config.new_track_thresh {
                continue;
            }
            let track = Track::spawn(
                self.next_track_id,
                self.camera_id.clone(),
                det,
                self.config.n_init,
            );
            tracing::debug!(camera = %self.camera_id, track_id = track.track_id, "track started");
            self.next_track_id += 1;
            self.tracks.push(track);
        }

        self.tracks.retain(|t| t.state != TrackState::Removed);

        // Step 7: Report confirmed tracks
        let mut confirmed: Vec<Track> = self
            .tracks
            .iter()
            .filter(|t| t.is_confirmed())
            .cloned()
            .collect();
        confirmed.sort_by_key(|t| t.track_id);
        confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(config: TrackerConfig) -> HybridTracker {
        HybridTracker::new(CameraId::from("cam"), config, AssociationMode::MotionOnly).unwrap()
    }

    #[test]
    fn test_track_confirmed_after_n_init() {
        let mut t = tracker(TrackerConfig::default());
        let det = || vec![Detection::new(100.0, 100.0, 150.0, 250.0, 0.9)];

        assert!(t.update(det()).is_empty());
        assert!(t.update(det()).is_empty());
        let tracks = t.update(det());
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
        assert_eq!(tracks[0].hit_streak, 3);
    }

    #[test]
    fn test_low_confidence_detection_does_not_spawn() {
        let mut t = tracker(TrackerConfig::default());
        t.update(vec![Detection::new(0.0, 0.0, 50.0, 100.0, 0.3)]);
        assert!(t.tracks().is_empty());
    }

    #[test]
    fn test_tentative_track_removed_on_miss() {
        let mut t = tracker(TrackerConfig::default());
        t.update(vec![Detection::new(0.0, 0.0, 50.0, 100.0, 0.9)]);
        assert_eq!(t.tracks().len(), 1);
        t.update(vec![]);
        assert!(t.tracks().is_empty());
    }

    #[test]
    fn test_confirmed_track_lost_then_removed() {
        let config = TrackerConfig {
            n_init: 1,
            max_age: 2,
            lost_grace: 2,
            ..Default::default()
        };
        let mut t = tracker(config);
        assert_eq!(t.update(vec![Detection::new(0.0, 0.0, 50.0, 100.0, 0.9)]).len(), 1);

        // Coasting through short misses keeps the track confirmed.
        assert_eq!(t.update(vec![]).len(), 1);
        assert_eq!(t.update(vec![]).len(), 1);

        // Third miss exceeds max_age.
        assert!(t.update(vec![]).is_empty());
        assert_eq!(t.tracks()[0].state, TrackState::Lost);

        t.update(vec![]);
        assert_eq!(t.tracks()[0].state, TrackState::Lost);
        t.update(vec![]);
        assert!(t.tracks().is_empty());
    }

    #[test]
    fn test_lost_track_recovers_same_id() {
        let config = TrackerConfig {
            n_init: 1,
            max_age: 1,
            lost_grace: 10,
            ..Default::default()
        };
        let mut t = tracker(config);
        let id = t.update(vec![Detection::new(0.0, 0.0, 50.0, 100.0, 0.9)])[0].track_id;
        t.update(vec![]);
        t.update(vec![]);
        assert_eq!(t.tracks()[0].state, TrackState::Lost);

        let tracks = t.update(vec![Detection::new(2.0, 0.0, 52.0, 100.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, id);
    }

    #[test]
    fn test_fallback_matches_weak_overlap() {
        // IoU of ~0.18 fails the primary threshold (cost <= 0.7) but passes
        // the fallback (cost <= 0.85).
        let config = TrackerConfig {
            n_init: 1,
            ..Default::default()
        };
        let mut t = tracker(config);
        let id = t.update(vec![Detection::new(0.0, 0.0, 100.0, 100.0, 0.9)])[0].track_id;
        let tracks = t.update(vec![Detection::new(0.0, 70.0, 100.0, 170.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, id);
    }

    #[test]
    fn test_nan_score_does_not_spawn() {
        let mut t = tracker(TrackerConfig::default());
        t.update(vec![Detection::new(0.0, 0.0, 50.0, 100.0, f32::NAN)]);
        assert!(t.tracks().is_empty());
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = TrackerConfig {
            n_init: 0,
            ..Default::default()
        };
        assert!(HybridTracker::new(CameraId::from("cam"), config, AssociationMode::MotionOnly).is_err());

        let config = TrackerConfig {
            match_thresh: 0.9,
            low_thresh: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            HybridTracker::new(CameraId::from("cam"), config, AssociationMode::MotionOnly),
            Err(ConfigError::FallbackStricterThanPrimary { .. })
        ));
    }
}

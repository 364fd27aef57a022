//! Single per-camera track and its lifecycle transitions.

use chrono::{DateTime, Utc};

use crate::appearance::Embedding;
use crate::ids::CameraId;
use crate::tracker::TrackerConfig;
use crate::tracker::matching::Detection;
use crate::tracker::motion::MotionState;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Single object track owned by one camera's tracker.
#[derive(Debug, Clone)]
pub struct Track {
    /// Identifier, unique only within `camera_id`
    pub track_id: u64,
    /// Camera the track belongs to for its whole lifetime
    pub camera_id: CameraId,
    pub state: TrackState,
    /// Confidence of the last matched detection
    pub score: f32,
    pub class_id: Option<usize>,
    /// Frames since creation
    pub age: u32,
    /// Consecutive frames with a matched detection
    pub hit_streak: u32,
    /// Consecutive frames without a matched detection
    pub miss_streak: u32,
    pub last_embedding: Option<Embedding>,
    pub last_seen: Option<DateTime<Utc>>,
    motion: MotionState,
}

impl Track {
    pub(crate) fn spawn(track_id: u64, camera_id: CameraId, det: &Detection, n_init: u32) -> Self {
        let state = if n_init <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };
        Self {
            track_id,
            camera_id,
            state,
            score: det.score,
            class_id: det.class_id,
            age: 0,
            hit_streak: 1,
            miss_streak: 0,
            last_embedding: det.embedding.clone(),
            last_seen: det.timestamp,
            motion: MotionState::new(&det.bbox),
        }
    }

    /// Current (predicted or last corrected) bounding box.
    pub fn bbox(&self) -> Rect {
        self.motion.rect()
    }

    /// Center velocity in pixels per frame.
    pub fn velocity(&self) -> (f32, f32) {
        let v = self.motion.velocity();
        (v[0], v[1])
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    pub(crate) fn predict(&mut self) {
        self.age += 1;
        match self.state {
            TrackState::Lost => self.motion.hold(),
            _ => self.motion.predict(),
        }
    }

    pub(crate) fn mark_matched(&mut self, det: &Detection, config: &TrackerConfig) {
        self.motion.correct(&det.bbox, config.velocity_smoothing);
        self.score = det.score;
        self.class_id = det.class_id.or(self.class_id);
        self.miss_streak = 0;
        self.hit_streak += 1;
        if let Some(embedding) = &det.embedding {
            self.last_embedding = Some(embedding.clone());
        }
        if det.timestamp.is_some() {
            self.last_seen = det.timestamp;
        }

        match self.state {
            TrackState::Tentative if self.hit_streak >= config.n_init => {
                self.state = TrackState::Confirmed;
                tracing::debug!(camera = %self.camera_id, track_id = self.track_id, "track confirmed");
            }
            TrackState::Lost => {
                self.state = TrackState::Confirmed;
                tracing::debug!(camera = %self.camera_id, track_id = self.track_id, "lost track recovered");
            }
            _ => {}
        }
    }

    pub(crate) fn mark_missed(&mut self, config: &TrackerConfig) {
        self.miss_streak += 1;
        self.hit_streak = 0;

        match self.state {
            TrackState::Tentative => self.state = TrackState::Removed,
            TrackState::Confirmed if self.miss_streak > config.max_age => {
                self.state = TrackState::Lost;
                self.motion.freeze();
                tracing::debug!(camera = %self.camera_id, track_id = self.track_id, "track lost");
            }
            TrackState::Lost if self.miss_streak > config.max_age + config.lost_grace => {
                self.state = TrackState::Removed;
                tracing::debug!(camera = %self.camera_id, track_id = self.track_id, "track removed");
            }
            _ => {}
        }
    }
}

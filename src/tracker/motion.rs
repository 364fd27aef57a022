//! Constant-velocity motion model over the center box form `(cx, cy, w, h)`.

use nalgebra::Vector4;

use crate::tracker::rect::Rect;

/// Smallest width/height a prediction may shrink to.
const MIN_SIZE: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct MotionState {
    position: Vector4<f32>,
    velocity: Vector4<f32>,
    last_observed: Vector4<f32>,
    frames_since_observation: u32,
}

impl MotionState {
    pub fn new(bbox: &Rect) -> Self {
        let position = bbox.to_cxcywh();
        Self {
            position,
            velocity: Vector4::zeros(),
            last_observed: position,
            frames_since_observation: 0,
        }
    }

    /// Advance one frame along the current velocity.
    pub fn predict(&mut self) {
        self.position += self.velocity;
        self.position[2] = self.position[2].max(MIN_SIZE);
        self.position[3] = self.position[3].max(MIN_SIZE);
        self.frames_since_observation += 1;
    }

    /// Count a frame without moving the box (used while the track is lost).
    pub fn hold(&mut self) {
        self.frames_since_observation += 1;
    }

    /// Snap to a new observation and blend the observed displacement into the
    /// velocity estimate with weight `smoothing`.
    pub fn correct(&mut self, bbox: &Rect, smoothing: f32) {
        let observed = bbox.to_cxcywh();
        let gap = self.frames_since_observation.max(1) as f32;
        let observed_velocity = (observed - self.last_observed) / gap;

        self.velocity = observed_velocity * smoothing + self.velocity * (1.0 - smoothing);
        self.position = observed;
        self.last_observed = observed;
        self.frames_since_observation = 0;
    }

    pub fn rect(&self) -> Rect {
        Rect::from_cxcywh(&self.position)
    }

    pub fn velocity(&self) -> Vector4<f32> {
        self.velocity
    }

    pub fn freeze(&mut self) {
        self.velocity = Vector4::zeros();
    }
}

//! Process configuration.
//!
//! Every section has sensible defaults and is validated once at startup.
//! Invalid values are rejected, never clamped.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{CameraId, RoomId};
use crate::tracker::TrackerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{name}` must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("`{name}` must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        min: u64,
        value: u64,
    },
    #[error("`low_thresh` ({low}) must not be stricter than `match_thresh` ({primary})")]
    FallbackStricterThanPrimary { primary: f32, low: f32 },
    #[error("room `{0}` is configured more than once")]
    DuplicateRoom(RoomId),
    #[error("room `{0}` has no cameras assigned")]
    RoomWithoutCameras(RoomId),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

pub(crate) fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            range: "(0, 1]",
            value: value as f64,
        })
    }
}

pub(crate) fn check_weight(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            range: "[0, 1]",
            value: value as f64,
        })
    }
}

pub(crate) fn check_min(name: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { name, min, value })
    }
}

/// Configuration for the shared person gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Minimum cosine similarity for an embedding to match an existing person.
    pub similarity_threshold: f32,
    /// Maximum number of embeddings retained per person (oldest evicted).
    pub embedding_cap_per_person: usize,
    /// Number of most recent embeddings compared besides the centroid.
    pub representative_k: usize,
    /// Similarities within this distance of the best are considered tied.
    pub tie_epsilon: f32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            embedding_cap_per_person: 32,
            representative_k: 4,
            tie_epsilon: 1e-3,
        }
    }
}

impl GalleryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("similarity_threshold", self.similarity_threshold)?;
        check_min("embedding_cap_per_person", self.embedding_cap_per_person as u64, 1)?;
        check_min("representative_k", self.representative_k as u64, 1)?;
        check_weight("tie_epsilon", self.tie_epsilon)
    }
}

/// A monitored room and the cameras that observe it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub room_id: RoomId,
    pub cameras: Vec<CameraId>,
    /// Overrides [`OccupancyConfig::max_occupancy_per_room`] for this room.
    #[serde(default)]
    pub max_occupancy: Option<usize>,
}

impl RoomConfig {
    pub fn new(room_id: impl Into<RoomId>, cameras: impl IntoIterator<Item = CameraId>) -> Self {
        Self {
            room_id: room_id.into(),
            cameras: cameras.into_iter().collect(),
            max_occupancy: None,
        }
    }

    pub fn with_max_occupancy(mut self, max_occupancy: usize) -> Self {
        self.max_occupancy = Some(max_occupancy);
        self
    }
}

/// Configuration for room aggregation and violation monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyConfig {
    pub max_occupancy_per_room: usize,
    /// A camera without updates for longer than this is excluded from its rooms.
    pub stall_grace_ms: u64,
    /// Period of the aggregation tick when driven by a ticker thread.
    pub tick_interval_ms: u64,
    pub rooms: Vec<RoomConfig>,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            max_occupancy_per_room: 1,
            stall_grace_ms: 5_000,
            tick_interval_ms: 500,
            rooms: Vec::new(),
        }
    }
}

impl OccupancyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_min("stall_grace_ms", self.stall_grace_ms, 1)?;
        check_min("tick_interval_ms", self.tick_interval_ms, 1)?;

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(&room.room_id) {
                return Err(ConfigError::DuplicateRoom(room.room_id.clone()));
            }
            if room.cameras.is_empty() {
                return Err(ConfigError::RoomWithoutCameras(room.room_id.clone()));
            }
        }
        Ok(())
    }

    pub fn stall_grace(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.stall_grace_ms as i64)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }
}

/// Configuration for a camera processing loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Boxes overlapping a higher-confidence box by at least this IoU are dropped.
    pub nms_thresh: f32,
    /// Re-resolve a track's identity every this many frames.
    pub reid_interval: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            nms_thresh: 0.7,
            reid_interval: 5,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("nms_thresh", self.nms_thresh)?;
        check_min("reid_interval", self.reid_interval as u64, 1)
    }
}

/// Top-level configuration, static for the lifetime of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub camera: CameraConfig,
    pub gallery: GalleryConfig,
    pub occupancy: OccupancyConfig,
}

impl Config {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.camera.validate()?;
        self.gallery.validate()?;
        self.occupancy.validate()
    }
}

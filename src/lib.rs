//! Multi-camera person tracking with room occupancy monitoring.
//!
//! The crate is organised in layers:
//!
//! - [`tracker`]: per-camera hybrid tracker (appearance + motion association).
//! - [`appearance`]: appearance embeddings and the embedder capability.
//! - [`reid`]: the process-wide person gallery used for cross-camera identity.
//! - [`occupancy`]: per-room occupancy aggregation and violation monitoring.
//! - [`integration`]: detector/store/sink boundaries and the camera worker loop.

pub mod appearance;
pub mod config;
pub mod error;
pub mod ids;
pub mod integration;
pub mod occupancy;
pub mod reid;
pub mod tracker;

pub use appearance::{EmbedError, Embedder, Embedding, EmbeddingError, HistogramEmbedder};
pub use config::{CameraConfig, Config, ConfigError, GalleryConfig, OccupancyConfig, RoomConfig};
pub use error::{Error, Result};
pub use ids::{CameraId, PersonId, RoomId};
pub use integration::{
    CameraHandle, CameraWorker, CameraWorkerBuilder, ChannelSink, DetectionBuilder,
    DetectionSource, Event, EventSink, Frame, IdentifiedTrack, InMemoryPersonStore, LogSink,
    NullSink, PersonStore, ReplaySource, StoreError, WorkerHandle,
};
pub use occupancy::{OccupancyBoard, OccupancyMonitor, OccupancyState, RoomStatus, Violation};
pub use reid::{MergeOutcome, Person, PersonGallery, Resolution};
pub use tracker::{AssociationMode, Detection, HybridTracker, Rect, Track, TrackState, TrackerConfig};

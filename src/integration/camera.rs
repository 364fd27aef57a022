//! One processing loop per camera.
//!
//! Each loop exclusively owns its tracker. Frames are consumed in arrival
//! order from a channel; identity resolution goes through the shared gallery
//! and the resulting person ids are published to the occupancy board.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, select};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::appearance::{Embedder, HistogramEmbedder};
use crate::config::{CameraConfig, ConfigError};
use crate::error::Result;
use crate::ids::{CameraId, PersonId};
use crate::integration::{DetectionSource, WorkerHandle};
use crate::occupancy::OccupancyBoard;
use crate::reid::PersonGallery;
use crate::tracker::{
    AssociationMode, Detection, HybridTracker, Rect, Track, TrackerConfig, non_max_suppression,
};

/// A decoded frame handed to a camera loop.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sequence number within the camera stream
    pub index: u64,
    /// Capture time, stamped onto detections and person sightings
    pub timestamp: DateTime<Utc>,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp: Utc::now(),
            image: Arc::new(image),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A confirmed track together with the person it was resolved to.
#[derive(Debug, Clone)]
pub struct IdentifiedTrack {
    pub track: Track,
    pub person_id: Option<PersonId>,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
struct Identity {
    person_id: PersonId,
    label: String,
    resolved_at_frame: u64,
}

pub struct CameraWorkerBuilder<D: DetectionSource> {
    camera_id: CameraId,
    detector: D,
    gallery: Arc<PersonGallery>,
    embedder: Option<Arc<dyn Embedder>>,
    board: Option<Arc<OccupancyBoard>>,
    tracker_config: TrackerConfig,
    camera_config: CameraConfig,
}

impl<D: DetectionSource> CameraWorkerBuilder<D> {
    /// Replace the default [`HistogramEmbedder`].
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Track with motion only. Without embeddings no identities are resolved,
    /// so the camera contributes nothing to room occupancy.
    pub fn without_embedder(mut self) -> Self {
        self.embedder = None;
        self
    }

    pub fn board(mut self, board: Arc<OccupancyBoard>) -> Self {
        self.board = Some(board);
        self
    }

    pub fn tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker_config = config;
        self
    }

    pub fn camera_config(mut self, config: CameraConfig) -> Self {
        self.camera_config = config;
        self
    }

    pub fn build(self) -> std::result::Result<CameraWorker<D>, ConfigError> {
        self.camera_config.validate()?;
        let mode = AssociationMode::for_embedder(self.embedder.is_some());
        let tracker = HybridTracker::new(self.camera_id.clone(), self.tracker_config, mode)?;
        if self.embedder.is_none() {
            warn!(camera = %self.camera_id, "no embedder configured, identities are disabled");
        }

        Ok(CameraWorker {
            camera_id: self.camera_id,
            config: self.camera_config,
            detector: self.detector,
            embedder: self.embedder,
            tracker,
            gallery: self.gallery,
            board: self.board,
            identities: HashMap::new(),
        })
    }
}

pub struct CameraWorker<D: DetectionSource> {
    camera_id: CameraId,
    config: CameraConfig,
    detector: D,
    embedder: Option<Arc<dyn Embedder>>,
    tracker: HybridTracker,
    gallery: Arc<PersonGallery>,
    board: Option<Arc<OccupancyBoard>>,
    identities: HashMap<u64, Identity>,
}

impl<D: DetectionSource> CameraWorker<D> {
    pub fn builder(camera_id: CameraId, detector: D, gallery: Arc<PersonGallery>) -> CameraWorkerBuilder<D> {
        CameraWorkerBuilder {
            camera_id,
            detector,
            gallery,
            embedder: Some(Arc::new(HistogramEmbedder::new())),
            board: None,
            tracker_config: TrackerConfig::default(),
            camera_config: CameraConfig::default(),
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn tracker(&self) -> &HybridTracker {
        &self.tracker
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Run one frame through detection, tracking and identity resolution.
    ///
    /// Never fails: a detector error skips the frame, an embedder error
    /// degrades the frame to motion-only association.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<IdentifiedTrack> {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(camera = %self.camera_id, frame = frame.index, %err, "detector failed, skipping frame");
                return Vec::new();
            }
        };
        let total = detections.len();
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.score.is_finite() && d.bbox.is_finite() && !d.bbox.is_empty())
            .collect();
        if detections.len() < total {
            warn!(
                camera = %self.camera_id,
                frame = frame.index,
                dropped = total - detections.len(),
                "dropping detections with non-finite or empty boxes"
            );
        }
        let mut detections = non_max_suppression(detections, self.config.nms_thresh);
        for det in &mut detections {
            det.timestamp.get_or_insert(frame.timestamp);
        }
        self.attach_embeddings(frame, &mut detections);

        let tracks = self.tracker.update(detections);
        let identified = self.identify(tracks, frame.timestamp);

        if let Some(board) = &self.board {
            if self.embedder.is_some() {
                let person_ids: BTreeSet<PersonId> = identified
                    .iter()
                    .filter_map(|t| t.person_id.clone())
                    .collect();
                // Staleness is judged on arrival, not on the capture clock.
                board.publish(&self.camera_id, person_ids, Utc::now());
            }
        }
        identified
    }

    fn attach_embeddings(&self, frame: &Frame, detections: &mut [Detection]) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        if detections.iter().all(|d| d.embedding.is_some()) {
            return;
        }

        let boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        match embedder.embed_all(&frame.image, &boxes) {
            Ok(embeddings) => {
                for (det, embedding) in detections.iter_mut().zip(embeddings) {
                    det.embedding.get_or_insert(embedding);
                }
            }
            Err(err) => {
                warn!(
                    camera = %self.camera_id,
                    frame = frame.index,
                    %err,
                    "embedder failed, using motion-only association for this frame"
                );
                for det in detections.iter_mut() {
                    det.embedding = None;
                }
            }
        }
    }

    fn identify(&mut self, tracks: Vec<Track>, at: DateTime<Utc>) -> Vec<IdentifiedTrack> {
        let frame_id = self.tracker.frame_id();
        let live: BTreeSet<u64> = self.tracker.tracks().iter().map(|t| t.track_id).collect();
        self.identities.retain(|id, _| live.contains(id));

        let reid_interval = self.config.reid_interval as u64;
        tracks
            .into_iter()
            .map(|track| {
                let due = self
                    .identities
                    .get(&track.track_id)
                    .is_none_or(|identity| frame_id - identity.resolved_at_frame >= reid_interval);

                if due && track.miss_streak == 0 {
                    if let Some(embedding) = &track.last_embedding {
                        let resolution = self.gallery.resolve_at(&self.camera_id, embedding, track.score, at);
                        debug!(
                            camera = %self.camera_id,
                            track_id = track.track_id,
                            person = %resolution.person_id,
                            created = resolution.created,
                            "track identity resolved"
                        );
                        self.identities.insert(
                            track.track_id,
                            Identity {
                                person_id: resolution.person_id,
                                label: resolution.label,
                                resolved_at_frame: frame_id,
                            },
                        );
                    }
                }

                let identity = self.identities.get_mut(&track.track_id).map(|identity| {
                    // Follow merges performed since the last resolution.
                    if let Some(canonical) = self.gallery.canonical_id(&identity.person_id) {
                        if canonical != identity.person_id {
                            if let Some(person) = self.gallery.get(&canonical) {
                                identity.label = person.label;
                            }
                            identity.person_id = canonical;
                        }
                    }
                    identity.clone()
                });
                IdentifiedTrack {
                    track,
                    person_id: identity.as_ref().map(|i| i.person_id.clone()),
                    label: identity.map(|i| i.label),
                }
            })
            .collect()
    }

    /// Process frames until `frames` disconnects or `stop` fires. The camera's
    /// snapshot is retired from the board on exit.
    pub fn run(mut self, frames: Receiver<Frame>, stop: Receiver<()>) {
        info!(camera = %self.camera_id, "camera loop started");
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(frames) -> frame => match frame {
                    Ok(frame) => {
                        self.process_frame(&frame);
                    }
                    Err(_) => break,
                },
            }
        }
        if let Some(board) = &self.board {
            board.retire(&self.camera_id);
        }
        info!(camera = %self.camera_id, frames = self.tracker.frame_id(), "camera loop stopped");
    }
}

impl<D> CameraWorker<D>
where
    D: DetectionSource + Send + 'static,
{
    /// Run the loop on its own thread.
    pub fn spawn(self, frames: Receiver<Frame>) -> Result<WorkerHandle> {
        let name = format!("camera-{}", self.camera_id);
        WorkerHandle::spawn(name, move |stop| self.run(frames, stop))
    }
}

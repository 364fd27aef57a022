//! Boundaries to external collaborators and the per-camera processing loop.
//!
//! This module provides traits for detectors, person stores and event sinks,
//! plus [`CameraWorker`], which wires a detector through the tracker, the
//! gallery and the occupancy board for one camera.

mod builder;
mod camera;
mod detector;
mod sink;
mod store;
mod worker;

pub use builder::DetectionBuilder;
pub use camera::{CameraWorker, CameraWorkerBuilder, Frame, IdentifiedTrack};
pub use detector::{DetectionSource, ReplaySource};
pub use sink::{ChannelSink, Event, EventSink, LogSink, NullSink};
pub use store::{InMemoryPersonStore, PersonStore, StoreError};
pub use worker::WorkerHandle;

/// Handle of a running camera loop.
pub type CameraHandle = WorkerHandle;

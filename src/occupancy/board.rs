//! Aggregates per-camera identity snapshots into per-room occupancy.
//!
//! Camera loops publish the set of person ids behind their confirmed tracks;
//! each loop is the sole writer of its own snapshot and replaces it whole, so
//! a tick never observes a half-updated camera. Ticks run on their own
//! schedule, either driven by the caller or by [`OccupancyBoard::spawn_ticker`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::select;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::{ConfigError, OccupancyConfig};
use crate::error::Result;
use crate::ids::{CameraId, PersonId};
use crate::integration::{EventSink, WorkerHandle};
use crate::occupancy::monitor::{OccupancyMonitor, OccupancyState, Violation};
use crate::reid::PersonGallery;

#[derive(Debug, Clone)]
struct CameraSnapshot {
    person_ids: BTreeSet<PersonId>,
    updated_at: DateTime<Utc>,
}

struct Room {
    cameras: Vec<CameraId>,
    monitor: OccupancyMonitor,
}

#[derive(Default)]
struct Rooms {
    rooms: Vec<Room>,
    stalled: HashSet<CameraId>,
}

pub struct OccupancyBoard {
    gallery: Arc<PersonGallery>,
    sink: Arc<dyn EventSink>,
    stall_grace: chrono::Duration,
    tick_interval: std::time::Duration,
    snapshots: RwLock<HashMap<CameraId, CameraSnapshot>>,
    rooms: Mutex<Rooms>,
}

impl OccupancyBoard {
    pub fn new(
        config: &OccupancyConfig,
        gallery: Arc<PersonGallery>,
        sink: Arc<dyn EventSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let rooms = config
            .rooms
            .iter()
            .map(|room| Room {
                cameras: room.cameras.clone(),
                monitor: OccupancyMonitor::new(
                    room.room_id.clone(),
                    room.max_occupancy.unwrap_or(config.max_occupancy_per_room),
                ),
            })
            .collect();

        Ok(Self {
            gallery,
            sink,
            stall_grace: config.stall_grace(),
            tick_interval: config.tick_interval(),
            snapshots: RwLock::new(HashMap::new()),
            rooms: Mutex::new(Rooms {
                rooms,
                stalled: HashSet::new(),
            }),
        })
    }

    /// Replace the identities currently visible on `camera_id`. `at` is the
    /// arrival time compared against `stall_grace` by [`OccupancyBoard::tick`].
    pub fn publish(&self, camera_id: &CameraId, person_ids: BTreeSet<PersonId>, at: DateTime<Utc>) {
        self.snapshots.write().insert(
            camera_id.clone(),
            CameraSnapshot {
                person_ids,
                updated_at: at,
            },
        );
    }

    /// Forget a camera, e.g. when its loop stops.
    pub fn retire(&self, camera_id: &CameraId) {
        self.snapshots.write().remove(camera_id);
    }

    /// Recompute every room at `now`, emit violations to the sink and return them.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<Violation> {
        let snapshots: HashMap<CameraId, CameraSnapshot> = self.snapshots.read().clone();
        let stale: HashSet<&CameraId> = snapshots
            .iter()
            .filter(|(_, s)| now - s.updated_at > self.stall_grace)
            .map(|(id, _)| id)
            .collect();

        let mut violations = Vec::new();
        {
            let mut state = self.rooms.lock();
            for camera in &stale {
                if state.stalled.insert((*camera).clone()) {
                    warn!(camera = %camera, "camera feed stalled, excluding from occupancy");
                }
            }
            state.stalled.retain(|camera| {
                let still = stale.contains(camera);
                if !still {
                    info!(camera = %camera, "camera feed resumed");
                }
                still
            });

            for room in &mut state.rooms {
                let occupants: BTreeSet<PersonId> = room
                    .cameras
                    .iter()
                    .filter(|camera| !stale.contains(camera))
                    .filter_map(|camera| snapshots.get(camera))
                    .flat_map(|snapshot| snapshot.person_ids.iter())
                    .map(|id| self.gallery.canonical_id(id).unwrap_or_else(|| id.clone()))
                    .collect();
                if let Some(violation) = room.monitor.observe(occupants, now) {
                    warn!(
                        room = %violation.room_id,
                        count = violation.count,
                        max = violation.max_occupancy,
                        "occupancy violation"
                    );
                    violations.push(violation);
                }
            }
        }

        for violation in &violations {
            self.sink.on_violation(violation);
        }
        violations
    }

    pub fn states(&self) -> Vec<OccupancyState> {
        self.rooms.lock().rooms.iter().map(|r| r.monitor.state()).collect()
    }

    /// Run [`OccupancyBoard::tick`] every `tick_interval` on a dedicated thread.
    pub fn spawn_ticker(self: &Arc<Self>) -> Result<WorkerHandle> {
        let board = Arc::clone(self);
        let ticker = crossbeam_channel::tick(self.tick_interval);
        WorkerHandle::spawn("occupancy-ticker".to_owned(), move |stop| loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    board.tick(Utc::now());
                }
            }
        })
    }
}

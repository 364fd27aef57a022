use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PersonId, RoomId};

/// Raised once each time a room goes over its maximum occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub room_id: RoomId,
    pub occupant_person_ids: Vec<PersonId>,
    pub count: usize,
    pub max_occupancy: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoomStatus {
    #[default]
    Normal,
    Violating,
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyState {
    pub room_id: RoomId,
    pub max_occupancy: usize,
    pub current_person_ids: BTreeSet<PersonId>,
    pub violation_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Edge-triggered occupancy state machine for one room.
#[derive(Debug, Clone)]
pub struct OccupancyMonitor {
    room_id: RoomId,
    max_occupancy: usize,
    status: RoomStatus,
    occupants: BTreeSet<PersonId>,
    updated_at: Option<DateTime<Utc>>,
}

impl OccupancyMonitor {
    pub fn new(room_id: RoomId, max_occupancy: usize) -> Self {
        Self {
            room_id,
            max_occupancy,
            status: RoomStatus::Normal,
            occupants: BTreeSet::new(),
            updated_at: None,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn count(&self) -> usize {
        self.occupants.len()
    }

    /// Replace the set of people in the room. Returns a violation only on the
    /// `Normal -> Violating` edge.
    pub fn observe(&mut self, occupants: BTreeSet<PersonId>, at: DateTime<Utc>) -> Option<Violation> {
        self.occupants = occupants;
        self.updated_at = Some(at);
        let over = self.occupants.len() > self.max_occupancy;

        match (self.status, over) {
            (RoomStatus::Normal, true) => {
                self.status = RoomStatus::Violating;
                Some(Violation {
                    room_id: self.room_id.clone(),
                    occupant_person_ids: self.occupants.iter().cloned().collect(),
                    count: self.occupants.len(),
                    max_occupancy: self.max_occupancy,
                    timestamp: at,
                })
            }
            (RoomStatus::Violating, false) => {
                self.status = RoomStatus::Normal;
                tracing::info!(room = %self.room_id, count = self.occupants.len(), "occupancy back to normal");
                None
            }
            _ => None,
        }
    }

    pub fn state(&self) -> OccupancyState {
        OccupancyState {
            room_id: self.room_id.clone(),
            max_occupancy: self.max_occupancy,
            current_person_ids: self.occupants.clone(),
            violation_active: self.status == RoomStatus::Violating,
            updated_at: self.updated_at,
        }
    }
}

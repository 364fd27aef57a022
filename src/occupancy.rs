//! Room occupancy aggregation and violation monitoring.

mod board;
mod monitor;

pub use board::OccupancyBoard;
pub use monitor::{OccupancyMonitor, OccupancyState, RoomStatus, Violation};

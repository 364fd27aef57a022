mod hybrid_tracker;
mod matching;
mod motion;
mod nms;
mod rect;
mod track;
mod track_state;

pub use hybrid_tracker::{AssociationMode, HybridTracker, TrackerConfig};
pub use matching::{AssignmentResult, Detection, fuse_appearance, iou_distance, linear_assignment};
pub use nms::non_max_suppression;
pub use rect::{Rect, iou_batch};
pub use track::Track;
pub use track_state::TrackState;

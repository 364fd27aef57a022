/// Lifecycle of a per-camera track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TrackState {
    /// Newly created, waiting for `n_init` consecutive matches
    #[default]
    Tentative,
    /// Confirmed object, reported to callers
    Confirmed,
    /// Missed for more than `max_age` frames, kept for recovery
    Lost,
    /// Dropped from the tracker
    Removed,
}

//! Events emitted by the trajectory player.

/// Visible frame changed (0-based index)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameChangedEvent {
    pub index: usize,
    pub total: usize,
}

impl FrameChangedEvent {
    /// Human-facing counter, "3 / 10"
    pub fn label(&self) -> String {
        format!("{} / {}", self.index + 1, self.total)
    }
}

/// Playback armed or stopped
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackChangedEvent {
    pub playing: bool,
}

/// New trajectory accepted by `load`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrajectoryLoadedEvent {
    pub frames: usize,
}

/// Trajectory emptied: closed, or every handle was pruned.
/// Front-ends tear down their frame controls on this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrajectoryClearedEvent;

/// Handles dropped by validation because the host no longer has them
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramesPrunedEvent {
    pub removed: usize,
    pub remaining: usize,
}

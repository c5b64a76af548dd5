//! Trajectory playback state machine.
//!
//! **Architecture**: the player owns the ordered frame handles, the current
//! index and the playback parameters. It owns no scene: every visibility
//! change goes through a [`FramePresenter`], every tick through a
//! [`Scheduler`]. Both collaborators live inside the player so there is a
//! single owner and no shared mutable state.
//!
//! # Invariants
//!
//! - `current` is `None` iff the sequence is empty, otherwise in `[0, len-1]`
//! - at most one handle is active as seen by the presenter
//! - every index change goes through `show_unchecked`
//!
//! # Stepping
//!
//! `step` moves by `skip`. Past either end it wraps to the opposite end when
//! looping, otherwise it clamps to the bound. The timer-driven `advance` is
//! the same forward step, except that without looping it stops playback at
//! the end instead of clamping.
//!
//! # Threading
//!
//! Single control thread. Timers are delivered by the owner through
//! [`TrajectoryPlayer::on_timer`]; a stale or cancelled id is ignored, so no
//! advance can run after `stop_playback` returns.

use log::{debug, info, trace, warn};
use std::fmt;
use std::time::Duration;

use super::event_bus::PlayerEventEmitter;
use super::player_events::{
    FrameChangedEvent, FramesPrunedEvent, PlaybackChangedEvent, TrajectoryClearedEvent,
    TrajectoryLoadedEvent,
};
use super::presenter::{FramePresenter, PresenterError};
use super::scheduler::{Scheduler, SchedulerError, TimerId};

/// Shortest trajectory `load` accepts
pub const MIN_FRAMES: usize = 2;

/// Default playback rate (frames per second)
pub const DEFAULT_FPS: f32 = 10.0;

/// Navigation direction for [`TrajectoryPlayer::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Player errors. All are recoverable; state is left consistent.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// `load` with fewer than [`MIN_FRAMES`] handles
    InsufficientFrames { found: usize },
    /// Navigation on an empty trajectory
    EmptyTrajectory,
    /// The presenter dropped a handle mid-operation; it has been pruned
    InvalidHandle,
    /// Speed must be finite and positive
    InvalidSpeed(f32),
    Presenter(PresenterError),
    Scheduler(SchedulerError),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::InsufficientFrames { found } => {
                write!(f, "Need at least {} frames, got {}", MIN_FRAMES, found)
            }
            PlayerError::EmptyTrajectory => write!(f, "No trajectory loaded"),
            PlayerError::InvalidHandle => write!(f, "Frame was removed by the host"),
            PlayerError::InvalidSpeed(s) => write!(f, "Invalid playback speed: {}", s),
            PlayerError::Presenter(e) => write!(f, "{}", e),
            PlayerError::Scheduler(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PlayerError {}

impl From<PresenterError> for PlayerError {
    fn from(e: PresenterError) -> Self {
        PlayerError::Presenter(e)
    }
}

impl From<SchedulerError> for PlayerError {
    fn from(e: SchedulerError) -> Self {
        PlayerError::Scheduler(e)
    }
}

/// Ordered frame playback over a presenter and a scheduler.
pub struct TrajectoryPlayer<P: FramePresenter, S: Scheduler> {
    frames: Vec<P::Handle>,
    current: Option<usize>,
    /// Index the presenter currently shows (None after the shown frame was pruned)
    active: Option<usize>,
    skip: usize,
    loop_enabled: bool,
    fps: f32,
    timer: Option<TimerId>,
    presenter: P,
    scheduler: S,
    events: PlayerEventEmitter,
}

impl<P: FramePresenter, S: Scheduler> TrajectoryPlayer<P, S> {
    pub fn new(presenter: P, scheduler: S) -> Self {
        Self {
            frames: Vec::new(),
            current: None,
            active: None,
            skip: 1,
            loop_enabled: false,
            fps: DEFAULT_FPS,
            timer: None,
            presenter,
            scheduler,
            events: PlayerEventEmitter::dummy(),
        }
    }

    /// Wire player events to a bus
    pub fn set_event_emitter(&mut self, events: PlayerEventEmitter) {
        self.events = events;
    }

    // === Accessors ===

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[P::Handle] {
        &self.frames
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Handle at the current index
    pub fn current_frame(&self) -> Option<&P::Handle> {
        self.current.and_then(|i| self.frames.get(i))
    }

    pub fn is_playing(&self) -> bool {
        self.timer.is_some()
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Playback rate in frames per second
    pub fn speed(&self) -> f32 {
        self.fps
    }

    /// Delay between timer-driven advances
    pub fn interval(&self) -> Duration {
        Self::interval_for(self.fps)
    }

    fn interval_for(fps: f32) -> Duration {
        Duration::from_nanos((1e9 / f64::from(fps)).round() as u64)
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    // === Setters ===

    pub fn set_skip(&mut self, skip: usize) {
        if skip == 0 {
            warn!("Skip must be >= 1, using 1");
        }
        self.skip = skip.max(1);
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Set playback rate. While playing the timer is re-armed at the new
    /// interval; the current index is kept. On any error the previous rate
    /// and timer stay in place.
    pub fn set_speed(&mut self, fps: f32) -> Result<(), PlayerError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PlayerError::InvalidSpeed(fps));
        }
        let interval = Self::interval_for(fps);
        if interval.is_zero() {
            return Err(PlayerError::InvalidSpeed(fps));
        }

        if let Some(old) = self.timer {
            let id = self.scheduler.schedule_recurring(interval).map_err(|e| {
                warn!("Failed to re-arm playback at {} fps: {}", fps, e);
                e
            })?;
            self.scheduler.cancel(old);
            self.timer = Some(id);
            debug!("Playback re-armed at {} fps", fps);
        }
        self.fps = fps;
        Ok(())
    }

    // === Sequence lifecycle ===

    /// Replace the trajectory and show its first frame.
    ///
    /// Rejected loads leave the previous trajectory untouched.
    pub fn load(&mut self, frames: Vec<P::Handle>) -> Result<(), PlayerError> {
        if frames.len() < MIN_FRAMES {
            return Err(PlayerError::InsufficientFrames { found: frames.len() });
        }

        // Hide the incoming frames before touching any state
        for handle in &frames[1..] {
            match self.presenter.deactivate(handle) {
                Ok(()) | Err(PresenterError::InvalidHandle(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.stop_playback();
        self.hide_active();

        self.frames = frames;
        self.current = Some(0);
        self.active = None;
        info!("Trajectory loaded: {} frames", self.frames.len());
        self.events.emit(TrajectoryLoadedEvent { frames: self.frames.len() });

        self.show_unchecked(0).map(|_| ())
    }

    /// Stop playback and give up every handle. The caller disposes of them.
    pub fn close(&mut self) -> Vec<P::Handle> {
        self.stop_playback();
        self.current = None;
        self.active = None;
        let frames = std::mem::take(&mut self.frames);
        if !frames.is_empty() {
            info!("Trajectory closed ({} frames)", frames.len());
            self.events.emit(TrajectoryClearedEvent);
        }
        frames
    }

    /// Drop handles the presenter no longer knows. Returns false when
    /// nothing is left; playback is stopped in that case.
    pub fn validate(&mut self) -> bool {
        if self.frames.is_empty() {
            return false;
        }

        let before = self.frames.len();
        let shown = self.active.and_then(|i| self.frames.get(i).cloned());
        let presenter = &self.presenter;
        self.frames.retain(|h| presenter.is_valid(h));
        let after = self.frames.len();

        if after == before {
            return true;
        }

        warn!("{} frame(s) removed externally, {} remain", before - after, after);
        self.events.emit(FramesPrunedEvent {
            removed: before - after,
            remaining: after,
        });

        if after == 0 {
            self.stop_playback();
            self.current = None;
            self.active = None;
            self.events.emit(TrajectoryClearedEvent);
            return false;
        }

        // Follow the shown frame if it survived, else clamp the old index
        self.active = shown.and_then(|h| self.frames.iter().position(|f| *f == h));
        self.current = match self.active {
            Some(i) => Some(i),
            None => self.current.map(|c| c.min(after - 1)),
        };
        true
    }

    // === Navigation ===

    /// Show frame `index`, clamped into range.
    pub fn show(&mut self, index: usize) -> Result<usize, PlayerError> {
        if !self.validate() {
            return Err(PlayerError::EmptyTrajectory);
        }
        self.show_unchecked(index)
    }

    /// Move by `skip` frames in `direction`.
    pub fn step(&mut self, direction: Direction) -> Result<usize, PlayerError> {
        if !self.validate() {
            return Err(PlayerError::EmptyTrajectory);
        }

        let last = self.frames.len() - 1;
        let current = self.current.unwrap_or(0);
        let target = match direction {
            Direction::Forward => match current.checked_add(self.skip) {
                Some(next) if next <= last => next,
                _ if self.loop_enabled => 0,
                _ => last,
            },
            Direction::Backward => match current.checked_sub(self.skip) {
                Some(prev) => prev,
                None if self.loop_enabled => last,
                None => 0,
            },
        };

        if target == current && self.active == Some(current) {
            trace!("Step {:?} at bound {}, nothing to do", direction, current);
            return Ok(current);
        }
        self.show_unchecked(target)
    }

    pub fn go_first(&mut self) -> Result<usize, PlayerError> {
        self.show(0)
    }

    pub fn go_last(&mut self) -> Result<usize, PlayerError> {
        if !self.validate() {
            return Err(PlayerError::EmptyTrajectory);
        }
        let last = self.frames.len() - 1;
        self.show_unchecked(last)
    }

    // === Playback ===

    /// Arm the recurring advance. No-op if playing or empty.
    pub fn start_playback(&mut self) -> Result<(), PlayerError> {
        if self.is_playing() || !self.validate() {
            return Ok(());
        }
        let id = self.scheduler.schedule_recurring(self.interval())?;
        self.timer = Some(id);
        info!("Playback started at {} fps", self.fps);
        self.events.emit(PlaybackChangedEvent { playing: true });
        Ok(())
    }

    /// Cancel the recurring advance (idempotent).
    pub fn stop_playback(&mut self) {
        if let Some(id) = self.timer.take() {
            self.scheduler.cancel(id);
            info!("Playback stopped");
            self.events.emit(PlaybackChangedEvent { playing: false });
        }
    }

    pub fn toggle_playback(&mut self) -> Result<(), PlayerError> {
        if self.is_playing() {
            self.stop_playback();
            Ok(())
        } else {
            self.start_playback()
        }
    }

    /// Deliver a fired timer. Returns the new index if the frame changed.
    pub fn on_timer(&mut self, id: TimerId) -> Result<Option<usize>, PlayerError> {
        if self.timer != Some(id) {
            trace!("Ignoring stale timer {:?}", id);
            return Ok(None);
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<Option<usize>, PlayerError> {
        if !self.validate() {
            self.stop_playback();
            return Ok(None);
        }

        let last = self.frames.len() - 1;
        let current = self.current.unwrap_or(0);
        match current.checked_add(self.skip) {
            Some(next) if next <= last => self.show_unchecked(next).map(Some),
            _ if self.loop_enabled => {
                trace!("Frame loop: {} -> 0", current);
                self.show_unchecked(0).map(Some)
            }
            _ => {
                trace!("Reached trajectory end, stopping");
                self.stop_playback();
                Ok(None)
            }
        }
    }

    // === Presentation ===

    /// Single place where the visible frame changes. Sequence must be non-empty.
    fn show_unchecked(&mut self, index: usize) -> Result<usize, PlayerError> {
        let index = index.min(self.frames.len() - 1);

        let mut hidden = None;
        if let Some(prev) = self.active
            && prev != index
        {
            match self.presenter.deactivate(&self.frames[prev]) {
                Ok(()) => hidden = Some(prev),
                // Gone already; nothing owed
                Err(PresenterError::InvalidHandle(_)) => {}
                Err(e) => return Err(e.into()),
            }
            self.active = None;
        }

        match self.presenter.activate(&self.frames[index]) {
            Ok(()) => {}
            Err(PresenterError::InvalidHandle(h)) => {
                warn!("Frame {} vanished while showing it ({})", index, h);
                self.restore(hidden);
                self.validate();
                return Err(PlayerError::InvalidHandle);
            }
            Err(e) => {
                self.restore(hidden);
                return Err(e.into());
            }
        }

        self.active = Some(index);
        self.current = Some(index);
        trace!("Showing frame {}/{}", index + 1, self.frames.len());
        self.events.emit(FrameChangedEvent {
            index,
            total: self.frames.len(),
        });
        Ok(index)
    }

    /// Put back the frame hidden by a show that then failed
    fn restore(&mut self, hidden: Option<usize>) {
        if let Some(prev) = hidden {
            match self.presenter.activate(&self.frames[prev]) {
                Ok(()) => self.active = Some(prev),
                Err(e) => warn!("Could not restore frame {}: {}", prev, e),
            }
        }
    }

    /// Best-effort hide of the shown frame before the sequence is replaced
    fn hide_active(&mut self) {
        if let Some(i) = self.active.take()
            && let Some(handle) = self.frames.get(i)
            && self.presenter.is_valid(handle)
            && let Err(e) = self.presenter.deactivate(handle)
        {
            warn!("Failed to hide previous frame: {}", e);
        }
    }
}

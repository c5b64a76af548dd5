//! Core engine modules - player, scheduling, events, workers
//!
//! These modules form the playback engine, independent of any host.

pub mod event_bus;
pub mod player;
pub mod player_events;
pub mod presenter;
pub mod scheduler;
pub mod workers;

// Re-exports for convenience
pub use event_bus::EventBus;
pub use player::{Direction, PlayerError, TrajectoryPlayer};
pub use presenter::{FramePresenter, PresenterError};
pub use scheduler::{Scheduler, SchedulerError, TickScheduler, TimerId};
pub use workers::Workers;

//! AMES - protein structure trajectory viewer library
//!
//! Re-exports all modules for use by the binary target.

// Core engine (player, scheduling, events, workers)
pub mod core;

// Scene host and frame presentation
pub mod host;

// App modules
pub mod align;
pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod movie;
pub mod server;
pub mod settings;
pub mod utils;
pub mod viewer;

// Re-export commonly used types from core
pub use core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use core::player::TrajectoryPlayer;

pub use host::{Host, SceneHost};
pub use settings::Settings;
pub use viewer::{Viewer, ViewerError, ViewerStatus};

//! REST API server for remote control of the viewer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐       mpsc::channel        ┌──────────────────────┐
//! │   API Server Thread     │  ─────── Command ───────▶  │   Control Thread     │
//! │   (rouille HTTP)        │                            │   (main loop)        │
//! │                         │                            │                      │
//! │  POST /api/play/20      │  ──▶ Play { speed } ────▶  │  viewer.execute()    │
//! │  POST /api/show/5       │  ──▶ Show { frame } ────▶  │  viewer.execute()    │
//! └─────────────────────────┘                            └──────────────────────┘
//!          │                                                      │
//!          │  Arc<SharedApiState>                                 │
//!          │◀──────────── read snapshots ─────────────────────────│
//!          │                                          updated every loop pass
//! ```
//!
//! Handlers never touch the player. They queue the same [`Command`](crate::commands::Command)
//! the stdin prompt produces and read the last published status.
//!
//! # Endpoints
//!
//! | Method | Path                 | Description                      |
//! |--------|----------------------|----------------------------------|
//! | GET    | `/api/status`        | Viewer status snapshot           |
//! | GET    | `/api/health`        | Health check                     |
//! | POST   | `/api/align[/chain]` | Sequential alignment             |
//! | POST   | `/api/show/{n}`      | Show frame n (1-based)           |
//! | POST   | `/api/play[/{fps}]`  | Start playback                   |
//! | POST   | `/api/stop`          | Stop playback                    |
//! | POST   | `/api/loop/{on,off}` | Loop mode                        |
//! | POST   | `/api/skip/{n}`      | Frames per step                  |
//! | POST   | `/api/load`          | Load files (`{"paths": [...]}`)  |
//! | POST   | `/api/command`       | Any command line (`{"line": ..}`)|

mod api;

pub use api::{ApiServer, SharedApiState};

//! Movie recording through the host's `movie` commands.
//!
//! Two modes:
//! - frame by frame: every `skip`th frame is shown and captured, then encoded
//! - interactive: capture starts now and runs until [`MovieRecorder::stop`]
//!
//! Any failure after `movie record` issues `movie abort` so the host is never
//! left capturing.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::player::{PlayerError, TrajectoryPlayer};
use crate::core::scheduler::Scheduler;
use crate::host::{Host, HostError, HostPresenter};

/// Default output name offered for a new recording
pub const DEFAULT_MOVIE_NAME: &str = "trajectory.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordMode {
    /// Frame by frame at the playback speed
    #[default]
    Trajectory,
    /// Frame by frame, framerate chosen to hit `duration_secs`
    FixedDuration,
    /// Record whatever happens until stopped
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieSettings {
    /// Output width in pixels, 0 = window size
    pub width: u32,
    /// Output height in pixels, 0 = window size
    pub height: u32,
    pub mode: RecordMode,
    pub duration_secs: f32,
}

impl Default for MovieSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            mode: RecordMode::default(),
            duration_secs: 10.0,
        }
    }
}

impl MovieSettings {
    /// `movie record`, with `size w,h` when both dimensions are set
    pub fn record_command(&self) -> String {
        if self.width > 0 && self.height > 0 {
            format!("movie record size {},{}", self.width, self.height)
        } else {
            "movie record".to_string()
        }
    }

    /// Output framerate for `n_frames` captured frames at playback speed `fps`
    pub fn framerate(&self, n_frames: usize, fps: f32) -> f32 {
        match self.mode {
            RecordMode::FixedDuration if self.duration_secs > 0.0 => {
                (n_frames as f32 / self.duration_secs).max(1.0)
            }
            _ => fps,
        }
    }
}

/// Indices captured for a trajectory of `len` frames
pub fn frame_indices(len: usize, skip: usize) -> Vec<usize> {
    (0..len).step_by(skip.max(1)).collect()
}

/// Append `.mp4` unless already present
pub fn movie_path(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(".mp4") {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_owned();
        s.push(".mp4");
        PathBuf::from(s)
    }
}

pub fn encode_command(path: &Path, framerate: f32) -> String {
    format!("movie encode \"{}\" framerate {:.1}", path.display(), framerate)
}

#[derive(Debug, Clone, PartialEq)]
pub enum MovieError {
    NoFrames,
    AlreadyRecording,
    Host(HostError),
    Player(PlayerError),
}

impl fmt::Display for MovieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovieError::NoFrames => write!(f, "No structures loaded"),
            MovieError::AlreadyRecording => write!(f, "A recording is already in progress"),
            MovieError::Host(e) => write!(f, "Movie recording failed: {}", e),
            MovieError::Player(e) => write!(f, "Movie recording failed: {}", e),
        }
    }
}

impl std::error::Error for MovieError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MovieError::Host(e) => Some(e),
            MovieError::Player(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HostError> for MovieError {
    fn from(e: HostError) -> Self {
        MovieError::Host(e)
    }
}

impl From<PlayerError> for MovieError {
    fn from(e: PlayerError) -> Self {
        MovieError::Player(e)
    }
}

/// Finished recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieSummary {
    pub path: PathBuf,
    /// Captured frames (None in interactive mode)
    pub frames: Option<usize>,
    pub framerate: f32,
}

impl MovieSummary {
    pub fn status_text(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("Saved: {}", name)
    }
}

/// Tracks an interactive recording between start and stop.
#[derive(Debug, Default)]
pub struct MovieRecorder {
    interactive: Option<PathBuf>,
}

impl MovieRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.interactive.is_some()
    }

    /// Capture every `skip`th frame of `player` and encode to `path`.
    ///
    /// `should_stop` is polled before each frame; a stop aborts the capture
    /// and returns `Ok(None)`.
    pub fn record_frames<H: Host, S: Scheduler>(
        &mut self,
        player: &mut TrajectoryPlayer<HostPresenter<H>, S>,
        settings: &MovieSettings,
        path: &Path,
        should_stop: &mut dyn FnMut() -> bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<Option<MovieSummary>, MovieError> {
        if self.is_recording() {
            return Err(MovieError::AlreadyRecording);
        }
        if !player.validate() {
            return Err(MovieError::NoFrames);
        }

        let path = movie_path(path);
        let indices = frame_indices(player.len(), player.skip());
        let framerate = settings.framerate(indices.len(), player.speed());
        player.stop_playback();

        player.presenter_mut().host_mut().run(&settings.record_command())?;
        info!("Recording {} frames to {}", indices.len(), path.display());

        let result = (|| -> Result<bool, MovieError> {
            for (n, &index) in indices.iter().enumerate() {
                if should_stop() {
                    return Ok(false);
                }
                player.show(index)?;
                player.presenter_mut().host_mut().run("wait 1")?;
                progress(n + 1, indices.len());
            }
            let host = player.presenter_mut().host_mut();
            host.run("movie stop")?;
            host.run(&encode_command(&path, framerate))?;
            Ok(true)
        })();

        match result {
            Ok(true) => {
                info!(
                    "Movie saved to {} ({} frames, {:.1} fps)",
                    path.display(),
                    indices.len(),
                    framerate
                );
                Ok(Some(MovieSummary {
                    path,
                    frames: Some(indices.len()),
                    framerate,
                }))
            }
            Ok(false) => {
                abort(player.presenter_mut().host_mut());
                info!("Recording stopped");
                Ok(None)
            }
            Err(e) => {
                error!("{}", e);
                abort(player.presenter_mut().host_mut());
                Err(e)
            }
        }
    }

    /// Start capturing now; finished by [`stop`](Self::stop).
    pub fn start_interactive<H: Host>(
        &mut self,
        host: &mut H,
        settings: &MovieSettings,
        path: &Path,
    ) -> Result<(), MovieError> {
        if self.is_recording() {
            return Err(MovieError::AlreadyRecording);
        }
        host.run(&settings.record_command())?;
        let path = movie_path(path);
        info!("Recording to {} (stop to encode)", path.display());
        self.interactive = Some(path);
        Ok(())
    }

    /// Finish an interactive capture and encode at `fps`.
    ///
    /// Without an interactive capture this only aborts whatever the host
    /// may be recording and returns `Ok(None)`.
    pub fn stop<H: Host>(&mut self, host: &mut H, fps: f32) -> Result<Option<MovieSummary>, MovieError> {
        let Some(path) = self.interactive.take() else {
            abort(host);
            return Ok(None);
        };

        let encoded = host
            .run("movie stop")
            .and_then(|_| host.run(&encode_command(&path, fps)));
        match encoded {
            Ok(_) => {
                info!("Movie saved to {}", path.display());
                Ok(Some(MovieSummary {
                    path,
                    frames: None,
                    framerate: fps,
                }))
            }
            Err(e) => {
                error!("Movie encoding failed: {}", e);
                abort(host);
                Err(e.into())
            }
        }
    }
}

fn abort<H: Host>(host: &mut H) {
    if let Err(e) = host.run("movie abort") {
        warn!("movie abort failed: {}", e);
    }
}

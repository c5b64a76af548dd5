//! Viewer session: one open trajectory tool.
//!
//! **Architecture**: the viewer owns the player (which owns the host through
//! [`HostPresenter`]), the settings, the pending file selection, the event
//! bus and the movie recorder. It lives on the control thread; the only
//! work that leaves it is USalign pre-alignment, which runs on [`Workers`]
//! and comes back through a channel drained by [`Viewer::poll_background`].
//!
//! # Load pipeline
//!
//! natural sort → close previous → every Nth file → optional pre-align →
//! open each file (hidden) → `player.load` → display styles.
//!
//! Files that fail to open are logged and skipped; fewer than two opened
//! models rejects the load and closes what was opened.

use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::align::{AlignError, AlignReport, PreAligner, PreAlignment, align_sequential};
use crate::commands::Command;
use crate::core::event_bus::{BoxedEvent, EventBus, PlayerEventEmitter};
use crate::core::player::{Direction, MIN_FRAMES, PlayerError, TrajectoryPlayer};
use crate::core::scheduler::TickScheduler;
use crate::core::workers::Workers;
use crate::display::{ColorMode, StyleGroup};
use crate::host::{Host, HostError, HostPresenter, ModelId, ModelInfo};
use crate::movie::{DEFAULT_MOVIE_NAME, MovieError, MovieRecorder, MovieSummary, RecordMode};
use crate::settings::Settings;
use crate::utils::sequences::{self, DiscoverError, PendingFiles};

/// Player driven by the control loop's tick scheduler
pub type Player<H> = TrajectoryPlayer<HostPresenter<H>, TickScheduler>;

#[derive(Debug)]
pub enum ViewerError {
    /// Fewer than two files selected, or left after load-every
    NotEnoughFiles(usize),
    /// Fewer than two files opened
    NotEnoughModels(usize),
    NoTrajectory,
    Discover(DiscoverError),
    Player(PlayerError),
    Align(AlignError),
    Movie(MovieError),
    Host(HostError),
    /// Unknown colour mode name
    UnknownColor(String),
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::NotEnoughFiles(n) => {
                write!(f, "Need >= {} files, got {}", MIN_FRAMES, n)
            }
            ViewerError::NotEnoughModels(n) => {
                write!(f, "Need >= {} structures loaded, got {}", MIN_FRAMES, n)
            }
            ViewerError::NoTrajectory => write!(f, "No trajectory loaded"),
            ViewerError::Discover(e) => write!(f, "{}", e),
            ViewerError::Player(e) => write!(f, "{}", e),
            ViewerError::Align(e) => write!(f, "{}", e),
            ViewerError::Movie(e) => write!(f, "{}", e),
            ViewerError::Host(e) => write!(f, "{}", e),
            ViewerError::UnknownColor(name) => write!(f, "Unknown color mode '{}'", name),
        }
    }
}

impl std::error::Error for ViewerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewerError::Player(e) => Some(e),
            ViewerError::Align(e) => Some(e),
            ViewerError::Movie(e) => Some(e),
            ViewerError::Host(e) => Some(e),
            ViewerError::Discover(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DiscoverError> for ViewerError {
    fn from(e: DiscoverError) -> Self {
        ViewerError::Discover(e)
    }
}

impl From<PlayerError> for ViewerError {
    fn from(e: PlayerError) -> Self {
        ViewerError::Player(e)
    }
}

impl From<AlignError> for ViewerError {
    fn from(e: AlignError) -> Self {
        ViewerError::Align(e)
    }
}

impl From<MovieError> for ViewerError {
    fn from(e: MovieError) -> Self {
        ViewerError::Movie(e)
    }
}

impl From<HostError> for ViewerError {
    fn from(e: HostError) -> Self {
        ViewerError::Host(e)
    }
}

/// Result of a completed load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadOutcome {
    pub frames: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub prealigned: bool,
}

/// What `run_load` did
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStart {
    Loaded(LoadOutcome),
    /// Pre-alignment queued; finished by `poll_background`
    Background,
}

enum PrealignMessage {
    Progress(usize, usize),
    Done(Result<PreAlignment, AlignError>),
}

struct BackgroundLoad {
    epoch: u64,
    epoch_ref: Arc<AtomicU64>,
    rx: Receiver<PrealignMessage>,
}

impl BackgroundLoad {
    /// Invalidate the job unless something newer already did
    fn cancel(&self) {
        if let Err(current) =
            self.epoch_ref
                .compare_exchange(self.epoch, self.epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
        {
            trace!("Background load epoch {} already superseded by {}", self.epoch, current);
        }
    }
}

/// Snapshot for status lines and the REST API
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewerStatus {
    pub loaded: bool,
    pub frames: usize,
    /// 1-based
    pub current_frame: Option<usize>,
    pub frame_label: String,
    pub model: Option<ModelId>,
    pub info: Option<ModelInfo>,
    pub playing: bool,
    pub fps: f32,
    pub skip: usize,
    pub loop_enabled: bool,
    pub pending_files: usize,
    pub load_status: String,
    pub align_status: String,
    pub recording: bool,
    pub loading: bool,
}

pub struct Viewer<H: Host> {
    player: Player<H>,
    settings: Settings,
    pending: PendingFiles,
    events: EventBus,
    recorder: MovieRecorder,
    workers: Option<Arc<Workers>>,
    background: Option<BackgroundLoad>,
    load_status: String,
    align_status: String,
}

impl<H: Host> Viewer<H> {
    pub fn new(host: H, settings: Settings) -> Self {
        let events = EventBus::new();
        let mut player = TrajectoryPlayer::new(HostPresenter::new(host), TickScheduler::new());
        player.set_event_emitter(PlayerEventEmitter::from_emitter(events.emitter()));
        player.set_skip(settings.skip);
        player.set_loop(settings.loop_enabled);
        if let Err(e) = player.set_speed(settings.fps) {
            warn!("Settings: {}, keeping {} fps", e, player.speed());
        }

        Self {
            player,
            settings,
            pending: PendingFiles::new(),
            events,
            recorder: MovieRecorder::new(),
            workers: None,
            background: None,
            load_status: "No files selected".to_string(),
            align_status: String::new(),
        }
    }

    /// Run pre-alignment on `workers` instead of the control thread
    pub fn with_workers(mut self, workers: Arc<Workers>) -> Self {
        self.workers = Some(workers);
        self
    }

    // === Accessors ===

    pub fn player(&self) -> &Player<H> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player<H> {
        &mut self.player
    }

    pub fn host(&self) -> &H {
        self.player.presenter().host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.player.presenter_mut().host_mut()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pending(&self) -> &PendingFiles {
        &self.pending
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Drain events emitted since the last call
    pub fn poll_events(&self) -> Vec<BoxedEvent> {
        self.events.poll()
    }

    pub fn is_loading(&self) -> bool {
        self.background.is_some()
    }

    // === File selection ===

    /// Replace the selection with `files` (not loaded yet)
    pub fn select_files(&mut self, files: Vec<PathBuf>) -> usize {
        self.pending.set(files);
        self.load_status = self.pending.status_text();
        self.pending.len()
    }

    /// Select every structure file in `dir`
    pub fn select_folder(&mut self, dir: &Path) -> Result<usize, ViewerError> {
        let files = sequences::discover_folder(dir)?;
        if files.is_empty() {
            warn!("No PDB/CIF files found in {}", dir.display());
            self.pending.clear();
            self.load_status = "No PDB files found".to_string();
            return Ok(0);
        }
        Ok(self.select_files(files))
    }

    /// A single directory selects its contents, anything else selects files
    pub fn select_inputs(&mut self, inputs: &[PathBuf]) -> Result<usize, ViewerError> {
        match inputs {
            [dir] if dir.is_dir() => self.select_folder(dir),
            _ => Ok(self.select_files(inputs.to_vec())),
        }
    }

    // === Loading ===

    /// Load the pending selection
    pub fn run_load(&mut self) -> Result<LoadStart, ViewerError> {
        let files = self.pending.files().to_vec();
        self.start_load(files)
    }

    /// Load `files`; pre-alignment goes to the workers when available.
    pub fn start_load(&mut self, files: Vec<PathBuf>) -> Result<LoadStart, ViewerError> {
        let files = self.prepare_load(files)?;

        if !self.settings.prealign {
            return self.open_trajectory(&files, false).map(LoadStart::Loaded);
        }

        let aligner = self.locate_aligner()?;
        let Some(workers) = self.workers.clone() else {
            let pre = self.prealign_blocking(&aligner, &files)?;
            return self.open_trajectory(pre.files(), true).map(LoadStart::Loaded);
        };

        let epoch = workers.bump_epoch();
        let epoch_ref = workers.epoch_ref();
        let (tx, rx) = unbounded();
        let job_epoch = Arc::clone(&epoch_ref);
        workers.execute_with_epoch(epoch, move || {
            let cancelled = || job_epoch.load(Ordering::Relaxed) != epoch;
            let progress_tx = tx.clone();
            let result = aligner.run(&files, &cancelled, &mut |done, total| {
                let _ = progress_tx.send(PrealignMessage::Progress(done, total));
            });
            let _ = tx.send(PrealignMessage::Done(result));
        });

        info!("Pre-alignment queued (epoch {})", epoch);
        self.load_status = "Pre-aligning with USalign...".to_string();
        self.background = Some(BackgroundLoad { epoch, epoch_ref, rx });
        Ok(LoadStart::Background)
    }

    /// Load `files` on this thread, pre-aligning inline if enabled.
    pub fn load_files(&mut self, files: Vec<PathBuf>) -> Result<LoadOutcome, ViewerError> {
        let files = self.prepare_load(files)?;
        if self.settings.prealign {
            let aligner = self.locate_aligner()?;
            let pre = self.prealign_blocking(&aligner, &files)?;
            self.open_trajectory(pre.files(), true)
        } else {
            self.open_trajectory(&files, false)
        }
    }

    /// Apply finished background work. Returns the load result once the
    /// queued pre-alignment completes.
    pub fn poll_background(&mut self) -> Option<Result<LoadOutcome, ViewerError>> {
        let bg = self.background.as_ref()?;
        let mut done = None;
        loop {
            match bg.rx.try_recv() {
                Ok(PrealignMessage::Progress(d, t)) => {
                    self.load_status = format!("Aligning {}/{}", d, t);
                }
                Ok(PrealignMessage::Done(result)) => {
                    done = Some(result);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Job skipped as stale before it ran
                    done = Some(Err(AlignError::Cancelled));
                    break;
                }
            }
        }

        let result = done?;
        self.background = None;
        Some(match result {
            Ok(pre) => self.open_trajectory(pre.files(), true),
            Err(e) => {
                warn!("Pre-alignment failed: {}", e);
                self.load_status = "USalign failed".to_string();
                Err(e.into())
            }
        })
    }

    /// Drop a queued pre-alignment
    pub fn cancel_background(&mut self) {
        if let Some(bg) = self.background.take() {
            bg.cancel();
            info!("Background load cancelled");
        }
    }

    fn prepare_load(&mut self, files: Vec<PathBuf>) -> Result<Vec<PathBuf>, ViewerError> {
        if files.len() < MIN_FRAMES {
            warn!("Please select at least {} structures", MIN_FRAMES);
            self.load_status = format!("Need >= {} files", MIN_FRAMES);
            return Err(ViewerError::NotEnoughFiles(files.len()));
        }

        let files = sequences::sort_alphanumeric(files);
        self.close_trajectory();

        let every = self.settings.load_every.max(1);
        let files = sequences::select_every(&files, every);
        if every > 1 {
            info!("Using every {} file ({} files)", every, files.len());
        }
        if files.len() < MIN_FRAMES {
            warn!("Need at least {} structures after skipping", MIN_FRAMES);
            self.load_status = format!("Need >= {} files", MIN_FRAMES);
            return Err(ViewerError::NotEnoughFiles(files.len()));
        }
        Ok(files)
    }

    fn locate_aligner(&mut self) -> Result<PreAligner, ViewerError> {
        PreAligner::locate(self.settings.usalign_path.as_deref()).map_err(|e| {
            warn!("{}", e);
            self.load_status = "USalign failed".to_string();
            ViewerError::Align(e)
        })
    }

    fn prealign_blocking(&mut self, aligner: &PreAligner, files: &[PathBuf]) -> Result<PreAlignment, ViewerError> {
        self.load_status = "Pre-aligning with USalign...".to_string();
        aligner
            .run(files, &|| false, &mut |d, t| debug!("Aligning {}/{}", d, t))
            .map_err(|e| {
                self.load_status = "USalign failed".to_string();
                ViewerError::Align(e)
            })
    }

    /// Open `files` in order, hidden, and hand the models to the player.
    fn open_trajectory(&mut self, files: &[PathBuf], prealigned: bool) -> Result<LoadOutcome, ViewerError> {
        let host = self.player.presenter_mut().host_mut();
        let mut models = Vec::with_capacity(files.len());
        let mut failed = Vec::new();

        for (i, path) in files.iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let opened = host.open(path).and_then(|id| host.set_display(id, false).map(|_| id));
            match opened {
                Ok(id) => {
                    info!("Loaded {} as frame {}", name, models.len() + 1);
                    models.push(id);
                }
                Err(e) => {
                    warn!("Failed to load {}: {}", name, e);
                    failed.push((path.clone(), e.to_string()));
                }
            }
            debug!("Loading {}/{}", i + 1, files.len());
        }

        if models.len() < MIN_FRAMES {
            warn!("Need at least {} structures loaded", MIN_FRAMES);
            if let Err(e) = host.close(&models) {
                warn!("Failed to close partial load: {}", e);
            }
            self.load_status = format!("Error: Need >= {}", MIN_FRAMES);
            return Err(ViewerError::NotEnoughModels(models.len()));
        }

        let frames = models.len();
        self.player.load(models)?;
        self.apply_display();
        self.load_status = format!("{} loaded", frames);
        self.align_status = "Not aligned".to_string();

        Ok(LoadOutcome {
            frames,
            failed,
            prealigned,
        })
    }

    // === Trajectory ===

    /// Stop playback, close this trajectory's models, drop queued work.
    pub fn close_trajectory(&mut self) {
        self.cancel_background();
        let models = self.player.close();
        if !models.is_empty()
            && let Err(e) = self.host_mut().close(&models)
        {
            warn!("Failed to close models: {}", e);
        }
    }

    /// Run every display style group on the loaded models
    pub fn apply_display(&mut self) -> usize {
        let models = self.player.frames().to_vec();
        let host = self.player.presenter_mut().host_mut();
        self.settings.display.apply(host, &models)
    }

    pub fn set_color(&mut self, mode: ColorMode) {
        self.settings.display.color = mode;
        let models = self.player.frames().to_vec();
        let host = self.player.presenter_mut().host_mut();
        self.settings.display.apply_group(host, &models, StyleGroup::Coloring);
    }

    /// Align each trajectory model onto the previous one
    pub fn align_trajectory(&mut self, chain: Option<&str>) -> Result<AlignReport, ViewerError> {
        if !self.player.validate() {
            return Err(ViewerError::NoTrajectory);
        }
        let models = self.player.frames().to_vec();
        self.align_models(&models, chain)
    }

    /// Align every atomic model the host has open, by ascending id
    pub fn align_all(&mut self, chain: Option<&str>) -> Result<AlignReport, ViewerError> {
        let models = self.host().models();
        self.align_models(&models, chain)
    }

    fn align_models(&mut self, models: &[ModelId], chain: Option<&str>) -> Result<AlignReport, ViewerError> {
        let chain = chain.unwrap_or(self.settings.chain.as_str()).to_string();
        self.align_status = "Aligning...".to_string();
        let host = self.player.presenter_mut().host_mut();
        let result = align_sequential(host, models, &chain, |d, t| debug!("Aligning... {}/{}", d, t));
        match result {
            Ok(report) => {
                self.align_status = report.status_text();
                Ok(report)
            }
            Err(e) => {
                warn!("{}", e);
                self.align_status = String::new();
                Err(e.into())
            }
        }
    }

    // === Playback ===

    /// Deliver due timers; returns how many frame changes happened.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = self.player.scheduler_mut().poll(now);
        let mut changed = 0;
        for id in due {
            match self.player.on_timer(id) {
                Ok(Some(_)) => changed += 1,
                Ok(None) => {}
                Err(e) => warn!("Playback: {}", e),
            }
        }
        changed
    }

    /// Time until the next timer is due (None when idle)
    pub fn time_to_next_tick(&self, now: Instant) -> Option<Duration> {
        self.player
            .scheduler()
            .next_deadline()
            .map(|d| d.saturating_duration_since(now))
    }

    pub fn set_speed(&mut self, fps: f32) -> Result<(), ViewerError> {
        self.player.set_speed(fps)?;
        self.settings.fps = fps;
        Ok(())
    }

    pub fn set_skip(&mut self, skip: usize) {
        self.player.set_skip(skip);
        self.settings.skip = self.player.skip();
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.player.set_loop(enabled);
        self.settings.loop_enabled = enabled;
    }

    /// Show a 1-based frame number, clamped into range
    pub fn show_frame(&mut self, frame: i64) -> Result<usize, ViewerError> {
        let index = usize::try_from(frame.saturating_sub(1)).unwrap_or(0);
        Ok(self.player.show(index)?)
    }

    // === Movie ===

    /// Record per the movie settings. Frame-by-frame modes poll
    /// `should_stop` between frames; interactive mode starts capturing and
    /// returns `Ok(None)`.
    pub fn record_movie(
        &mut self,
        path: &Path,
        should_stop: &mut dyn FnMut() -> bool,
    ) -> Result<Option<MovieSummary>, ViewerError> {
        if self.settings.movie.mode == RecordMode::Interactive {
            let host = self.player.presenter_mut().host_mut();
            self.recorder.start_interactive(host, &self.settings.movie, path)?;
            return Ok(None);
        }
        let summary = self.recorder.record_frames(
            &mut self.player,
            &self.settings.movie,
            path,
            should_stop,
            &mut |d, t| debug!("Recording {}/{}", d, t),
        )?;
        Ok(summary)
    }

    /// Finish an interactive recording (or abort whatever is running)
    pub fn stop_recording(&mut self) -> Result<Option<MovieSummary>, ViewerError> {
        let fps = self.player.speed();
        let host = self.player.presenter_mut().host_mut();
        Ok(self.recorder.stop(host, fps)?)
    }

    // === Status ===

    /// "3 / 10", or "0 / 0" when empty
    pub fn frame_label(&self) -> String {
        match self.player.current_index() {
            Some(i) => format!("{} / {}", i + 1, self.player.len()),
            None => "0 / 0".to_string(),
        }
    }

    /// "Model: #3 | Residues: 120 | Atoms: 950" for the shown frame
    pub fn info_label(&self) -> String {
        let Some(id) = self.player.current_frame().copied() else {
            return String::new();
        };
        let count = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());
        match self.host().model_info(id) {
            Some(info) => format!(
                "Model: {} | Residues: {} | Atoms: {}",
                id,
                count(info.residues),
                count(info.atoms)
            ),
            None => format!("Model: {}", id),
        }
    }

    pub fn status(&self) -> ViewerStatus {
        let model = self.player.current_frame().copied();
        ViewerStatus {
            loaded: !self.player.is_empty(),
            frames: self.player.len(),
            current_frame: self.player.current_index().map(|i| i + 1),
            frame_label: self.frame_label(),
            model,
            info: model.and_then(|id| self.host().model_info(id)),
            playing: self.player.is_playing(),
            fps: self.player.speed(),
            skip: self.player.skip(),
            loop_enabled: self.player.loop_enabled(),
            pending_files: self.pending.len(),
            load_status: self.load_status.clone(),
            align_status: self.align_status.clone(),
            recording: self.recorder.is_recording(),
            loading: self.background.is_some(),
        }
    }

    pub fn status_text(&self) -> String {
        let s = self.status();
        let mut text = format!(
            "{} | {} | {} fps | skip {} | loop {}",
            s.frame_label,
            if s.playing { "playing" } else { "stopped" },
            s.fps,
            s.skip,
            if s.loop_enabled { "on" } else { "off" }
        );
        let info = self.info_label();
        if !info.is_empty() {
            text.push_str(" | ");
            text.push_str(&info);
        }
        if !s.load_status.is_empty() {
            text.push_str(" | ");
            text.push_str(&s.load_status);
        }
        text
    }

    // === Commands ===

    /// Execute one command; returns a line for the user.
    pub fn execute(&mut self, command: Command) -> Result<String, ViewerError> {
        debug!("Command: {:?}", command);
        match command {
            Command::Align { chain } => {
                let report = self.align_all(chain.as_deref())?;
                Ok(report.status_text())
            }
            Command::Show { frame } => {
                if self.player.is_empty() {
                    return Err(ViewerError::NoTrajectory);
                }
                self.show_frame(frame)?;
                Ok(self.frame_label())
            }
            Command::Play { speed } => {
                if let Some(fps) = speed {
                    self.set_speed(fps as f32)?;
                }
                if self.player.is_empty() {
                    return Err(ViewerError::NoTrajectory);
                }
                self.player.start_playback()?;
                Ok(format!("Playing at {} fps", self.player.speed()))
            }
            Command::Stop => {
                self.player.stop_playback();
                Ok("Stopped".to_string())
            }
            Command::Toggle => {
                self.player.toggle_playback()?;
                Ok(if self.player.is_playing() { "Playing" } else { "Stopped" }.to_string())
            }
            Command::First => self.navigate(|p| p.go_first()),
            Command::Last => self.navigate(|p| p.go_last()),
            Command::Next => self.navigate(|p| p.step(Direction::Forward)),
            Command::Prev => self.navigate(|p| p.step(Direction::Backward)),
            Command::Loop { state } => {
                self.set_loop(state.enabled());
                Ok(format!("Loop {}", if state.enabled() { "on" } else { "off" }))
            }
            Command::Skip { n } => {
                self.set_skip(n);
                Ok(format!("Skip {}", self.player.skip()))
            }
            Command::Color { mode } => {
                let mode = ColorMode::from_name(&mode).ok_or(ViewerError::UnknownColor(mode))?;
                self.set_color(mode);
                Ok(format!("Color: {}", mode))
            }
            Command::Load { paths } => {
                self.select_inputs(&paths)?;
                match self.run_load()? {
                    LoadStart::Loaded(outcome) => Ok(format!("{} loaded", outcome.frames)),
                    LoadStart::Background => Ok(self.load_status.clone()),
                }
            }
            Command::Record { stop: true, .. } => match self.stop_recording()? {
                Some(summary) => Ok(summary.status_text()),
                None => Ok("Recording stopped".to_string()),
            },
            Command::Record { path, .. } => {
                let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_MOVIE_NAME));
                match self.record_movie(&path, &mut || false)? {
                    Some(summary) => Ok(summary.status_text()),
                    None if self.recorder.is_recording() => {
                        Ok("Recording... (record --stop when done)".to_string())
                    }
                    None => Ok("Recording stopped".to_string()),
                }
            }
            Command::Status => Ok(self.status_text()),
            Command::Close => {
                self.close_trajectory();
                Ok("Closed".to_string())
            }
            Command::Quit => Ok("Bye".to_string()),
        }
    }

    fn navigate(&mut self, f: impl FnOnce(&mut Player<H>) -> Result<usize, PlayerError>) -> Result<String, ViewerError> {
        f(&mut self.player)?;
        Ok(self.frame_label())
    }
}

impl<H: Host> Drop for Viewer<H> {
    fn drop(&mut self) {
        if self.recorder.is_recording() {
            let _ = self.stop_recording();
        }
        self.close_trajectory();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::parse_command;
    use crate::core::event_bus::downcast_event;
    use crate::core::player_events::{FrameChangedEvent, TrajectoryLoadedEvent};
    use crate::host::SceneHost;
    use std::fs;

    struct Fixture {
        dir: PathBuf,
    }

    impl Fixture {
        fn new(names: &[&str]) -> Self {
            let dir = std::env::temp_dir().join(format!("ames_viewer_{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            for name in names {
                fs::write(dir.join(name), "END\n").unwrap();
            }
            Self { dir }
        }

        fn paths(&self, names: &[&str]) -> Vec<PathBuf> {
            names.iter().map(|n| self.dir.join(n)).collect()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn viewer() -> Viewer<SceneHost> {
        Viewer::new(SceneHost::new(), Settings::default())
    }

    fn model_names(v: &Viewer<SceneHost>) -> Vec<String> {
        v.player()
            .frames()
            .iter()
            .map(|id| v.host().model_info(*id).unwrap().name)
            .collect()
    }

    #[test]
    fn test_load_sorted_and_first_shown() {
        let fx = Fixture::new(&["s_10.pdb", "s_2.pdb", "s_1.pdb"]);
        let mut v = viewer();
        let outcome = v.load_files(fx.paths(&["s_10.pdb", "s_2.pdb", "s_1.pdb"])).unwrap();

        assert_eq!(outcome.frames, 3);
        assert!(outcome.failed.is_empty());
        assert_eq!(model_names(&v), vec!["s_1", "s_2", "s_10"]);
        assert_eq!(v.frame_label(), "1 / 3");
        assert_eq!(v.host().displayed(), vec![v.player().frames()[0]]);
        assert_eq!(v.status().load_status, "3 loaded");
        assert_eq!(v.status().align_status, "Not aligned");
        // Default styles went to the trajectory's models
        assert!(v.host().script().contains(&"cartoon #1,2,3/A".to_string()));
    }

    #[test]
    fn test_load_every_nth() {
        let names = ["f_1.pdb", "f_2.pdb", "f_3.pdb", "f_4.pdb", "f_5.pdb"];
        let fx = Fixture::new(&names);
        let mut settings = Settings::default();
        settings.load_every = 2;
        let mut v = Viewer::new(SceneHost::new(), settings);

        v.load_files(fx.paths(&names)).unwrap();
        assert_eq!(model_names(&v), vec!["f_1", "f_3", "f_5"]);

        let mut settings = Settings::default();
        settings.load_every = 5;
        let mut v = Viewer::new(SceneHost::new(), settings);
        assert!(matches!(
            v.load_files(fx.paths(&names)),
            Err(ViewerError::NotEnoughFiles(1))
        ));
    }

    #[test]
    fn test_failed_open_is_skipped() {
        let fx = Fixture::new(&["a_1.pdb", "a_3.pdb"]);
        let mut v = viewer();
        let outcome = v.load_files(fx.paths(&["a_1.pdb", "a_2.pdb", "a_3.pdb"])).unwrap();
        assert_eq!(outcome.frames, 2);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].0.ends_with("a_2.pdb"));
    }

    #[test]
    fn test_too_few_opened_closes_partial() {
        let fx = Fixture::new(&["only_1.pdb"]);
        let mut v = viewer();
        let err = v.load_files(fx.paths(&["only_1.pdb", "missing_2.pdb"])).unwrap_err();
        assert!(matches!(err, ViewerError::NotEnoughModels(1)));
        assert!(v.host().models().is_empty());
        assert!(v.player().is_empty());
        assert_eq!(v.status().load_status, "Error: Need >= 2");
    }

    #[test]
    fn test_reload_closes_previous() {
        let fx = Fixture::new(&["x_1.pdb", "x_2.pdb", "y_1.pdb", "y_2.pdb"]);
        let mut v = viewer();
        v.load_files(fx.paths(&["x_1.pdb", "x_2.pdb"])).unwrap();
        let first: Vec<ModelId> = v.player().frames().to_vec();

        v.load_files(fx.paths(&["y_1.pdb", "y_2.pdb"])).unwrap();
        for id in first {
            assert!(!v.host().is_alive(id));
        }
        assert_eq!(v.host().models().len(), 2);
        assert!(v.host().script().contains(&"close #1,2".to_string()));
    }

    #[test]
    fn test_select_folder_and_run_load() {
        let fx = Fixture::new(&["g_2.cif", "g_1.pdb", "readme.txt"]);
        let mut v = viewer();
        assert_eq!(v.select_inputs(&[fx.dir.clone()]).unwrap(), 2);
        assert_eq!(v.status().load_status, "2 files selected");

        match v.run_load().unwrap() {
            LoadStart::Loaded(outcome) => assert_eq!(outcome.frames, 2),
            LoadStart::Background => panic!("no prealign configured"),
        }
        assert_eq!(model_names(&v), vec!["g_1", "g_2"]);
    }

    #[test]
    fn test_empty_folder_status() {
        let fx = Fixture::new(&["notes.txt"]);
        let mut v = viewer();
        assert_eq!(v.select_folder(&fx.dir).unwrap(), 0);
        assert_eq!(v.status().load_status, "No PDB files found");
    }

    #[test]
    fn test_commands_drive_player() {
        let names = ["t_1.pdb", "t_2.pdb", "t_3.pdb", "t_4.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();

        let mut run = |line: &str| v.execute(parse_command(line).unwrap());
        assert_eq!(run("ames show 3").unwrap(), "3 / 4");
        assert_eq!(run("show 99").unwrap(), "4 / 4");
        assert_eq!(run("show 0").unwrap(), "1 / 4");
        assert_eq!(run("show -5").unwrap(), "1 / 4");
        assert_eq!(run("skip 2").unwrap(), "Skip 2");
        assert_eq!(run("next").unwrap(), "3 / 4");
        assert_eq!(run("next").unwrap(), "4 / 4");
        assert_eq!(run("loop on").unwrap(), "Loop on");
        assert_eq!(run("next").unwrap(), "1 / 4");
        assert_eq!(run("prev").unwrap(), "4 / 4");
        assert_eq!(run("first").unwrap(), "1 / 4");
        assert_eq!(run("last").unwrap(), "4 / 4");

        assert_eq!(v.settings().skip, 2);
        assert!(v.settings().loop_enabled);
    }

    #[test]
    fn test_play_and_tick() {
        let names = ["p_1.pdb", "p_2.pdb", "p_3.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();

        assert_eq!(v.execute(Command::Play { speed: Some(20) }).unwrap(), "Playing at 20 fps");
        assert!(v.player().is_playing());
        assert_eq!(v.settings().fps, 20.0);

        let start = Instant::now();
        let step = v.player().interval();
        assert_eq!(v.tick(start + step), 1);
        assert_eq!(v.frame_label(), "2 / 3");
        assert_eq!(v.tick(start + step * 2), 1);
        // End without loop: playback stops, frame stays
        assert_eq!(v.tick(start + step * 3), 0);
        assert!(!v.player().is_playing());
        assert_eq!(v.frame_label(), "3 / 3");
        assert!(v.time_to_next_tick(start).is_none());
    }

    #[test]
    fn test_play_zero_speed_rejected() {
        let names = ["z_1.pdb", "z_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();

        let err = v.execute(Command::Play { speed: Some(0) }).unwrap_err();
        assert!(matches!(err, ViewerError::Player(PlayerError::InvalidSpeed(_))));
        assert!(!v.player().is_playing());
        assert_eq!(v.settings().fps, 10.0);
    }

    #[test]
    fn test_play_speed_without_interval_rejected() {
        let names = ["h_1.pdb", "h_2.pdb", "h_3.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();

        let err = v.execute(Command::Play { speed: Some(3_000_000_000) }).unwrap_err();
        assert!(matches!(err, ViewerError::Player(PlayerError::InvalidSpeed(_))));
        assert_eq!(v.player().speed(), 10.0);
        assert_eq!(v.settings().fps, 10.0);

        // Plain play still works at the old rate
        v.execute(Command::Play { speed: None }).unwrap();
        assert!(v.player().is_playing());

        assert!(v.set_speed(3e9).is_err());
        assert!(v.player().is_playing());
        assert_eq!(v.player().speed(), 10.0);
        assert_eq!(v.player().interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_commands_without_trajectory() {
        let mut v = viewer();
        assert!(matches!(
            v.execute(Command::Show { frame: 1 }),
            Err(ViewerError::NoTrajectory)
        ));
        assert!(matches!(
            v.execute(Command::Play { speed: None }),
            Err(ViewerError::NoTrajectory)
        ));
        assert_eq!(v.execute(Command::Stop).unwrap(), "Stopped");
        assert_eq!(v.frame_label(), "0 / 0");
        assert_eq!(v.info_label(), "");
    }

    #[test]
    fn test_align_command_uses_all_models() {
        let names = ["m_1.pdb", "m_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        let extra = v.host_mut().add_model("reference");
        v.load_files(fx.paths(&names)).unwrap();

        let text = v
            .execute(Command::Align {
                chain: Some("B".into()),
            })
            .unwrap();
        assert_eq!(text, "Aligned (chain B)");
        let script = v.host().script();
        assert!(script.contains(&format!("matchmaker #2/B to {}/B", extra)));
        assert!(script.contains(&"matchmaker #3/B to #2/B".to_string()));
    }

    #[test]
    fn test_align_trajectory_only() {
        let names = ["m_1.pdb", "m_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.host_mut().add_model("reference");
        v.load_files(fx.paths(&names)).unwrap();

        let report = v.align_trajectory(None).unwrap();
        assert_eq!(report.aligned, 1);
        assert_eq!(v.status().align_status, "Aligned (chain A)");
        assert!(
            !v.host()
                .script()
                .iter()
                .any(|c| c.starts_with("matchmaker #2/A to #1"))
        );
    }

    #[test]
    fn test_events_reach_bus() {
        let names = ["e_1.pdb", "e_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();
        v.execute(Command::Next).unwrap();

        let events = v.poll_events();
        assert!(events.iter().any(|e| downcast_event::<TrajectoryLoadedEvent>(e).is_some()));
        let labels: Vec<String> = events
            .iter()
            .filter_map(|e| downcast_event::<FrameChangedEvent>(e))
            .map(|e| e.label())
            .collect();
        assert_eq!(labels, vec!["1 / 2", "2 / 2"]);
    }

    #[test]
    fn test_vanished_model_is_pruned() {
        let names = ["v_1.pdb", "v_2.pdb", "v_3.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();
        let middle = v.player().frames()[1];
        v.host_mut().delete_model(middle);

        assert_eq!(v.execute(Command::Next).unwrap(), "2 / 2");
        assert_eq!(v.status().frames, 2);
    }

    #[test]
    fn test_color_command() {
        let names = ["c_1.pdb", "c_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();

        assert_eq!(
            v.execute(Command::Color { mode: "rainbow".into() }).unwrap(),
            "Color: Rainbow"
        );
        assert_eq!(v.host().script().last().unwrap(), "rainbow #1,2");
        assert!(matches!(
            v.execute(Command::Color { mode: "neon".into() }),
            Err(ViewerError::UnknownColor(_))
        ));
    }

    #[test]
    fn test_record_command() {
        let names = ["r_1.pdb", "r_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();

        let text = v
            .execute(Command::Record {
                path: Some(fx.dir.join("movie")),
                stop: false,
            })
            .unwrap();
        assert_eq!(text, "Saved: movie.mp4");
        assert!(v.host().script().iter().any(|c| c.starts_with("movie encode")));
    }

    #[test]
    fn test_interactive_record() {
        let mut settings = Settings::default();
        settings.movie.mode = RecordMode::Interactive;
        let mut v = Viewer::new(SceneHost::new(), settings);

        let text = v
            .execute(Command::Record {
                path: Some(PathBuf::from("live")),
                stop: false,
            })
            .unwrap();
        assert_eq!(text, "Recording... (record --stop when done)");
        assert!(v.status().recording);

        let text = v
            .execute(Command::Record {
                path: None,
                stop: true,
            })
            .unwrap();
        assert_eq!(text, "Saved: live.mp4");
        assert!(!v.status().recording);
    }

    #[test]
    fn test_close_command() {
        let names = ["k_1.pdb", "k_2.pdb"];
        let fx = Fixture::new(&names);
        let mut v = viewer();
        v.load_files(fx.paths(&names)).unwrap();
        v.execute(Command::Play { speed: None }).unwrap();

        assert_eq!(v.execute(Command::Close).unwrap(), "Closed");
        assert!(v.player().is_empty());
        assert!(!v.player().is_playing());
        assert!(v.host().models().is_empty());
        assert_eq!(v.frame_label(), "0 / 0");
    }

    #[test]
    fn test_prealign_without_usalign_fails_cleanly() {
        let names = ["u_1.pdb", "u_2.pdb"];
        let fx = Fixture::new(&names);
        let mut settings = Settings::default();
        settings.prealign = true;
        settings.usalign_path = Some(PathBuf::from("/no/such/USalign"));
        let mut v = Viewer::new(SceneHost::new(), settings);

        // Only meaningful when no USalign is installed on this machine
        if PreAligner::locate(Some(Path::new("/no/such/USalign"))).is_err() {
            let err = v.load_files(fx.paths(&names)).unwrap_err();
            assert!(matches!(err, ViewerError::Align(AlignError::UsalignNotFound { .. })));
            assert_eq!(v.status().load_status, "USalign failed");
            assert!(v.player().is_empty());
        }
    }

    #[test]
    fn test_select_missing_folder_keeps_source() {
        use std::error::Error;
        let fx = Fixture::new(&[]);
        let mut v = viewer();
        let err = v.select_folder(&fx.dir.join("nope")).unwrap_err();
        assert!(matches!(err, ViewerError::Discover(DiscoverError::NotADirectory(_))));
        assert!(err.to_string().contains("nope"));
        assert!(err.source().is_some());
    }

    /// Shell stand-in for USalign: logs `file ref` and writes `<prefix>.pdb`
    #[cfg(unix)]
    fn fake_usalign(dir: &Path) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;
        let bin = dir.join("USalign");
        let log = dir.join("calls.log");
        let script = format!(
            "#!/bin/sh\necho \"$1 $2\" >> \"{}\"\ncp \"$1\" \"$6.pdb\"\necho open > \"$6.cxc\"\n",
            log.display()
        );
        fs::write(&bin, script).unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        (bin, log)
    }

    #[cfg(unix)]
    fn prealign_viewer(bin: &Path, workers: &Arc<Workers>) -> Viewer<SceneHost> {
        let mut settings = Settings::default();
        settings.prealign = true;
        settings.usalign_path = Some(bin.to_path_buf());
        Viewer::new(SceneHost::new(), settings).with_workers(Arc::clone(workers))
    }

    #[cfg(unix)]
    fn wait_for_load(v: &mut Viewer<SceneHost>) -> Result<LoadOutcome, ViewerError> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(result) = v.poll_background() {
                return result;
            }
            assert!(Instant::now() < deadline, "background load never finished");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Park the pool's only worker until the sender fires or drops
    #[cfg(unix)]
    fn block_worker(workers: &Workers) -> crossbeam_channel::Sender<()> {
        let (tx, rx) = unbounded::<()>();
        workers.execute(move || {
            let _ = rx.recv();
        });
        tx
    }

    #[cfg(unix)]
    fn read_calls(log: &Path) -> Vec<String> {
        fs::read_to_string(log)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[cfg(unix)]
    #[test]
    fn test_background_prealign_load() {
        let names = ["s_1.pdb", "s_2.pdb", "s_3.pdb"];
        let fx = Fixture::new(&names);
        let (bin, log) = fake_usalign(&fx.dir);
        let workers = Arc::new(Workers::new(1));
        let mut v = prealign_viewer(&bin, &workers);

        v.select_files(fx.paths(&names));
        assert_eq!(v.run_load().unwrap(), LoadStart::Background);
        assert!(v.is_loading());
        assert!(v.player().is_empty());

        let outcome = wait_for_load(&mut v).unwrap();
        assert_eq!(outcome.frames, 3);
        assert!(outcome.prealigned);
        assert!(outcome.failed.is_empty());
        assert!(!v.is_loading());
        assert_eq!(model_names(&v), vec!["s_1", "s_2", "s_3"]);
        assert_eq!(v.status().load_status, "3 loaded");

        // Each file went onto the previous aligned output
        let first = v.player().frames()[0];
        let ws = v.host().model_path(first).unwrap().parent().unwrap().to_path_buf();
        assert_ne!(ws, fx.dir);
        assert_eq!(
            read_calls(&log),
            vec![
                format!("{} {}", fx.dir.join("s_2.pdb").display(), ws.join("s_1.pdb").display()),
                format!("{} {}", fx.dir.join("s_3.pdb").display(), ws.join("s_2.pdb").display()),
            ]
        );

        // Workspace is dropped once the models are open
        assert!(!ws.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_prealign_job_reports_cancelled() {
        let names = ["t_1.pdb", "t_2.pdb"];
        let fx = Fixture::new(&names);
        let (bin, log) = fake_usalign(&fx.dir);
        let workers = Arc::new(Workers::new(1));
        let mut v = prealign_viewer(&bin, &workers);

        let release = block_worker(&workers);
        v.select_files(fx.paths(&names));
        assert_eq!(v.run_load().unwrap(), LoadStart::Background);
        workers.bump_epoch();
        release.send(()).unwrap();

        let err = wait_for_load(&mut v).unwrap_err();
        assert!(matches!(err, ViewerError::Align(AlignError::Cancelled)));
        assert!(!v.is_loading());
        assert!(v.player().is_empty());
        assert!(v.host().models().is_empty());
        assert!(read_calls(&log).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_newer_load_supersedes_queued_prealign() {
        let old = ["a_1.pdb", "a_2.pdb"];
        let new = ["b_1.pdb", "b_2.pdb"];
        let fx = Fixture::new(&["a_1.pdb", "a_2.pdb", "b_1.pdb", "b_2.pdb"]);
        let (bin, log) = fake_usalign(&fx.dir);
        let workers = Arc::new(Workers::new(1));
        let mut v = prealign_viewer(&bin, &workers);

        let release = block_worker(&workers);
        v.select_files(fx.paths(&old));
        assert_eq!(v.run_load().unwrap(), LoadStart::Background);
        v.select_files(fx.paths(&new));
        assert_eq!(v.run_load().unwrap(), LoadStart::Background);
        release.send(()).unwrap();

        let outcome = wait_for_load(&mut v).unwrap();
        assert_eq!(outcome.frames, 2);
        assert_eq!(model_names(&v), vec!["b_1", "b_2"]);
        assert_eq!(v.host().models().len(), 2);

        let calls = read_calls(&log);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("b_2.pdb"));
        assert!(!calls.iter().any(|c| c.contains("a_1.pdb") || c.contains("a_2.pdb")));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_background_drops_result() {
        let names = ["c_1.pdb", "c_2.pdb"];
        let fx = Fixture::new(&names);
        let (bin, log) = fake_usalign(&fx.dir);
        let workers = Arc::new(Workers::new(1));
        let mut v = prealign_viewer(&bin, &workers);

        let release = block_worker(&workers);
        v.select_files(fx.paths(&names));
        assert_eq!(v.run_load().unwrap(), LoadStart::Background);
        v.cancel_background();
        assert!(!v.is_loading());
        release.send(()).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert!(v.poll_background().is_none());
        assert!(v.player().is_empty());
        assert!(read_calls(&log).is_empty());
    }

    #[test]
    fn test_loop_state_from_settings() {
        let mut settings = Settings::default();
        settings.loop_enabled = true;
        settings.skip = 3;
        settings.fps = 5.0;
        let v = Viewer::new(SceneHost::new(), settings);
        assert!(v.player().loop_enabled());
        assert_eq!(v.player().skip(), 3);
        assert_eq!(v.player().speed(), 5.0);
    }
}

use ames::cli::Args;
use ames::commands::{Command, parse_command};
use ames::config;
use ames::core::event_bus::{BoxedEvent, downcast_event};
use ames::core::player_events::{
    FrameChangedEvent, FramesPrunedEvent, PlaybackChangedEvent, TrajectoryClearedEvent,
    TrajectoryLoadedEvent,
};
use ames::core::workers::Workers;
use ames::host::SceneHost;
use ames::server::{ApiServer, SharedApiState};
use ames::settings::Settings;
use ames::viewer::{LoadOutcome, LoadStart, Viewer, ViewerError};

use anyhow::Context;
use clap::Parser;
use log::{debug, error, info, warn};
use std::io::BufRead;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Longest the control loop sleeps without a due timer
const IDLE_POLL: Duration = Duration::from_millis(50);

/// One-shot actions from the command line, run once the first load lands
#[derive(Debug, Default)]
struct StartupActions {
    frame: Option<usize>,
    align: bool,
    autoplay: bool,
    record: Option<std::path::PathBuf>,
}

fn init_logging(args: &Args, path_config: &config::PathConfig) -> anyhow::Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Read command lines from stdin until EOF
fn spawn_stdin_reader(tx: mpsc::Sender<Command>, quit_on_eof: bool) -> std::io::Result<()> {
    thread::Builder::new().name("ames-stdin".to_string()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(cmd) => {
                    if tx.send(cmd).is_err() {
                        return;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
        }
        debug!("stdin closed");
        if quit_on_eof {
            let _ = tx.send(Command::Quit);
        }
    })?;
    Ok(())
}

fn report_events(events: Vec<BoxedEvent>) {
    for event in events {
        if let Some(e) = downcast_event::<FrameChangedEvent>(&event) {
            debug!("Frame {}", e.label());
        } else if let Some(e) = downcast_event::<PlaybackChangedEvent>(&event) {
            println!("{}", if e.playing { "Playing" } else { "Stopped" });
        } else if let Some(e) = downcast_event::<TrajectoryLoadedEvent>(&event) {
            println!("Trajectory loaded: {} frames", e.frames);
        } else if downcast_event::<TrajectoryClearedEvent>(&event).is_some() {
            println!("Trajectory cleared");
        } else if let Some(e) = downcast_event::<FramesPrunedEvent>(&event) {
            println!("{} frame(s) closed outside the viewer, {} remain", e.removed, e.remaining);
        }
    }
}

/// Apply startup actions after a successful load. Returns true to quit.
fn on_loaded(
    viewer: &mut Viewer<SceneHost>,
    outcome: &LoadOutcome,
    actions: &mut StartupActions,
    rx: &mpsc::Receiver<Command>,
) -> bool {
    println!("{} loaded{}", outcome.frames, if outcome.prealigned { " (pre-aligned)" } else { "" });
    for (path, reason) in &outcome.failed {
        println!("  skipped {}: {}", path.display(), reason);
    }

    if actions.align {
        match viewer.align_trajectory(None) {
            Ok(report) => println!("{}", report.status_text()),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    if let Some(frame) = actions.frame.take()
        && let Err(e) = viewer.show_frame(frame as i64)
    {
        warn!("--frame {}: {}", frame, e);
    }

    if let Some(path) = actions.record.take() {
        let mut should_stop = || loop {
            match rx.try_recv() {
                Ok(Command::Stop | Command::Quit | Command::Record { stop: true, .. }) => return true,
                Ok(other) => info!("Ignoring {:?} while recording", other),
                Err(_) => return false,
            }
        };
        match viewer.record_movie(&path, &mut should_stop) {
            Ok(Some(summary)) => println!("{}", summary.status_text()),
            Ok(None) => println!("Recording stopped"),
            Err(e) => eprintln!("Error: {}", e),
        }
        return true;
    }

    if actions.autoplay
        && let Err(e) = viewer.player_mut().start_playback()
    {
        warn!("Autoplay failed: {}", e);
    }
    false
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    info!("AMES trajectory viewer starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let mut settings = Settings::load(&settings_path).unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        Settings::default()
    });
    settings.apply_args(&args);
    if args.save_settings {
        settings.save(&settings_path)?;
    }

    let workers = Arc::new(Workers::for_background());
    let api_enabled = settings.api_server_enabled;
    let api_port = settings.api_server_port;
    let mut viewer = Viewer::new(SceneHost::new(), settings).with_workers(Arc::clone(&workers));

    let (tx, rx) = mpsc::channel::<Command>();
    let api_state = Arc::new(SharedApiState::new());
    if api_enabled {
        ApiServer::start(api_port, Arc::clone(&api_state), tx.clone())
            .context("Failed to start API server")?;
    }
    let batch = args.record.is_some();
    if !batch {
        spawn_stdin_reader(tx.clone(), !api_enabled).context("Failed to start stdin reader")?;
        println!("Commands: load, show N, play [fps], stop, next, prev, first, last, loop on|off, skip N, align [chain], record [file], status, close, quit");
    }
    drop(tx);

    let mut actions = StartupActions {
        frame: args.start_frame,
        align: args.align,
        autoplay: args.autoplay,
        record: args.record.clone(),
    };

    let mut quit = false;
    if !args.inputs.is_empty() {
        let started = viewer
            .select_inputs(&args.inputs)
            .and_then(|_| viewer.run_load());
        match started {
            Ok(LoadStart::Loaded(outcome)) => quit = on_loaded(&mut viewer, &outcome, &mut actions, &rx),
            Ok(LoadStart::Background) => println!("Pre-aligning with USalign..."),
            Err(e) => {
                error!("Load failed: {}", e);
                eprintln!("Error: {}", e);
                quit = batch;
            }
        }
    } else if batch {
        eprintln!("Error: --record needs structure files");
        quit = true;
    }

    while !quit {
        let now = Instant::now();
        viewer.tick(now);

        if let Some(result) = viewer.poll_background() {
            match result {
                Ok(outcome) => quit = on_loaded(&mut viewer, &outcome, &mut actions, &rx),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    quit = batch;
                }
            }
        }

        report_events(viewer.poll_events());
        api_state.publish(viewer.status());
        if quit {
            break;
        }

        let wait = viewer
            .time_to_next_tick(Instant::now())
            .map_or(IDLE_POLL, |d| d.min(IDLE_POLL));
        match rx.recv_timeout(wait) {
            Ok(Command::Quit) => quit = true,
            Ok(cmd) => match viewer.execute(cmd) {
                Ok(msg) => println!("{}", msg),
                Err(ViewerError::NoTrajectory) => println!("No trajectory loaded"),
                Err(e) => eprintln!("Error: {}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            // Only reachable in batch mode while a background load runs
            Err(RecvTimeoutError::Disconnected) => {
                if !viewer.is_loading() {
                    quit = true;
                } else {
                    thread::sleep(wait);
                }
            }
        }
    }

    report_events(viewer.poll_events());
    viewer.close_trajectory();
    if let Some(path) = &args.script {
        viewer
            .host()
            .write_script(path)
            .with_context(|| format!("Failed to write script: {}", path.display()))?;
        info!("Host script written to {}", path.display());
    }
    info!("AMES trajectory viewer exiting");
    Ok(())
}

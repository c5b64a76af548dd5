use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Host:   scene (command script)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Structure-trajectory viewer
#[derive(Parser, Debug, Default)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Structure files (PDB/CIF) or a single folder holding them
    #[arg(value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Load only every Nth file (1 = all)
    #[arg(short = 'e', long = "load-every", value_name = "N")]
    pub load_every: Option<usize>,

    /// Pre-align files with USalign before loading
    #[arg(long = "prealign")]
    pub prealign: bool,

    /// Path to the USalign executable (default: search PATH and conda dirs)
    #[arg(long = "usalign", value_name = "EXE")]
    pub usalign: Option<PathBuf>,

    /// Chain used for sequential alignment
    #[arg(long = "chain", value_name = "ID")]
    pub chain: Option<String>,

    /// Playback speed in frames per second
    #[arg(long = "fps", value_name = "FPS")]
    pub fps: Option<f32>,

    /// Frames to advance per step
    #[arg(short = 's', long = "skip", value_name = "N")]
    pub skip: Option<usize>,

    /// Enable looping
    #[arg(short = 'o', long = "loop", value_name = "0|1")]
    pub loop_playback: Option<u8>,

    /// Coloring (chain, plddt, ss, rainbow, atom)
    #[arg(long = "color", value_name = "MODE")]
    pub color: Option<String>,

    /// Start frame (1-based)
    #[arg(long = "frame", value_name = "N")]
    pub start_frame: Option<usize>,

    /// Auto-play on startup
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// Align the trajectory (matchmaker) right after loading
    #[arg(long = "align")]
    pub align: bool,

    /// Start the REST API server on this port
    #[arg(long = "api-port", value_name = "PORT")]
    pub api_port: Option<u16>,

    /// Record the loaded trajectory to a movie and exit
    #[arg(long = "record", value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Write the host command script here on exit
    #[arg(long = "script", value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Enable debug logging to file (default: ames.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Persist the effective settings (after CLI overrides) to ames.json
    #[arg(long = "save-settings")]
    pub save_settings: bool,
}

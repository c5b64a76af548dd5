//! Persistent settings (`ames.json`).
//!
//! Missing keys fall back to defaults, so files written by older versions
//! keep loading. CLI values override what was loaded.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::align::DEFAULT_CHAIN;
use crate::cli::Args;
use crate::core::player::DEFAULT_FPS;
use crate::display::{ColorMode, DisplaySettings};
use crate::movie::MovieSettings;

/// Default REST API port
pub const DEFAULT_API_PORT: u16 = 9876;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Playback
    pub fps: f32,
    pub skip: usize,
    pub loop_enabled: bool,

    // Loading
    pub load_every: usize,
    pub prealign: bool,
    pub usalign_path: Option<PathBuf>,

    // Alignment
    pub chain: String,

    pub display: DisplaySettings,
    pub movie: MovieSettings,

    // REST API Server
    pub api_server_enabled: bool,
    pub api_server_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            skip: 1,
            loop_enabled: false,
            load_every: 1,
            prealign: false,
            usalign_path: None,
            chain: DEFAULT_CHAIN.to_string(),
            display: DisplaySettings::default(),
            movie: MovieSettings::default(),
            api_server_enabled: false,
            api_server_port: DEFAULT_API_PORT,
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file gives defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Override with whatever the command line sets.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(n) = args.load_every {
            self.load_every = n.max(1);
        }
        if args.prealign {
            self.prealign = true;
        }
        if let Some(path) = &args.usalign {
            self.usalign_path = Some(path.clone());
        }
        if let Some(chain) = &args.chain {
            self.chain = chain.clone();
        }
        if let Some(fps) = args.fps {
            if fps.is_finite() && fps > 0.0 {
                self.fps = fps;
            } else {
                warn!("Ignoring invalid --fps {}", fps);
            }
        }
        if let Some(skip) = args.skip {
            self.skip = skip.max(1);
        }
        if let Some(l) = args.loop_playback {
            self.loop_enabled = l != 0;
        }
        if let Some(name) = &args.color {
            match ColorMode::from_name(name) {
                Some(mode) => self.display.color = mode,
                None => warn!("Unknown color mode '{}'", name),
            }
        }
        if let Some(port) = args.api_port {
            self.api_server_enabled = true;
            self.api_server_port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_missing_keys_use_defaults() {
        let s: Settings = serde_json::from_str(r#"{"fps": 24.0, "display": {"color": "Rainbow"}}"#).unwrap();
        assert_eq!(s.fps, 24.0);
        assert_eq!(s.skip, 1);
        assert_eq!(s.chain, "A");
        assert_eq!(s.display.color, ColorMode::Rainbow);
        assert!(s.display.chain_a.cartoon);
        assert_eq!(s.movie.duration_secs, 10.0);
    }

    #[test]
    fn test_save_load() {
        let dir = std::env::temp_dir().join(format!("ames_settings_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ames.json");

        let mut s = Settings::default();
        s.loop_enabled = true;
        s.usalign_path = Some(PathBuf::from("/opt/USalign"));
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), s);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file() {
        let s = Settings::load(Path::new("/no/such/ames.json")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_args_override() {
        let args = Args::try_parse_from([
            "ames", "--fps", "0", "-s", "0", "-e", "3", "--loop", "1", "--chain", "B",
            "--color", "ss", "--api-port", "8000",
        ])
        .unwrap();
        let mut s = Settings::default();
        s.apply_args(&args);

        assert_eq!(s.fps, DEFAULT_FPS);
        assert_eq!(s.skip, 1);
        assert_eq!(s.load_every, 3);
        assert!(s.loop_enabled);
        assert_eq!(s.chain, "B");
        assert_eq!(s.display.color, ColorMode::BySecondaryStructure);
        assert!(s.api_server_enabled);
        assert_eq!(s.api_server_port, 8000);
    }
}

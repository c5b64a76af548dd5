//! Trajectory file discovery and ordering
//!
//! Frames are ordered by a natural sort on the file name: digit runs compare
//! as numbers, so `step_2.pdb` comes before `step_10.pdb`.

use log::{info, warn};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::structure::STRUCTURE_EXTS;
use crate::core::player::MIN_FRAMES;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

/// One run of a natural-sort key
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyPart {
    Text(String),
    Num(String),
}

impl KeyPart {
    /// Numeric runs compare by value without parsing (no overflow on long runs)
    fn cmp_num(a: &str, b: &str) -> Ordering {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Num(a), KeyPart::Num(b)) => Self::cmp_num(a, b),
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            // Keys alternate text/num from the start, so mixed pairs only
            // occur on malformed input; numbers first keeps it total
            (KeyPart::Num(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Num(_)) => Ordering::Greater,
        }
    }
}

/// Natural-sort key of a path's file name (text runs lower-cased).
fn natural_key(path: &Path) -> Vec<KeyPart> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut parts = Vec::new();
    let mut last = 0;
    for m in DIGITS.find_iter(&name) {
        parts.push(KeyPart::Text(name[last..m.start()].to_lowercase()));
        parts.push(KeyPart::Num(m.as_str().to_string()));
        last = m.end();
    }
    parts.push(KeyPart::Text(name[last..].to_lowercase()));
    parts
}

/// Sort paths alphanumerically by file name.
pub fn sort_alphanumeric(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort_by_cached_key(|p| natural_key(p));
    paths
}

#[derive(Debug)]
pub enum DiscoverError {
    NotADirectory(PathBuf),
    Pattern(glob::PatternError),
}

impl fmt::Display for DiscoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverError::NotADirectory(dir) => write!(f, "Not a directory: {}", dir.display()),
            DiscoverError::Pattern(e) => write!(f, "Bad folder pattern: {}", e),
        }
    }
}

impl std::error::Error for DiscoverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoverError::Pattern(e) => Some(e),
            DiscoverError::NotADirectory(_) => None,
        }
    }
}

impl From<glob::PatternError> for DiscoverError {
    fn from(e: glob::PatternError) -> Self {
        DiscoverError::Pattern(e)
    }
}

/// All structure files directly inside `dir`, naturally sorted.
pub fn discover_folder(dir: &Path) -> Result<Vec<PathBuf>, DiscoverError> {
    if !dir.is_dir() {
        return Err(DiscoverError::NotADirectory(dir.to_path_buf()));
    }

    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut paths = Vec::new();
    for ext in STRUCTURE_EXTS {
        let pattern = format!("{}/*.{}", base, ext);
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) => paths.push(path),
                Err(e) => warn!("Skipping unreadable entry: {}", e),
            }
        }
    }

    let paths = sort_alphanumeric(paths);
    info!("Found {} structure files in {}", paths.len(), dir.display());
    Ok(paths)
}

/// Every `n`th path starting with the first (`n` of 0 is treated as 1).
pub fn select_every(paths: &[PathBuf], n: usize) -> Vec<PathBuf> {
    paths.iter().step_by(n.max(1)).cloned().collect()
}

/// Files chosen by the user but not loaded yet.
#[derive(Debug, Clone, Default)]
pub struct PendingFiles {
    files: Vec<PathBuf>,
}

impl PendingFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection (stored naturally sorted)
    pub fn set(&mut self, files: Vec<PathBuf>) {
        self.files = sort_alphanumeric(files);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Enough files to form a trajectory
    pub fn is_loadable(&self) -> bool {
        self.files.len() >= MIN_FRAMES
    }

    pub fn status_text(&self) -> String {
        match self.files.len() {
            0 => "No files selected".to_string(),
            1 => format!("1 file selected (need >= {})", MIN_FRAMES),
            n => format!("{} files selected", n),
        }
    }
}

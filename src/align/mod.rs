//! Structural alignment of consecutive frames.
//!
//! Two routes:
//! - [`matchmaker`]: after loading, inside the host, each model onto its predecessor
//! - [`usalign`]: before loading, on files, with the external USalign binary

pub mod matchmaker;
pub mod usalign;

use std::fmt;
use std::path::PathBuf;

pub use matchmaker::{AlignReport, DEFAULT_CHAIN, align_sequential};
pub use usalign::{AlignWorkspace, PreAligner, PreAlignment};

#[derive(Debug)]
pub enum AlignError {
    /// Fewer than two models or files to align
    TooFewStructures(usize),
    /// USalign missing from every searched location
    UsalignNotFound { searched: Vec<PathBuf> },
    /// Superseded by a newer load or shut down
    Cancelled,
    Io(std::io::Error),
}

impl fmt::Display for AlignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignError::TooFewStructures(n) => {
                write!(f, "Need at least 2 structures for alignment, got {}", n)
            }
            AlignError::UsalignNotFound { searched } => {
                let list: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
                write!(
                    f,
                    "USalign not found. Install USalign or add it to PATH. Searched: PATH, {}",
                    list.join(", ")
                )
            }
            AlignError::Cancelled => write!(f, "Alignment cancelled"),
            AlignError::Io(e) => write!(f, "Alignment I/O error: {}", e),
        }
    }
}

impl std::error::Error for AlignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlignError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AlignError {
    fn from(e: std::io::Error) -> Self {
        AlignError::Io(e)
    }
}

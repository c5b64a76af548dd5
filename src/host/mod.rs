//! Host application seam.
//!
//! Everything the viewer needs from the molecular-visualization host:
//! open a structure file and get its model back, toggle model display,
//! run host commands, close models. [`HostPresenter`] turns any host into
//! the player's [`FramePresenter`](crate::core::FramePresenter).

pub mod presenter;
pub mod scene;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use presenter::HostPresenter;
pub use scene::SceneHost;

/// Host model id (`#3` in host command syntax)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Summary shown next to the frame counter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub residues: Option<usize>,
    pub atoms: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    ModelNotFound(ModelId),
    OpenFailed { path: PathBuf, reason: String },
    CommandFailed { command: String, reason: String },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::ModelNotFound(id) => write!(f, "Model {} not found", id),
            HostError::OpenFailed { path, reason } => {
                write!(f, "Failed to open {}: {}", path.display(), reason)
            }
            HostError::CommandFailed { command, reason } => {
                write!(f, "Command '{}' failed: {}", command, reason)
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Molecular-visualization host.
///
/// `open` returns the new model directly; the viewer never infers it from
/// scene side effects.
pub trait Host {
    fn open(&mut self, path: &Path) -> Result<ModelId, HostError>;

    fn set_display(&mut self, id: ModelId, visible: bool) -> Result<(), HostError>;

    fn is_alive(&self, id: ModelId) -> bool;

    fn model_info(&self, id: ModelId) -> Option<ModelInfo>;

    /// All atomic models currently open, ascending by id
    fn models(&self) -> Vec<ModelId>;

    /// Execute one host command line; returns its text output
    fn run(&mut self, command: &str) -> Result<String, HostError>;

    fn close(&mut self, ids: &[ModelId]) -> Result<(), HostError>;
}

/// Host specifier for a set of models: `#1,2,5`. Empty input gives "".
pub fn model_spec(ids: &[ModelId]) -> String {
    if ids.is_empty() {
        return String::new();
    }
    let joined: Vec<String> = ids.iter().map(|id| id.0.to_string()).collect();
    format!("#{}", joined.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_spec() {
        assert_eq!(model_spec(&[]), "");
        assert_eq!(model_spec(&[ModelId(4)]), "#4");
        assert_eq!(model_spec(&[ModelId(1), ModelId(2), ModelId(10)]), "#1,2,10");
    }

    #[test]
    fn test_model_id_display() {
        assert_eq!(ModelId(7).to_string(), "#7");
    }
}

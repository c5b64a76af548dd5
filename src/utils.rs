//! Utility functions and constants
//!
//! **Used by**: viewer (file selection), cli, server

pub mod sequences;

/// Structure file type detection
pub mod structure {
    use std::path::Path;

    /// Structure formats the trajectory loader picks up from folders
    pub const STRUCTURE_EXTS: &[&str] = &["pdb", "cif"];

    /// Check if file looks like a structure file (by extension)
    pub fn is_structure(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| STRUCTURE_EXTS.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

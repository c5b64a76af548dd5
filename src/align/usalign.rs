//! Pre-alignment of structure files with the external USalign binary.
//!
//! Chain alignment: the first file is copied unchanged, each following file
//! is superposed onto the *aligned* previous file. A pair USalign cannot
//! handle is copied unchanged and the chain continues from it. Output lives
//! in a temporary workspace that is removed when dropped.

use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

use super::AlignError;

/// Executable name looked up on PATH
pub const USALIGN_BIN: &str = "USalign";

/// Conda-style and package-manager locations searched after PATH
pub fn fallback_locations() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = dirs_next::home_dir() {
        for env in ["miniforge3", "miniconda3", "anaconda3", "conda"] {
            dirs.push(home.join(env).join("bin").join(USALIGN_BIN));
        }
    }
    dirs.push(PathBuf::from("/usr/local/bin").join(USALIGN_BIN));
    dirs.push(PathBuf::from("/opt/homebrew/bin").join(USALIGN_BIN));
    dirs
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| {
            let plain = dir.join(name);
            let exe = dir.join(format!("{}.exe", name));
            [plain, exe]
        })
        .find(|p| is_executable(p))
}

/// Locate USalign: explicit path, then PATH, then [`fallback_locations`].
pub fn find_usalign(explicit: Option<&Path>) -> Result<PathBuf, AlignError> {
    if let Some(path) = explicit {
        if is_executable(path) {
            return Ok(path.to_path_buf());
        }
        warn!("Configured USalign {} is not executable, searching", path.display());
    }

    if let Some(found) = find_on_path(USALIGN_BIN) {
        return Ok(found);
    }

    let candidates = fallback_locations();
    candidates
        .iter()
        .find(|p| is_executable(p))
        .cloned()
        .ok_or(AlignError::UsalignNotFound {
            searched: candidates,
        })
}

/// Temporary directory for aligned files; removed on drop.
#[derive(Debug)]
pub struct AlignWorkspace {
    dir: PathBuf,
}

impl AlignWorkspace {
    pub fn create() -> Result<Self, AlignError> {
        let dir = std::env::temp_dir().join(format!("ames_usalign_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&dir)?;
        debug!("Created align workspace {}", dir.display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Remove the `.cxc` scripts USalign writes next to its output
    pub fn remove_side_files(&self) -> Result<usize, AlignError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "cxc") {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => debug!("Could not remove {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }

    /// Remove the directory now, reporting failure
    pub fn cleanup(self) -> std::io::Result<()> {
        let dir = self.dir.clone();
        std::mem::forget(self);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Drop for AlignWorkspace {
    fn drop(&mut self) {
        if self.dir.exists()
            && let Err(e) = fs::remove_dir_all(&self.dir)
        {
            warn!("Failed to cleanup tmp dir {}: {}", self.dir.display(), e);
        }
    }
}

/// Aligned files plus the workspace that holds them
#[derive(Debug)]
pub struct PreAlignment {
    files: Vec<PathBuf>,
    workspace: AlignWorkspace,
}

impl PreAlignment {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn workspace(&self) -> &AlignWorkspace {
        &self.workspace
    }
}

/// Runs USalign over a file chain.
#[derive(Debug, Clone)]
pub struct PreAligner {
    usalign: PathBuf,
}

impl PreAligner {
    pub fn new(usalign: PathBuf) -> Self {
        Self { usalign }
    }

    pub fn locate(explicit: Option<&Path>) -> Result<Self, AlignError> {
        find_usalign(explicit).map(Self::new)
    }

    pub fn executable(&self) -> &Path {
        &self.usalign
    }

    /// Align `files` in order into a fresh workspace.
    ///
    /// `is_cancelled` is checked before each pair; `progress(done, total)`
    /// after each file.
    pub fn run(
        &self,
        files: &[PathBuf],
        is_cancelled: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<PreAlignment, AlignError> {
        if files.len() < 2 {
            return Err(AlignError::TooFewStructures(files.len()));
        }

        let workspace = AlignWorkspace::create()?;
        let total = files.len();
        let mut aligned: Vec<PathBuf> = Vec::with_capacity(total);

        info!("Pre-aligning {} files with {}", total, self.usalign.display());
        for (i, file) in files.iter().enumerate() {
            if is_cancelled() {
                return Err(AlignError::Cancelled);
            }

            let output = match aligned.last() {
                None => copy_into(file, workspace.path())?,
                Some(prev) => match self.align_pair(file, prev, workspace.path()) {
                    Ok(out) => out,
                    Err(reason) => {
                        warn!("USalign failed for {}: {}", display_name(file), reason);
                        copy_into(file, workspace.path())?
                    }
                },
            };
            aligned.push(output);
            progress(i + 1, total);
        }

        workspace.remove_side_files()?;
        Ok(PreAlignment {
            files: aligned,
            workspace,
        })
    }

    /// Superpose `file` onto `reference`; returns the aligned output path.
    fn align_pair(&self, file: &Path, reference: &Path, out_dir: &Path) -> Result<PathBuf, String> {
        let stem = file
            .file_stem()
            .ok_or_else(|| "file has no name".to_string())?;
        let prefix = out_dir.join(stem);

        let result = Command::new(&self.usalign)
            .arg(file)
            .arg(reference)
            .args(["-mm", "1", "-chimerax"])
            .arg(&prefix)
            .output()
            .map_err(|e| e.to_string())?;

        // `-chimerax <prefix>` writes <prefix>.pdb plus .cxc scripts
        let mut out: OsString = prefix.into_os_string();
        out.push(".pdb");
        let out = PathBuf::from(out);

        if result.status.success() && out.exists() {
            Ok(out)
        } else {
            Err(String::from_utf8_lossy(&result.stderr).trim().to_string())
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf, AlignError> {
    let name = file.file_name().ok_or_else(|| {
        AlignError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file: {}", file.display()),
        ))
    })?;
    let dest = dir.join(name);
    fs::copy(file, &dest)?;
    Ok(dest)
}

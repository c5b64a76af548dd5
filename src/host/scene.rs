//! In-process host: a model registry plus the command script it was driven with.
//!
//! Used by the `ames` binary for dry runs (the recorded script can be
//! replayed in the real host as a `.cxc` file) and by tests as a
//! deterministic host.

use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{Host, HostError, ModelId, ModelInfo, model_spec};

#[derive(Debug, Clone)]
struct SceneModel {
    name: String,
    path: Option<PathBuf>,
    displayed: bool,
}

#[derive(Debug, Default)]
pub struct SceneHost {
    models: BTreeMap<ModelId, SceneModel>,
    next_id: u32,
    script: Vec<String>,
    /// Command prefixes that fail (failure injection)
    failing: Vec<String>,
}

impl SceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model without a backing file
    pub fn add_model(&mut self, name: &str) -> ModelId {
        self.insert(name.to_string(), None)
    }

    /// Drop a model without going through `close` (user closed it in the host)
    pub fn delete_model(&mut self, id: ModelId) -> bool {
        self.models.remove(&id).is_some()
    }

    pub fn is_displayed(&self, id: ModelId) -> Option<bool> {
        self.models.get(&id).map(|m| m.displayed)
    }

    pub fn model_path(&self, id: ModelId) -> Option<&Path> {
        self.models.get(&id).and_then(|m| m.path.as_deref())
    }

    /// Ids of displayed models
    pub fn displayed(&self) -> Vec<ModelId> {
        self.models
            .iter()
            .filter(|(_, m)| m.displayed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every command received so far, in order
    pub fn script(&self) -> &[String] {
        &self.script
    }

    /// Make every later command starting with `prefix` fail
    pub fn fail_commands_starting_with(&mut self, prefix: &str) {
        self.failing.push(prefix.to_string());
    }

    /// Write the recorded script, one command per line
    pub fn write_script(&self, path: &Path) -> std::io::Result<()> {
        let mut text = self.script.join("\n");
        text.push('\n');
        std::fs::write(path, text)
    }

    fn insert(&mut self, name: String, path: Option<PathBuf>) -> ModelId {
        self.next_id += 1;
        let id = ModelId(self.next_id);
        // Hosts display freshly opened models
        self.models.insert(
            id,
            SceneModel {
                name,
                path,
                displayed: true,
            },
        );
        id
    }

    fn record(&mut self, command: String) -> Result<(), HostError> {
        debug!("host> {}", command);
        if self.failing.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(HostError::CommandFailed {
                command,
                reason: "rejected by host".to_string(),
            });
        }
        self.script.push(command);
        Ok(())
    }
}

impl Host for SceneHost {
    fn open(&mut self, path: &Path) -> Result<ModelId, HostError> {
        if !path.is_file() {
            return Err(HostError::OpenFailed {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            });
        }
        self.record(format!("open \"{}\"", path.display()))
            .map_err(|e| HostError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        Ok(self.insert(name, Some(path.to_path_buf())))
    }

    fn set_display(&mut self, id: ModelId, visible: bool) -> Result<(), HostError> {
        if !self.models.contains_key(&id) {
            return Err(HostError::ModelNotFound(id));
        }
        let verb = if visible { "show" } else { "hide" };
        self.record(format!("{} {} models", verb, id))?;
        if let Some(model) = self.models.get_mut(&id) {
            model.displayed = visible;
        }
        Ok(())
    }

    fn is_alive(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    fn model_info(&self, id: ModelId) -> Option<ModelInfo> {
        self.models.get(&id).map(|m| ModelInfo {
            name: m.name.clone(),
            residues: None,
            atoms: None,
        })
    }

    fn models(&self) -> Vec<ModelId> {
        self.models.keys().copied().collect()
    }

    fn run(&mut self, command: &str) -> Result<String, HostError> {
        self.record(command.to_string())?;
        Ok(String::new())
    }

    fn close(&mut self, ids: &[ModelId]) -> Result<(), HostError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.record(format!("close {}", model_spec(ids)))?;
        for id in ids {
            self.models.remove(id);
        }
        Ok(())
    }
}

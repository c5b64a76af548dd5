//! Display styles for the loaded trajectory, rendered as host commands.
//!
//! Every command targets the trajectory's own models (`#1,2,3`), never the
//! whole scene. Commands are grouped: chain A, chain B, colouring, ligands.
//! A group stops at its first failing command; the failure is logged and the
//! remaining groups still run.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::host::{Host, ModelId, model_spec};

/// Colouring scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ColorMode {
    ByChain,
    #[default]
    ByPlddt,
    BySecondaryStructure,
    Rainbow,
    ByAtom,
}

impl ColorMode {
    pub const ALL: [ColorMode; 5] = [
        ColorMode::ByChain,
        ColorMode::ByPlddt,
        ColorMode::BySecondaryStructure,
        ColorMode::Rainbow,
        ColorMode::ByAtom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::ByChain => "By Chain",
            ColorMode::ByPlddt => "By pLDDT",
            ColorMode::BySecondaryStructure => "By Secondary Structure",
            ColorMode::Rainbow => "Rainbow",
            ColorMode::ByAtom => "By Atom",
        }
    }

    /// Parse a display name or a short alias (`chain`, `plddt`, `ss`, `rainbow`, `atom`)
    pub fn from_name(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().to_lowercase() == lower)
            .or(match lower.as_str() {
                "chain" | "bychain" => Some(ColorMode::ByChain),
                "plddt" | "bfactor" => Some(ColorMode::ByPlddt),
                "ss" | "secondary" => Some(ColorMode::BySecondaryStructure),
                "atom" | "byatom" | "hetero" => Some(ColorMode::ByAtom),
                _ => None,
            })
    }

    /// Host commands for this mode on `spec`
    pub fn commands(&self, spec: &str) -> Vec<String> {
        match self {
            ColorMode::ByChain => vec![format!("color bychain {}", spec)],
            ColorMode::ByPlddt => vec![format!("color bfactor {} palette alphafold", spec)],
            ColorMode::BySecondaryStructure => vec![
                format!("color helix {} purple", spec),
                format!("color strand {} yellow", spec),
                format!("color coil {} gray", spec),
            ],
            ColorMode::Rainbow => vec![format!("rainbow {}", spec)],
            ColorMode::ByAtom => vec![format!("color byhetero {}", spec)],
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Representations enabled for one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainStyle {
    pub cartoon: bool,
    pub stick: bool,
    pub sphere: bool,
}

impl ChainStyle {
    /// Reset the chain, then add each enabled representation.
    pub fn commands(&self, spec: &str, chain: &str) -> Vec<String> {
        let target = format!("{}/{}", spec, chain);
        let mut cmds = vec![format!("hide {} target ac", target)];
        if self.cartoon {
            cmds.push(format!("cartoon {}", target));
            cmds.push(format!("show {} target c", target));
        }
        if self.stick {
            cmds.push(format!("show {} target a", target));
            cmds.push(format!("style {} stick", target));
        }
        if self.sphere {
            cmds.push(format!("show {} target a", target));
            cmds.push(format!("style {} sphere", target));
        }
        cmds
    }
}

/// Ligand and ion representation. Ball wins over sphere, sphere over stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LigandStyle {
    pub stick: bool,
    pub sphere: bool,
    pub ball: bool,
}

impl LigandStyle {
    pub fn selection(spec: &str) -> String {
        format!("{} & ~protein & ~nucleic", spec)
    }

    pub fn commands(&self, spec: &str) -> Vec<String> {
        let lig = Self::selection(spec);
        let style = if self.ball {
            Some("ball")
        } else if self.sphere {
            Some("sphere")
        } else if self.stick {
            Some("stick")
        } else {
            None
        };

        match style {
            Some(style) => vec![
                format!("show {} target a", lig),
                format!("style {} {}", lig, style),
            ],
            None => vec![format!("hide {} target a", lig)],
        }
    }
}

/// Persistent display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub chain_a: ChainStyle,
    pub chain_b: ChainStyle,
    pub color: ColorMode,
    pub ligand: LigandStyle,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            chain_a: ChainStyle {
                cartoon: true,
                ..Default::default()
            },
            chain_b: ChainStyle::default(),
            color: ColorMode::default(),
            ligand: LigandStyle::default(),
        }
    }
}

/// Command group, applied independently of the others
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleGroup {
    ChainA,
    ChainB,
    Coloring,
    Ligand,
}

impl StyleGroup {
    pub const ALL: [StyleGroup; 4] = [
        StyleGroup::ChainA,
        StyleGroup::ChainB,
        StyleGroup::Coloring,
        StyleGroup::Ligand,
    ];

    fn label(&self) -> &'static str {
        match self {
            StyleGroup::ChainA => "Chain A style",
            StyleGroup::ChainB => "Chain B style",
            StyleGroup::Coloring => "Coloring",
            StyleGroup::Ligand => "Ligand style",
        }
    }
}

impl DisplaySettings {
    pub fn group_commands(&self, group: StyleGroup, spec: &str) -> Vec<String> {
        match group {
            StyleGroup::ChainA => self.chain_a.commands(spec, "A"),
            StyleGroup::ChainB => self.chain_b.commands(spec, "B"),
            StyleGroup::Coloring => self.color.commands(spec),
            StyleGroup::Ligand => self.ligand.commands(spec),
        }
    }

    /// Run one group on `models`. Returns false if a command failed.
    pub fn apply_group<H: Host>(&self, host: &mut H, models: &[ModelId], group: StyleGroup) -> bool {
        if models.is_empty() {
            return true;
        }
        let spec = model_spec(models);
        for cmd in self.group_commands(group, &spec) {
            if let Err(e) = host.run(&cmd) {
                warn!("{} error: {}", group.label(), e);
                return false;
            }
        }
        debug!("{} applied to {}", group.label(), spec);
        true
    }

    /// Run every group; returns how many failed.
    pub fn apply<H: Host>(&self, host: &mut H, models: &[ModelId]) -> usize {
        StyleGroup::ALL
            .iter()
            .filter(|g| !self.apply_group(host, models, **g))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SceneHost;

    #[test]
    fn test_default_commands() {
        let s = DisplaySettings::default();
        assert_eq!(
            s.group_commands(StyleGroup::ChainA, "#1,2"),
            vec!["hide #1,2/A target ac", "cartoon #1,2/A", "show #1,2/A target c"]
        );
        assert_eq!(s.group_commands(StyleGroup::ChainB, "#1,2"), vec!["hide #1,2/B target ac"]);
        assert_eq!(
            s.group_commands(StyleGroup::Coloring, "#1,2"),
            vec!["color bfactor #1,2 palette alphafold"]
        );
        assert_eq!(
            s.group_commands(StyleGroup::Ligand, "#1,2"),
            vec!["hide #1,2 & ~protein & ~nucleic target a"]
        );
    }

    #[test]
    fn test_ligand_precedence() {
        let all = LigandStyle {
            stick: true,
            sphere: true,
            ball: true,
        };
        assert_eq!(all.commands("#1")[1], "style #1 & ~protein & ~nucleic ball");

        let no_ball = LigandStyle { ball: false, ..all };
        assert_eq!(no_ball.commands("#1")[1], "style #1 & ~protein & ~nucleic sphere");

        let stick = LigandStyle {
            stick: true,
            ..Default::default()
        };
        assert_eq!(
            stick.commands("#1"),
            vec![
                "show #1 & ~protein & ~nucleic target a",
                "style #1 & ~protein & ~nucleic stick"
            ]
        );
    }

    #[test]
    fn test_secondary_structure_colors() {
        assert_eq!(
            ColorMode::BySecondaryStructure.commands("#3"),
            vec!["color helix #3 purple", "color strand #3 yellow", "color coil #3 gray"]
        );
    }

    #[test]
    fn test_color_mode_names() {
        for mode in ColorMode::ALL {
            assert_eq!(ColorMode::from_name(mode.as_str()), Some(mode));
        }
        assert_eq!(ColorMode::from_name("ss"), Some(ColorMode::BySecondaryStructure));
        assert_eq!(ColorMode::from_name("by plddt"), Some(ColorMode::ByPlddt));
        assert_eq!(ColorMode::from_name("neon"), None);
    }

    #[test]
    fn test_failed_group_does_not_stop_others() {
        let mut host = SceneHost::new();
        let ids = vec![host.add_model("a"), host.add_model("b")];
        host.fail_commands_starting_with("cartoon");

        let settings = DisplaySettings::default();
        assert_eq!(settings.apply(&mut host, &ids), 1);
        assert_eq!(
            host.script(),
            &[
                "hide #1,2/A target ac".to_string(),
                "hide #1,2/B target ac".to_string(),
                "color bfactor #1,2 palette alphafold".to_string(),
                "hide #1,2 & ~protein & ~nucleic target a".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_models_is_noop() {
        let mut host = SceneHost::new();
        assert_eq!(DisplaySettings::default().apply(&mut host, &[]), 0);
        assert!(host.script().is_empty());
    }
}

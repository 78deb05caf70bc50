//! Propagator configuration, read from a TOML file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Displacement applied to a call site the plug rule detaches.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

/// Tunables for the change propagator and the headless editor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PropagatorConfig {
    /// How far a detached call site is moved so it does not sit on its old target.
    pub detach_offset: Offset,
    /// Hue of procedure blocks whose type is still polymorphic.
    pub procedure_hue: u16,
    /// Hue per concrete type constructor name.
    pub type_hues: BTreeMap<String, u16>,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        let type_hues = [("Number", 230), ("String", 160), ("Boolean", 210), ("List", 260)]
            .into_iter()
            .map(|(name, hue)| (name.to_string(), hue))
            .collect();
        PropagatorConfig {
            detach_offset: Offset { dx: -20.0, dy: -20.0 },
            procedure_hue: 300,
            type_hues,
        }
    }
}

impl PropagatorConfig {
    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<PropagatorConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_str(&content)
    }

    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_str(content: &str) -> Result<PropagatorConfig, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Hue for a concrete type constructor, falling back to the procedure hue.
    pub fn hue_for(&self, con_name: Option<&str>) -> u16 {
        con_name
            .and_then(|name| self.type_hues.get(name).copied())
            .unwrap_or(self.procedure_hue)
    }
}

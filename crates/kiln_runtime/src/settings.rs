//! Runtime settings

use anyhow::{Context, Result};
use kiln_core::SceneConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the `kiln` binary, read from an optional JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub scene: SceneConfig,
    /// Entities spawned into the demo scene.
    pub demo_entities: usize,
    /// Where to write the serialized demo scene, if anywhere.
    pub output: Option<PathBuf>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            demo_entities: 1000,
            output: None,
        }
    }
}

impl RuntimeSettings {
    /// Load settings from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing settings in {}", path.display()))
    }
}

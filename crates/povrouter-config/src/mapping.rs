// ── Mapping file ──
//
// Player → source table stored as a flat JSON object:
// `{ "76561198000000001": "POV_Alice" }`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use povrouter_core::{Mapping, PlayerId};

use crate::ConfigError;

#[derive(Debug, Clone)]
pub struct MappingFile {
    path: PathBuf,
}

impl MappingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table. A missing file is an empty mapping.
    pub fn load(&self) -> Result<Mapping, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Mapping::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Mapping::new());
        }

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&text).map_err(|source| ConfigError::Mapping {
                path: self.path.clone(),
                source,
            })?;

        Ok(raw
            .into_iter()
            .map(|(player, source)| (PlayerId::new(player), source.trim().to_owned()))
            .filter(|(player, source)| !player.is_empty() && !source.is_empty())
            .collect())
    }

    /// Write the table, replacing the file atomically.
    pub fn save(&self, mapping: &Mapping) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(mapping).map_err(|source| ConfigError::Mapping {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

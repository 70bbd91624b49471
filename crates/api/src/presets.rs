//! File-backed store for named plan presets.
//!
//! Each preset is an opaque JSON document saved as
//! `<sanitized-name>.json` in one directory. Every name, including those
//! used for lookups, is sanitized first, so a request can never address
//! a path outside the directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use groupexec_core::error::CoreError;
use groupexec_core::preset::{validate_preset_name, PRESET_EXTENSION};
use serde::Serialize;

/// Listing entry for a stored preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetSummary {
    pub name: String,
}

pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the preset directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create preset directory", &self.dir, e))
    }

    fn path_for(&self, safe_name: &str) -> PathBuf {
        self.dir.join(format!("{safe_name}.{PRESET_EXTENSION}"))
    }

    /// Names of all stored presets, sorted.
    pub async fn list(&self) -> Result<Vec<PresetSummary>, CoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read preset directory", &self.dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("read preset directory", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PRESET_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names.into_iter().map(|name| PresetSummary { name }).collect())
    }

    /// Save `document` under `name`, replacing any existing preset.
    ///
    /// Returns the sanitized name the preset was stored under.
    pub async fn save(&self, name: &str, document: &serde_json::Value) -> Result<String, CoreError> {
        let safe = validate_preset_name(name)?;
        let path = self.path_for(&safe);
        let tmp = path.with_extension(format!("{PRESET_EXTENSION}.tmp"));

        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| CoreError::Internal(format!("Failed to encode preset: {e}")))?;

        self.ensure_dir().await?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error("write preset", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("replace preset", &path, e))?;

        tracing::info!(preset = %safe, path = %path.display(), "Preset saved");
        Ok(safe)
    }

    pub async fn load(&self, name: &str) -> Result<serde_json::Value, CoreError> {
        let safe = validate_preset_name(name)?;
        let path = self.path_for(&safe);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(safe)),
            Err(e) => return Err(io_error("read preset", &path, e)),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Internal(format!("Preset '{safe}' is not valid JSON: {e}")))
    }

    pub async fn delete(&self, name: &str) -> Result<(), CoreError> {
        let safe = validate_preset_name(name)?;
        let path = self.path_for(&safe);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(preset = %safe, "Preset deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(safe)),
            Err(e) => Err(io_error("delete preset", &path, e)),
        }
    }
}

fn not_found(name: String) -> CoreError {
    CoreError::NotFound {
        entity: "Preset",
        id: name,
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> CoreError {
    CoreError::Internal(format!("Failed to {action} at {}: {err}", path.display()))
}

//! Rotation state persisted across supervisor restarts.
//!
//! Stored as a small JSON object with sorted keys. Only one supervisor runs
//! at a time (see `rotor-lock`), so read-modify-write is safe here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rotor_core::RotorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    /// Credential chosen for the current (or most recent) session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_credential: Option<PathBuf>,
    /// Pid of the shell that launched the most recent transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_launcher_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Keys this version does not know about, kept on rewrite.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RotationState {
    /// Read the state file. Absent or empty means first run.
    ///
    /// Unparseable content is [`RotorError::CorruptState`]: guessing here
    /// could leave an orphaned transfer running next to a new one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            RotorError::CorruptState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Replace the whole record atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;

        // Going through `Value` sorts every key, including flattened extras.
        let value = serde_json::to_value(self).context("Failed to serialize rotation state")?;
        let json = serde_json::to_string_pretty(&value)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write rotation state")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to persist to {}", path.display()))?;
        Ok(())
    }

    /// Set one key and rewrite the file, keeping all other keys.
    pub fn write(path: &Path, key: &str, value: serde_json::Value) -> Result<Self> {
        Self::update(path, |state| {
            let mut object = match serde_json::to_value(&*state)? {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            object.insert(key.to_string(), value);
            *state = serde_json::from_value(serde_json::Value::Object(object))
                .with_context(|| format!("Invalid value for state key '{key}'"))?;
            Ok(())
        })
    }

    pub fn record_credential(path: &Path, credential: &Path) -> Result<Self> {
        Self::update(path, |state| {
            state.last_credential = Some(credential.to_path_buf());
            Ok(())
        })
    }

    pub fn record_launcher_pid(path: &Path, pid: u32) -> Result<Self> {
        Self::update(path, |state| {
            state.last_launcher_pid = Some(pid);
            Ok(())
        })
    }

    fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut RotationState) -> Result<()>,
    {
        let mut state = Self::load(path)?;
        f(&mut state)?;
        state.updated_at = Some(Utc::now());
        state.save(path)?;
        Ok(state)
    }
}

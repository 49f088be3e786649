//! Strategies for handing the active credential to the transfer process.
//!
//! The supervisor only sees [`CredentialInjector`]; which strategy runs is
//! a configuration choice.

use anyhow::{Context, Result};
use rotor_config::{RotationMode, RotorConfig};
use rotor_core::{CredentialIdentity, RotorError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait CredentialInjector: Send + Sync {
    /// Make `credential` effective for the next spawn. May edit `args` and
    /// may touch external files.
    fn prepare(&self, args: &mut Vec<String>, credential: &CredentialIdentity) -> Result<()>;

    fn describe(&self) -> String;
}

/// Appends `<flag> <credential file>` to the command line.
#[derive(Debug, Clone)]
pub struct RuntimeFlag {
    flag: String,
}

impl RuntimeFlag {
    pub fn new(flag: impl Into<String>) -> Self {
        Self { flag: flag.into() }
    }
}

impl CredentialInjector for RuntimeFlag {
    fn prepare(&self, args: &mut Vec<String>, credential: &CredentialIdentity) -> Result<()> {
        args.push(self.flag.clone());
        args.push(credential.path().to_string_lossy().into_owned());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("runtime flag {}", self.flag)
    }
}

/// Rewrites `key = <credential file>` inside `[section]` of an INI-style
/// transfer config, then points the transfer at that file with `--config`.
///
/// A missing section fails the spawn with
/// [`RotorError::ConfigSectionMissing`].
#[derive(Debug, Clone)]
pub struct ConfigSection {
    config_path: PathBuf,
    section: String,
    key: String,
}

impl ConfigSection {
    pub fn new(config_path: impl Into<PathBuf>, section: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            config_path: config_path.into(),
            section: section.into(),
            key: key.into(),
        }
    }
}

impl CredentialInjector for ConfigSection {
    fn prepare(&self, args: &mut Vec<String>, credential: &CredentialIdentity) -> Result<()> {
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!(
                "Failed to read transfer config: {}",
                self.config_path.display()
            )
        })?;
        let value = credential.path().to_string_lossy();
        let rewritten = rewrite_section_key(&content, &self.section, &self.key, &value)
            .ok_or_else(|| RotorError::ConfigSectionMissing {
                path: self.config_path.clone(),
                section: self.section.clone(),
            })?;
        atomic_write(&self.config_path, rewritten.as_bytes())?;
        debug!(
            config = %self.config_path.display(),
            section = %self.section,
            credential = %credential.label(),
            "Rewrote transfer config section"
        );

        args.push("--config".to_string());
        args.push(self.config_path.to_string_lossy().into_owned());
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "config section [{}] in {}",
            self.section,
            self.config_path.display()
        )
    }
}

/// Build the injector selected by `rotation.mode`.
pub fn injector_for(config: &RotorConfig) -> Result<Box<dyn CredentialInjector>> {
    match config.rotation.mode {
        RotationMode::Runtime => Ok(Box::new(RuntimeFlag::new(
            config.rotation.credential_flag.clone(),
        ))),
        RotationMode::Config => {
            let section = config
                .rotation
                .resolved_section(&config.transfer)
                .ok_or_else(|| RotorError::InvalidConfig {
                    reason: "rotation.section is required in config mode".to_string(),
                })?;
            Ok(Box::new(ConfigSection::new(
                config.rotation.rclone_config_path(),
                section,
                config.rotation.key.clone(),
            )))
        }
    }
}

/// Set `key = value` in `[section]`, replacing an existing assignment or
/// inserting one right below the header. Returns `None` when the section
/// does not exist. Every other line is kept verbatim.
pub(crate) fn rewrite_section_key(
    content: &str,
    section: &str,
    key: &str,
    value: &str,
) -> Option<String> {
    let assignment = format!("{key} = {value}");
    let mut out: Vec<String> = Vec::new();
    let mut in_section = false;
    let mut found_section = false;
    let mut written = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(name) = section_header(trimmed) {
            if in_section && !written {
                insert_after_header(&mut out, section, &assignment);
                written = true;
            }
            in_section = name == section;
            found_section |= in_section;
            out.push(line.to_string());
            continue;
        }

        if in_section && !written && assignment_key(trimmed) == Some(key) {
            out.push(assignment.clone());
            written = true;
            continue;
        }
        out.push(line.to_string());
    }

    if !found_section {
        return None;
    }
    if !written {
        insert_after_header(&mut out, section, &assignment);
    }

    let mut rewritten = out.join("\n");
    if content.ends_with('\n') {
        rewritten.push('\n');
    }
    Some(rewritten)
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn assignment_key(line: &str) -> Option<&str> {
    if line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    line.split_once('=').map(|(k, _)| k.trim())
}

fn insert_after_header(out: &mut Vec<String>, section: &str, assignment: &str) {
    let header_at = out
        .iter()
        .rposition(|l| section_header(l.trim()) == Some(section));
    if let Some(index) = header_at {
        out.insert(index + 1, assignment.to_string());
    }
}

/// Write data to a file atomically using temp-file + rename.
fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(data).context("Failed to write temp file")?;
    tmp.persist(target)
        .with_context(|| format!("Failed to persist to {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;

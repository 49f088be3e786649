//! Round-robin credential pool.

use anyhow::{Context, Result};
use rotor_core::{CredentialIdentity, RotorError};
use std::path::Path;
use tracing::debug;

/// Ordered, non-empty set of credentials.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    identities: Vec<CredentialIdentity>,
}

impl CredentialPool {
    /// Scan `dir` for `*.json` credential files, sorted by path.
    ///
    /// An empty result (including a missing directory) is
    /// [`RotorError::NoCredentials`].
    pub fn load(dir: &Path) -> Result<Self> {
        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&dir.to_string_lossy())
        );

        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)
            .with_context(|| format!("Invalid credential pattern: {pattern}"))?
        {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable credential entry: {e}"),
            }
        }
        paths.sort();

        let identities = paths
            .iter()
            .map(|p| CredentialIdentity::from_file(p))
            .collect::<Vec<_>>();
        if identities.is_empty() {
            return Err(RotorError::NoCredentials {
                dir: dir.to_path_buf(),
            }
            .into());
        }

        debug!(count = identities.len(), dir = %dir.display(), "Loaded credential pool");
        Ok(Self { identities })
    }

    pub fn from_identities(identities: Vec<CredentialIdentity>) -> Result<Self> {
        if identities.is_empty() {
            return Err(RotorError::NoCredentials {
                dir: Default::default(),
            }
            .into());
        }
        Ok(Self { identities })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialIdentity> {
        self.identities.iter()
    }

    pub fn first(&self) -> &CredentialIdentity {
        &self.identities[0]
    }

    pub fn position(&self, path: &Path) -> Option<usize> {
        self.identities.iter().position(|c| c.path() == path)
    }

    /// Rotate so the credential at `path` becomes index 0, keeping relative
    /// order. Returns `false` (and leaves the pool untouched) when absent.
    pub fn reorder(&mut self, path: &Path) -> bool {
        match self.position(path) {
            Some(index) => {
                self.identities.rotate_left(index);
                true
            }
            None => false,
        }
    }

    /// Credential after `current`, wrapping past the end.
    ///
    /// An unknown or absent `current` restarts at index 0.
    pub fn next(&self, current: Option<&CredentialIdentity>) -> &CredentialIdentity {
        let index = current
            .and_then(|c| self.position(c.path()))
            .map(|i| (i + 1) % self.identities.len())
            .unwrap_or(0);
        &self.identities[index]
    }
}

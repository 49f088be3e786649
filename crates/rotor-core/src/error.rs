use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum RotorError {
    #[error("No credential files found in {}", dir.display())]
    NoCredentials { dir: PathBuf },

    #[error("State file {} is corrupt: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("Another supervisor instance is already running ({holder})")]
    AlreadyRunning { holder: String },

    #[error("Transfer binary '{binary}' is not installed or not in PATH")]
    BinaryNotFound { binary: String },

    #[error("Failed to spawn transfer command '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Statistics endpoint unreachable: {reason}")]
    StatsUnreachable { reason: String },

    #[error("Transfer process lost: statistics unreachable {attempts} times in a row")]
    TransferLost { attempts: u32 },

    #[error("Section [{section}] not found in {}", path.display())]
    ConfigSectionMissing { path: PathBuf, section: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl RotorError {
    /// A single unreachable poll is absorbed by the monitoring loop; every
    /// other variant aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RotorError::StatsUnreachable { .. })
    }
}

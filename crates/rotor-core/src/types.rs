use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// JSON field carrying the account address in a service-account key file.
const IDENTITY_FIELD: &str = "client_email";

/// One rotatable credential file.
///
/// Equality and hashing use the file path only; the label is derived from
/// the file's contents and only ever used for logging.
#[derive(Debug, Clone, Eq)]
pub struct CredentialIdentity {
    path: PathBuf,
    label: String,
}

impl CredentialIdentity {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }

    /// Build an identity from a credential file on disk.
    ///
    /// The label comes from the `client_email` field when the file is
    /// readable JSON carrying it; otherwise the file stem is used.
    pub fn from_file(path: &Path) -> Self {
        let label = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|json| {
                json.get(IDENTITY_FIELD)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            });
        Self::new(path, label)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for CredentialIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl std::hash::Hash for CredentialIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for CredentialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.path.display())
    }
}

/// One in-flight transfer as reported by the statistics endpoint.
///
/// Both counters are optional: the endpoint drops them for entries that
/// have already completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl TransferEntry {
    /// Entry with neither counter present.
    pub fn is_finished(&self) -> bool {
        self.bytes.is_none() && self.speed.is_none()
    }

    /// Nonzero progress with positive instantaneous speed.
    pub fn is_moving(&self) -> bool {
        self.bytes.unwrap_or(0) != 0 && self.speed.unwrap_or(0.0) > 0.0
    }
}

/// One parsed statistics poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Bytes transferred since the transfer process started.
    #[serde(default)]
    pub bytes: u64,
    /// Current throughput in bytes per second.
    #[serde(default)]
    pub speed: f64,
    #[serde(
        rename = "lastError",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_error: Option<String>,
    #[serde(default)]
    pub transferring: Vec<TransferEntry>,
}

/// Rotation rules evaluated against each statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    VolumeCeiling,
    StalledProgress,
    RateLimit,
    AllIdle,
}

impl RuleKind {
    pub const ALL: [RuleKind; 4] = [
        RuleKind::VolumeCeiling,
        RuleKind::StalledProgress,
        RuleKind::RateLimit,
        RuleKind::AllIdle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::VolumeCeiling => "volume-ceiling",
            RuleKind::StalledProgress => "stalled-progress",
            RuleKind::RateLimit => "rate-limit",
            RuleKind::AllIdle => "all-idle",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod error;
pub mod types;

pub use error::RotorError;
pub use types::{CredentialIdentity, RuleKind, StatsSnapshot, TransferEntry};

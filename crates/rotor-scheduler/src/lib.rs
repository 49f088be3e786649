//! Scheduling decisions: credential round-robin, persisted rotation state,
//! and the rule engine that decides when to rotate.

pub mod pool;
pub mod rate_limit;
pub mod rules;
pub mod state;

pub use pool::CredentialPool;
pub use rate_limit::{RateLimitDetected, detect_rate_limit};
pub use rules::{Evaluation, RuleEngine};
pub use state::RotationState;

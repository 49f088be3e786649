//! Supervisor configuration: one immutable structure built at startup.

pub mod config;
pub mod paths;
pub mod rules;

pub use config::{
    ConfigOverrides, RotationConfig, RotationMode, RotorConfig, TimingConfig, TransferConfig,
};
pub use rules::{IdleRule, RateLimitRule, RulesConfig, StalledRule, VolumeRule};

use rotor_core::RuleKind;
use serde::{Deserialize, Serialize};

/// Decimal, not binary: 750 GB as counted by the remote quota.
pub const DEFAULT_VOLUME_CEILING_BYTES: u64 = 750 * 1_000_000_000;
pub const DEFAULT_STALLED_THRESHOLD: u32 = 100;

/// Which rules are active and how many must agree before rotating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default = "default_quorum")]
    pub quorum: u32,
    #[serde(default)]
    pub volume: VolumeRule,
    #[serde(default)]
    pub stalled: StalledRule,
    #[serde(default)]
    pub rate_limit: RateLimitRule,
    #[serde(default)]
    pub idle: IdleRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeRule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_volume_ceiling")]
    pub ceiling_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StalledRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Consecutive ticks without byte growth before the rule fires.
    #[serde(default = "default_stalled_threshold")]
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitRule {
    #[serde(default)]
    pub enabled: bool,
    /// Substrings of the transfer's last error that mark a rate limit.
    #[serde(default = "default_rate_limit_markers")]
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdleRule {
    #[serde(default)]
    pub enabled: bool,
}

fn default_quorum() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_volume_ceiling() -> u64 {
    DEFAULT_VOLUME_CEILING_BYTES
}

fn default_stalled_threshold() -> u32 {
    DEFAULT_STALLED_THRESHOLD
}

fn default_rate_limit_markers() -> Vec<String> {
    vec![
        "userRateLimitExceeded".to_string(),
        "User rate limit exceeded".to_string(),
    ]
}

impl Default for VolumeRule {
    fn default() -> Self {
        Self {
            enabled: false,
            ceiling_bytes: default_volume_ceiling(),
        }
    }
}

impl Default for StalledRule {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_stalled_threshold(),
        }
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            enabled: false,
            markers: default_rate_limit_markers(),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            quorum: default_quorum(),
            volume: VolumeRule::default(),
            stalled: StalledRule::default(),
            rate_limit: RateLimitRule::default(),
            idle: IdleRule::default(),
        }
    }
}

impl RulesConfig {
    pub fn is_enabled(&self, rule: RuleKind) -> bool {
        match rule {
            RuleKind::VolumeCeiling => self.volume.enabled,
            RuleKind::StalledProgress => self.stalled.enabled,
            RuleKind::RateLimit => self.rate_limit.enabled,
            RuleKind::AllIdle => self.idle.enabled,
        }
    }

    pub fn enabled_rules(&self) -> Vec<RuleKind> {
        RuleKind::ALL
            .into_iter()
            .filter(|rule| self.is_enabled(*rule))
            .collect()
    }

    /// Quorum above the enabled count means rotation can never trigger.
    pub fn is_unreachable(&self) -> bool {
        self.quorum as usize > self.enabled_rules().len()
    }
}

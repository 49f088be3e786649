//! Rotation rule engine.
//!
//! Each tick the engine receives the current snapshot plus the previous
//! one and reports which enabled rules fired. Rotation is signalled when at
//! least `quorum` enabled rules fire in the same tick.
//!
//! Counters that span ticks (stalled-tick count, rate-limit latch) belong
//! to the current session and are cleared by [`RuleEngine::start_session`].

use rotor_config::RulesConfig;
use rotor_core::{RuleKind, StatsSnapshot};
use tracing::{debug, info};

use crate::rate_limit::detect_rate_limit;

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Enabled rules that fired this tick.
    pub fired: Vec<RuleKind>,
    pub quorum: u32,
    pub rotate: bool,
}

impl Evaluation {
    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }
}

#[derive(Debug, Default, Clone)]
struct SessionCounters {
    stalled_ticks: u32,
    rate_limited: bool,
    ticks: u64,
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: RulesConfig,
    session: SessionCounters,
}

impl RuleEngine {
    pub fn new(rules: RulesConfig) -> Self {
        Self {
            rules,
            session: SessionCounters::default(),
        }
    }

    /// Reset every per-session counter. Call once per spawned transfer.
    pub fn start_session(&mut self) {
        self.session = SessionCounters::default();
    }

    pub fn stalled_ticks(&self) -> u32 {
        self.session.stalled_ticks
    }

    pub fn is_rate_limited(&self) -> bool {
        self.session.rate_limited
    }

    pub fn ticks(&self) -> u64 {
        self.session.ticks
    }

    pub fn evaluate(
        &mut self,
        current: &StatsSnapshot,
        previous: Option<&StatsSnapshot>,
    ) -> Evaluation {
        self.session.ticks += 1;

        // Every rule updates its counters, enabled or not, so toggling a rule
        // never sees a half-built history.
        let volume = self.volume_exceeded(current);
        let stalled = self.track_stall(current, previous);
        let rate_limited = self.track_rate_limit(current);
        let idle = all_transfers_idle(current);

        let fired: Vec<RuleKind> = [
            (RuleKind::VolumeCeiling, volume),
            (RuleKind::StalledProgress, stalled),
            (RuleKind::RateLimit, rate_limited),
            (RuleKind::AllIdle, idle),
        ]
        .into_iter()
        .filter(|(rule, hit)| *hit && self.rules.is_enabled(*rule))
        .map(|(rule, _)| rule)
        .collect();

        let rotate = fired.len() >= self.rules.quorum as usize;
        debug!(
            tick = self.session.ticks,
            bytes = current.bytes,
            stalled_ticks = self.session.stalled_ticks,
            fired = ?fired,
            quorum = self.rules.quorum,
            rotate,
            "Evaluated rotation rules"
        );

        Evaluation {
            fired,
            quorum: self.rules.quorum,
            rotate,
        }
    }

    fn volume_exceeded(&self, current: &StatsSnapshot) -> bool {
        current.bytes > self.rules.volume.ceiling_bytes
    }

    fn track_stall(&mut self, current: &StatsSnapshot, previous: Option<&StatsSnapshot>) -> bool {
        let previous_bytes = previous.map(|p| p.bytes).unwrap_or(0);
        if current.bytes > previous_bytes {
            self.session.stalled_ticks = 0;
        } else {
            self.session.stalled_ticks = self.session.stalled_ticks.saturating_add(1);
        }
        self.session.stalled_ticks >= self.rules.stalled.threshold
    }

    fn track_rate_limit(&mut self, current: &StatsSnapshot) -> bool {
        if !self.session.rate_limited {
            if let Some(detected) =
                detect_rate_limit(current.last_error.as_deref(), &self.rules.rate_limit.markers)
            {
                info!(marker = %detected.matched_marker, "Transfer reported a rate limit");
                self.session.rate_limited = true;
            }
        }
        self.session.rate_limited
    }
}

/// True when no in-flight entry is making progress.
///
/// Entries without byte and speed fields have finished and are ignored; an
/// empty list counts as idle.
pub fn all_transfers_idle(snapshot: &StatsSnapshot) -> bool {
    !snapshot
        .transferring
        .iter()
        .filter(|entry| !entry.is_finished())
        .any(|entry| entry.is_moving())
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;

use super::*;
use proptest::prelude::*;
use rotor_config::{IdleRule, RateLimitRule, StalledRule, VolumeRule};
use rotor_core::TransferEntry;

fn only(rule: RuleKind) -> RulesConfig {
    RulesConfig {
        quorum: 1,
        volume: VolumeRule {
            enabled: rule == RuleKind::VolumeCeiling,
            ..Default::default()
        },
        stalled: StalledRule {
            enabled: rule == RuleKind::StalledProgress,
            threshold: 3,
        },
        rate_limit: RateLimitRule {
            enabled: rule == RuleKind::RateLimit,
            ..Default::default()
        },
        idle: IdleRule {
            enabled: rule == RuleKind::AllIdle,
        },
    }
}

fn snapshot(bytes: u64) -> StatsSnapshot {
    StatsSnapshot {
        bytes,
        ..Default::default()
    }
}

fn entry(bytes: Option<u64>, speed: Option<f64>) -> TransferEntry {
    TransferEntry {
        name: Some("file.bin".to_string()),
        bytes,
        speed,
    }
}

fn with_transfers(entries: Vec<TransferEntry>) -> StatsSnapshot {
    StatsSnapshot {
        bytes: 1,
        transferring: entries,
        ..Default::default()
    }
}

#[test]
fn test_volume_fires_only_above_ceiling() {
    let mut rules = only(RuleKind::VolumeCeiling);
    rules.volume.ceiling_bytes = 1_000;
    let mut engine = RuleEngine::new(rules);

    assert!(!engine.evaluate(&snapshot(1_000), None).rotate);
    let eval = engine.evaluate(&snapshot(1_001), Some(&snapshot(1_000)));
    assert!(eval.rotate);
    assert_eq!(eval.fired, vec![RuleKind::VolumeCeiling]);
}

#[test]
fn test_volume_default_ceiling_is_decimal_gigabytes() {
    let mut engine = RuleEngine::new(only(RuleKind::VolumeCeiling));
    // 700 GiB is 751.6e9 bytes, already past the decimal ceiling.
    let seven_hundred_gib: u64 = 700 * 1024 * 1024 * 1024;
    assert!(engine.evaluate(&snapshot(seven_hundred_gib), None).rotate);

    engine.start_session();
    assert!(!engine.evaluate(&snapshot(749_999_999_999), None).rotate);
}

#[test]
fn test_stalled_fires_exactly_at_threshold() {
    let mut engine = RuleEngine::new(only(RuleKind::StalledProgress));
    let flat = snapshot(500);

    assert!(!engine.evaluate(&flat, Some(&flat)).rotate);
    assert_eq!(engine.stalled_ticks(), 1);
    assert!(!engine.evaluate(&flat, Some(&flat)).rotate);
    assert_eq!(engine.stalled_ticks(), 2);
    assert!(engine.evaluate(&flat, Some(&flat)).rotate);
    assert_eq!(engine.stalled_ticks(), 3);
}

#[test]
fn test_stalled_resets_on_growth() {
    let mut engine = RuleEngine::new(only(RuleKind::StalledProgress));
    let a = snapshot(500);
    let b = snapshot(600);

    engine.evaluate(&a, Some(&a));
    engine.evaluate(&a, Some(&a));
    assert_eq!(engine.stalled_ticks(), 2);

    assert!(!engine.evaluate(&b, Some(&a)).rotate);
    assert_eq!(engine.stalled_ticks(), 0);

    engine.evaluate(&b, Some(&b));
    assert_eq!(engine.stalled_ticks(), 1);
}

#[test]
fn test_first_tick_compares_against_zero() {
    let mut engine = RuleEngine::new(only(RuleKind::StalledProgress));
    engine.evaluate(&snapshot(0), None);
    assert_eq!(engine.stalled_ticks(), 1);

    engine.start_session();
    engine.evaluate(&snapshot(10), None);
    assert_eq!(engine.stalled_ticks(), 0);
}

#[test]
fn test_rate_limit_is_sticky_within_session() {
    let mut engine = RuleEngine::new(only(RuleKind::RateLimit));
    let limited = StatsSnapshot {
        bytes: 10,
        last_error: Some("Error 403: userRateLimitExceeded".to_string()),
        ..Default::default()
    };
    let other_error = StatsSnapshot {
        bytes: 20,
        last_error: Some("connection reset by peer".to_string()),
        ..Default::default()
    };
    let clean = snapshot(30);

    assert!(!engine.evaluate(&snapshot(5), None).rotate);
    assert!(engine.evaluate(&limited, None).rotate);
    assert!(engine.evaluate(&other_error, Some(&limited)).rotate);
    assert!(engine.evaluate(&clean, Some(&other_error)).rotate);
    assert!(engine.is_rate_limited());
}

#[test]
fn test_start_session_clears_counters() {
    let mut rules = only(RuleKind::RateLimit);
    rules.stalled.threshold = 2;
    let mut engine = RuleEngine::new(rules);
    let limited = StatsSnapshot {
        last_error: Some("userRateLimitExceeded".to_string()),
        ..Default::default()
    };

    engine.evaluate(&limited, None);
    engine.evaluate(&limited, Some(&limited));
    assert!(engine.is_rate_limited());
    assert_eq!(engine.stalled_ticks(), 2);

    engine.start_session();
    assert!(!engine.is_rate_limited());
    assert_eq!(engine.stalled_ticks(), 0);
    assert_eq!(engine.ticks(), 0);
    assert!(!engine.evaluate(&snapshot(1), None).rotate);
}

#[test]
fn test_idle_entries() {
    assert!(all_transfers_idle(&with_transfers(vec![])));
    assert!(all_transfers_idle(&with_transfers(vec![entry(Some(0), Some(5.0))])));
    assert!(all_transfers_idle(&with_transfers(vec![entry(Some(500), Some(0.0))])));
    assert!(!all_transfers_idle(&with_transfers(vec![entry(Some(500), Some(3.0))])));
    assert!(all_transfers_idle(&with_transfers(vec![entry(None, None)])));
}

#[test]
fn test_idle_single_moving_entry_wins() {
    let snapshot = with_transfers(vec![
        entry(None, None),
        entry(Some(0), Some(0.0)),
        entry(Some(42), Some(1.5)),
    ]);
    assert!(!all_transfers_idle(&snapshot));

    let mut engine = RuleEngine::new(only(RuleKind::AllIdle));
    assert!(!engine.evaluate(&snapshot, None).rotate);
}

#[test]
fn test_idle_rule_fires_on_empty_list() {
    let mut engine = RuleEngine::new(only(RuleKind::AllIdle));
    let eval = engine.evaluate(&with_transfers(vec![]), None);
    assert_eq!(eval.fired, vec![RuleKind::AllIdle]);
    assert!(eval.rotate);
}

#[test]
fn test_disabled_rules_never_reported() {
    let mut rules = only(RuleKind::VolumeCeiling);
    rules.volume.ceiling_bytes = u64::MAX;
    let mut engine = RuleEngine::new(rules);

    // Idle and stalled would both fire here, but neither is enabled.
    let eval = engine.evaluate(&with_transfers(vec![]), Some(&snapshot(1)));
    assert!(eval.fired.is_empty());
    assert!(!eval.rotate);
}

#[test]
fn test_quorum_two_needs_both() {
    let mut rules = only(RuleKind::StalledProgress);
    rules.idle.enabled = true;
    rules.stalled.threshold = 1;
    rules.quorum = 2;
    let mut engine = RuleEngine::new(rules);

    let moving = StatsSnapshot {
        bytes: 100,
        transferring: vec![entry(Some(100), Some(9.0))],
        ..Default::default()
    };
    let eval = engine.evaluate(&moving, Some(&moving));
    assert_eq!(eval.fired, vec![RuleKind::StalledProgress]);
    assert!(!eval.rotate);

    let idle = snapshot(100);
    let eval = engine.evaluate(&idle, Some(&moving));
    assert_eq!(eval.fired_count(), 2);
    assert!(eval.rotate);
}

/// Snapshot on which every rule fires given `fire_everything` rules.
fn firing_snapshot() -> StatsSnapshot {
    StatsSnapshot {
        bytes: 100,
        last_error: Some("userRateLimitExceeded".to_string()),
        ..Default::default()
    }
}

fn fire_everything(enabled: [bool; 4], quorum: u32) -> RulesConfig {
    RulesConfig {
        quorum,
        volume: VolumeRule {
            enabled: enabled[0],
            ceiling_bytes: 10,
        },
        stalled: StalledRule {
            enabled: enabled[1],
            threshold: 1,
        },
        rate_limit: RateLimitRule {
            enabled: enabled[2],
            ..Default::default()
        },
        idle: IdleRule {
            enabled: enabled[3],
        },
    }
}

proptest! {
    #[test]
    fn prop_rotate_iff_fired_reaches_quorum(
        enabled in proptest::array::uniform4(any::<bool>()),
        quorum in 1u32..6,
        ticks in 1usize..5,
    ) {
        let rules = fire_everything(enabled, quorum);
        let enabled_count = rules.enabled_rules().len();
        let mut engine = RuleEngine::new(rules);
        let snap = firing_snapshot();

        for _ in 0..ticks {
            let eval = engine.evaluate(&snap, Some(&snap));
            prop_assert_eq!(eval.fired_count(), enabled_count);
            prop_assert_eq!(eval.rotate, enabled_count >= quorum as usize);
            if quorum as usize > enabled_count {
                prop_assert!(!eval.rotate);
            }
        }
    }
}

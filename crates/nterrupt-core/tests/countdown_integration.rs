//! Integration tests for countdown behavior.
//!
//! Drives the engine with a simulated clock and a recording scheduler, the
//! same way a host would deliver wake-ups and refresh ticks.

use std::sync::Arc;

use nterrupt_core::host::RecordingScheduler;
use nterrupt_core::storage::EngineConfig;
use nterrupt_core::{Clock, CountdownEngine, Event, ManualClock, MemoryCountdownStore};
use proptest::prelude::*;

const T0: u64 = 1_700_000_000_000;

fn engine_at(start_ms: u64) -> (CountdownEngine, ManualClock, RecordingScheduler) {
    let clock = ManualClock::new(start_ms);
    let scheduler = RecordingScheduler::new();
    let engine = CountdownEngine::new(
        Box::new(MemoryCountdownStore::new()),
        Box::new(scheduler.clone()),
        Arc::new(clock.clone()),
        &EngineConfig::default(),
    );
    (engine, clock, scheduler)
}

/// Deliver due wake-ups and one refresh tick, like a host event loop.
fn pump(engine: &mut CountdownEngine, scheduler: &RecordingScheduler, now_ms: u64) -> Vec<Event> {
    let mut events = Vec::new();
    for entity_id in scheduler.fire_due(now_ms) {
        events.extend(engine.on_wake(&entity_id));
    }
    events.extend(engine.tick());
    events
}

fn expiries(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::BlockExpired { .. }))
        .count()
}

#[test]
fn test_example_scenario() {
    let (mut engine, clock, scheduler) = engine_at(T0);
    engine
        .start("com.example.social", "Social", 300_000)
        .unwrap();
    assert_eq!(engine.remaining_time("com.example.social"), 300_000);

    let mut events = Vec::new();
    clock.set(T0 + 299_000);
    events.extend(pump(&mut engine, &scheduler, clock.now_ms()));
    assert_eq!(engine.remaining_time("com.example.social"), 1_000);

    clock.set(T0 + 300_000);
    events.extend(pump(&mut engine, &scheduler, clock.now_ms()));
    assert_eq!(engine.remaining_time("com.example.social"), 0);
    assert!(engine.block("com.example.social").is_none());

    clock.advance(5_000);
    events.extend(pump(&mut engine, &scheduler, clock.now_ms()));
    assert_eq!(expiries(&events), 1);
}

#[test]
fn test_expiry_exactness() {
    let (mut engine, clock, scheduler) = engine_at(T0);
    engine.start("app", "Test", 2_000).unwrap();

    clock.advance(2_000);
    pump(&mut engine, &scheduler, T0 + 2_000);

    assert!(!engine.is_active("app"));
    assert!(engine.block("app").is_none());
    assert_eq!(engine.active_count(), 0);
}

#[test]
fn test_concurrent_block_replacement() {
    let (mut engine, clock, scheduler) = engine_at(T0);
    engine.start("app", "App", 10_000).unwrap();
    engine.start("app", "App", 3_000).unwrap();

    assert_eq!(engine.active_count(), 1);
    assert_eq!(engine.block("app").unwrap().expiry_ms, T0 + 3_000);

    // The block ends with the second expiry, once.
    clock.set(T0 + 3_000);
    let mut events = pump(&mut engine, &scheduler, T0 + 3_000);

    // Nothing stale fires at the first call's expiry.
    engine.start("app", "App", 60_000).unwrap();
    clock.set(T0 + 10_000);
    events.extend(pump(&mut engine, &scheduler, T0 + 10_000));

    assert_eq!(expiries(&events), 1);
    assert!(engine.is_active("app"));
}

#[test]
fn test_missed_ticks_do_not_drift() {
    let (mut engine, clock, _scheduler) = engine_at(T0);
    engine.start("app", "App", 600_000).unwrap();

    // The host suspends the process: no ticks for four minutes.
    clock.advance(240_000);
    assert_eq!(engine.remaining_time("app"), 360_000);
    engine.tick();
    clock.advance(1_000);
    assert_eq!(engine.remaining_time("app"), 359_000);
}

#[test]
fn test_stop_twice_is_harmless() {
    let (mut engine, _clock, _scheduler) = engine_at(T0);
    engine.start("app", "App", 10_000).unwrap();
    engine.stop("app");
    engine.stop("app");
    assert_eq!(engine.remaining_time("app"), 0);
    assert!(!engine.is_active("app"));
}

proptest! {
    #[test]
    fn prop_remaining_equals_duration_right_after_start(duration_ms in 1u64..=86_400_000) {
        let (mut engine, _clock, _scheduler) = engine_at(T0);
        engine.start("app", "App", duration_ms).unwrap();
        prop_assert_eq!(engine.remaining_time("app"), duration_ms);
    }

    #[test]
    fn prop_remaining_never_increases(
        duration_ms in 1u64..=600_000,
        steps in proptest::collection::vec(0u64..=120_000, 1..20),
    ) {
        let (mut engine, clock, scheduler) = engine_at(T0);
        engine.start("app", "App", duration_ms).unwrap();

        let mut previous = engine.remaining_time("app");
        let mut now = T0;
        for step in steps {
            now += step;
            clock.set(now);
            pump(&mut engine, &scheduler, now);
            let current = engine.remaining_time("app");
            prop_assert!(current <= previous);
            prop_assert_eq!(current, (T0 + duration_ms).saturating_sub(now));
            previous = current;
        }
    }

    #[test]
    fn prop_expiry_broadcast_at_most_once(
        duration_ms in 1u64..=60_000,
        steps in proptest::collection::vec(1u64..=30_000, 1..30),
    ) {
        let (mut engine, clock, scheduler) = engine_at(T0);
        engine.start("app", "App", duration_ms).unwrap();

        let mut events = Vec::new();
        let mut now = T0;
        for step in steps {
            now += step;
            clock.set(now);
            events.extend(pump(&mut engine, &scheduler, now));
            // Duplicate wake-up delivery.
            events.extend(engine.on_wake("app"));
        }
        if now >= T0 + duration_ms {
            prop_assert_eq!(expiries(&events), 1);
            prop_assert!(engine.block("app").is_none());
        } else {
            prop_assert_eq!(expiries(&events), 0);
        }
    }

    #[test]
    fn prop_blank_ids_are_rejected(id in "[ \t]{0,4}") {
        let (mut engine, _clock, scheduler) = engine_at(T0);
        prop_assert!(engine.start(&id, "App", 1_000).is_err());
        prop_assert!(engine.start("app", "App", 0).is_err());
        prop_assert_eq!(engine.active_count(), 0);
        prop_assert_eq!(scheduler.repeating_interval(), None);
    }
}

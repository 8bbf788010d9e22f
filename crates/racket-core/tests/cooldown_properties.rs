//! Property coverage for cooldown arithmetic.

use std::sync::Arc;

use contracts::{ActionKey, Actor, GameConfig, Timestamp};
use proptest::prelude::*;
use racket_core::clock::{ManualClock, SyncedClock};
use racket_core::cooldown::CooldownTracker;

fn actor_with_stamp(key: ActionKey, at_ms: i64) -> Actor {
    let mut actor = Actor::new("a", "Ana", "downtown");
    actor
        .last_performed
        .insert(key, Timestamp::from_millis(at_ms));
    actor
}

proptest! {
    /// Remaining time never increases as the clock moves forward, never
    /// goes negative, and never exceeds the configured duration.
    #[test]
    fn remaining_is_monotone_nonincreasing(
        start_ms in 0_i64..1_000_000_000,
        steps in proptest::collection::vec(0_i64..100_000, 1..20),
    ) {
        let config = GameConfig::default();
        let local = Arc::new(ManualClock::new(start_ms));
        let clock = SyncedClock::new(local.clone());
        let tracker = CooldownTracker { clock: &clock, config: &config };
        let actor = actor_with_stamp(ActionKey::Attack, start_ms);
        let duration = config.cooldown_ms(ActionKey::Attack);

        let mut previous = tracker.remaining_ms(&actor, ActionKey::Attack);
        prop_assert_eq!(previous, duration);

        for step in steps {
            local.advance(step);
            let current = tracker.remaining_ms(&actor, ActionKey::Attack);
            prop_assert!(current <= previous, "remaining must not grow");
            prop_assert!(current >= 0, "remaining must not go negative");
            prop_assert!(current <= duration, "remaining must not exceed duration");
            previous = current;
        }
    }

    /// The seconds view always rounds up, so a lockout never displays as
    /// over while milliseconds remain.
    #[test]
    fn seconds_view_rounds_up(elapsed_ms in 0_i64..10_000_000) {
        let config = GameConfig::default();
        let start_ms = 1_000_000;
        let local = Arc::new(ManualClock::new(start_ms));
        let clock = SyncedClock::new(local.clone());
        let tracker = CooldownTracker { clock: &clock, config: &config };
        let actor = actor_with_stamp(ActionKey::Attack, start_ms);

        local.advance(elapsed_ms);
        let ms = tracker.remaining_ms(&actor, ActionKey::Attack);
        let seconds = tracker.remaining_seconds(&actor, ActionKey::Attack);
        prop_assert!(seconds * 1000 >= ms);
        prop_assert!((seconds - 1) * 1000 < ms || seconds == 0);
    }
}

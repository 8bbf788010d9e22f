//! Per-action lockout timers keyed by stored last-performed timestamps.

use contracts::{ActionKey, Actor, GameConfig};
use serde_json::Value;

use crate::clock::SyncedClock;
use crate::store::{server_timestamp, StoreError};

/// Answers "how long until this actor may perform that action again."
/// Pure reads over stored state and the synchronized clock; the stamp that
/// starts a cooldown is staged into the acting operation's own transaction.
pub struct CooldownTracker<'a> {
    pub clock: &'a SyncedClock,
    pub config: &'a GameConfig,
}

impl CooldownTracker<'_> {
    pub fn remaining_ms(&self, actor: &Actor, key: ActionKey) -> i64 {
        let Some(last) = actor.last_performed.get(&key) else {
            return 0;
        };
        let duration = self.config.cooldown_ms(key);
        (duration - self.clock.now().since(*last)).max(0)
    }

    pub fn remaining_seconds(&self, actor: &Actor, key: ActionKey) -> i64 {
        let ms = self.remaining_ms(actor, key);
        (ms + 999) / 1000
    }

    pub fn is_locked(&self, actor: &Actor, key: ActionKey) -> bool {
        self.remaining_ms(actor, key) > 0
    }
}

/// The actor document as a JSON value with `last_performed[key]` replaced
/// by a server-timestamp sentinel. Written inside the acting operation's
/// transaction so the stamp and the action's side effects commit together,
/// and the stamp itself is skew-free.
pub fn stamped_actor_value(actor: &Actor, key: ActionKey) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(actor)?;
    value["last_performed"][key.as_str()] = server_timestamp();
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::DocumentStore;
    use contracts::Timestamp;
    use std::sync::Arc;

    #[test]
    fn never_performed_means_no_remaining_time() {
        let config = GameConfig::default();
        let clock = SyncedClock::new(Arc::new(ManualClock::new(1_000_000)));
        let tracker = CooldownTracker {
            clock: &clock,
            config: &config,
        };
        let actor = Actor::new("a", "Ana", "downtown");
        assert_eq!(tracker.remaining_ms(&actor, ActionKey::Attack), 0);
        assert!(!tracker.is_locked(&actor, ActionKey::Attack));
    }

    #[test]
    fn remaining_counts_down_and_floors_at_zero() {
        let config = GameConfig::default();
        let local = Arc::new(ManualClock::new(1_000_000));
        let clock = SyncedClock::new(local.clone());
        let tracker = CooldownTracker {
            clock: &clock,
            config: &config,
        };

        let mut actor = Actor::new("a", "Ana", "downtown");
        actor
            .last_performed
            .insert(ActionKey::Attack, Timestamp::from_millis(1_000_000));

        let full = config.cooldown_ms(ActionKey::Attack);
        assert_eq!(tracker.remaining_ms(&actor, ActionKey::Attack), full);

        local.advance(full / 2);
        assert_eq!(tracker.remaining_ms(&actor, ActionKey::Attack), full / 2);

        local.advance(full);
        assert_eq!(tracker.remaining_ms(&actor, ActionKey::Attack), 0);
    }

    #[test]
    fn remaining_seconds_rounds_up_partial_seconds() {
        let mut config = GameConfig::default();
        config.cooldowns_ms.insert(ActionKey::Robbery, 1_500);
        let local = Arc::new(ManualClock::new(10_000));
        let clock = SyncedClock::new(local);
        let tracker = CooldownTracker {
            clock: &clock,
            config: &config,
        };

        let mut actor = Actor::new("a", "Ana", "downtown");
        actor
            .last_performed
            .insert(ActionKey::Robbery, Timestamp::from_millis(10_000));

        assert_eq!(tracker.remaining_seconds(&actor, ActionKey::Robbery), 2);
    }

    #[test]
    fn stamp_resolves_to_server_time_not_local_time() {
        let server = Arc::new(ManualClock::new(500_000));
        let store = DocumentStore::new(server);
        let actor = Actor::new("a", "Ana", "downtown");

        let stamped = stamped_actor_value(&actor, ActionKey::Attack).expect("stamp");
        store.set_value("actors/a", stamped).expect("write");

        let decoded: Actor = store
            .get_as("actors/a")
            .expect("read")
            .expect("doc present");
        assert_eq!(
            decoded.last_performed.get(&ActionKey::Attack),
            Some(&Timestamp::from_millis(500_000))
        );
    }
}

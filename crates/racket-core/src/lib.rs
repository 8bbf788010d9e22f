//! Arbitration kernel for a persistent multiplayer crime economy.
//!
//! All game-state mutation flows through optimistic, retryable transactions
//! against a versioned document store; a skew-resistant synchronized clock
//! decides every timed condition (cooldown expiry, jail release, production
//! completion). There is no server-side game loop: clients drive every
//! transition and the store arbitrates races at commit time.

pub mod bounty;
pub mod chance;
pub mod clock;
pub mod combat;
pub mod cooldown;
pub mod detention;
pub mod engine;
pub mod events;
pub mod production;
pub mod store;

/// Document-path layout of the game schema.
pub mod paths {
    pub const ACTORS_PREFIX: &str = "actors/";
    pub const BOUNTIES_PREFIX: &str = "bounties/";
    pub const EVENTS_PREFIX: &str = "events/";

    pub fn actor(actor_id: &str) -> String {
        format!("actors/{actor_id}")
    }

    /// Ammo stacks live under the owning actor but are separate documents,
    /// so a combat transaction can validate the stack on its own version.
    pub fn ammo(actor_id: &str, catalog_id: &str) -> String {
        format!("actors/{actor_id}/ammo/{catalog_id}")
    }

    pub fn bounty(bounty_id: &str) -> String {
        format!("bounties/{bounty_id}")
    }

    pub fn alert(target_id: &str, alert_id: &str) -> String {
        format!("alerts/{target_id}/{alert_id}")
    }

    pub fn event(seq: u64) -> String {
        format!("events/{seq:010}")
    }

    /// Whether a path under `actors/` is a top-level actor document rather
    /// than an owned subdocument such as an ammo stack.
    pub fn is_actor_doc(path: &str) -> bool {
        path.strip_prefix(ACTORS_PREFIX)
            .is_some_and(|rest| !rest.contains('/'))
    }
}

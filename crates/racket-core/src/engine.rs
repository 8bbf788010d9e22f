//! Facade over the store, clock, chance source, and component pipelines.
//!
//! Everything above this layer (HTTP handlers, CLI, persistence) talks to
//! [`GameEngine`] and never to a component directly. The engine owns event
//! emission: components return outcomes, the engine appends the public
//! event record after the outcome has committed.

use std::fmt;
use std::sync::{Arc, Mutex};

use contracts::{
    Actor, AmmoStack, AttackAlert, Bounty, ClaimReport, CombatReport, Event, EventType,
    GameConfig, ProductionState, Timestamp, WeaponProfile,
};
use serde_json::json;

use crate::bounty::{BountyBoard, BountyError};
use crate::chance::{ChanceSource, SeededChance};
use crate::clock::{LocalClock, SyncedClock, SystemClock};
use crate::combat::{AttackRequest, CombatError, CombatPipeline};
use crate::detention::{DetentionError, DetentionLifecycle, RescueOutcome};
use crate::events::EventLog;
use crate::paths;
use crate::production::{ProductionError, ProductionScheduler, SlotProgress};
use crate::store::{abort, DocumentStore, StoreError, TxnError};

#[derive(Debug)]
pub enum EngineError {
    ActorNotFound(String),
    NameTaken(String),
    InvalidRequest(String),
    Combat(CombatError),
    Detention(DetentionError),
    Bounty(BountyError),
    Production(ProductionError),
    Contention { attempts: u32 },
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActorNotFound(actor_id) => write!(f, "actor not found: {actor_id}"),
            Self::NameTaken(name) => write!(f, "name already taken: {name}"),
            Self::InvalidRequest(reason) => write!(f, "invalid request: {reason}"),
            Self::Combat(err) => write!(f, "{err}"),
            Self::Detention(err) => write!(f, "{err}"),
            Self::Bounty(err) => write!(f, "{err}"),
            Self::Production(err) => write!(f, "{err}"),
            Self::Contention { attempts } => {
                write!(f, "engine transaction contended after {attempts} attempts")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<CombatError> for EngineError {
    fn from(value: CombatError) -> Self {
        Self::Combat(value)
    }
}

impl From<DetentionError> for EngineError {
    fn from(value: DetentionError) -> Self {
        Self::Detention(value)
    }
}

impl From<BountyError> for EngineError {
    fn from(value: BountyError) -> Self {
        Self::Bounty(value)
    }
}

impl From<ProductionError> for EngineError {
    fn from(value: ProductionError) -> Self {
        Self::Production(value)
    }
}

impl From<TxnError<EngineError>> for EngineError {
    fn from(value: TxnError<EngineError>) -> Self {
        match value {
            TxnError::Aborted(inner) => inner,
            TxnError::Contention { attempts } => Self::Contention { attempts },
            TxnError::Store(err) => Self::Store(err),
        }
    }
}

pub struct GameEngine {
    store: DocumentStore,
    clock: SyncedClock,
    config: GameConfig,
    chance: Mutex<Box<dyn ChanceSource + Send>>,
    events: EventLog,
}

impl fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameEngine")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl GameEngine {
    /// Production wiring: system wall clock on both sides, RNG seeded from
    /// the config.
    pub fn new(config: GameConfig) -> Self {
        let seed = config.seed;
        Self::with_parts(
            config,
            Arc::new(SystemClock),
            Box::new(SeededChance::new(seed)),
        )
    }

    /// Fully injectable wiring for tests and the deterministic demo. The
    /// same clock serves as the store's server clock and the local clock,
    /// so the offset measures exactly the skew a test sets up.
    pub fn with_parts(
        config: GameConfig,
        clock: Arc<dyn LocalClock>,
        chance: Box<dyn ChanceSource + Send>,
    ) -> Self {
        Self {
            store: DocumentStore::new(clock.clone()),
            clock: SyncedClock::new(clock),
            config,
            chance: Mutex::new(chance),
            events: EventLog::new(),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn clock(&self) -> &SyncedClock {
        &self.clock
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Probe-and-readback clock sync. Called once at startup and again on
    /// the configured cadence; failures degrade accuracy, never block.
    pub fn synchronize_clock(&self) -> Result<i64, EngineError> {
        let offset = self.clock.synchronize(&self.store)?;
        self.events.append(
            &self.store,
            EventType::ClockSynced,
            "system",
            None,
            Some(json!({ "offset_ms": offset })),
        )?;
        Ok(offset)
    }

    // ---- actors ----

    pub fn create_actor(&self, name: &str, location_id: &str) -> Result<Actor, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidRequest("empty actor name".to_string()));
        }
        if self.find_actor_by_name(name)?.is_some() {
            return Err(EngineError::NameTaken(name.to_string()));
        }

        let n = self.next_id("actors")?;
        let actor_id = format!("actor_{n:06}");
        let mut actor = Actor::new(actor_id.clone(), name, location_id);
        actor.health = self.config.max_health;
        actor.production = ProductionState::with_slots(self.config.production_slots);
        self.store.set(&paths::actor(&actor_id), &actor)?;

        self.events.append(
            &self.store,
            EventType::ActorCreated,
            &actor_id,
            None,
            Some(json!({ "name": name })),
        )?;
        tracing::info!(%actor_id, name, "actor created");
        Ok(actor)
    }

    pub fn actor(&self, actor_id: &str) -> Result<Actor, EngineError> {
        self.store
            .get_as(&paths::actor(actor_id))?
            .ok_or_else(|| EngineError::ActorNotFound(actor_id.to_string()))
    }

    pub fn actors(&self) -> Result<Vec<Actor>, EngineError> {
        let mut out = Vec::new();
        for (path, doc) in self.store.list_prefix(paths::ACTORS_PREFIX)? {
            if paths::is_actor_doc(&path) {
                out.push(doc.decode()?);
            }
        }
        Ok(out)
    }

    pub fn find_actor_by_name(&self, name: &str) -> Result<Option<Actor>, EngineError> {
        for actor in self.actors()? {
            if actor.name.eq_ignore_ascii_case(name) {
                return Ok(Some(actor));
            }
        }
        Ok(None)
    }

    pub fn equip_weapon(
        &self,
        actor_id: &str,
        weapon: WeaponProfile,
    ) -> Result<(), EngineError> {
        let path = paths::actor(actor_id);
        self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&path)? else {
                return abort(EngineError::ActorNotFound(actor_id.to_string()));
            };
            actor.weapon = Some(weapon.clone());
            txn.set(&path, &actor)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Merge ammunition into the owner's stack for that catalog id.
    pub fn add_ammo(&self, actor_id: &str, stack: AmmoStack) -> Result<(), EngineError> {
        if self.store.get(&paths::actor(actor_id))?.is_none() {
            return Err(EngineError::ActorNotFound(actor_id.to_string()));
        }
        let path = paths::ammo(actor_id, &stack.catalog_id);
        self.store.run_transaction(|txn| {
            let merged = match txn.read_as::<AmmoStack>(&path)? {
                Some(existing) => AmmoStack {
                    quantity: existing.quantity + stack.quantity,
                    ..stack.clone()
                },
                None => stack.clone(),
            };
            txn.set(&path, &merged)?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn grant_cash(&self, actor_id: &str, amount: i64) -> Result<i64, EngineError> {
        let path = paths::actor(actor_id);
        let balance = self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&path)? else {
                return abort(EngineError::ActorNotFound(actor_id.to_string()));
            };
            actor.cash += amount;
            txn.set(&path, &actor)?;
            Ok(actor.cash)
        })?;
        Ok(balance)
    }

    pub fn alerts_for(&self, target_id: &str) -> Result<Vec<AttackAlert>, EngineError> {
        let prefix = format!("alerts/{target_id}/");
        let mut out = Vec::new();
        for (_, doc) in self.store.list_prefix(&prefix)? {
            out.push(doc.decode()?);
        }
        Ok(out)
    }

    // ---- combat ----

    pub fn attack(&self, request: &AttackRequest) -> Result<CombatReport, EngineError> {
        let pipeline = CombatPipeline {
            store: &self.store,
            clock: &self.clock,
            config: &self.config,
        };
        let report = pipeline.resolve(request)?;

        self.events.append(
            &self.store,
            EventType::AttackLanded,
            &request.attacker_id,
            Some(&report.target_id),
            Some(json!({ "damage": report.damage, "shots": report.shots })),
        )?;
        if report.fatal {
            self.events.append(
                &self.store,
                EventType::ActorKilled,
                &request.attacker_id,
                Some(&report.target_id),
                None,
            )?;
            if report.bounty_payout > 0 {
                self.events.append(
                    &self.store,
                    EventType::BountyPaid,
                    &request.attacker_id,
                    Some(&report.target_id),
                    Some(json!({ "payout": report.bounty_payout })),
                )?;
            }
        }
        Ok(report)
    }

    // ---- detention ----

    fn detention(&self) -> DetentionLifecycle<'_> {
        DetentionLifecycle {
            store: &self.store,
            clock: &self.clock,
            config: &self.config,
        }
    }

    pub fn arrest(&self, actor_id: &str) -> Result<Timestamp, EngineError> {
        let release_at = self.detention().arrest(actor_id)?;
        self.events.append(
            &self.store,
            EventType::ActorArrested,
            actor_id,
            None,
            Some(json!({ "release_at": release_at.millis() })),
        )?;
        Ok(release_at)
    }

    pub fn release_if_expired(&self, actor_id: &str) -> Result<bool, EngineError> {
        let released = self.detention().release_if_expired(actor_id)?;
        if released {
            self.events
                .append(&self.store, EventType::ActorReleased, actor_id, None, None)?;
        }
        Ok(released)
    }

    pub fn bribe(&self, actor_id: &str, target_id: &str) -> Result<RescueOutcome, EngineError> {
        let outcome = {
            let mut chance = self
                .chance
                .lock()
                .map_err(|_| EngineError::Store(StoreError::Poisoned))?;
            self.detention().bribe(chance.as_mut(), actor_id, target_id)?
        };
        let event_type = match outcome {
            RescueOutcome::Freed { .. } => EventType::BribeSucceeded,
            RescueOutcome::FailedAndArrested { .. } => EventType::BribeFailed,
        };
        self.events
            .append(&self.store, event_type, actor_id, Some(target_id), None)?;
        Ok(outcome)
    }

    pub fn breakout(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> Result<RescueOutcome, EngineError> {
        let outcome = {
            let mut chance = self
                .chance
                .lock()
                .map_err(|_| EngineError::Store(StoreError::Poisoned))?;
            self.detention()
                .breakout(chance.as_mut(), actor_id, target_id)?
        };
        let event_type = match outcome {
            RescueOutcome::Freed { .. } => EventType::BreakoutSucceeded,
            RescueOutcome::FailedAndArrested { .. } => EventType::BreakoutFailed,
        };
        self.events
            .append(&self.store, event_type, actor_id, Some(target_id), None)?;
        Ok(outcome)
    }

    // ---- bounties ----

    pub fn post_bounty(
        &self,
        poster_id: &str,
        target_id: &str,
        reward: i64,
    ) -> Result<Bounty, EngineError> {
        let n = self.next_id("bounties")?;
        let bounty_id = format!("bounty_{n:06}");
        let board = BountyBoard { store: &self.store };
        let bounty = board.post(&bounty_id, poster_id, target_id, reward)?;
        self.events.append(
            &self.store,
            EventType::BountyPosted,
            poster_id,
            Some(target_id),
            Some(json!({ "bounty_id": bounty.bounty_id, "reward": reward })),
        )?;
        Ok(bounty)
    }

    pub fn cancel_bounty(&self, bounty_id: &str, poster_id: &str) -> Result<Bounty, EngineError> {
        let board = BountyBoard { store: &self.store };
        let bounty = board.cancel(bounty_id, poster_id)?;
        self.events.append(
            &self.store,
            EventType::BountyCancelled,
            poster_id,
            Some(&bounty.target_id),
            Some(json!({ "bounty_id": bounty_id })),
        )?;
        Ok(bounty)
    }

    pub fn bounties(&self) -> Result<Vec<Bounty>, EngineError> {
        let board = BountyBoard { store: &self.store };
        Ok(board.all_open()?)
    }

    // ---- production ----

    fn production(&self) -> ProductionScheduler<'_> {
        ProductionScheduler {
            store: &self.store,
            clock: &self.clock,
            config: &self.config,
        }
    }

    pub fn set_production_selection(
        &self,
        actor_id: &str,
        slot: usize,
        recipe_id: Option<String>,
    ) -> Result<(), EngineError> {
        Ok(self.production().set_selection(actor_id, slot, recipe_id)?)
    }

    pub fn start_production(&self, actor_id: &str) -> Result<(), EngineError> {
        self.production().start(actor_id)?;
        self.events
            .append(&self.store, EventType::ProductionStarted, actor_id, None, None)?;
        Ok(())
    }

    pub fn production_progress(&self, actor_id: &str) -> Result<Vec<SlotProgress>, EngineError> {
        Ok(self.production().progress(actor_id)?)
    }

    pub fn claim_production(&self, actor_id: &str) -> Result<ClaimReport, EngineError> {
        let report = self.production().claim(actor_id)?;
        self.events.append(
            &self.store,
            EventType::ProductionClaimed,
            actor_id,
            None,
            Some(json!({ "completed_slots": report.completed_slots })),
        )?;
        Ok(report)
    }

    // ---- events ----

    pub fn events_since(&self, after: u64) -> Result<Vec<Event>, EngineError> {
        Ok(EventLog::events_since(&self.store, after)?)
    }

    fn next_id(&self, counter: &str) -> Result<u64, EngineError> {
        let path = format!("meta/counters/{counter}");
        let n = self.store.run_transaction(|txn| {
            let current = txn
                .read(&path)?
                .and_then(|doc| doc.data.get("next").and_then(|next| next.as_u64()))
                .unwrap_or(1);
            txn.set_value(&path, json!({ "next": current + 1 }));
            Ok(current)
        })?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chance::ForcedChance;
    use crate::clock::ManualClock;
    use contracts::EventType;

    fn engine() -> GameEngine {
        GameEngine::with_parts(
            GameConfig::default(),
            Arc::new(ManualClock::new(1_000_000)),
            Box::new(ForcedChance::always_succeed()),
        )
    }

    #[test]
    fn create_actor_allocates_sequential_ids() {
        let engine = engine();
        let first = engine.create_actor("Ana", "downtown").expect("create");
        let second = engine.create_actor("Bruno", "harbor").expect("create");
        assert_eq!(first.actor_id, "actor_000001");
        assert_eq!(second.actor_id, "actor_000002");
        assert_eq!(engine.actors().expect("list").len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let engine = engine();
        engine.create_actor("Ana", "downtown").expect("create");
        let result = engine.create_actor("aNA", "harbor");
        assert!(matches!(result, Err(EngineError::NameTaken(_))));
    }

    #[test]
    fn blank_names_are_rejected() {
        let engine = engine();
        let result = engine.create_actor("   ", "downtown");
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn add_ammo_merges_into_existing_stack() {
        let engine = engine();
        let actor = engine.create_actor("Ana", "downtown").expect("create");
        let stack = AmmoStack {
            catalog_id: "ammo:9mm".to_string(),
            power: 2,
            quantity: 10,
        };
        engine.add_ammo(&actor.actor_id, stack.clone()).expect("add");
        engine.add_ammo(&actor.actor_id, stack).expect("add again");

        let stored: AmmoStack = engine
            .store()
            .get_as(&paths::ammo(&actor.actor_id, "ammo:9mm"))
            .expect("read")
            .expect("present");
        assert_eq!(stored.quantity, 20);
    }

    #[test]
    fn attack_appends_public_events() {
        let engine = engine();
        let attacker = engine.create_actor("Ana", "downtown").expect("create");
        engine.create_actor("Bruno", "downtown").expect("create");

        let report = engine
            .attack(&AttackRequest {
                attacker_id: attacker.actor_id.clone(),
                target_name: "Bruno".to_string(),
                ammo_id: None,
                shots: 1,
            })
            .expect("attack");
        assert!(!report.fatal);

        let types: Vec<EventType> = engine
            .events_since(0)
            .expect("events")
            .into_iter()
            .map(|event| event.event_type)
            .collect();
        assert!(types.contains(&EventType::AttackLanded));
        assert!(!types.contains(&EventType::ActorKilled));
    }

    #[test]
    fn bribe_routes_through_injected_chance_and_emits_outcome() {
        let engine = engine();
        let briber = engine.create_actor("Ana", "downtown").expect("create");
        let target = engine.create_actor("Bruno", "downtown").expect("create");
        engine.grant_cash(&briber.actor_id, 50_000).expect("grant");
        engine.arrest(&target.actor_id).expect("arrest");

        let outcome = engine
            .bribe(&briber.actor_id, &target.actor_id)
            .expect("bribe");
        assert!(matches!(outcome, RescueOutcome::Freed { .. }));

        let types: Vec<EventType> = engine
            .events_since(0)
            .expect("events")
            .into_iter()
            .map(|event| event.event_type)
            .collect();
        assert!(types.contains(&EventType::ActorArrested));
        assert!(types.contains(&EventType::BribeSucceeded));
    }

    #[test]
    fn clock_sync_is_observable_as_an_event() {
        let engine = engine();
        let offset = engine.synchronize_clock().expect("sync");
        assert_eq!(offset, 0);
        assert!(engine.clock().is_ready());

        let events = engine.events_since(0).expect("events");
        assert!(events
            .iter()
            .any(|event| event.event_type == EventType::ClockSynced));
    }
}

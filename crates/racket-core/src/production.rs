//! Slot-based production: select recipes, start a shared timer, claim the
//! finished output.
//!
//! Slots run sequentially off one `started_at` stamp: slot `i` only makes
//! progress after every earlier slot has finished. Claiming grants output
//! and resets the run in a single transaction so a retried claim cannot
//! grant twice.

use std::fmt;

use contracts::{Actor, ClaimReport, GameConfig};

use crate::clock::SyncedClock;
use crate::paths;
use crate::store::{abort, server_timestamp, DocumentStore, StoreError, TxnError};

#[derive(Debug)]
pub enum ProductionError {
    ActorNotFound(String),
    SlotOutOfRange { slot: usize, slots: usize },
    /// Selections are frozen while the timer runs.
    ProductionRunning,
    MissingSelection { slot: usize },
    NothingCompleted,
    Contention { attempts: u32 },
    Store(StoreError),
}

impl fmt::Display for ProductionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActorNotFound(actor_id) => write!(f, "actor not found: {actor_id}"),
            Self::SlotOutOfRange { slot, slots } => {
                write!(f, "slot {slot} out of range (have {slots})")
            }
            Self::ProductionRunning => write!(f, "production is already running"),
            Self::MissingSelection { slot } => write!(f, "slot {slot} has no recipe selected"),
            Self::NothingCompleted => write!(f, "no slot has completed yet"),
            Self::Contention { attempts } => {
                write!(f, "production update contended after {attempts} attempts")
            }
            Self::Store(err) => write!(f, "production store error: {err}"),
        }
    }
}

impl std::error::Error for ProductionError {}

impl From<StoreError> for ProductionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TxnError<ProductionError>> for ProductionError {
    fn from(value: TxnError<ProductionError>) -> Self {
        match value {
            TxnError::Aborted(inner) => inner,
            TxnError::Contention { attempts } => Self::Contention { attempts },
            TxnError::Store(err) => Self::Store(err),
        }
    }
}

/// Read-only progress view of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotProgress {
    pub slot: usize,
    pub recipe_id: Option<String>,
    /// 0.0 while waiting on earlier slots, 1.0 when finished.
    pub progress: f64,
}

impl SlotProgress {
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

pub struct ProductionScheduler<'a> {
    pub store: &'a DocumentStore,
    pub clock: &'a SyncedClock,
    pub config: &'a GameConfig,
}

impl ProductionScheduler<'_> {
    pub fn set_selection(
        &self,
        actor_id: &str,
        slot: usize,
        recipe_id: Option<String>,
    ) -> Result<(), ProductionError> {
        let slots = self.config.production_slots;
        if slot >= slots {
            return Err(ProductionError::SlotOutOfRange { slot, slots });
        }
        let actor_path = paths::actor(actor_id);
        self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&actor_path)? else {
                return abort(ProductionError::ActorNotFound(actor_id.to_string()));
            };
            if actor.production.is_running() {
                return abort(ProductionError::ProductionRunning);
            }
            actor.production.selections.resize(slots, None);
            actor.production.selections[slot] = recipe_id.clone();
            txn.set(&actor_path, &actor)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Start the run. Every slot must have a recipe; the timer stamp is a
    /// server timestamp so two devices of the same owner agree on progress.
    pub fn start(&self, actor_id: &str) -> Result<(), ProductionError> {
        let slots = self.config.production_slots;
        let actor_path = paths::actor(actor_id);
        self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&actor_path)? else {
                return abort(ProductionError::ActorNotFound(actor_id.to_string()));
            };
            if actor.production.is_running() {
                return abort(ProductionError::ProductionRunning);
            }
            actor.production.selections.resize(slots, None);
            for (slot, selection) in actor.production.selections.iter().enumerate() {
                if selection.is_none() {
                    return abort(ProductionError::MissingSelection { slot });
                }
            }
            let mut value = serde_json::to_value(&actor).map_err(StoreError::Serde)?;
            value["production"]["started_at"] = server_timestamp();
            txn.set_value(&actor_path, value);
            Ok(())
        })?;
        tracing::info!(actor_id, slots, "production started");
        Ok(())
    }

    /// Per-slot progress, each in `[0, 1]`. Pure read; nothing is written.
    pub fn progress(&self, actor_id: &str) -> Result<Vec<SlotProgress>, ProductionError> {
        let actor: Actor = self
            .store
            .get_as(&paths::actor(actor_id))?
            .ok_or_else(|| ProductionError::ActorNotFound(actor_id.to_string()))?;

        let duration = self.config.slot_duration_ms;
        let now = self.clock.now();
        let mut out = Vec::with_capacity(actor.production.selections.len());
        for (slot, recipe_id) in actor.production.selections.iter().enumerate() {
            let progress = match actor.production.started_at {
                Some(started_at) => {
                    let into_slot = now.since(started_at) - slot as i64 * duration;
                    (into_slot as f64 / duration as f64).clamp(0.0, 1.0)
                }
                None => 0.0,
            };
            out.push(SlotProgress {
                slot,
                recipe_id: recipe_id.clone(),
                progress,
            });
        }
        Ok(out)
    }

    /// Collect the output of every finished slot and reset the run. Grant
    /// and reset commit together; claiming again without a new run fails
    /// with `NothingCompleted`.
    pub fn claim(&self, actor_id: &str) -> Result<ClaimReport, ProductionError> {
        let slots = self.config.production_slots;
        let duration = self.config.slot_duration_ms;
        let actor_path = paths::actor(actor_id);

        let report = self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&actor_path)? else {
                return abort(ProductionError::ActorNotFound(actor_id.to_string()));
            };
            let Some(started_at) = actor.production.started_at else {
                return abort(ProductionError::NothingCompleted);
            };
            let elapsed = self.clock.now().since(started_at);
            let completed = ((elapsed / duration).max(0) as usize).min(slots);
            if completed == 0 {
                return abort(ProductionError::NothingCompleted);
            }

            let mut report = ClaimReport {
                completed_slots: completed,
                granted: Default::default(),
            };
            actor.production.selections.resize(slots, None);
            for slot in 0..completed {
                if let Some(recipe_id) = actor.production.selections[slot].clone() {
                    *actor.inventory.entry(recipe_id.clone()).or_insert(0) += 1;
                    *report.granted.entry(recipe_id).or_insert(0) += 1;
                }
            }

            // Selections in retained families carry over to the next run.
            for selection in actor.production.selections.iter_mut() {
                let keep = selection
                    .as_deref()
                    .and_then(|recipe_id| recipe_id.split(':').next())
                    .is_some_and(|family| self.config.retaining_families.contains(family));
                if !keep {
                    *selection = None;
                }
            }
            actor.production.started_at = None;

            txn.set(&actor_path, &actor)?;
            Ok(report)
        })?;

        tracing::info!(
            actor_id,
            completed = report.completed_slots,
            "production claimed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    struct Fixture {
        store: DocumentStore,
        clock: SyncedClock,
        local: Arc<ManualClock>,
        config: GameConfig,
    }

    fn fixture_with_slots(slots: usize) -> Fixture {
        let local = Arc::new(ManualClock::new(2_000_000));
        let mut config = GameConfig::default();
        config.production_slots = slots;
        Fixture {
            store: DocumentStore::new(local.clone()),
            clock: SyncedClock::new(local.clone()),
            local,
            config,
        }
    }

    impl Fixture {
        fn scheduler(&self) -> ProductionScheduler<'_> {
            ProductionScheduler {
                store: &self.store,
                clock: &self.clock,
                config: &self.config,
            }
        }

        fn put_actor(&self, actor_id: &str) {
            let actor = Actor::new(actor_id, actor_id, "downtown");
            self.store.set(&paths::actor(actor_id), &actor).expect("write");
        }

        fn actor(&self, actor_id: &str) -> Actor {
            self.store
                .get_as(&paths::actor(actor_id))
                .expect("read")
                .expect("present")
        }
    }

    fn select_all(fx: &Fixture, actor_id: &str, recipes: &[&str]) {
        let scheduler = fx.scheduler();
        for (slot, recipe) in recipes.iter().enumerate() {
            scheduler
                .set_selection(actor_id, slot, Some(recipe.to_string()))
                .expect("select");
        }
    }

    #[test]
    fn start_requires_every_slot_selected() {
        let fx = fixture_with_slots(2);
        fx.put_actor("a");
        let scheduler = fx.scheduler();

        scheduler
            .set_selection("a", 0, Some("drug:meth".to_string()))
            .expect("select");
        let result = scheduler.start("a");
        assert!(matches!(
            result,
            Err(ProductionError::MissingSelection { slot: 1 })
        ));

        scheduler
            .set_selection("a", 1, Some("ammo:9mm".to_string()))
            .expect("select");
        scheduler.start("a").expect("start");
        assert!(fx.actor("a").production.is_running());
    }

    #[test]
    fn selection_is_frozen_while_running() {
        let fx = fixture_with_slots(2);
        fx.put_actor("a");
        select_all(&fx, "a", &["drug:meth", "ammo:9mm"]);
        fx.scheduler().start("a").expect("start");

        let result = fx
            .scheduler()
            .set_selection("a", 0, Some("drug:coke".to_string()));
        assert!(matches!(result, Err(ProductionError::ProductionRunning)));

        let again = fx.scheduler().start("a");
        assert!(matches!(again, Err(ProductionError::ProductionRunning)));
    }

    #[test]
    fn slot_out_of_range_is_rejected_up_front() {
        let fx = fixture_with_slots(2);
        fx.put_actor("a");
        let result = fx.scheduler().set_selection("a", 2, None);
        assert!(matches!(
            result,
            Err(ProductionError::SlotOutOfRange { slot: 2, slots: 2 })
        ));
    }

    #[test]
    fn slots_progress_sequentially() {
        let fx = fixture_with_slots(2);
        fx.put_actor("a");
        select_all(&fx, "a", &["drug:meth", "ammo:9mm"]);
        fx.scheduler().start("a").expect("start");

        let duration = fx.config.slot_duration_ms;
        fx.local.advance(duration / 2);
        let half = fx.scheduler().progress("a").expect("progress");
        assert_eq!(half[0].progress, 0.5);
        assert_eq!(half[1].progress, 0.0);

        fx.local.advance(duration);
        let later = fx.scheduler().progress("a").expect("progress");
        assert_eq!(later[0].progress, 1.0);
        assert_eq!(later[1].progress, 0.5);
        assert!(later[0].is_complete());
        assert!(!later[1].is_complete());
    }

    #[test]
    fn claim_grid_matches_elapsed_time() {
        let duration = GameConfig::default().slot_duration_ms;
        for (elapsed, expected) in [
            (duration / 2, None),
            (duration * 3 / 2, Some(1)),
            (duration * 5 / 2, Some(2)),
        ] {
            let fx = fixture_with_slots(2);
            fx.put_actor("a");
            select_all(&fx, "a", &["drug:meth", "drug:coke"]);
            fx.scheduler().start("a").expect("start");
            fx.local.advance(elapsed);

            match expected {
                None => {
                    let result = fx.scheduler().claim("a");
                    assert!(matches!(result, Err(ProductionError::NothingCompleted)));
                    assert!(fx.actor("a").production.is_running(), "run keeps going");
                }
                Some(completed) => {
                    let report = fx.scheduler().claim("a").expect("claim");
                    assert_eq!(report.completed_slots, completed);
                    let total: u32 = report.granted.values().sum();
                    assert_eq!(total as usize, completed);
                }
            }
        }
    }

    #[test]
    fn claim_grants_inventory_and_resets_atomically() {
        let fx = fixture_with_slots(2);
        fx.put_actor("a");
        select_all(&fx, "a", &["ammo:9mm", "drug:meth"]);
        fx.scheduler().start("a").expect("start");
        fx.local.advance(fx.config.slot_duration_ms * 3);

        let report = fx.scheduler().claim("a").expect("claim");
        assert_eq!(report.completed_slots, 2);
        assert_eq!(report.granted.get("ammo:9mm"), Some(&1));
        assert_eq!(report.granted.get("drug:meth"), Some(&1));

        let actor = fx.actor("a");
        assert_eq!(actor.inventory.get("ammo:9mm"), Some(&1));
        assert_eq!(actor.inventory.get("drug:meth"), Some(&1));
        assert!(!actor.production.is_running());

        // The ammo family keeps its selection; the drug slot resets.
        assert_eq!(
            actor.production.selections,
            vec![Some("ammo:9mm".to_string()), None]
        );

        // Nothing left to claim until the next run starts.
        let again = fx.scheduler().claim("a");
        assert!(matches!(again, Err(ProductionError::NothingCompleted)));
    }
}

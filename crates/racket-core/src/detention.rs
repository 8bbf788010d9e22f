//! Jail state machine: arrest, natural release, bribe, breakout.
//!
//! An actor cycles between Free and Detained for its whole life. Every
//! release path re-checks detention liveness inside a transaction; two
//! clients racing to free the same target cannot double-apply, and the
//! loser sees a clean no-op.

use std::fmt;

use contracts::{Actor, GameConfig, Timestamp};

use crate::chance::ChanceSource;
use crate::clock::SyncedClock;
use crate::paths;
use crate::store::{abort, DocumentStore, StoreError, TxnError};

#[derive(Debug)]
pub enum DetentionError {
    ActorNotFound(String),
    /// The target is not currently detained; nothing was charged or rolled.
    NotJailed(String),
    NoFunds { required: i64, available: i64 },
    Contention { attempts: u32 },
    Store(StoreError),
}

impl fmt::Display for DetentionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActorNotFound(actor_id) => write!(f, "actor not found: {actor_id}"),
            Self::NotJailed(actor_id) => write!(f, "actor is not in jail: {actor_id}"),
            Self::NoFunds {
                required,
                available,
            } => write!(f, "insufficient cash: required={required} available={available}"),
            Self::Contention { attempts } => {
                write!(f, "detention update contended after {attempts} attempts")
            }
            Self::Store(err) => write!(f, "detention store error: {err}"),
        }
    }
}

impl std::error::Error for DetentionError {}

impl From<StoreError> for DetentionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TxnError<DetentionError>> for DetentionError {
    fn from(value: TxnError<DetentionError>) -> Self {
        match value {
            TxnError::Aborted(inner) => inner,
            TxnError::Contention { attempts } => Self::Contention { attempts },
            TxnError::Store(err) => Self::Store(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescueOutcome {
    Freed {
        cost_paid: i64,
    },
    /// The roll failed; the rescuer is now jailed themselves. Any stake
    /// paid stays paid.
    FailedAndArrested {
        cost_paid: i64,
        rescuer_release_at: Timestamp,
    },
}

pub struct DetentionLifecycle<'a> {
    pub store: &'a DocumentStore,
    pub clock: &'a SyncedClock,
    pub config: &'a GameConfig,
}

impl DetentionLifecycle<'_> {
    /// Free -> Detained. Sentence scales with accumulated heat, which is
    /// spent (reset to zero) by the arrest.
    pub fn arrest(&self, actor_id: &str) -> Result<Timestamp, DetentionError> {
        let path = paths::actor(actor_id);
        let release_at = self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&path)? else {
                return abort(DetentionError::ActorNotFound(actor_id.to_string()));
            };
            let release_at = self
                .clock
                .now()
                .plus_millis(self.config.sentence_ms(actor.heat));
            actor.in_detention = true;
            actor.release_at = Some(release_at);
            actor.heat = 0;
            txn.set(&path, &actor)?;
            Ok(release_at)
        })?;
        tracing::info!(actor_id, release_at_ms = release_at.millis(), "actor arrested");
        Ok(release_at)
    }

    /// Live detention check: jailed and the sentence has not yet run out.
    pub fn is_still_detained(&self, actor_id: &str) -> Result<bool, DetentionError> {
        let actor: Actor = self
            .store
            .get_as(&paths::actor(actor_id))?
            .ok_or_else(|| DetentionError::ActorNotFound(actor_id.to_string()))?;
        let now = self.clock.now();
        Ok(actor.in_detention && actor.release_at.map_or(true, |at| at > now))
    }

    /// Detained -> Free when the sentence has expired. Guarded transaction:
    /// re-reads inside, writes nothing unless the release is due. Safe to
    /// call speculatively on every page load; idempotent on free actors.
    pub fn release_if_expired(&self, actor_id: &str) -> Result<bool, DetentionError> {
        let path = paths::actor(actor_id);
        let released = self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&path)? else {
                return abort(DetentionError::ActorNotFound(actor_id.to_string()));
            };
            if !actor.in_detention {
                return Ok(false);
            }
            if actor.release_at.is_some_and(|at| at > self.clock.now()) {
                return Ok(false);
            }
            actor.in_detention = false;
            actor.release_at = None;
            txn.set(&path, &actor)?;
            Ok(true)
        })?;
        if released {
            tracing::info!(actor_id, "detention expired, actor released");
        }
        Ok(released)
    }

    /// Pay the bribe stake and roll for the target's freedom. The stake is
    /// committed before the roll and stays paid whatever the outcome; a
    /// failed roll jails the briber, not the target.
    pub fn bribe(
        &self,
        chance: &mut dyn ChanceSource,
        actor_id: &str,
        target_id: &str,
    ) -> Result<RescueOutcome, DetentionError> {
        self.rescue(
            chance,
            actor_id,
            target_id,
            self.config.bribe_cost,
            self.config.chance_bribe,
        )
    }

    /// Free the target by force: no stake, lower odds, same failure mode.
    pub fn breakout(
        &self,
        chance: &mut dyn ChanceSource,
        actor_id: &str,
        target_id: &str,
    ) -> Result<RescueOutcome, DetentionError> {
        self.rescue(chance, actor_id, target_id, 0, self.config.chance_breakout)
    }

    fn rescue(
        &self,
        chance: &mut dyn ChanceSource,
        actor_id: &str,
        target_id: &str,
        cost: i64,
        probability: f64,
    ) -> Result<RescueOutcome, DetentionError> {
        // Liveness check before any cost is paid or any chance rolled.
        // A third party may already have freed the target.
        if !self.is_still_detained(target_id)? {
            return Err(DetentionError::NotJailed(target_id.to_string()));
        }

        if cost > 0 {
            let path = paths::actor(actor_id);
            self.store.run_transaction(|txn| {
                let Some(mut actor) = txn.read_as::<Actor>(&path)? else {
                    return abort(DetentionError::ActorNotFound(actor_id.to_string()));
                };
                if actor.cash < cost {
                    return abort(DetentionError::NoFunds {
                        required: cost,
                        available: actor.cash,
                    });
                }
                actor.cash -= cost;
                txn.set(&path, &actor)?;
                Ok(())
            })?;
        }

        if chance.succeeds(probability) {
            self.clear_detention(target_id)?;
            tracing::info!(actor_id, target_id, cost, "rescue succeeded");
            Ok(RescueOutcome::Freed { cost_paid: cost })
        } else {
            let rescuer_release_at = self.arrest(actor_id)?;
            tracing::info!(actor_id, target_id, cost, "rescue failed, rescuer jailed");
            Ok(RescueOutcome::FailedAndArrested {
                cost_paid: cost,
                rescuer_release_at,
            })
        }
    }

    /// Unconditionally clear the target's detention. No-op if a concurrent
    /// release got there first.
    fn clear_detention(&self, target_id: &str) -> Result<(), DetentionError> {
        let path = paths::actor(target_id);
        self.store.run_transaction(|txn| {
            let Some(mut actor) = txn.read_as::<Actor>(&path)? else {
                return abort(DetentionError::ActorNotFound(target_id.to_string()));
            };
            if !actor.in_detention {
                return Ok(());
            }
            actor.in_detention = false;
            actor.release_at = None;
            txn.set(&path, &actor)?;
            Ok(())
        })?;
        Ok(())
    }
}

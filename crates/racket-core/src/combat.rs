//! Atomic attack resolution with cascading economic effects.
//!
//! Validation happens before any transaction; the damage/ammo/death write
//! is one optimistic transaction that re-reads both the target and the
//! ammunition stack, so two attackers racing on the last rounds in a stack
//! cannot both spend them. The cascade (target alert, bounty payout, kill
//! cooldown stamp) runs after the combat commit but before the caller sees
//! success.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{
    ActionKey, Actor, AmmoStack, AttackAlert, Bounty, CombatReport, GameConfig, Timestamp,
};

use crate::clock::SyncedClock;
use crate::cooldown::{stamped_actor_value, CooldownTracker};
use crate::paths;
use crate::store::{abort, server_timestamp, DocumentStore, StoreError, TxnError};

#[derive(Debug)]
pub enum CombatError {
    AttackerNotFound(String),
    TargetNotFound(String),
    SelfTarget,
    ProtectedTarget(String),
    AlreadyDead(String),
    WrongLocation {
        attacker_location: String,
        target_location: String,
    },
    /// The equipped weapon needs ammunition and none was selected.
    NoAmmoSelected,
    /// Detected inside the transaction: a concurrent attack spent the
    /// stack first. Never retried automatically.
    InsufficientAmmo {
        have: u32,
        need: u32,
    },
    CooldownActive {
        remaining_ms: i64,
    },
    Detained,
    Contention {
        attempts: u32,
    },
    Store(StoreError),
}

impl fmt::Display for CombatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttackerNotFound(actor_id) => write!(f, "attacker not found: {actor_id}"),
            Self::TargetNotFound(name) => write!(f, "no actor named {name}"),
            Self::SelfTarget => write!(f, "cannot attack yourself"),
            Self::ProtectedTarget(name) => write!(f, "target is protected: {name}"),
            Self::AlreadyDead(name) => write!(f, "target is already dead: {name}"),
            Self::WrongLocation {
                attacker_location,
                target_location,
            } => write!(
                f,
                "target is elsewhere: attacker={attacker_location} target={target_location}"
            ),
            Self::NoAmmoSelected => write!(f, "weapon requires ammunition and none is selected"),
            Self::InsufficientAmmo { have, need } => {
                write!(f, "not enough ammunition: have={have} need={need}")
            }
            Self::CooldownActive { remaining_ms } => {
                write!(f, "attack still cooling down: {remaining_ms}ms remaining")
            }
            Self::Detained => write!(f, "attacker is in jail"),
            Self::Contention { attempts } => {
                write!(f, "combat transaction contended after {attempts} attempts")
            }
            Self::Store(err) => write!(f, "combat store error: {err}"),
        }
    }
}

impl std::error::Error for CombatError {}

impl From<StoreError> for CombatError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TxnError<CombatError>> for CombatError {
    fn from(value: TxnError<CombatError>) -> Self {
        match value {
            TxnError::Aborted(inner) => inner,
            TxnError::Contention { attempts } => Self::Contention { attempts },
            TxnError::Store(err) => Self::Store(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttackRequest {
    pub attacker_id: String,
    /// Resolved by unique display name, case-insensitive.
    pub target_name: String,
    pub ammo_id: Option<String>,
    /// Desired shots; clamped to `[1, min(capacity, owned)]`.
    pub shots: u32,
}

struct CommitOutcome {
    damage: i64,
    health_after: u32,
    fatal: bool,
}

pub struct CombatPipeline<'a> {
    pub store: &'a DocumentStore,
    pub clock: &'a SyncedClock,
    pub config: &'a GameConfig,
}

impl CombatPipeline<'_> {
    pub fn resolve(&self, request: &AttackRequest) -> Result<CombatReport, CombatError> {
        let attacker: Actor = self
            .store
            .get_as(&paths::actor(&request.attacker_id))?
            .ok_or_else(|| CombatError::AttackerNotFound(request.attacker_id.clone()))?;

        if attacker.in_detention {
            return Err(CombatError::Detained);
        }
        let tracker = CooldownTracker {
            clock: self.clock,
            config: self.config,
        };
        let remaining_ms = tracker.remaining_ms(&attacker, ActionKey::Attack);
        if remaining_ms > 0 {
            return Err(CombatError::CooldownActive { remaining_ms });
        }

        let target = self.find_by_name(&request.target_name)?;
        if target.actor_id == attacker.actor_id {
            return Err(CombatError::SelfTarget);
        }
        if target.role.is_protected() {
            return Err(CombatError::ProtectedTarget(target.name.clone()));
        }
        if !target.alive {
            return Err(CombatError::AlreadyDead(target.name.clone()));
        }
        if target.location_id != attacker.location_id {
            return Err(CombatError::WrongLocation {
                attacker_location: attacker.location_id.clone(),
                target_location: target.location_id.clone(),
            });
        }

        // Bare hands: power 0, single shot, no ammunition.
        let (weapon_power, capacity, uses_ammo) = attacker
            .weapon
            .as_ref()
            .map(|weapon| (weapon.power, weapon.capacity, weapon.uses_ammo))
            .unwrap_or((0, 1, false));

        let (shots, ammo_path, ammo_power) = if uses_ammo {
            let Some(ammo_id) = request.ammo_id.as_deref() else {
                return Err(CombatError::NoAmmoSelected);
            };
            let ammo_path = paths::ammo(&attacker.actor_id, ammo_id);
            let stack: Option<AmmoStack> = self.store.get_as(&ammo_path)?;
            let (owned, power) = stack
                .map(|stack| (stack.quantity, stack.power))
                .unwrap_or((0, 0));
            let max_shots = capacity.min(owned);
            if max_shots == 0 {
                return Err(CombatError::InsufficientAmmo { have: 0, need: 1 });
            }
            (request.shots.clamp(1, max_shots), Some(ammo_path), power)
        } else {
            (1, None, 0)
        };

        let outcome = self.commit_attack(
            &target.actor_id,
            &request.target_name,
            ammo_path.as_deref(),
            shots,
            weapon_power,
            ammo_power,
        )?;

        // Cascade: best-effort relative to the combat commit, but it runs
        // to completion before the attacker sees success.
        self.write_alert(&attacker, &target, &outcome)?;
        let bounty_payout =
            self.finalize_attacker(&attacker.actor_id, &target.actor_id, outcome.fatal)?;

        tracing::info!(
            attacker_id = %attacker.actor_id,
            target_id = %target.actor_id,
            damage = outcome.damage,
            fatal = outcome.fatal,
            bounty_payout,
            "attack resolved"
        );

        Ok(CombatReport {
            target_id: target.actor_id,
            shots,
            ammo_spent: if uses_ammo { shots } else { 0 },
            damage: outcome.damage,
            target_health_after: outcome.health_after,
            fatal: outcome.fatal,
            bounty_payout,
        })
    }

    fn find_by_name(&self, name: &str) -> Result<Actor, CombatError> {
        for (path, doc) in self.store.list_prefix(paths::ACTORS_PREFIX)? {
            if !paths::is_actor_doc(&path) {
                continue;
            }
            let actor: Actor = doc.decode()?;
            if actor.name.eq_ignore_ascii_case(name) {
                return Ok(actor);
            }
        }
        Err(CombatError::TargetNotFound(name.to_string()))
    }

    /// The atomic heart: target health/death and ammunition spend commit
    /// together or not at all, against versions re-read inside the
    /// transaction.
    fn commit_attack(
        &self,
        target_id: &str,
        target_name: &str,
        ammo_path: Option<&str>,
        shots: u32,
        weapon_power: i64,
        ammo_power: i64,
    ) -> Result<CommitOutcome, CombatError> {
        let target_path = paths::actor(target_id);
        let outcome = self.store.run_transaction(|txn| {
            let Some(mut target) = txn.read_as::<Actor>(&target_path)? else {
                return abort(CombatError::TargetNotFound(target_name.to_string()));
            };
            if !target.alive {
                return abort(CombatError::AlreadyDead(target.name.clone()));
            }

            let stack = match ammo_path {
                Some(path) => {
                    let Some(stack) = txn.read_as::<AmmoStack>(path)? else {
                        return abort(CombatError::InsufficientAmmo {
                            have: 0,
                            need: shots,
                        });
                    };
                    if stack.quantity < shots {
                        return abort(CombatError::InsufficientAmmo {
                            have: stack.quantity,
                            need: shots,
                        });
                    }
                    Some(stack)
                }
                None => None,
            };

            let damage = ((weapon_power + ammo_power) * i64::from(shots)).max(1);
            let health_after = (i64::from(target.health) - damage).max(0) as u32;
            let fatal = health_after == 0;

            target.health = health_after;
            if fatal {
                target.alive = false;
            }
            let mut target_value = serde_json::to_value(&target).map_err(StoreError::Serde)?;
            if fatal {
                target_value["died_at"] = server_timestamp();
            }
            txn.set_value(&target_path, target_value);

            if let (Some(path), Some(mut stack)) = (ammo_path, stack) {
                stack.quantity -= shots;
                if stack.quantity == 0 {
                    txn.delete(path);
                } else {
                    txn.set(path, &stack)?;
                }
            }

            Ok(CommitOutcome {
                damage,
                health_after,
                fatal,
            })
        })?;
        Ok(outcome)
    }

    /// Always notify the target of the attack; notification UI consumes
    /// these records elsewhere. Alert ids come from a process-local
    /// counter, the same scheme the event log uses; two attacks committing
    /// back to back must never share a path.
    fn write_alert(
        &self,
        attacker: &Actor,
        target: &Actor,
        outcome: &CommitOutcome,
    ) -> Result<(), CombatError> {
        static NEXT_ALERT_SEQ: AtomicU64 = AtomicU64::new(1);

        let seq = NEXT_ALERT_SEQ.fetch_add(1, Ordering::SeqCst);
        let alert = AttackAlert {
            alert_id: format!("alert_{seq:010}"),
            target_id: target.actor_id.clone(),
            attacker_name: attacker.name.clone(),
            damage: outcome.damage,
            fatal: outcome.fatal,
            at: Timestamp::default(),
        };
        let mut value = serde_json::to_value(&alert).map_err(StoreError::Serde)?;
        value["at"] = server_timestamp();
        self.store
            .set_value(&paths::alert(&target.actor_id, &alert.alert_id), value)?;
        Ok(())
    }

    /// Final attacker update: stamp the attack cooldown, and on a kill cash
    /// in every open bounty on the target in the same transaction, so the
    /// payout cannot half-apply.
    fn finalize_attacker(
        &self,
        attacker_id: &str,
        target_id: &str,
        fatal: bool,
    ) -> Result<i64, CombatError> {
        let mut bounty_paths = Vec::new();
        if fatal {
            for (path, doc) in self.store.list_prefix(paths::BOUNTIES_PREFIX)? {
                let bounty: Bounty = doc.decode()?;
                if bounty.target_id == target_id {
                    bounty_paths.push(path);
                }
            }
        }

        let attacker_path = paths::actor(attacker_id);
        let payout = self.store.run_transaction(|txn| {
            let mut payout = 0_i64;
            let mut to_delete = Vec::new();
            for path in &bounty_paths {
                // A concurrently cancelled bounty simply no longer counts.
                if let Some(bounty) = txn.read_as::<Bounty>(path)? {
                    payout += bounty.reward;
                    to_delete.push(path.as_str());
                }
            }

            let Some(mut attacker) = txn.read_as::<Actor>(&attacker_path)? else {
                return abort(CombatError::AttackerNotFound(attacker_id.to_string()));
            };
            attacker.cash += payout;
            let stamped = stamped_actor_value(&attacker, ActionKey::Attack)?;
            for path in &to_delete {
                txn.delete(path);
            }
            txn.set_value(&attacker_path, stamped);
            Ok(payout)
        })?;
        Ok(payout)
    }
}

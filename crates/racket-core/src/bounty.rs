//! Standing kill rewards: posted with escrow, refunded on cancel, paid out
//! by the combat cascade.

use std::fmt;

use contracts::{Actor, Bounty, Timestamp};

use crate::paths;
use crate::store::{abort, server_timestamp, DocumentStore, StoreError, TxnError};

#[derive(Debug)]
pub enum BountyError {
    ActorNotFound(String),
    /// Already paid out, already cancelled, or never existed.
    BountyNotFound(String),
    NotPoster {
        bounty_id: String,
        poster_id: String,
    },
    InvalidReward(i64),
    NoFunds {
        required: i64,
        available: i64,
    },
    Contention {
        attempts: u32,
    },
    Store(StoreError),
}

impl fmt::Display for BountyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActorNotFound(actor_id) => write!(f, "actor not found: {actor_id}"),
            Self::BountyNotFound(bounty_id) => write!(f, "bounty not open: {bounty_id}"),
            Self::NotPoster {
                bounty_id,
                poster_id,
            } => write!(f, "bounty {bounty_id} was not posted by {poster_id}"),
            Self::InvalidReward(reward) => write!(f, "invalid bounty reward: {reward}"),
            Self::NoFunds {
                required,
                available,
            } => write!(f, "insufficient cash: required={required} available={available}"),
            Self::Contention { attempts } => {
                write!(f, "bounty update contended after {attempts} attempts")
            }
            Self::Store(err) => write!(f, "bounty store error: {err}"),
        }
    }
}

impl std::error::Error for BountyError {}

impl From<StoreError> for BountyError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TxnError<BountyError>> for BountyError {
    fn from(value: TxnError<BountyError>) -> Self {
        match value {
            TxnError::Aborted(inner) => inner,
            TxnError::Contention { attempts } => Self::Contention { attempts },
            TxnError::Store(err) => Self::Store(err),
        }
    }
}

pub struct BountyBoard<'a> {
    pub store: &'a DocumentStore,
}

impl BountyBoard<'_> {
    /// Post a bounty, escrowing the reward from the poster's cash in the
    /// same transaction that creates the record.
    pub fn post(
        &self,
        bounty_id: &str,
        poster_id: &str,
        target_id: &str,
        reward: i64,
    ) -> Result<Bounty, BountyError> {
        if reward <= 0 {
            return Err(BountyError::InvalidReward(reward));
        }
        if self
            .store
            .get(&paths::actor(target_id))?
            .is_none()
        {
            return Err(BountyError::ActorNotFound(target_id.to_string()));
        }

        let poster_path = paths::actor(poster_id);
        let bounty_path = paths::bounty(bounty_id);
        self.store.run_transaction(|txn| {
            let Some(mut poster) = txn.read_as::<Actor>(&poster_path)? else {
                return abort(BountyError::ActorNotFound(poster_id.to_string()));
            };
            if poster.cash < reward {
                return abort(BountyError::NoFunds {
                    required: reward,
                    available: poster.cash,
                });
            }
            poster.cash -= reward;
            txn.set(&poster_path, &poster)?;

            let bounty = Bounty {
                bounty_id: bounty_id.to_string(),
                target_id: target_id.to_string(),
                poster_id: poster_id.to_string(),
                reward,
                posted_at: Timestamp::default(),
            };
            let mut value = serde_json::to_value(&bounty).map_err(StoreError::Serde)?;
            value["posted_at"] = server_timestamp();
            txn.set_value(&bounty_path, value);
            Ok(())
        })?;

        let posted: Bounty = self
            .store
            .get_as(&bounty_path)?
            .ok_or_else(|| BountyError::BountyNotFound(bounty_id.to_string()))?;
        tracing::info!(bounty_id, poster_id, target_id, reward, "bounty posted");
        Ok(posted)
    }

    /// Cancel an open bounty, refunding the escrowed reward to the poster.
    /// Loses the race cleanly if the bounty was just paid out by a kill.
    pub fn cancel(&self, bounty_id: &str, poster_id: &str) -> Result<Bounty, BountyError> {
        let bounty_path = paths::bounty(bounty_id);
        let poster_path = paths::actor(poster_id);
        let refunded = self.store.run_transaction(|txn| {
            let Some(bounty) = txn.read_as::<Bounty>(&bounty_path)? else {
                return abort(BountyError::BountyNotFound(bounty_id.to_string()));
            };
            if bounty.poster_id != poster_id {
                return abort(BountyError::NotPoster {
                    bounty_id: bounty_id.to_string(),
                    poster_id: poster_id.to_string(),
                });
            }
            let Some(mut poster) = txn.read_as::<Actor>(&poster_path)? else {
                return abort(BountyError::ActorNotFound(poster_id.to_string()));
            };
            poster.cash += bounty.reward;
            txn.set(&poster_path, &poster)?;
            txn.delete(&bounty_path);
            Ok(bounty)
        })?;
        tracing::info!(bounty_id, poster_id, reward = refunded.reward, "bounty cancelled");
        Ok(refunded)
    }

    /// Every open bounty naming the given target.
    pub fn open_bounties_for(&self, target_id: &str) -> Result<Vec<Bounty>, BountyError> {
        let mut matching = Vec::new();
        for (_, doc) in self.store.list_prefix(paths::BOUNTIES_PREFIX)? {
            let bounty: Bounty = doc.decode()?;
            if bounty.target_id == target_id {
                matching.push(bounty);
            }
        }
        Ok(matching)
    }

    pub fn all_open(&self) -> Result<Vec<Bounty>, BountyError> {
        let mut open = Vec::new();
        for (_, doc) in self.store.list_prefix(paths::BOUNTIES_PREFIX)? {
            open.push(doc.decode()?);
        }
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(ManualClock::new(700_000)))
    }

    fn put_actor(store: &DocumentStore, actor_id: &str, cash: i64) {
        let mut actor = Actor::new(actor_id, actor_id, "downtown");
        actor.cash = cash;
        store.set(&paths::actor(actor_id), &actor).expect("write");
    }

    fn cash_of(store: &DocumentStore, actor_id: &str) -> i64 {
        store
            .get_as::<Actor>(&paths::actor(actor_id))
            .expect("read")
            .expect("present")
            .cash
    }

    #[test]
    fn post_escrows_reward_and_stamps_server_time() {
        let store = store();
        put_actor(&store, "poster", 1_000);
        put_actor(&store, "mark", 0);

        let board = BountyBoard { store: &store };
        let bounty = board.post("b1", "poster", "mark", 400).expect("post");

        assert_eq!(bounty.reward, 400);
        assert_eq!(bounty.posted_at, Timestamp::from_millis(700_000));
        assert_eq!(cash_of(&store, "poster"), 600);
    }

    #[test]
    fn post_without_funds_aborts_cleanly() {
        let store = store();
        put_actor(&store, "poster", 100);
        put_actor(&store, "mark", 0);

        let board = BountyBoard { store: &store };
        let result = board.post("b1", "poster", "mark", 400);

        assert!(matches!(result, Err(BountyError::NoFunds { .. })));
        assert_eq!(cash_of(&store, "poster"), 100);
        assert!(store.get(&paths::bounty("b1")).unwrap().is_none());
    }

    #[test]
    fn cancel_refunds_poster_and_deletes_record() {
        let store = store();
        put_actor(&store, "poster", 1_000);
        put_actor(&store, "mark", 0);
        let board = BountyBoard { store: &store };
        board.post("b1", "poster", "mark", 400).expect("post");

        let cancelled = board.cancel("b1", "poster").expect("cancel");
        assert_eq!(cancelled.reward, 400);
        assert_eq!(cash_of(&store, "poster"), 1_000);
        assert!(store.get(&paths::bounty("b1")).unwrap().is_none());
    }

    #[test]
    fn cancel_by_non_poster_is_rejected() {
        let store = store();
        put_actor(&store, "poster", 1_000);
        put_actor(&store, "other", 1_000);
        put_actor(&store, "mark", 0);
        let board = BountyBoard { store: &store };
        board.post("b1", "poster", "mark", 400).expect("post");

        let result = board.cancel("b1", "other");
        assert!(matches!(result, Err(BountyError::NotPoster { .. })));
        assert!(store.get(&paths::bounty("b1")).unwrap().is_some());
    }

    #[test]
    fn cancel_of_missing_bounty_reports_not_open() {
        let store = store();
        put_actor(&store, "poster", 1_000);
        let board = BountyBoard { store: &store };

        let result = board.cancel("gone", "poster");
        assert!(matches!(result, Err(BountyError::BountyNotFound(_))));
    }

    #[test]
    fn open_bounties_for_filters_by_target() {
        let store = store();
        put_actor(&store, "poster", 10_000);
        put_actor(&store, "mark", 0);
        put_actor(&store, "other", 0);
        let board = BountyBoard { store: &store };
        board.post("b1", "poster", "mark", 100).expect("post");
        board.post("b2", "poster", "other", 250).expect("post");
        board.post("b3", "poster", "mark", 50).expect("post");

        let on_mark = board.open_bounties_for("mark").expect("query");
        let ids: Vec<&str> = on_mark.iter().map(|b| b.bounty_id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b3"]);
    }
}

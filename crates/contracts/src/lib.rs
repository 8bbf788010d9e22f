//! v1 cross-boundary contracts for the racket kernel, API, and persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Epoch milliseconds. Every stored timestamp and every "now" the kernel
/// derives uses this unit.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn plus_millis(self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Signed distance to an earlier timestamp, in milliseconds.
    pub fn since(self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Cooldown-gated actions. Each key owns one stored `last_performed`
/// timestamp and one configured duration.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    Attack,
    VehicleTheft,
    Robbery,
    Heist,
}

impl ActionKey {
    pub const ALL: [ActionKey; 4] = [
        ActionKey::Attack,
        ActionKey::VehicleTheft,
        ActionKey::Robbery,
        ActionKey::Heist,
    ];

    /// The serialized form, usable as a JSON map key.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKey::Attack => "attack",
            ActionKey::VehicleTheft => "vehicle_theft",
            ActionKey::Robbery => "robbery",
            ActionKey::Heist => "heist",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Player,
    Moderator,
    Admin,
}

impl ActorRole {
    /// Elevated roles cannot be attacked.
    pub fn is_protected(self) -> bool {
        !matches!(self, ActorRole::Player)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeaponProfile {
    pub catalog_id: String,
    pub power: i64,
    /// Maximum shots per attack.
    pub capacity: u32,
    pub uses_ammo: bool,
}

/// One stack of a single ammunition type. Stored as its own document under
/// the owning actor so concurrent attacks re-read it transactionally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmmoStack {
    pub catalog_id: String,
    pub power: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionState {
    /// One entry per slot; `None` until the owner selects a recipe.
    #[serde(default)]
    pub selections: Vec<Option<String>>,
    /// Set by a server timestamp when production starts; `None` while idle.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
}

impl ProductionState {
    pub fn with_slots(slots: usize) -> Self {
        Self {
            selections: vec![None; slots],
            started_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}

/// A player's persistent game record. The unit of contention: only the
/// owner writes its timed fields, except combat which writes into the
/// target's health and death fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub actor_id: String,
    pub name: String,
    pub role: ActorRole,
    pub location_id: String,
    pub health: u32,
    pub alive: bool,
    pub died_at: Option<Timestamp>,
    pub cash: i64,
    pub bank: i64,
    /// Accumulated police attention; lengthens the next sentence.
    pub heat: u32,
    pub in_detention: bool,
    /// Present only while `in_detention` is true.
    pub release_at: Option<Timestamp>,
    pub weapon: Option<WeaponProfile>,
    #[serde(default)]
    pub last_performed: BTreeMap<ActionKey, Timestamp>,
    #[serde(default)]
    pub production: ProductionState,
    /// Catalog id -> owned units, for goods that are not their own
    /// documents (everything except ammo).
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
}

impl Actor {
    pub fn new(
        actor_id: impl Into<String>,
        name: impl Into<String>,
        location_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            name: name.into(),
            role: ActorRole::Player,
            location_id: location_id.into(),
            health: 100,
            alive: true,
            died_at: None,
            cash: 0,
            bank: 0,
            heat: 0,
            in_detention: false,
            release_at: None,
            weapon: None,
            last_performed: BTreeMap::new(),
            production: ProductionState::default(),
            inventory: BTreeMap::new(),
        }
    }
}

/// A standing cash reward for killing a specific actor. Funds are escrowed
/// from the poster when the bounty is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bounty {
    pub bounty_id: String,
    pub target_id: String,
    pub poster_id: String,
    pub reward: i64,
    pub posted_at: Timestamp,
}

/// Notification record written for the target of every attack. The kernel's
/// obligation ends at writing this; notification UI consumes it elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackAlert {
    pub alert_id: String,
    pub target_id: String,
    pub attacker_name: String,
    pub damage: i64,
    pub fatal: bool,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub schema_version: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    /// Per-action lockout durations, milliseconds.
    #[serde(default)]
    pub cooldowns_ms: BTreeMap<ActionKey, i64>,
    pub bribe_cost: i64,
    pub chance_bribe: f64,
    pub chance_breakout: f64,
    pub base_sentence_ms: i64,
    /// Added to the sentence once per point of heat.
    pub heat_sentence_ms: i64,
    pub production_slots: usize,
    pub slot_duration_ms: i64,
    /// Recipe families (the `family` in `family:item` ids) whose slot
    /// selections survive a claim; all others reset.
    #[serde(default)]
    pub retaining_families: BTreeSet<String>,
    pub resync_interval_ms: i64,
    pub max_health: u32,
}

impl GameConfig {
    pub fn cooldown_ms(&self, key: ActionKey) -> i64 {
        self.cooldowns_ms.get(&key).copied().unwrap_or(0)
    }

    pub fn sentence_ms(&self, heat: u32) -> i64 {
        self.base_sentence_ms
            .saturating_add(self.heat_sentence_ms.saturating_mul(i64::from(heat)))
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut cooldowns_ms = BTreeMap::new();
        cooldowns_ms.insert(ActionKey::Attack, 120_000);
        cooldowns_ms.insert(ActionKey::VehicleTheft, 180_000);
        cooldowns_ms.insert(ActionKey::Robbery, 300_000);
        cooldowns_ms.insert(ActionKey::Heist, 3_600_000);

        let mut retaining_families = BTreeSet::new();
        retaining_families.insert("ammo".to_string());

        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: 1337,
            cooldowns_ms,
            bribe_cost: 10_000,
            chance_bribe: 0.6,
            chance_breakout: 0.35,
            base_sentence_ms: 20_000,
            heat_sentence_ms: 10_000,
            production_slots: 4,
            slot_duration_ms: 600_000,
            retaining_families,
            resync_interval_ms: 300_000,
            max_health: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ActorCreated,
    AttackLanded,
    ActorKilled,
    BountyPosted,
    BountyCancelled,
    BountyPaid,
    ActorArrested,
    ActorReleased,
    BribeSucceeded,
    BribeFailed,
    BreakoutSucceeded,
    BreakoutFailed,
    ProductionStarted,
    ProductionClaimed,
    ClockSynced,
}

/// Public event record appended for every committed state transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub schema_version: String,
    pub event_id: String,
    pub seq: u64,
    pub event_type: EventType,
    pub at: Timestamp,
    /// Actor whose action produced the event.
    pub subject_id: String,
    /// Other actor involved, when there is one.
    pub object_id: Option<String>,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ActorNotFound,
    BountyNotFound,
    NameTaken,
    TargetNotFound,
    SelfTarget,
    ProtectedTarget,
    AlreadyDead,
    WrongLocation,
    NoAmmoSelected,
    InsufficientAmmo,
    CooldownActive,
    Detained,
    NotJailed,
    NoFunds,
    ProductionRunning,
    MissingSelection,
    NothingCompleted,
    InvalidRequest,
    StoreContention,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

/// Outcome of a resolved attack, returned to the attacking client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatReport {
    pub target_id: String,
    pub shots: u32,
    pub ammo_spent: u32,
    pub damage: i64,
    pub target_health_after: u32,
    pub fatal: bool,
    /// Summed rewards of every bounty cashed in by the kill, zero otherwise.
    pub bounty_payout: i64,
}

/// Outcome of a production claim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimReport {
    pub completed_slots: usize,
    /// Recipe id -> units granted.
    pub granted: BTreeMap<String, u32>,
}

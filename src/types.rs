//! Shared types for the PADDOCK engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that store, engine, and action
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A wagering account. The balance is mutated only by the wagering,
/// settlement, and refund engines — never written directly by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Current balance in virtual currency units. Never negative.
    pub balance: Decimal,
    pub is_admin: bool,
}

impl User {
    pub fn new(name: &str, balance: Decimal, is_admin: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            balance,
            is_admin,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} coins)", self.name, self.balance)
    }
}

// ---------------------------------------------------------------------------
// Race
// ---------------------------------------------------------------------------

/// Race lifecycle status.
///
/// `Settled` is terminal and only ever written by the settlement engine;
/// a direct status update to `settled` is rejected so payout logic can
/// never be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    Upcoming,
    Open,
    Closed,
    Settled,
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceStatus::Upcoming => write!(f, "upcoming"),
            RaceStatus::Open => write!(f, "open"),
            RaceStatus::Closed => write!(f, "closed"),
            RaceStatus::Settled => write!(f, "settled"),
        }
    }
}

impl std::str::FromStr for RaceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" => Ok(RaceStatus::Upcoming),
            "open" => Ok(RaceStatus::Open),
            "closed" => Ok(RaceStatus::Closed),
            "settled" => Ok(RaceStatus::Settled),
            _ => Err(anyhow::anyhow!("Unknown race status: {s}")),
        }
    }
}

/// Placement slot on a race. Drives the payout tier at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementSlot {
    Winner,
    Second,
    Third,
}

impl PlacementSlot {
    /// All slots, in payout order.
    pub const ALL: &'static [PlacementSlot] = &[
        PlacementSlot::Winner,
        PlacementSlot::Second,
        PlacementSlot::Third,
    ];

    /// The place rank recorded on winning bets for this slot.
    pub fn rank(&self) -> u8 {
        match self {
            PlacementSlot::Winner => 1,
            PlacementSlot::Second => 2,
            PlacementSlot::Third => 3,
        }
    }
}

impl fmt::Display for PlacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementSlot::Winner => write!(f, "winner"),
            PlacementSlot::Second => write!(f, "second"),
            PlacementSlot::Third => write!(f, "third"),
        }
    }
}

impl std::str::FromStr for PlacementSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "winner" | "first" | "1" => Ok(PlacementSlot::Winner),
            "second" | "2" => Ok(PlacementSlot::Second),
            "third" | "3" => Ok(PlacementSlot::Third),
            _ => Err(anyhow::anyhow!("Unknown placement slot: {s}")),
        }
    }
}

/// A wagering event with participants, placements, and a lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub id: String,
    pub name: String,
    pub status: RaceStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, by the settlement engine.
    pub settled_at: Option<DateTime<Utc>>,
    pub winner_id: Option<String>,
    pub second_place_id: Option<String>,
    pub third_place_id: Option<String>,
}

impl Race {
    /// A fresh race in the `upcoming` state.
    pub fn new(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            status: RaceStatus::Upcoming,
            created_at: Utc::now(),
            settled_at: None,
            winner_id: None,
            second_place_id: None,
            third_place_id: None,
        }
    }

    /// The player currently assigned to a slot, if any.
    pub fn placement(&self, slot: PlacementSlot) -> Option<&str> {
        match slot {
            PlacementSlot::Winner => self.winner_id.as_deref(),
            PlacementSlot::Second => self.second_place_id.as_deref(),
            PlacementSlot::Third => self.third_place_id.as_deref(),
        }
    }

    /// The slot a player currently occupies, if any.
    pub fn slot_held_by(&self, player_id: &str) -> Option<PlacementSlot> {
        PlacementSlot::ALL
            .iter()
            .copied()
            .find(|slot| self.placement(*slot) == Some(player_id))
    }

    /// Settlement requires winner and second place; third is optional.
    pub fn has_required_placements(&self) -> bool {
        self.winner_id.is_some() && self.second_place_id.is_some()
    }

    /// Helper to build a test race with sensible defaults.
    #[cfg(test)]
    pub fn sample(status: RaceStatus) -> Self {
        let mut race = Race::new("Test Cup");
        race.status = status;
        race
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.status)
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A participant within a race, carrying a payout odds multiplier.
/// Immutable once bets reference it — there is no update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub race_id: String,
    pub name: String,
    /// Decimal odds multiplier, always > 1.
    pub odds: Decimal,
}

impl Player {
    pub fn new(race_id: &str, name: &str, odds: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            race_id: race_id.to_string(),
            name: name.to_string(),
            odds,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.odds)
    }
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// A user's stake on a specific player within a specific race.
///
/// `settled` flips to true exactly once — at race settlement or at
/// race-deletion refund — and `winnings` / `place_rank` never change after
/// that point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub user_id: String,
    pub race_id: String,
    pub player_id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub settled: bool,
    /// Zero until settled; non-zero only on a winning bet.
    pub winnings: Decimal,
    /// 1/2/3 on a placed bet, None on a losing or unsettled bet.
    pub place_rank: Option<u8>,
}

impl Bet {
    /// A fresh unsettled bet.
    pub fn new(user_id: &str, race_id: &str, player_id: &str, amount: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            race_id: race_id.to_string(),
            player_id: player_id.to_string(),
            amount,
            created_at: Utc::now(),
            settled: false,
            winnings: Decimal::ZERO,
            place_rank: None,
        }
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} coins on player {} (settled: {}, winnings: {})",
            self.amount, self.player_id, self.settled, self.winnings,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Underlying persistence failure, surfaced by every store primitive.
#[derive(Debug, Clone, thiserror::Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Domain-specific error taxonomy for the engine.
///
/// Validation errors are raised before any mutation; mutation-sequence
/// failures trigger the compensating rollback documented on each engine
/// operation before propagating as `Store`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        needed: Decimal,
        available: Decimal,
    },

    #[error("race is not open for betting")]
    RaceNotOpen,

    #[error("race cannot be settled without a winner and second place")]
    IncompleteResults,

    #[error("{0}")]
    Conflict(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Action result envelope
// ---------------------------------------------------------------------------

/// The `{success, data?, error?}` result shape handed to callers.
///
/// Success wraps the operation's return value; failure wraps the
/// human-readable error message. Engine errors never cross the caller
/// boundary as panics or raw error types.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T, EngineError>> for ActionResult<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => ActionResult::ok(data),
            Err(e) => ActionResult::err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- RaceStatus tests --

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", RaceStatus::Upcoming), "upcoming");
        assert_eq!(format!("{}", RaceStatus::Open), "open");
        assert_eq!(format!("{}", RaceStatus::Closed), "closed");
        assert_eq!(format!("{}", RaceStatus::Settled), "settled");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("open".parse::<RaceStatus>().unwrap(), RaceStatus::Open);
        assert_eq!("SETTLED".parse::<RaceStatus>().unwrap(), RaceStatus::Settled);
        assert!("running".parse::<RaceStatus>().is_err());
    }

    #[test]
    fn test_status_serialization_roundtrip() {
        for status in [
            RaceStatus::Upcoming,
            RaceStatus::Open,
            RaceStatus::Closed,
            RaceStatus::Settled,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            let parsed: RaceStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, parsed);
        }
    }

    // -- PlacementSlot tests --

    #[test]
    fn test_slot_rank() {
        assert_eq!(PlacementSlot::Winner.rank(), 1);
        assert_eq!(PlacementSlot::Second.rank(), 2);
        assert_eq!(PlacementSlot::Third.rank(), 3);
    }

    #[test]
    fn test_slot_from_str() {
        assert_eq!("winner".parse::<PlacementSlot>().unwrap(), PlacementSlot::Winner);
        assert_eq!("2".parse::<PlacementSlot>().unwrap(), PlacementSlot::Second);
        assert!("fourth".parse::<PlacementSlot>().is_err());
    }

    // -- Race tests --

    #[test]
    fn test_new_race_is_upcoming() {
        let race = Race::new("Spring Handicap");
        assert_eq!(race.status, RaceStatus::Upcoming);
        assert!(race.settled_at.is_none());
        assert!(race.winner_id.is_none());
    }

    #[test]
    fn test_slot_held_by() {
        let mut race = Race::sample(RaceStatus::Open);
        race.winner_id = Some("p1".into());
        race.second_place_id = Some("p2".into());

        assert_eq!(race.slot_held_by("p1"), Some(PlacementSlot::Winner));
        assert_eq!(race.slot_held_by("p2"), Some(PlacementSlot::Second));
        assert_eq!(race.slot_held_by("p3"), None);
    }

    #[test]
    fn test_required_placements() {
        let mut race = Race::sample(RaceStatus::Open);
        assert!(!race.has_required_placements());
        race.winner_id = Some("p1".into());
        assert!(!race.has_required_placements());
        race.second_place_id = Some("p2".into());
        assert!(race.has_required_placements());
        // Third place is never required
        assert!(race.third_place_id.is_none());
    }

    // -- Bet tests --

    #[test]
    fn test_new_bet_is_unsettled() {
        let bet = Bet::new("u1", "r1", "p1", dec!(25));
        assert!(!bet.settled);
        assert_eq!(bet.winnings, Decimal::ZERO);
        assert_eq!(bet.place_rank, None);
        assert_eq!(bet.amount, dec!(25));
    }

    // -- Error tests --

    #[test]
    fn test_error_messages() {
        let e = EngineError::InsufficientBalance {
            needed: dec!(50),
            available: dec!(20),
        };
        assert_eq!(e.to_string(), "insufficient balance: need 50, have 20");

        let e = EngineError::not_found("user", "u9");
        assert_eq!(e.to_string(), "user not found: u9");

        let e = EngineError::Store(StoreError::new("disk on fire"));
        assert_eq!(e.to_string(), "storage error: disk on fire");
    }

    // -- ActionResult tests --

    #[test]
    fn test_action_result_ok_shape() {
        let result = ActionResult::ok(42u32);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_action_result_err_shape() {
        let result: ActionResult<u32> = ActionResult::err(EngineError::RaceNotOpen);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "race is not open for betting");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_action_result_from_result() {
        let ok: ActionResult<u32> = Ok::<_, EngineError>(7).into();
        assert!(ok.success);
        let err: ActionResult<u32> =
            Err::<u32, _>(EngineError::Validation("bad".into())).into();
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("invalid input: bad"));
    }
}

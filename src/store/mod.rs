//! Ledger store abstraction.
//!
//! Defines the `LedgerStore` trait — a transactional key-value-by-id view
//! over users, races, players, and bets — and provides implementations for:
//! - SQLite (sqlx) — the durable relational store
//! - Memory — in-memory rows for tests and demos
//!
//! Each method is a single independent row operation. Multi-row mutations
//! are sequenced by the engines, which own the compensation contracts when
//! a later statement fails.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{Bet, PlacementSlot, Player, Race, RaceStatus, StoreError, User};

/// Abstraction over the relational ledger store.
///
/// No application-level transactions: every call is one statement, and the
/// engines must re-read the freshest row immediately before each dependent
/// write (balance updates in particular).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -- Users --

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// All users, highest balance first (leaderboard order).
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Overwrite a user's balance with a freshly computed value.
    async fn update_user_balance(&self, id: &str, balance: Decimal) -> Result<(), StoreError>;

    // -- Races --

    async fn insert_race(&self, race: &Race) -> Result<(), StoreError>;

    async fn get_race(&self, id: &str) -> Result<Option<Race>, StoreError>;

    /// All races, newest first.
    async fn list_races(&self) -> Result<Vec<Race>, StoreError>;

    /// Persist a race's status; `settled_at` is written alongside when the
    /// settlement engine moves a race to its terminal state.
    async fn update_race_status(
        &self,
        id: &str,
        status: RaceStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Persist a single placement foreign key on the race row.
    async fn set_race_placement(
        &self,
        id: &str,
        slot: PlacementSlot,
        player_id: &str,
    ) -> Result<(), StoreError>;

    /// Null out winner/second/third in one statement (pre-deletion step).
    async fn clear_race_placements(&self, id: &str) -> Result<(), StoreError>;

    async fn delete_race(&self, id: &str) -> Result<(), StoreError>;

    // -- Players --

    async fn insert_player(&self, player: &Player) -> Result<(), StoreError>;

    async fn get_player(&self, id: &str) -> Result<Option<Player>, StoreError>;

    async fn players_for_race(&self, race_id: &str) -> Result<Vec<Player>, StoreError>;

    async fn delete_players_for_race(&self, race_id: &str) -> Result<(), StoreError>;

    // -- Bets --

    async fn insert_bet(&self, bet: &Bet) -> Result<(), StoreError>;

    async fn get_bet(&self, id: &str) -> Result<Option<Bet>, StoreError>;

    async fn bets_for_race(&self, race_id: &str) -> Result<Vec<Bet>, StoreError>;

    /// Only bets with `settled = false` — the settlement engine's
    /// exactly-once filter.
    async fn unsettled_bets_for_race(&self, race_id: &str) -> Result<Vec<Bet>, StoreError>;

    async fn bets_for_user_race(
        &self,
        user_id: &str,
        race_id: &str,
    ) -> Result<Vec<Bet>, StoreError>;

    async fn update_bet_amount(&self, id: &str, amount: Decimal) -> Result<(), StoreError>;

    /// Mark a bet settled, persisting its final winnings and place rank.
    async fn mark_bet_settled(
        &self,
        id: &str,
        winnings: Decimal,
        place_rank: Option<u8>,
    ) -> Result<(), StoreError>;

    async fn delete_bets_for_race(&self, race_id: &str) -> Result<(), StoreError>;
}

//! In-memory ledger store.
//!
//! Holds all rows in `Mutex`-guarded vectors — the moral equivalent of the
//! relational store, minus durability. Used by tests and demo setups, and
//! supports per-operation failure injection so engine compensation paths
//! can be exercised deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Mutex;

use super::LedgerStore;
use crate::types::{Bet, PlacementSlot, Player, Race, RaceStatus, StoreError, User};

/// An in-memory row store.
///
/// All state is controllable from test code; `fail_on` makes a named
/// operation return a `StoreError` until cleared.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
    races: Mutex<Vec<Race>>,
    players: Mutex<Vec<Player>>,
    bets: Mutex<Vec<Bet>>,
    fail_ops: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a named operation (e.g. `"insert_bet"`) to fail until cleared.
    pub fn fail_on(&self, op: &str) {
        self.fail_ops.lock().unwrap().insert(op.to_string());
    }

    /// Clear all forced failures.
    pub fn clear_failures(&self) {
        self.fail_ops.lock().unwrap().clear();
    }

    fn check(&self, op: &str) -> Result<(), StoreError> {
        if self.fail_ops.lock().unwrap().contains(op) {
            return Err(StoreError::new(format!("injected failure: {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    // -- Users --

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.check("insert_user")?;
        self.users.lock().unwrap().push(user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.check("get_user")?;
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.check("list_users")?;
        let mut users = self.users.lock().unwrap().clone();
        users.sort_by(|a, b| b.balance.cmp(&a.balance));
        Ok(users)
    }

    async fn update_user_balance(&self, id: &str, balance: Decimal) -> Result<(), StoreError> {
        self.check("update_user_balance")?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::new(format!("no user row: {id}")))?;
        user.balance = balance;
        Ok(())
    }

    // -- Races --

    async fn insert_race(&self, race: &Race) -> Result<(), StoreError> {
        self.check("insert_race")?;
        self.races.lock().unwrap().push(race.clone());
        Ok(())
    }

    async fn get_race(&self, id: &str) -> Result<Option<Race>, StoreError> {
        self.check("get_race")?;
        Ok(self.races.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn list_races(&self) -> Result<Vec<Race>, StoreError> {
        self.check("list_races")?;
        let mut races = self.races.lock().unwrap().clone();
        races.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(races)
    }

    async fn update_race_status(
        &self,
        id: &str,
        status: RaceStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.check("update_race_status")?;
        let mut races = self.races.lock().unwrap();
        let race = races
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::new(format!("no race row: {id}")))?;
        race.status = status;
        if let Some(at) = settled_at {
            race.settled_at = Some(at);
        }
        Ok(())
    }

    async fn set_race_placement(
        &self,
        id: &str,
        slot: PlacementSlot,
        player_id: &str,
    ) -> Result<(), StoreError> {
        self.check("set_race_placement")?;
        let mut races = self.races.lock().unwrap();
        let race = races
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::new(format!("no race row: {id}")))?;
        let field = match slot {
            PlacementSlot::Winner => &mut race.winner_id,
            PlacementSlot::Second => &mut race.second_place_id,
            PlacementSlot::Third => &mut race.third_place_id,
        };
        *field = Some(player_id.to_string());
        Ok(())
    }

    async fn clear_race_placements(&self, id: &str) -> Result<(), StoreError> {
        self.check("clear_race_placements")?;
        let mut races = self.races.lock().unwrap();
        let race = races
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::new(format!("no race row: {id}")))?;
        race.winner_id = None;
        race.second_place_id = None;
        race.third_place_id = None;
        Ok(())
    }

    async fn delete_race(&self, id: &str) -> Result<(), StoreError> {
        self.check("delete_race")?;
        self.races.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    // -- Players --

    async fn insert_player(&self, player: &Player) -> Result<(), StoreError> {
        self.check("insert_player")?;
        self.players.lock().unwrap().push(player.clone());
        Ok(())
    }

    async fn get_player(&self, id: &str) -> Result<Option<Player>, StoreError> {
        self.check("get_player")?;
        Ok(self
            .players
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn players_for_race(&self, race_id: &str) -> Result<Vec<Player>, StoreError> {
        self.check("players_for_race")?;
        Ok(self
            .players
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.race_id == race_id)
            .cloned()
            .collect())
    }

    async fn delete_players_for_race(&self, race_id: &str) -> Result<(), StoreError> {
        self.check("delete_players_for_race")?;
        self.players.lock().unwrap().retain(|p| p.race_id != race_id);
        Ok(())
    }

    // -- Bets --

    async fn insert_bet(&self, bet: &Bet) -> Result<(), StoreError> {
        self.check("insert_bet")?;
        self.bets.lock().unwrap().push(bet.clone());
        Ok(())
    }

    async fn get_bet(&self, id: &str) -> Result<Option<Bet>, StoreError> {
        self.check("get_bet")?;
        Ok(self.bets.lock().unwrap().iter().find(|b| b.id == id).cloned())
    }

    async fn bets_for_race(&self, race_id: &str) -> Result<Vec<Bet>, StoreError> {
        self.check("bets_for_race")?;
        Ok(self
            .bets
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.race_id == race_id)
            .cloned()
            .collect())
    }

    async fn unsettled_bets_for_race(&self, race_id: &str) -> Result<Vec<Bet>, StoreError> {
        self.check("unsettled_bets_for_race")?;
        Ok(self
            .bets
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.race_id == race_id && !b.settled)
            .cloned()
            .collect())
    }

    async fn bets_for_user_race(
        &self,
        user_id: &str,
        race_id: &str,
    ) -> Result<Vec<Bet>, StoreError> {
        self.check("bets_for_user_race")?;
        Ok(self
            .bets
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.user_id == user_id && b.race_id == race_id)
            .cloned()
            .collect())
    }

    async fn update_bet_amount(&self, id: &str, amount: Decimal) -> Result<(), StoreError> {
        self.check("update_bet_amount")?;
        let mut bets = self.bets.lock().unwrap();
        let bet = bets
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::new(format!("no bet row: {id}")))?;
        bet.amount = amount;
        Ok(())
    }

    async fn mark_bet_settled(
        &self,
        id: &str,
        winnings: Decimal,
        place_rank: Option<u8>,
    ) -> Result<(), StoreError> {
        self.check("mark_bet_settled")?;
        let mut bets = self.bets.lock().unwrap();
        let bet = bets
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::new(format!("no bet row: {id}")))?;
        bet.settled = true;
        bet.winnings = winnings;
        bet.place_rank = place_rank;
        Ok(())
    }

    async fn delete_bets_for_race(&self, race_id: &str) -> Result<(), StoreError> {
        self.check("delete_bets_for_race")?;
        self.bets.lock().unwrap().retain(|b| b.race_id != race_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_user_roundtrip() {
        let store = MemoryStore::new();
        let user = User::new("Ross", dec!(100), false);
        store.insert_user(&user).await.unwrap();

        let loaded = store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Ross");
        assert_eq!(loaded.balance, dec!(100));

        store.update_user_balance(&user.id, dec!(75)).await.unwrap();
        let loaded = store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec!(75));
    }

    #[tokio::test]
    async fn test_list_users_leaderboard_order() {
        let store = MemoryStore::new();
        store.insert_user(&User::new("low", dec!(10), false)).await.unwrap();
        store.insert_user(&User::new("high", dec!(500), false)).await.unwrap();
        store.insert_user(&User::new("mid", dec!(90), false)).await.unwrap();

        let users = store.list_users().await.unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_race_placement_and_clear() {
        let store = MemoryStore::new();
        let race = Race::new("Cup");
        store.insert_race(&race).await.unwrap();

        store
            .set_race_placement(&race.id, PlacementSlot::Winner, "p1")
            .await
            .unwrap();
        store
            .set_race_placement(&race.id, PlacementSlot::Third, "p3")
            .await
            .unwrap();

        let loaded = store.get_race(&race.id).await.unwrap().unwrap();
        assert_eq!(loaded.winner_id.as_deref(), Some("p1"));
        assert_eq!(loaded.second_place_id, None);
        assert_eq!(loaded.third_place_id.as_deref(), Some("p3"));

        store.clear_race_placements(&race.id).await.unwrap();
        let loaded = store.get_race(&race.id).await.unwrap().unwrap();
        assert_eq!(loaded.winner_id, None);
        assert_eq!(loaded.third_place_id, None);
    }

    #[tokio::test]
    async fn test_unsettled_filter() {
        let store = MemoryStore::new();
        let mut settled = Bet::new("u1", "r1", "p1", dec!(10));
        settled.settled = true;
        store.insert_bet(&settled).await.unwrap();
        store.insert_bet(&Bet::new("u2", "r1", "p2", dec!(20))).await.unwrap();
        store.insert_bet(&Bet::new("u3", "r2", "p9", dec!(30))).await.unwrap();

        let unsettled = store.unsettled_bets_for_race("r1").await.unwrap();
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].amount, dec!(20));

        let all = store.bets_for_race("r1").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_bet_settled() {
        let store = MemoryStore::new();
        let bet = Bet::new("u1", "r1", "p1", dec!(10));
        store.insert_bet(&bet).await.unwrap();

        store.mark_bet_settled(&bet.id, dec!(34), Some(1)).await.unwrap();
        let loaded = store.get_bet(&bet.id).await.unwrap().unwrap();
        assert!(loaded.settled);
        assert_eq!(loaded.winnings, dec!(34));
        assert_eq!(loaded.place_rank, Some(1));
    }

    #[tokio::test]
    async fn test_cascade_deletes() {
        let store = MemoryStore::new();
        let race = Race::new("Cup");
        store.insert_race(&race).await.unwrap();
        store.insert_player(&Player::new(&race.id, "Ross", dec!(6.7))).await.unwrap();
        store.insert_bet(&Bet::new("u1", &race.id, "p1", dec!(10))).await.unwrap();

        store.delete_bets_for_race(&race.id).await.unwrap();
        store.delete_players_for_race(&race.id).await.unwrap();
        store.delete_race(&race.id).await.unwrap();

        assert!(store.bets_for_race(&race.id).await.unwrap().is_empty());
        assert!(store.players_for_race(&race.id).await.unwrap().is_empty());
        assert!(store.get_race(&race.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.fail_on("insert_bet");

        let err = store
            .insert_bet(&Bet::new("u1", "r1", "p1", dec!(10)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insert_bet"));

        store.clear_failures();
        store.insert_bet(&Bet::new("u1", "r1", "p1", dec!(10))).await.unwrap();
    }
}

//! Settlement engine.
//!
//! Computes payouts for every bet on a race once placements are final,
//! credits winners, and marks each bet settled exactly once. Payout tiers:
//! winner pays amount × odds, second and third pay amount × odds / 2.
//!
//! Settlement is retryable-to-completion: the `settled = false` filter is
//! what prevents double-payout, so a bet whose credit failed stays
//! unsettled and is picked up by the next invocation, while completed bets
//! are never reprocessed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::store::LedgerStore;
use crate::types::{EngineError, PlacementSlot, Race, RaceStatus};

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

/// A bet that could not be settled in this pass. It remains unsettled and
/// will be reprocessed if settlement is invoked again.
#[derive(Debug, Clone, Serialize)]
pub struct FailedSettlement {
    pub bet_id: String,
    pub reason: String,
}

/// Summary of a settlement pass over one race.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub race_id: String,
    pub settled_at: DateTime<Utc>,
    pub bets_settled: usize,
    pub bets_won: usize,
    pub total_paid: Decimal,
    pub failed: Vec<FailedSettlement>,
}

// ---------------------------------------------------------------------------
// Settlement engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Settle a race: pay out every unsettled bet by placement tier and move
    /// the race to its terminal state.
    ///
    /// Requires winner and second place to be assigned; third is optional.
    /// Re-invoking on an already-settled race reprocesses nothing.
    pub async fn settle_race(&self, race_id: &str) -> Result<SettlementReport, EngineError> {
        let race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::not_found("race", race_id))?;

        if !race.has_required_placements() {
            return Err(EngineError::IncompleteResults);
        }

        let odds = self.fetch_placement_odds(&race).await?;

        // Move the race to settled before paying out, so a crash mid-loop
        // leaves a retryable race, not a re-openable one. The timestamp is
        // written once; a retry pass keeps the original.
        let settled_at = match race.settled_at {
            Some(at) => at,
            None => {
                let now = Utc::now();
                self.store
                    .update_race_status(race_id, RaceStatus::Settled, Some(now))
                    .await?;
                now
            }
        };

        let bets = self.store.unsettled_bets_for_race(race_id).await?;
        info!(race = %race.name, bets = bets.len(), "Settling race");

        let mut report = SettlementReport {
            race_id: race_id.to_string(),
            settled_at,
            bets_settled: 0,
            bets_won: 0,
            total_paid: Decimal::ZERO,
            failed: Vec::new(),
        };

        for bet in bets {
            let (winnings, place_rank) = match race.slot_held_by(&bet.player_id) {
                Some(PlacementSlot::Winner) => (bet.amount * odds[&bet.player_id], Some(1)),
                Some(slot) => (
                    bet.amount * (odds[&bet.player_id] / dec!(2)),
                    Some(slot.rank()),
                ),
                None => (Decimal::ZERO, None),
            };

            if winnings > Decimal::ZERO {
                if let Err(e) = self.credit_winnings(&bet.user_id, winnings).await {
                    // Leave the bet unsettled so a later pass retries it.
                    warn!(
                        bet_id = %bet.id,
                        user_id = %bet.user_id,
                        %winnings,
                        error = %e,
                        "Winnings credit failed, bet left unsettled for retry"
                    );
                    report.failed.push(FailedSettlement {
                        bet_id: bet.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            if let Err(e) = self
                .store
                .mark_bet_settled(&bet.id, winnings, place_rank)
                .await
            {
                // Credited but not marked: a retry pass would pay this bet
                // again. Flag loudly.
                error!(
                    bet_id = %bet.id,
                    %winnings,
                    error = %e,
                    "FATAL: bet paid out but could not be marked settled"
                );
                report.failed.push(FailedSettlement {
                    bet_id: bet.id.clone(),
                    reason: format!("paid but not marked settled: {e}"),
                });
                continue;
            }

            report.bets_settled += 1;
            if winnings > Decimal::ZERO {
                report.bets_won += 1;
                report.total_paid += winnings;
            }
        }

        info!(
            race = %race.name,
            settled = report.bets_settled,
            won = report.bets_won,
            paid = %report.total_paid,
            failed = report.failed.len(),
            "Race settled"
        );
        Ok(report)
    }

    /// Odds for every placed player, keyed by player id.
    async fn fetch_placement_odds(
        &self,
        race: &Race,
    ) -> Result<HashMap<String, Decimal>, EngineError> {
        let mut odds = HashMap::new();
        for slot in PlacementSlot::ALL {
            if let Some(player_id) = race.placement(*slot) {
                let player = self
                    .store
                    .get_player(player_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("player", player_id))?;
                odds.insert(player.id, player.odds);
            }
        }
        Ok(odds)
    }

    /// Credit winnings onto the freshest balance read.
    async fn credit_winnings(
        &self,
        user_id: &str,
        winnings: Decimal,
    ) -> Result<(), EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;
        self.store
            .update_user_balance(user_id, user.balance + winnings)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Bet, Player, User};

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: SettlementEngine,
        race: Race,
        winner: Player,
        second: Player,
        loser: Player,
    }

    /// Open race with winner (odds 3), second (odds 2), and an unplaced
    /// player, placements already assigned.
    async fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut race = Race::new("Test Cup");
        race.status = RaceStatus::Open;

        let winner = Player::new(&race.id, "Ross", dec!(3.0));
        let second = Player::new(&race.id, "Banu", dec!(2.0));
        let loser = Player::new(&race.id, "Aaron", dec!(1.7));
        race.winner_id = Some(winner.id.clone());
        race.second_place_id = Some(second.id.clone());

        store.insert_race(&race).await.unwrap();
        for p in [&winner, &second, &loser] {
            store.insert_player(p).await.unwrap();
        }

        let engine = SettlementEngine::new(store.clone());
        Fixture {
            store,
            engine,
            race,
            winner,
            second,
            loser,
        }
    }

    async fn add_bet(f: &Fixture, user_balance: Decimal, player_id: &str, amount: Decimal) -> (User, Bet) {
        let user = User::new("bettor", user_balance, false);
        f.store.insert_user(&user).await.unwrap();
        let bet = Bet::new(&user.id, &f.race.id, player_id, amount);
        f.store.insert_bet(&bet).await.unwrap();
        (user, bet)
    }

    #[tokio::test]
    async fn test_winner_paid_full_odds() {
        let f = setup().await;
        let (user, bet) = add_bet(&f, dec!(0), &f.winner.id, dec!(100)).await;

        let report = f.engine.settle_race(&f.race.id).await.unwrap();
        assert_eq!(report.bets_settled, 1);
        assert_eq!(report.bets_won, 1);
        assert_eq!(report.total_paid, dec!(300));

        let settled = f.store.get_bet(&bet.id).await.unwrap().unwrap();
        assert!(settled.settled);
        assert_eq!(settled.winnings, dec!(300));
        assert_eq!(settled.place_rank, Some(1));

        let fresh = f.store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance, dec!(300));

        let race = f.store.get_race(&f.race.id).await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::Settled);
        assert!(race.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_second_place_paid_half_odds() {
        let f = setup().await;
        let (user, bet) = add_bet(&f, dec!(0), &f.second.id, dec!(50)).await;

        f.engine.settle_race(&f.race.id).await.unwrap();

        let settled = f.store.get_bet(&bet.id).await.unwrap().unwrap();
        assert_eq!(settled.winnings, dec!(50)); // 50 × 2.0 / 2
        assert_eq!(settled.place_rank, Some(2));
        let fresh = f.store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance, dec!(50));
    }

    #[tokio::test]
    async fn test_third_place_paid_half_odds_when_set() {
        let f = setup().await;
        f.store
            .set_race_placement(&f.race.id, PlacementSlot::Third, &f.loser.id)
            .await
            .unwrap();
        let (user, bet) = add_bet(&f, dec!(0), &f.loser.id, dec!(20)).await;

        f.engine.settle_race(&f.race.id).await.unwrap();

        let settled = f.store.get_bet(&bet.id).await.unwrap().unwrap();
        assert_eq!(settled.winnings, dec!(17)); // 20 × 1.7 / 2
        assert_eq!(settled.place_rank, Some(3));
        let fresh = f.store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance, dec!(17));
    }

    #[tokio::test]
    async fn test_losing_bet_settles_with_zero() {
        let f = setup().await;
        let (user, bet) = add_bet(&f, dec!(5), &f.loser.id, dec!(20)).await;

        let report = f.engine.settle_race(&f.race.id).await.unwrap();
        assert_eq!(report.bets_settled, 1);
        assert_eq!(report.bets_won, 0);
        assert_eq!(report.total_paid, Decimal::ZERO);

        let settled = f.store.get_bet(&bet.id).await.unwrap().unwrap();
        assert!(settled.settled);
        assert_eq!(settled.winnings, Decimal::ZERO);
        assert_eq!(settled.place_rank, None);

        let fresh = f.store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance, dec!(5)); // untouched
    }

    #[tokio::test]
    async fn test_requires_winner_and_second() {
        let store = Arc::new(MemoryStore::new());
        let mut race = Race::new("Unplaced");
        race.status = RaceStatus::Closed;
        race.winner_id = Some("p1".into());
        store.insert_race(&race).await.unwrap();

        let engine = SettlementEngine::new(store);
        let err = engine.settle_race(&race.id).await.unwrap_err();
        assert!(matches!(err, EngineError::IncompleteResults));
    }

    #[tokio::test]
    async fn test_resettle_is_noop() {
        let f = setup().await;
        let (user, bet) = add_bet(&f, dec!(0), &f.winner.id, dec!(100)).await;

        f.engine.settle_race(&f.race.id).await.unwrap();
        let first_settled_at = f
            .store
            .get_race(&f.race.id)
            .await
            .unwrap()
            .unwrap()
            .settled_at
            .unwrap();

        let report = f.engine.settle_race(&f.race.id).await.unwrap();
        assert_eq!(report.bets_settled, 0);
        assert_eq!(report.total_paid, Decimal::ZERO);

        // No double payment, winnings unchanged, timestamp preserved
        let fresh = f.store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance, dec!(300));
        let settled = f.store.get_bet(&bet.id).await.unwrap().unwrap();
        assert_eq!(settled.winnings, dec!(300));
        let race = f.store.get_race(&f.race.id).await.unwrap().unwrap();
        assert_eq!(race.settled_at.unwrap(), first_settled_at);
    }

    #[tokio::test]
    async fn test_credit_failure_leaves_bet_retryable() {
        let f = setup().await;
        let (win_user, win_bet) = add_bet(&f, dec!(0), &f.winner.id, dec!(100)).await;
        let (_, lose_bet) = add_bet(&f, dec!(0), &f.loser.id, dec!(10)).await;

        f.store.fail_on("update_user_balance");
        let report = f.engine.settle_race(&f.race.id).await.unwrap();

        // The losing bet settled (no credit needed); the winner did not.
        assert_eq!(report.bets_settled, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bet_id, win_bet.id);

        let pending = f.store.get_bet(&win_bet.id).await.unwrap().unwrap();
        assert!(!pending.settled);
        let lost = f.store.get_bet(&lose_bet.id).await.unwrap().unwrap();
        assert!(lost.settled);

        // A second pass completes the payout exactly once.
        f.store.clear_failures();
        let report = f.engine.settle_race(&f.race.id).await.unwrap();
        assert_eq!(report.bets_settled, 1);
        assert_eq!(report.total_paid, dec!(300));

        let fresh = f.store.get_user(&win_user.id).await.unwrap().unwrap();
        assert_eq!(fresh.balance, dec!(300));
    }

    #[tokio::test]
    async fn test_missing_race() {
        let store = Arc::new(MemoryStore::new());
        let engine = SettlementEngine::new(store);
        let err = engine.settle_race("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "race", .. }));
    }
}

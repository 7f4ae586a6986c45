//! Race deletion / refund engine.
//!
//! Cancels a race: refunds every not-yet-settled bet, then cascades the
//! delete through bets, placement foreign keys, players, and finally the
//! race row. The ordering is mandatory — reordering would break referential
//! integrity or lose refund information.
//!
//! Failure at any step aborts and surfaces the error with no compensation:
//! a partial delete is non-canonical but not corrupt, and refunds already
//! applied stay applied.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::LedgerStore;
use crate::types::EngineError;

/// Summary of a race deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub race_id: String,
    pub race_name: String,
    pub bets_refunded: usize,
    pub total_refunded: Decimal,
    pub deleted_at: chrono::DateTime<Utc>,
}

pub struct DeletionEngine {
    store: Arc<dyn LedgerStore>,
}

impl DeletionEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Delete a race, refunding unsettled bets first.
    ///
    /// A refund returns the stake only (never winnings) and is recorded as a
    /// zero-winnings settlement, indistinguishable from a losing bet once
    /// the rows are gone.
    pub async fn delete_race(&self, race_id: &str) -> Result<DeletionReport, EngineError> {
        let race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::not_found("race", race_id))?;

        let bets = self.store.bets_for_race(race_id).await?;

        let mut report = DeletionReport {
            race_id: race_id.to_string(),
            race_name: race.name.clone(),
            bets_refunded: 0,
            total_refunded: Decimal::ZERO,
            deleted_at: Utc::now(),
        };

        // Step 1: refund-and-settle every unsettled bet.
        for bet in bets.iter().filter(|b| !b.settled) {
            match self.store.get_user(&bet.user_id).await? {
                Some(user) => {
                    self.store
                        .update_user_balance(&bet.user_id, user.balance + bet.amount)
                        .await?;
                    report.bets_refunded += 1;
                    report.total_refunded += bet.amount;
                }
                None => {
                    warn!(
                        bet_id = %bet.id,
                        user_id = %bet.user_id,
                        "Bettor row missing during refund, stake forfeited"
                    );
                }
            }
            self.store
                .mark_bet_settled(&bet.id, Decimal::ZERO, None)
                .await?;
        }

        // Steps 2-5: cascade the delete in FK-safe order.
        self.store.delete_bets_for_race(race_id).await?;
        self.store.clear_race_placements(race_id).await?;
        self.store.delete_players_for_race(race_id).await?;
        self.store.delete_race(race_id).await?;

        info!(
            race = %race.name,
            refunded = report.bets_refunded,
            total = %report.total_refunded,
            "Race deleted"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

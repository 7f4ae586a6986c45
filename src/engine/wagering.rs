//! Wagering engine.
//!
//! Validates and records bets, debiting the bettor's balance, and supports
//! amending an unsettled bet's stake. The store has no multi-row
//! transactions, so every two-row mutation here carries an explicit
//! compensating action: the debit is re-credited if the bet insert fails,
//! and an amended stake is rolled back if the balance write fails.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::store::LedgerStore;
use crate::types::{Bet, EngineError, RaceStatus, StoreError};

pub struct WageringEngine {
    store: Arc<dyn LedgerStore>,
}

impl WageringEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Place a bet for a user on a player in an open race.
    ///
    /// Preconditions, each a distinct failure: positive amount, sufficient
    /// balance, race open. The player must exist; whether it belongs to the
    /// race is trusted to the caller, matching the admin flow that only
    /// offers same-race players.
    pub async fn place_bet(
        &self,
        user_id: &str,
        race_id: &str,
        player_id: &str,
        amount: Decimal,
    ) -> Result<Bet, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "bet amount must be positive".into(),
            ));
        }

        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        if user.balance < amount {
            return Err(EngineError::InsufficientBalance {
                needed: amount,
                available: user.balance,
            });
        }

        match self.store.get_race(race_id).await? {
            Some(race) if race.status == RaceStatus::Open => {}
            _ => return Err(EngineError::RaceNotOpen),
        }

        self.store
            .get_player(player_id)
            .await?
            .ok_or_else(|| EngineError::not_found("player", player_id))?;

        // Debit first, then insert. The balance just read is the freshest
        // value preceding the write.
        self.store
            .update_user_balance(user_id, user.balance - amount)
            .await?;

        let bet = Bet::new(user_id, race_id, player_id, amount);
        if let Err(insert_err) = self.store.insert_bet(&bet).await {
            warn!(
                user_id,
                race_id,
                %amount,
                error = %insert_err,
                "Bet insert failed after debit, re-crediting balance"
            );
            return Err(self.recredit_after_failed_insert(user_id, amount, insert_err).await);
        }

        info!(
            user_id,
            race_id,
            player_id,
            amount = %bet.amount,
            bet_id = %bet.id,
            "Bet placed"
        );
        Ok(bet)
    }

    /// Compensating action for a failed bet insert: restore the debited
    /// amount onto the user's freshest balance. A failure here leaves the
    /// ledger inconsistent and is surfaced distinctly.
    async fn recredit_after_failed_insert(
        &self,
        user_id: &str,
        amount: Decimal,
        insert_err: StoreError,
    ) -> EngineError {
        let restore = async {
            let fresh = self
                .store
                .get_user(user_id)
                .await?
                .ok_or_else(|| StoreError::new(format!("no user row: {user_id}")))?;
            self.store
                .update_user_balance(user_id, fresh.balance + amount)
                .await
        };

        match restore.await {
            Ok(()) => EngineError::Store(insert_err),
            Err(credit_err) => {
                error!(
                    user_id,
                    %amount,
                    insert_error = %insert_err,
                    credit_error = %credit_err,
                    "FATAL: balance debited but bet insert and compensating credit both failed"
                );
                EngineError::Store(StoreError::new(format!(
                    "bet insert failed ({insert_err}) and the compensating balance credit \
                     also failed ({credit_err}); user {user_id} is owed {amount}",
                )))
            }
        }
    }

    /// Amend the stake on an unsettled bet owned by the user.
    ///
    /// The balance moves by the stake delta: shrinking refunds the
    /// difference, growing debits it (and must be fundable from the current
    /// balance). Potential winnings are a view concern — nothing is
    /// recomputed here.
    pub async fn update_bet(
        &self,
        bet_id: &str,
        new_amount: Decimal,
        user_id: &str,
    ) -> Result<Bet, EngineError> {
        if new_amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "bet amount must be positive".into(),
            ));
        }

        let bet = self
            .store
            .get_bet(bet_id)
            .await?
            .ok_or_else(|| EngineError::not_found("bet", bet_id))?;

        if bet.user_id != user_id {
            return Err(EngineError::Validation(
                "bet does not belong to this user".into(),
            ));
        }
        if bet.settled {
            return Err(EngineError::Validation("bet is already settled".into()));
        }

        // Positive when shrinking the stake, negative when growing it.
        let balance_delta = bet.amount - new_amount;

        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        let new_balance = user.balance + balance_delta;
        if new_balance < Decimal::ZERO {
            return Err(EngineError::InsufficientBalance {
                needed: new_amount,
                available: user.balance + bet.amount,
            });
        }

        self.store.update_bet_amount(bet_id, new_amount).await?;

        if let Err(balance_err) = self.store.update_user_balance(user_id, new_balance).await {
            warn!(
                bet_id,
                user_id,
                error = %balance_err,
                "Balance update failed after stake change, rolling bet amount back"
            );
            return Err(self
                .rollback_bet_amount(bet_id, bet.amount, balance_err)
                .await);
        }

        info!(
            bet_id,
            user_id,
            old_amount = %bet.amount,
            new_amount = %new_amount,
            "Bet amount updated"
        );

        let mut updated = bet;
        updated.amount = new_amount;
        Ok(updated)
    }

    /// Compensating action for a failed balance write: restore the bet's
    /// previous stake.
    async fn rollback_bet_amount(
        &self,
        bet_id: &str,
        previous_amount: Decimal,
        balance_err: StoreError,
    ) -> EngineError {
        match self.store.update_bet_amount(bet_id, previous_amount).await {
            Ok(()) => EngineError::Store(balance_err),
            Err(rollback_err) => {
                error!(
                    bet_id,
                    balance_error = %balance_err,
                    rollback_error = %rollback_err,
                    "FATAL: bet amount changed but balance update and rollback both failed"
                );
                EngineError::Store(StoreError::new(format!(
                    "balance update failed ({balance_err}) and the bet amount rollback \
                     also failed ({rollback_err}); bet {bet_id} should hold {previous_amount}",
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

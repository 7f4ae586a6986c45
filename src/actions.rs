//! Caller-facing action layer.
//!
//! Every engine operation (plus the plain CRUD callers need) exposed as a
//! request/response function returning the `{success, data?, error?}`
//! envelope. Presentation layers invoke these, display the error message
//! verbatim on failure, and never see a raw error type.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::engine::deletion::{DeletionEngine, DeletionReport};
use crate::engine::lifecycle::{BulkAction, BulkStatusReport, RaceLifecycle};
use crate::engine::settlement::{SettlementEngine, SettlementReport};
use crate::engine::wagering::WageringEngine;
use crate::store::LedgerStore;
use crate::types::{
    ActionResult, Bet, EngineError, PlacementSlot, Player, Race, RaceStatus, User,
};
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Race CRUD
// ---------------------------------------------------------------------------

/// Everything a race page needs in one payload.
#[derive(Debug, Clone, Serialize)]
pub struct RaceDetail {
    pub race: Race,
    pub players: Vec<Player>,
    pub bets: Vec<Bet>,
}

pub async fn create_race(store: &Arc<dyn LedgerStore>, name: &str) -> ActionResult<Race> {
    let result = async {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("race name must not be empty".into()));
        }
        let race = Race::new(name.trim());
        store.insert_race(&race).await?;
        Ok(race)
    };
    result.await.into()
}

pub async fn list_races(store: &Arc<dyn LedgerStore>) -> ActionResult<Vec<Race>> {
    store
        .list_races()
        .await
        .map_err(EngineError::from)
        .into()
}

pub async fn get_race_detail(store: &Arc<dyn LedgerStore>, race_id: &str) -> ActionResult<RaceDetail> {
    let result = async {
        let race = store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::not_found("race", race_id))?;
        let players = store.players_for_race(race_id).await?;
        let bets = store.bets_for_race(race_id).await?;
        Ok(RaceDetail { race, players, bets })
    };
    result.await.into()
}

pub async fn add_player(
    store: &Arc<dyn LedgerStore>,
    race_id: &str,
    name: &str,
    odds: Decimal,
) -> ActionResult<Player> {
    let result = async {
        if odds <= dec!(1) {
            return Err(EngineError::Validation(
                "odds must be greater than 1".into(),
            ));
        }
        store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::not_found("race", race_id))?;
        let player = Player::new(race_id, name, odds);
        store.insert_player(&player).await?;
        Ok(player)
    };
    result.await.into()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub async fn set_placement(
    store: &Arc<dyn LedgerStore>,
    race_id: &str,
    slot: PlacementSlot,
    player_id: &str,
) -> ActionResult<Race> {
    RaceLifecycle::new(store.clone())
        .set_placement(race_id, slot, player_id)
        .await
        .into()
}

pub async fn update_race_status(
    store: &Arc<dyn LedgerStore>,
    race_id: &str,
    status: RaceStatus,
) -> ActionResult<Race> {
    RaceLifecycle::new(store.clone())
        .update_status(race_id, status)
        .await
        .into()
}

pub async fn bulk_update_race_status(
    store: &Arc<dyn LedgerStore>,
    action: BulkAction,
) -> ActionResult<BulkStatusReport> {
    RaceLifecycle::new(store.clone())
        .bulk_update_status(action)
        .await
        .into()
}

// ---------------------------------------------------------------------------
// Wagering
// ---------------------------------------------------------------------------

pub async fn place_bet(
    store: &Arc<dyn LedgerStore>,
    user_id: &str,
    race_id: &str,
    player_id: &str,
    amount: Decimal,
) -> ActionResult<Bet> {
    WageringEngine::new(store.clone())
        .place_bet(user_id, race_id, player_id, amount)
        .await
        .into()
}

pub async fn update_bet(
    store: &Arc<dyn LedgerStore>,
    bet_id: &str,
    new_amount: Decimal,
    user_id: &str,
) -> ActionResult<Bet> {
    WageringEngine::new(store.clone())
        .update_bet(bet_id, new_amount, user_id)
        .await
        .into()
}

pub async fn user_bets_for_race(
    store: &Arc<dyn LedgerStore>,
    user_id: &str,
    race_id: &str,
) -> ActionResult<Vec<Bet>> {
    store
        .bets_for_user_race(user_id, race_id)
        .await
        .map_err(EngineError::from)
        .into()
}

// ---------------------------------------------------------------------------
// Settlement & deletion
// ---------------------------------------------------------------------------

pub async fn settle_race(
    store: &Arc<dyn LedgerStore>,
    race_id: &str,
) -> ActionResult<SettlementReport> {
    SettlementEngine::new(store.clone())
        .settle_race(race_id)
        .await
        .into()
}

pub async fn delete_race(
    store: &Arc<dyn LedgerStore>,
    race_id: &str,
) -> ActionResult<DeletionReport> {
    DeletionEngine::new(store.clone())
        .delete_race(race_id)
        .await
        .into()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn create_user(
    store: &Arc<dyn LedgerStore>,
    name: &str,
    starting_balance: Decimal,
    is_admin: bool,
) -> ActionResult<User> {
    let result = async {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("user name must not be empty".into()));
        }
        if starting_balance < Decimal::ZERO {
            return Err(EngineError::Validation(
                "starting balance must not be negative".into(),
            ));
        }
        let user = User::new(name.trim(), starting_balance, is_admin);
        store.insert_user(&user).await?;
        Ok(user)
    };
    result.await.into()
}

pub async fn get_user(store: &Arc<dyn LedgerStore>, user_id: &str) -> ActionResult<User> {
    let result = async {
        store
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))
    };
    result.await.into()
}

/// All users, highest balance first.
pub async fn leaderboard(store: &Arc<dyn LedgerStore>) -> ActionResult<Vec<User>> {
    store.list_users().await.map_err(EngineError::from).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Demo fixture data.
//!
//! Seeds a recognisable office-pool setup: one admin, a handful of bettors,
//! and an open race with priced players. Skipped when the store already
//! holds users, so restarting the binary never duplicates rows.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

use crate::store::LedgerStore;
use crate::types::{EngineError, Player, Race, RaceStatus, User};

/// Populate an empty store with demo users and one open race.
pub async fn seed_demo_data(store: &Arc<dyn LedgerStore>) -> Result<(), EngineError> {
    if !store.list_users().await?.is_empty() {
        info!("Store already populated, skipping seed");
        return Ok(());
    }

    store
        .insert_user(&User::new("Admin", dec!(1000), true))
        .await?;
    for name in ["John", "Jane", "Pierre", "Marie", "Tom", "Lucy"] {
        store.insert_user(&User::new(name, dec!(100), false)).await?;
    }

    let mut race = Race::new("FDJ Team Cup");
    race.status = RaceStatus::Open;
    store.insert_race(&race).await?;

    let players = [
        ("Ross", dec!(6.7)),
        ("Banu", dec!(12.2)),
        ("Neil H", dec!(3.4)),
        ("Aaron", dec!(1.7)),
        ("Aneta", dec!(7.7)),
    ];
    for (name, odds) in players {
        store
            .insert_player(&Player::new(&race.id, name, odds))
            .await?;
    }

    info!(race = %race.name, users = 7, players = 5, "Seeded demo data");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

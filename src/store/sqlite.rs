//! SQLite ledger store.
//!
//! Durable implementation of `LedgerStore` over an sqlx connection pool.
//! Decimals are stored as TEXT to keep currency math exact, timestamps as
//! RFC3339 TEXT. The schema is bootstrapped on connect so a fresh database
//! file is usable immediately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use super::LedgerStore;
use crate::types::{Bet, PlacementSlot, Player, Race, RaceStatus, StoreError, User};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::new(e.to_string())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    balance    TEXT NOT NULL,
    is_admin   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS races (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    status           TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    settled_at       TEXT,
    winner_id        TEXT,
    second_place_id  TEXT,
    third_place_id   TEXT
);

CREATE TABLE IF NOT EXISTS players (
    id       TEXT PRIMARY KEY,
    race_id  TEXT NOT NULL,
    name     TEXT NOT NULL,
    odds     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bets (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    race_id     TEXT NOT NULL,
    player_id   TEXT NOT NULL,
    amount      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    settled     INTEGER NOT NULL DEFAULT 0,
    winnings    TEXT NOT NULL DEFAULT '0',
    place_rank  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_players_race ON players (race_id);
CREATE INDEX IF NOT EXISTS idx_bets_race ON bets (race_id);
CREATE INDEX IF NOT EXISTS idx_bets_user ON bets (user_id);
"#;

/// SQLite-backed ledger store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a SQLite database and bootstrap the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::new(format!("bad database url {url}: {e}")))?
            .create_if_missing(true);

        // An in-memory database exists per-connection, so the pool must not
        // fan out for `:memory:` URLs.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(url, "SQLite ledger store ready");
        Ok(Self { pool })
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::new(format!("bad decimal in {column}: {raw} ({e})")))
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::new(format!("bad timestamp in {column}: {raw} ({e})")))
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        balance: parse_decimal(&row.try_get::<String, _>("balance")?, "users.balance")?,
        is_admin: row.try_get::<i64, _>("is_admin")? != 0,
    })
}

fn race_from_row(row: &SqliteRow) -> Result<Race, StoreError> {
    let status: String = row.try_get("status")?;
    let settled_at: Option<String> = row.try_get("settled_at")?;
    Ok(Race {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status
            .parse::<RaceStatus>()
            .map_err(|e| StoreError::new(e.to_string()))?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?, "races.created_at")?,
        settled_at: settled_at
            .map(|s| parse_timestamp(&s, "races.settled_at"))
            .transpose()?,
        winner_id: row.try_get("winner_id")?,
        second_place_id: row.try_get("second_place_id")?,
        third_place_id: row.try_get("third_place_id")?,
    })
}

fn player_from_row(row: &SqliteRow) -> Result<Player, StoreError> {
    Ok(Player {
        id: row.try_get("id")?,
        race_id: row.try_get("race_id")?,
        name: row.try_get("name")?,
        odds: parse_decimal(&row.try_get::<String, _>("odds")?, "players.odds")?,
    })
}

fn bet_from_row(row: &SqliteRow) -> Result<Bet, StoreError> {
    Ok(Bet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        race_id: row.try_get("race_id")?,
        player_id: row.try_get("player_id")?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?, "bets.amount")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?, "bets.created_at")?,
        settled: row.try_get::<i64, _>("settled")? != 0,
        winnings: parse_decimal(&row.try_get::<String, _>("winnings")?, "bets.winnings")?,
        place_rank: row
            .try_get::<Option<i64>, _>("place_rank")?
            .map(|r| r as u8),
    })
}

fn require_row(result: sqlx::sqlite::SqliteQueryResult, what: &str) -> Result<(), StoreError> {
    if result.rows_affected() == 0 {
        return Err(StoreError::new(format!("no {what} row")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LedgerStore implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for SqliteStore {
    // -- Users --

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, name, balance, is_admin) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.name)
            .bind(user.balance.to_string())
            .bind(user.is_admin as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        // balance is TEXT, so order numerically via CAST
        let rows = sqlx::query("SELECT * FROM users ORDER BY CAST(balance AS REAL) DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn update_user_balance(&self, id: &str, balance: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET balance = ? WHERE id = ?")
            .bind(balance.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_row(result, "user")
    }

    // -- Races --

    async fn insert_race(&self, race: &Race) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO races (id, name, status, created_at, settled_at, winner_id, \
             second_place_id, third_place_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&race.id)
        .bind(&race.name)
        .bind(race.status.to_string())
        .bind(race.created_at.to_rfc3339())
        .bind(race.settled_at.map(|at| at.to_rfc3339()))
        .bind(&race.winner_id)
        .bind(&race.second_place_id)
        .bind(&race.third_place_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_race(&self, id: &str) -> Result<Option<Race>, StoreError> {
        let row = sqlx::query("SELECT * FROM races WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(race_from_row).transpose()
    }

    async fn list_races(&self) -> Result<Vec<Race>, StoreError> {
        let rows = sqlx::query("SELECT * FROM races ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(race_from_row).collect()
    }

    async fn update_race_status(
        &self,
        id: &str,
        status: RaceStatus,
        settled_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = match settled_at {
            Some(at) => {
                sqlx::query("UPDATE races SET status = ?, settled_at = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(at.to_rfc3339())
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("UPDATE races SET status = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };
        require_row(result, "race")
    }

    async fn set_race_placement(
        &self,
        id: &str,
        slot: PlacementSlot,
        player_id: &str,
    ) -> Result<(), StoreError> {
        let column = match slot {
            PlacementSlot::Winner => "winner_id",
            PlacementSlot::Second => "second_place_id",
            PlacementSlot::Third => "third_place_id",
        };
        let result = sqlx::query(&format!("UPDATE races SET {column} = ? WHERE id = ?"))
            .bind(player_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_row(result, "race")
    }

    async fn clear_race_placements(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE races SET winner_id = NULL, second_place_id = NULL, \
             third_place_id = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        require_row(result, "race")
    }

    async fn delete_race(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM races WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Players --

    async fn insert_player(&self, player: &Player) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO players (id, race_id, name, odds) VALUES (?, ?, ?, ?)")
            .bind(&player.id)
            .bind(&player.race_id)
            .bind(&player.name)
            .bind(player.odds.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_player(&self, id: &str) -> Result<Option<Player>, StoreError> {
        let row = sqlx::query("SELECT * FROM players WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn players_for_race(&self, race_id: &str) -> Result<Vec<Player>, StoreError> {
        let rows = sqlx::query("SELECT * FROM players WHERE race_id = ?")
            .bind(race_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(player_from_row).collect()
    }

    async fn delete_players_for_race(&self, race_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM players WHERE race_id = ?")
            .bind(race_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Bets --

    async fn insert_bet(&self, bet: &Bet) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bets (id, user_id, race_id, player_id, amount, created_at, \
             settled, winnings, place_rank) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bet.id)
        .bind(&bet.user_id)
        .bind(&bet.race_id)
        .bind(&bet.player_id)
        .bind(bet.amount.to_string())
        .bind(bet.created_at.to_rfc3339())
        .bind(bet.settled as i64)
        .bind(bet.winnings.to_string())
        .bind(bet.place_rank.map(|r| r as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_bet(&self, id: &str) -> Result<Option<Bet>, StoreError> {
        let row = sqlx::query("SELECT * FROM bets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(bet_from_row).transpose()
    }

    async fn bets_for_race(&self, race_id: &str) -> Result<Vec<Bet>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bets WHERE race_id = ?")
            .bind(race_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(bet_from_row).collect()
    }

    async fn unsettled_bets_for_race(&self, race_id: &str) -> Result<Vec<Bet>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bets WHERE race_id = ? AND settled = 0")
            .bind(race_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(bet_from_row).collect()
    }

    async fn bets_for_user_race(
        &self,
        user_id: &str,
        race_id: &str,
    ) -> Result<Vec<Bet>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bets WHERE user_id = ? AND race_id = ?")
            .bind(user_id)
            .bind(race_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(bet_from_row).collect()
    }

    async fn update_bet_amount(&self, id: &str, amount: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE bets SET amount = ? WHERE id = ?")
            .bind(amount.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        require_row(result, "bet")
    }

    async fn mark_bet_settled(
        &self,
        id: &str,
        winnings: Decimal,
        place_rank: Option<u8>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE bets SET settled = 1, winnings = ?, place_rank = ? WHERE id = ?")
                .bind(winnings.to_string())
                .bind(place_rank.map(|r| r as i64))
                .bind(id)
                .execute(&self.pool)
                .await?;
        require_row(result, "bet")
    }

    async fn delete_bets_for_race(&self, race_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bets WHERE race_id = ?")
            .bind(race_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Race lifecycle controller.
//!
//! Validates and applies race status transitions and placement assignments.
//! Settlement is deliberately unreachable from here — a race only becomes
//! `settled` through the settlement engine, so payout logic always runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::store::LedgerStore;
use crate::types::{EngineError, PlacementSlot, Race, RaceStatus};

// ---------------------------------------------------------------------------
// Bulk status report
// ---------------------------------------------------------------------------

/// Target of a bulk status sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Open,
    Close,
}

impl BulkAction {
    pub fn target_status(&self) -> RaceStatus {
        match self {
            BulkAction::Open => RaceStatus::Open,
            BulkAction::Close => RaceStatus::Closed,
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkAction::Open => write!(f, "open"),
            BulkAction::Close => write!(f, "close"),
        }
    }
}

impl std::str::FromStr for BulkAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(BulkAction::Open),
            "close" => Ok(BulkAction::Close),
            _ => Err(anyhow::anyhow!("Unknown bulk action: {s}")),
        }
    }
}

/// A race left untouched by a bulk sweep, with the reason why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRace {
    pub name: String,
    pub reason: String,
}

/// Outcome of a bulk status sweep. Each race is updated independently;
/// one failure never blocks the others.
#[derive(Debug, Clone, Serialize)]
pub struct BulkStatusReport {
    pub updated_count: usize,
    pub skipped_count: usize,
    pub skipped_races: Vec<SkippedRace>,
}

// ---------------------------------------------------------------------------
// Lifecycle controller
// ---------------------------------------------------------------------------

pub struct RaceLifecycle {
    store: Arc<dyn LedgerStore>,
}

impl RaceLifecycle {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Assign a player to a placement slot on a race.
    ///
    /// A player may hold at most one slot; re-assigning the same slot to the
    /// same player is an allowed no-op. Only the single foreign-key field is
    /// persisted.
    pub async fn set_placement(
        &self,
        race_id: &str,
        slot: PlacementSlot,
        player_id: &str,
    ) -> Result<Race, EngineError> {
        let mut race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::not_found("race", race_id))?;

        let player = self
            .store
            .get_player(player_id)
            .await?
            .ok_or_else(|| EngineError::not_found("player", player_id))?;

        if player.race_id != race.id {
            return Err(EngineError::Validation(format!(
                "player {} does not belong to race {}",
                player.name, race.name,
            )));
        }

        if race.placement(slot) == Some(player_id) {
            return Ok(race);
        }

        if let Some(held) = race.slot_held_by(player_id) {
            return Err(EngineError::Conflict(format!(
                "player {} already holds the {held} slot",
                player.name,
            )));
        }

        self.store.set_race_placement(race_id, slot, player_id).await?;
        info!(race = %race.name, %slot, player = %player.name, "Placement set");

        match slot {
            PlacementSlot::Winner => race.winner_id = Some(player_id.to_string()),
            PlacementSlot::Second => race.second_place_id = Some(player_id.to_string()),
            PlacementSlot::Third => race.third_place_id = Some(player_id.to_string()),
        }
        Ok(race)
    }

    /// Apply a direct status transition.
    ///
    /// Allowed targets are `upcoming`, `open`, and `closed`. No starting-state
    /// restriction is enforced here — the caller offers sensible transitions.
    pub async fn update_status(
        &self,
        race_id: &str,
        status: RaceStatus,
    ) -> Result<Race, EngineError> {
        if status == RaceStatus::Settled {
            return Err(EngineError::Validation(
                "races are settled through the settlement engine, not a status update".into(),
            ));
        }

        let mut race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| EngineError::not_found("race", race_id))?;

        self.store.update_race_status(race_id, status, None).await?;
        info!(race = %race.name, from = %race.status, to = %status, "Race status updated");

        race.status = status;
        Ok(race)
    }

    /// Sweep every non-settled race towards the target status.
    ///
    /// Skip rules:
    /// - already in the target status ("already <status>")
    /// - opening a race that is missing its winner or second place
    /// - closing a race that is not currently open
    /// - a per-race store failure is recorded as a skip, never an abort
    pub async fn bulk_update_status(
        &self,
        action: BulkAction,
    ) -> Result<BulkStatusReport, EngineError> {
        let target = action.target_status();
        let races = self.store.list_races().await?;

        let mut report = BulkStatusReport {
            updated_count: 0,
            skipped_count: 0,
            skipped_races: Vec::new(),
        };

        for race in races {
            if race.status == RaceStatus::Settled {
                continue;
            }

            let skip_reason = if race.status == target {
                Some(format!("already {target}"))
            } else if action == BulkAction::Open && !race.has_required_placements() {
                Some("missing winner or second place".to_string())
            } else if action == BulkAction::Close && race.status != RaceStatus::Open {
                Some(format!("not open (currently {})", race.status))
            } else {
                None
            };

            if let Some(reason) = skip_reason {
                report.skipped_count += 1;
                report.skipped_races.push(SkippedRace {
                    name: race.name.clone(),
                    reason,
                });
                continue;
            }

            match self.store.update_race_status(&race.id, target, None).await {
                Ok(()) => report.updated_count += 1,
                Err(e) => {
                    warn!(race = %race.name, error = %e, "Bulk status update failed for race");
                    report.skipped_count += 1;
                    report.skipped_races.push(SkippedRace {
                        name: race.name.clone(),
                        reason: format!("update failed: {e}"),
                    });
                }
            }
        }

        info!(
            %action,
            updated = report.updated_count,
            skipped = report.skipped_count,
            "Bulk status sweep complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! JSON API server over the action layer.
//!
//! A thin Axum router: each route deserializes a payload, calls the matching
//! action, and returns the `{success, data?, error?}` envelope as JSON with
//! status 200. Clients branch on `success`, never on the HTTP status.
//! CORS enabled for local development.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::actions;
use crate::engine::deletion::DeletionReport;
use crate::engine::lifecycle::{BulkAction, BulkStatusReport};
use crate::engine::settlement::SettlementReport;
use crate::store::LedgerStore;
use crate::types::{ActionResult, Bet, PlacementSlot, Player, Race, RaceStatus, User};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by all route handlers.
pub struct ServerState {
    pub store: Arc<dyn LedgerStore>,
    /// Balance granted to users created through the API.
    pub starting_balance: Decimal,
}

pub type AppState = Arc<ServerState>;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRaceRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPlayerRequest {
    pub name: String,
    pub odds: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SetPlacementRequest {
    pub slot: PlacementSlot,
    pub player_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RaceStatus,
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub action: BulkAction,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: String,
    pub race_id: String,
    pub player_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBetRequest {
    pub user_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Start the API server.
///
/// This spawns a background task — it doesn't block.
pub fn spawn_server(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "API server starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind API port");

        axum::serve(listener, app).await.expect("API server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/races", get(list_races).post(create_race))
        .route("/api/races/bulk-status", post(bulk_update_status))
        .route("/api/races/:id", get(get_race).delete(delete_race))
        .route("/api/races/:id/players", post(add_player))
        .route("/api/races/:id/placements", post(set_placement))
        .route("/api/races/:id/status", post(update_status))
        .route("/api/races/:id/settle", post(settle_race))
        .route("/api/bets", post(place_bet))
        .route("/api/bets/:id", patch(update_bet))
        .route("/api/users", get(leaderboard).post(create_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:user_id/races/:race_id/bets", get(user_bets))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn list_races(State(state): State<AppState>) -> Json<ActionResult<Vec<Race>>> {
    Json(actions::list_races(&state.store).await)
}

async fn create_race(
    State(state): State<AppState>,
    Json(req): Json<CreateRaceRequest>,
) -> Json<ActionResult<Race>> {
    Json(actions::create_race(&state.store, &req.name).await)
}

async fn get_race(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ActionResult<actions::RaceDetail>> {
    Json(actions::get_race_detail(&state.store, &id).await)
}

async fn delete_race(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ActionResult<DeletionReport>> {
    Json(actions::delete_race(&state.store, &id).await)
}

async fn add_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddPlayerRequest>,
) -> Json<ActionResult<Player>> {
    Json(actions::add_player(&state.store, &id, &req.name, req.odds).await)
}

async fn set_placement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetPlacementRequest>,
) -> Json<ActionResult<Race>> {
    Json(actions::set_placement(&state.store, &id, req.slot, &req.player_id).await)
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Json<ActionResult<Race>> {
    Json(actions::update_race_status(&state.store, &id, req.status).await)
}

async fn bulk_update_status(
    State(state): State<AppState>,
    Json(req): Json<BulkStatusRequest>,
) -> Json<ActionResult<BulkStatusReport>> {
    Json(actions::bulk_update_race_status(&state.store, req.action).await)
}

async fn settle_race(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ActionResult<SettlementReport>> {
    Json(actions::settle_race(&state.store, &id).await)
}

async fn place_bet(
    State(state): State<AppState>,
    Json(req): Json<PlaceBetRequest>,
) -> Json<ActionResult<Bet>> {
    Json(
        actions::place_bet(
            &state.store,
            &req.user_id,
            &req.race_id,
            &req.player_id,
            req.amount,
        )
        .await,
    )
}

async fn update_bet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBetRequest>,
) -> Json<ActionResult<Bet>> {
    Json(actions::update_bet(&state.store, &id, req.amount, &req.user_id).await)
}

async fn leaderboard(State(state): State<AppState>) -> Json<ActionResult<Vec<User>>> {
    Json(actions::leaderboard(&state.store).await)
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Json<ActionResult<User>> {
    Json(actions::create_user(&state.store, &req.name, state.starting_balance, req.is_admin).await)
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ActionResult<User>> {
    Json(actions::get_user(&state.store, &id).await)
}

async fn user_bets(
    State(state): State<AppState>,
    Path((user_id, race_id)): Path<(String, String)>,
) -> Json<ActionResult<Vec<Bet>>> {
    Json(actions::user_bets_for_race(&state.store, &user_id, &race_id).await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
